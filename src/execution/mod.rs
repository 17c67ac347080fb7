pub mod heimdallcli;
pub mod submitter;

pub use heimdallcli::{HeimdallCliConfig, HeimdallCliSubmitter};
pub use submitter::{CorrectionSubmitter, Submission};
