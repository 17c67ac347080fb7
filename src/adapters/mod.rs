pub mod ethereum;
pub mod heimdall;
pub mod subgraph;
pub mod traits;

pub use ethereum::EthereumClient;
pub use heimdall::HeimdallClient;
pub use subgraph::SubgraphClient;
pub use traits::{BlockTimeSource, StakeUpdateSource, ValidatorStateSource};
