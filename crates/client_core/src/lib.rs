//! Client side of the phylogenetic analysis workflow.

pub mod config;
pub mod controller;
pub mod gateway;
pub mod interpret;
pub mod layout;
pub mod render;
pub mod transport;
pub mod types;
pub mod upload;

pub use config::{load_settings, Settings};
pub use controller::{PipelineController, PipelineError, PipelineEvent, PipelineSnapshot};
pub use gateway::{Gateway, GatewayError, OperationKey, OperationStatus, OperationTracker};
pub use interpret::{interpret, ComparisonInterpretation, SimilarityBand, TopologyBand};
pub use layout::{LayoutNode, TreeLayout};
pub use transport::{HttpPhyloBackend, PhyloBackend};
pub use types::{AlignmentState, ComparisonResult, Session, TreeArtifact};
pub use upload::FastaUpload;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
