//! Hardware-calibrated cost model.
//!
//! At startup the host is probed into a [`HardwareProfile`]; the profile
//! derives the four cost factors every operator formula is expressed in.

mod cardinality;
mod hardware;
mod model;

pub use cardinality::CardinalityEstimator;
pub use hardware::{CostFactors, DiskType, HardwareProfile};
pub use model::{CostModel, VectorIndexKind};
