//! Process-wide query runtime: cancellation contexts, the query registry
//! backing SHOW PROCESSLIST, and the bounded error ring.

mod context;
mod error_ring;
mod registry;

pub use context::{CancelHandle, QueryContext};
pub use error_ring::{ErrorRing, RecordedError};
pub use registry::{QueryInfo, QueryRuntime, QueryStatus};
