//! Writable virtual configuration tables backed by JSON files.
//!
//! Each table serialises every read and write against its file through a
//! single process-wide mutex, held across the disk I/O. Configuration
//! edits are rare, so the coarse lock is adequate.

mod api_client_table;
mod datasource_table;
mod json_store;

pub use api_client_table::{ApiClientRecord, ApiClientTable};
pub use datasource_table::{DatasourceRecord, DatasourceTable};
pub(crate) use json_store::JsonFileStore;
