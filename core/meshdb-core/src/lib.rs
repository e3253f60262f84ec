//! # MeshDB — Federated SQL Execution Engine
//!
//! MeshDB accepts MySQL-compatible SQL, compiles it into cost-based
//! physical plans, and runs those plans against pluggable data sources:
//! an MVCC in-memory store, a sled-backed key-value store, and whatever
//! adapters the embedding process registers.
//!
//! ## Quick Start
//!
//! ```rust
//! use meshdb_core::Engine;
//!
//! # fn main() -> meshdb_core::MeshResult<()> {
//! let engine = Engine::new();
//! let session = engine.connect();
//!
//! engine.execute(&session, "CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(255))")?;
//! engine.execute(&session, "INSERT INTO users (name) VALUES ('Alice')")?;
//!
//! let result = engine.execute(&session, "SELECT * FROM users WHERE id = 1")?;
//! assert_eq!(result.rows.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution Pipeline
//!
//! ```text
//! SQL String → Parser → AST → LogicalPlan → Optimizer (rules + cost +
//! join reorder) → Plan IR → Executor → QueryResult
//! ```
//!
//! Operators route every table read and write through the data-access
//! [`datasource::Service`], which consults the [`datasource::Router`] at
//! call time, so re-routing a table takes effect immediately.
//!
//! ## Module Structure
//! - [`engine`] — the facade ([`Engine`])
//! - [`sql`] — planner, optimizer, plan IR, physical operators
//! - [`datasource`] — storage contract, backends, registry, routing
//! - [`runtime`] — query registry, cancellation, progress
//! - [`fulltext`] — BM25 scoring and sparse vectors
//! - [`vector`] — flat and HNSW vector indexes
//! - [`session`] — session store and scratchpads
//! - [`vtable`] — writable JSON-backed configuration tables

pub mod datasource;
pub mod engine;
pub mod error;
pub mod fulltext;
pub mod runtime;
pub mod session;
pub mod sql;
pub mod types;
pub mod vector;
pub mod vtable;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use engine::Engine;
pub use error::{MeshError, MeshResult};
pub use types::{ColumnInfo, Filter, QueryOptions, QueryResult, Row, TableInfo, Value};
