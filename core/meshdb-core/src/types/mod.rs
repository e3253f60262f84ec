//! Domain model shared by every subsystem.
//!
//! Rows are dynamically typed column maps; everything a data source
//! understands (schemas, filters, query options) lives here.

mod filter;
mod query;
mod row;
mod schema;
mod value;

pub use filter::{CompareOp, Filter, like_match};
pub use query::{QueryOptions, QueryResult, SortDirection};
pub use row::{Row, decode_row, encode_row, row_from_pairs};
pub use schema::{ColumnInfo, TableConfig, TableInfo, is_integer_type};
pub use value::{Value, hash_key, multi_hash_key};
