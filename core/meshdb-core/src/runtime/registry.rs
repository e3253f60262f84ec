//! Query registry backing SHOW PROCESSLIST and query cancellation.

use crate::error::{MeshError, MeshResult};
use crate::runtime::CancelHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Pending,
    Running,
    Finished,
    Canceled,
    Failed,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Running => "running",
            QueryStatus::Finished => "finished",
            QueryStatus::Canceled => "canceled",
            QueryStatus::Failed => "failed",
        }
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            QueryStatus::Finished | QueryStatus::Canceled | QueryStatus::Failed
        )
    }
}

/// Snapshot of one registered query.
#[derive(Debug, Clone)]
pub struct QueryInfo {
    pub query_id: String,
    pub sql: String,
    pub status: QueryStatus,
    /// 0.0 ..= 1.0
    pub progress: f64,
    pub started_at_ms: u64,
    pub elapsed: Duration,
}

struct QueryEntry {
    sql: String,
    status: QueryStatus,
    progress: f64,
    started: Instant,
    started_at_ms: u64,
    cancel: CancelHandle,
    /// Set when the entry reached a terminal status; pruned after a grace
    /// period so PROCESSLIST can still report it
    finished: Option<Instant>,
}

/// Process-wide runtime. All mutations serialise through a single lock;
/// registrations are rare relative to reads.
#[derive(Default)]
pub struct QueryRuntime {
    queries: Mutex<HashMap<String, QueryEntry>>,
}

impl QueryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_query(
        &self,
        query_id: impl Into<String>,
        sql: impl Into<String>,
        cancel: CancelHandle,
    ) -> MeshResult<()> {
        let query_id = query_id.into();
        let mut queries = self.queries.lock();
        if queries.contains_key(&query_id) {
            return Err(MeshError::AlreadyExists(query_id));
        }
        let started_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        queries.insert(
            query_id,
            QueryEntry {
                sql: sql.into(),
                status: QueryStatus::Pending,
                progress: 0.0,
                started: Instant::now(),
                started_at_ms,
                cancel,
                finished: None,
            },
        );
        Ok(())
    }

    pub fn update_progress(
        &self,
        query_id: &str,
        progress: f64,
        status: QueryStatus,
    ) -> MeshResult<()> {
        let mut queries = self.queries.lock();
        let entry = queries
            .get_mut(query_id)
            .ok_or_else(|| MeshError::QueryNotFound(query_id.to_string()))?;
        entry.progress = progress.clamp(0.0, 1.0);
        entry.status = status;
        if status.is_terminal() && entry.finished.is_none() {
            entry.finished = Some(Instant::now());
        }
        Ok(())
    }

    /// Signal the query's cancel handle and mark the entry canceled. The
    /// entry stays visible until pruned.
    pub fn cancel_query(&self, query_id: &str) -> MeshResult<()> {
        let mut queries = self.queries.lock();
        let entry = queries
            .get_mut(query_id)
            .ok_or_else(|| MeshError::QueryNotFound(query_id.to_string()))?;
        entry.cancel.cancel();
        entry.status = QueryStatus::Canceled;
        entry.finished = Some(Instant::now());
        debug!(query_id, "query canceled");
        Ok(())
    }

    /// Snapshot for SHOW PROCESSLIST.
    pub fn get_all_queries(&self) -> Vec<QueryInfo> {
        let queries = self.queries.lock();
        let mut out: Vec<QueryInfo> = queries
            .iter()
            .map(|(id, e)| QueryInfo {
                query_id: id.clone(),
                sql: e.sql.clone(),
                status: e.status,
                progress: e.progress,
                started_at_ms: e.started_at_ms,
                elapsed: e.started.elapsed(),
            })
            .collect();
        out.sort_by(|a, b| a.started_at_ms.cmp(&b.started_at_ms));
        out
    }

    /// Drop terminal entries older than `grace`. Returns how many were
    /// removed.
    pub fn prune_finished(&self, grace: Duration) -> usize {
        let mut queries = self.queries.lock();
        let before = queries.len();
        queries.retain(|_, e| match e.finished {
            Some(at) => at.elapsed() < grace,
            None => true,
        });
        before - queries.len()
    }

    pub fn active_count(&self) -> usize {
        self.queries
            .lock()
            .values()
            .filter(|e| !e.status.is_terminal())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::QueryContext;

    #[test]
    fn register_and_snapshot() {
        let runtime = QueryRuntime::new();
        let ctx = QueryContext::new();
        runtime
            .register_query("q1", "SELECT 1", ctx.cancel_handle())
            .unwrap();
        let all = runtime.get_all_queries();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].query_id, "q1");
        assert_eq!(all[0].status, QueryStatus::Pending);
    }

    #[test]
    fn duplicate_registration_fails() {
        let runtime = QueryRuntime::new();
        let ctx = QueryContext::new();
        runtime
            .register_query("q1", "SELECT 1", ctx.cancel_handle())
            .unwrap();
        assert!(
            runtime
                .register_query("q1", "SELECT 2", ctx.cancel_handle())
                .is_err()
        );
    }

    #[test]
    fn cancel_signals_context_and_keeps_entry() {
        let runtime = QueryRuntime::new();
        let ctx = QueryContext::new();
        runtime
            .register_query("q1", "SELECT 1", ctx.cancel_handle())
            .unwrap();
        runtime.cancel_query("q1").unwrap();
        assert!(ctx.is_canceled());
        // canceled entries remain visible for PROCESSLIST
        let all = runtime.get_all_queries();
        assert_eq!(all[0].status, QueryStatus::Canceled);
        // zero grace prunes it
        assert_eq!(runtime.prune_finished(Duration::from_secs(0)), 1);
        assert!(runtime.get_all_queries().is_empty());
    }

    #[test]
    fn cancel_unknown_query() {
        let runtime = QueryRuntime::new();
        assert!(matches!(
            runtime.cancel_query("nope"),
            Err(MeshError::QueryNotFound(_))
        ));
    }

    #[test]
    fn progress_clamps() {
        let runtime = QueryRuntime::new();
        let ctx = QueryContext::new();
        runtime
            .register_query("q1", "SELECT 1", ctx.cancel_handle())
            .unwrap();
        runtime
            .update_progress("q1", 7.5, QueryStatus::Running)
            .unwrap();
        assert_eq!(runtime.get_all_queries()[0].progress, 1.0);
    }
}
