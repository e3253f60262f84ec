//! Process-wide data source registry.

use crate::datasource::{DataSource, MemoryDataSource};
use crate::error::{MeshError, MeshResult};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// The name every manager registers at construction.
pub const DEFAULT_SOURCE: &str = "default";

/// Health probe outcome for one source.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub source: String,
    pub healthy: bool,
    pub error: Option<String>,
}

/// Registry mapping source name → [`DataSource`].
///
/// A "default" source (the MVCC in-memory backend) is always present.
pub struct Manager {
    sources: RwLock<HashMap<String, Arc<dyn DataSource>>>,
    /// Live connection names for diagnostics: name → acquire count
    acquired: Mutex<HashMap<String, usize>>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        let default: Arc<dyn DataSource> = Arc::new(MemoryDataSource::new(DEFAULT_SOURCE));
        // the default source is always usable
        let _ = default.connect();
        let mut sources: HashMap<String, Arc<dyn DataSource>> = HashMap::new();
        sources.insert(DEFAULT_SOURCE.to_string(), default);
        Self {
            sources: RwLock::new(sources),
            acquired: Mutex::new(HashMap::new()),
        }
    }

    /// Register a source under a unique name.
    pub fn register(&self, name: impl Into<String>, source: Arc<dyn DataSource>) -> MeshResult<()> {
        let name = name.into();
        let mut sources = self.sources.write();
        if sources.contains_key(&name) {
            return Err(MeshError::AlreadyExists(name));
        }
        info!(source = %name, "data source registered");
        sources.insert(name, source);
        Ok(())
    }

    /// Unregister and close a source. The default source cannot be removed.
    pub fn unregister(&self, name: &str) -> MeshResult<()> {
        if name == DEFAULT_SOURCE {
            return Err(MeshError::InvalidArgument(
                "cannot unregister the default source".to_string(),
            ));
        }
        let removed = self.sources.write().remove(name);
        match removed {
            Some(source) => {
                if let Err(e) = source.close() {
                    warn!(source = %name, error = %e, "close on unregister failed");
                }
                Ok(())
            }
            None => Err(MeshError::SourceNotFound(name.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> MeshResult<Arc<dyn DataSource>> {
        self.sources
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| MeshError::SourceNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.read().contains_key(name)
    }

    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get a source and track the acquisition for diagnostics.
    pub fn acquire(&self, name: &str) -> MeshResult<Arc<dyn DataSource>> {
        let source = self.get(name)?;
        *self.acquired.lock().entry(name.to_string()).or_insert(0) += 1;
        Ok(source)
    }

    pub fn release(&self, name: &str) {
        let mut acquired = self.acquired.lock();
        if let Some(count) = acquired.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                acquired.remove(name);
            }
        }
    }

    /// Names with at least one live acquisition.
    pub fn acquired_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.acquired.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Probe every registered source.
    ///
    /// The registry is snapshotted under the read lock and probed outside
    /// it, so a slow or wedged remote source never blocks registration.
    pub fn health_check(&self) -> Vec<HealthReport> {
        let snapshot: Vec<(String, Arc<dyn DataSource>)> = {
            let sources = self.sources.read();
            sources
                .iter()
                .map(|(name, source)| (name.clone(), Arc::clone(source)))
                .collect()
        };

        let mut reports: Vec<HealthReport> = snapshot
            .into_par_iter()
            .map(|(name, source)| match source.get_tables() {
                Ok(_) => HealthReport {
                    source: name,
                    healthy: true,
                    error: None,
                },
                Err(e) => HealthReport {
                    source: name,
                    healthy: false,
                    error: Some(e.to_string()),
                },
            })
            .collect();
        reports.sort_by(|a, b| a.source.cmp(&b.source));
        reports
    }
}
