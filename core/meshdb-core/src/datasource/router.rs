//! Table → source routing.
//!
//! Every read and write resolves its target source here at call time, so
//! re-routing a table mid-session takes effect immediately.

use crate::datasource::{DataSource, Manager};
use crate::error::{MeshError, MeshResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct Router {
    manager: RwLock<Option<Arc<Manager>>>,
    routes: RwLock<HashMap<String, String>>,
    default_source: RwLock<String>,
}

impl Router {
    /// A router with no manager attached; every `route` call fails with
    /// `RouterNotInitialized` until [`Router::attach`] runs.
    pub fn new() -> Self {
        Self {
            manager: RwLock::new(None),
            routes: RwLock::new(HashMap::new()),
            default_source: RwLock::new(crate::datasource::manager::DEFAULT_SOURCE.to_string()),
        }
    }

    pub fn with_manager(manager: Arc<Manager>) -> Self {
        let router = Self::new();
        router.attach(manager);
        router
    }

    pub fn attach(&self, manager: Arc<Manager>) {
        *self.manager.write() = Some(manager);
    }

    /// Resolve the source serving `table`.
    pub fn route(&self, table: &str) -> MeshResult<Arc<dyn DataSource>> {
        let manager = self
            .manager
            .read()
            .clone()
            .ok_or(MeshError::RouterNotInitialized)?;
        let source_name = {
            let routes = self.routes.read();
            match routes.get(table) {
                Some(name) => name.clone(),
                None => self.default_source.read().clone(),
            }
        };
        manager
            .get(&source_name)
            .map_err(|_| MeshError::RouteNotFound(table.to_string()))
    }

    /// Name of the source `table` would route to (no lookup of the source
    /// itself).
    pub fn route_name(&self, table: &str) -> String {
        let routes = self.routes.read();
        routes
            .get(table)
            .cloned()
            .unwrap_or_else(|| self.default_source.read().clone())
    }

    pub fn add_route(&self, table: impl Into<String>, source: impl Into<String>) -> MeshResult<()> {
        let (table, source) = (table.into(), source.into());
        if let Some(manager) = self.manager.read().as_ref() {
            if !manager.contains(&source) {
                return Err(MeshError::SourceNotFound(source));
            }
        }
        debug!(%table, %source, "route added");
        self.routes.write().insert(table, source);
        Ok(())
    }

    pub fn remove_route(&self, table: &str) -> MeshResult<()> {
        self.routes
            .write()
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| MeshError::RouteNotFound(table.to_string()))
    }

    pub fn get_route(&self, table: &str) -> Option<String> {
        self.routes.read().get(table).cloned()
    }

    /// A copy of the route table.
    pub fn get_routes(&self) -> HashMap<String, String> {
        self.routes.read().clone()
    }

    pub fn set_default_source(&self, source: impl Into<String>) {
        *self.default_source.write() = source.into();
    }

    pub fn default_source(&self) -> String {
        self.default_source.read().clone()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MemoryDataSource;

    #[test]
    fn route_without_manager_fails() {
        let router = Router::new();
        assert!(matches!(
            router.route("users"),
            Err(MeshError::RouterNotInitialized)
        ));
    }

    #[test]
    fn route_falls_back_to_default() {
        let manager = Arc::new(Manager::new());
        let router = Router::with_manager(manager);
        let source = router.route("anything").unwrap();
        assert_eq!(source.name(), "default");
    }

    #[test]
    fn add_remove_route() {
        let manager = Arc::new(Manager::new());
        let extra: Arc<dyn DataSource> = Arc::new(MemoryDataSource::new("extra"));
        extra.connect().unwrap();
        manager.register("extra", extra).unwrap();

        let router = Router::with_manager(manager);
        router.add_route("orders", "extra").unwrap();
        assert_eq!(router.route("orders").unwrap().name(), "extra");
        assert_eq!(router.get_route("orders"), Some("extra".to_string()));
        assert_eq!(router.get_routes().len(), 1);

        router.remove_route("orders").unwrap();
        assert_eq!(router.route("orders").unwrap().name(), "default");
        assert!(matches!(
            router.remove_route("orders"),
            Err(MeshError::RouteNotFound(_))
        ));
    }

    #[test]
    fn add_route_validates_source() {
        let manager = Arc::new(Manager::new());
        let router = Router::with_manager(manager);
        assert!(matches!(
            router.add_route("orders", "nope"),
            Err(MeshError::SourceNotFound(_))
        ));
    }

    #[test]
    fn routes_copy_is_detached() {
        let manager = Arc::new(Manager::new());
        let router = Router::with_manager(manager);
        let copy = router.get_routes();
        router.add_route("t", "default").unwrap();
        assert!(copy.is_empty());
        assert_eq!(router.get_routes().len(), 1);
    }
}
