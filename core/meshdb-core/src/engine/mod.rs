//! Engine facade.
//!
//! Owns the registry, router, runtime, sessions and vector indexes, and
//! drives a statement end to end: parse → logical plan → optimizer →
//! physical plan → operator tree → `QueryResult`.

use crate::datasource::{BackupManager, Manager, Router, Service};
use crate::error::{MeshError, MeshResult};
use crate::runtime::{ErrorRing, QueryContext, QueryRuntime, QueryStatus};
use crate::session::{Session, SessionStore};
use crate::sql::executor::Executor;
use crate::sql::optimizer::QueryOptimizer;
use crate::sql::optimizer::cost::{CostModel, HardwareProfile};
use crate::sql::optimizer::join_reorder::JoinReorderer;
use crate::sql::plan::{Plan, PlanConfig, VectorScanConfig, distance_column};
use crate::sql::planner::{LogicalPlan, LogicalPlanner, PhysicalPlanner};
use crate::sql::show::{
    InformationSchemaSource, ShowStatement, parse_show, rewrite_to_sql, show_processlist,
    show_status, show_variables,
};
use crate::sql::SqlParser;
use crate::types::{Filter, QueryResult, TableConfig, is_integer_type};
use crate::vector::IndexManager;
use crate::vtable::{ApiClientTable, DatasourceTable};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info};

pub struct Engine {
    manager: Arc<Manager>,
    router: Arc<Router>,
    service: Service,
    runtime: Arc<QueryRuntime>,
    sessions: Arc<SessionStore>,
    vectors: Arc<IndexManager>,
    cost: Arc<CostModel>,
    backups: BackupManager,
    errors: Arc<ErrorRing>,
    parser: SqlParser,
    optimizer: QueryOptimizer,
    physical: PhysicalPlanner,
    executor: Executor,
    next_query_id: AtomicU64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with the in-memory default source and the catalog source.
    pub fn new() -> Self {
        let manager = Arc::new(Manager::new());
        let info_schema: Arc<dyn crate::datasource::DataSource> =
            Arc::new(InformationSchemaSource::new(Arc::downgrade(&manager)));
        manager
            .register(InformationSchemaSource::NAME, info_schema)
            .expect("fresh manager has no catalog source yet");

        let router = Arc::new(Router::with_manager(Arc::clone(&manager)));
        for table in ["tables", "schemata", "columns"] {
            router
                .add_route(format!("information_schema.{table}"), InformationSchemaSource::NAME)
                .expect("catalog source is registered");
        }

        let service = Service::new(Arc::clone(&router));
        let vectors = Arc::new(IndexManager::new());
        let cost = Arc::new(CostModel::new(&HardwareProfile::detect()));
        let reorderer = Arc::new(JoinReorderer::default());
        let physical = PhysicalPlanner::new(service.clone(), Arc::clone(&cost), reorderer);
        let executor = Executor::new(service.clone(), Arc::clone(&vectors));

        info!("engine started");
        Self {
            manager,
            router,
            service,
            runtime: Arc::new(QueryRuntime::new()),
            sessions: Arc::new(SessionStore::new()),
            vectors,
            cost,
            backups: BackupManager::new(),
            errors: Arc::new(ErrorRing::new()),
            parser: SqlParser::new(),
            optimizer: QueryOptimizer::new(),
            physical,
            executor,
            next_query_id: AtomicU64::new(0),
        }
    }

    /// Engine with the virtual configuration tables mounted from
    /// `config_dir/datasources.json` and `config_dir/api_clients.json`.
    pub fn with_config_dir(config_dir: impl AsRef<Path>) -> MeshResult<Self> {
        let engine = Self::new();
        let config_dir = config_dir.as_ref();

        let datasource_table: Arc<dyn crate::datasource::DataSource> = Arc::new(
            DatasourceTable::new(
                config_dir.join("datasources.json"),
                Arc::downgrade(&engine.manager),
            ),
        );
        engine
            .manager
            .register("datasource_config", datasource_table)?;
        engine.router.add_route("datasource", "datasource_config")?;

        let api_client_table: Arc<dyn crate::datasource::DataSource> =
            Arc::new(ApiClientTable::new(config_dir.join("api_clients.json")));
        engine
            .manager
            .register("api_client_config", api_client_table)?;
        engine.router.add_route("api_client", "api_client_config")?;

        Ok(engine)
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn runtime(&self) -> &Arc<QueryRuntime> {
        &self.runtime
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn vectors(&self) -> &Arc<IndexManager> {
        &self.vectors
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn errors(&self) -> &Arc<ErrorRing> {
        &self.errors
    }

    /// External cache feedback: the observed cache-hit rate for a table,
    /// folded into future scan cost estimates.
    pub fn update_cache_hit_info(&self, table: impl Into<String>, rate: f64) {
        self.cost.update_cache_hit_info(table, rate);
    }

    pub fn connect(&self) -> Arc<Session> {
        self.sessions.create_session()
    }

    pub fn disconnect(&self, session: &Session) -> MeshResult<()> {
        // an open transaction rolls back with the session
        if let Some((source_name, tx_id)) = session.take_transaction() {
            let source = self.manager.get(&source_name)?;
            source.rollback(tx_id)?;
        }
        self.sessions.destroy_session(session.id())
    }

    /// Execute one SQL statement for a session.
    pub fn execute(&self, session: &Session, sql: &str) -> MeshResult<QueryResult> {
        let ctx = QueryContext::new();
        self.execute_with_context(session, sql, &ctx)
    }

    /// Execute with a caller-supplied context (cancellation, deadline).
    pub fn execute_with_context(
        &self,
        session: &Session,
        sql: &str,
        ctx: &QueryContext,
    ) -> MeshResult<QueryResult> {
        if let Some(statement) = parse_show(sql) {
            return self.execute_show(session, statement, ctx);
        }
        if let Some(result) = self.execute_transaction_control(session, sql)? {
            return Ok(result);
        }

        let query_id = format!(
            "q-{}",
            self.next_query_id.fetch_add(1, Ordering::SeqCst) + 1
        );
        // everything the statement logs carries its query_id
        let span = crate::logging::query_span(&query_id);
        let _span_guard = span.enter();
        self.runtime
            .register_query(&query_id, sql, ctx.cancel_handle())?;
        self.runtime
            .update_progress(&query_id, 0.0, QueryStatus::Running)?;

        let outcome = self.execute_statement(session, sql, ctx);
        match &outcome {
            Ok(_) => {
                let _ = self
                    .runtime
                    .update_progress(&query_id, 1.0, QueryStatus::Finished);
            }
            Err(MeshError::Canceled) => {
                let _ = self
                    .runtime
                    .update_progress(&query_id, 1.0, QueryStatus::Canceled);
            }
            Err(e) => {
                if matches!(e, MeshError::Io { .. } | MeshError::SourceUnavailable { .. }) {
                    self.errors.record(query_id.clone(), e.to_string());
                }
                error!(query_id, error = %e, "query failed");
                let _ = self
                    .runtime
                    .update_progress(&query_id, 1.0, QueryStatus::Failed);
            }
        }
        outcome
    }

    fn execute_statement(
        &self,
        session: &Session,
        sql: &str,
        ctx: &QueryContext,
    ) -> MeshResult<QueryResult> {
        let statement = self.parser.parse_one(sql)?;
        // the planner carries per-statement alias state, so each
        // statement gets its own
        let logical = LogicalPlanner::new().plan(&statement)?;

        // DDL dispatches directly; everything else goes through the
        // optimizer and the physical planner
        match &logical {
            LogicalPlan::CreateTable {
                info,
                if_not_exists,
            } => {
                let mut config = TableConfig::default();
                config.auto_increment_column = info
                    .primary_column()
                    .filter(|c| is_integer_type(&c.col_type))
                    .map(|c| c.name.clone());
                match self.service.create_table(info, &config) {
                    Err(MeshError::AlreadyExists(_)) if *if_not_exists => {
                        return Ok(QueryResult::affected(0));
                    }
                    Err(e) => return Err(e),
                    Ok(()) => return Ok(QueryResult::affected(0)),
                }
            }
            LogicalPlan::DropTable { table, if_exists } => {
                match self.service.drop_table(table) {
                    Err(MeshError::TableNotFound(_)) if *if_exists => {
                        return Ok(QueryResult::affected(0));
                    }
                    Err(e) => return Err(e),
                    Ok(()) => {
                        self.vectors.drop_table_indexes(table);
                        return Ok(QueryResult::affected(0));
                    }
                }
            }
            LogicalPlan::Truncate { table } => {
                self.service.truncate_table(table)?;
                return Ok(QueryResult::affected(0));
            }
            _ => {}
        }

        let optimized = self.optimizer.optimize(logical)?;
        let plan = self.physical.plan(&optimized)?;
        debug!(session = session.id(), cost = plan.estimated_cost, "plan ready");
        self.executor.execute(ctx, &plan)
    }

    fn execute_show(
        &self,
        session: &Session,
        statement: ShowStatement,
        ctx: &QueryContext,
    ) -> MeshResult<QueryResult> {
        match &statement {
            ShowStatement::Use { database } => {
                session.use_database(database.clone());
                Ok(QueryResult::empty())
            }
            ShowStatement::Processlist => Ok(show_processlist(&self.runtime)),
            ShowStatement::Variables { like } => {
                Ok(show_variables(Some(session), like.as_deref()))
            }
            ShowStatement::Status { like } => Ok(show_status(like.as_deref())),
            _ => {
                let rewritten = rewrite_to_sql(&statement).ok_or_else(|| {
                    MeshError::SqlExecution {
                        message: "SHOW statement has no rewrite".to_string(),
                        context: format!("{statement:?}"),
                    }
                })?;
                self.execute_with_context(session, &rewritten, ctx)
            }
        }
    }

    /// BEGIN / COMMIT / ROLLBACK. Transactions scope to the router's
    /// default source; cross-source statements have no transactional
    /// envelope.
    fn execute_transaction_control(
        &self,
        session: &Session,
        sql: &str,
    ) -> MeshResult<Option<QueryResult>> {
        let keyword = sql.trim().trim_end_matches(';').to_ascii_uppercase();
        match keyword.as_str() {
            "BEGIN" | "START TRANSACTION" => {
                let source_name = self.router.default_source();
                let source = self.manager.get(&source_name)?;
                let tx_id = source.begin()?;
                session.set_transaction(source_name, tx_id)?;
                Ok(Some(QueryResult::empty()))
            }
            "COMMIT" => {
                let (source_name, tx_id) = session.take_transaction().ok_or_else(|| {
                    MeshError::InvalidArgument("no open transaction".to_string())
                })?;
                self.manager.get(&source_name)?.commit(tx_id)?;
                Ok(Some(QueryResult::empty()))
            }
            "ROLLBACK" => {
                let (source_name, tx_id) = session.take_transaction().ok_or_else(|| {
                    MeshError::InvalidArgument("no open transaction".to_string())
                })?;
                self.manager.get(&source_name)?.rollback(tx_id)?;
                Ok(Some(QueryResult::empty()))
            }
            _ => Ok(None),
        }
    }

    /// Programmatic vector search: builds a VectorScan plan and runs it.
    pub fn vector_search(
        &self,
        ctx: &QueryContext,
        table: &str,
        column: &str,
        query_vector: Vec<f32>,
        k: usize,
        filters: Vec<Filter>,
    ) -> MeshResult<QueryResult> {
        let index = self.vectors.get_index(table, column)?;
        let config = index.config();
        let mut schema = self
            .service
            .table_info(table)
            .map(|info| info.columns)
            .unwrap_or_default();
        schema.push(distance_column());
        let plan = Plan::new(
            1,
            PlanConfig::VectorScan(VectorScanConfig {
                table: table.to_string(),
                column: column.to_string(),
                index_type: format!("{:?}", config.index_type).to_lowercase(),
                metric_type: format!("{:?}", config.metric).to_lowercase(),
                query_vector,
                k,
                filters,
            }),
            schema,
            vec![],
        );
        self.executor.execute(ctx, &plan)
    }

    /// Cancel a running query by id.
    pub fn cancel_query(&self, query_id: &str) -> MeshResult<()> {
        self.runtime.cancel_query(query_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn engine_with_users() -> (Engine, Arc<Session>) {
        let engine = Engine::new();
        let session = engine.connect();
        engine
            .execute(
                &session,
                "CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(255))",
            )
            .unwrap();
        (engine, session)
    }

    #[test]
    fn create_insert_select_round_trip() {
        let (engine, session) = engine_with_users();
        engine
            .execute(
                &session,
                "INSERT INTO users (id, name) VALUES (1, 'Alice'), (2, 'Bob')",
            )
            .unwrap();
        let result = engine
            .execute(&session, "SELECT name FROM users WHERE id = 2")
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("name"), Some(&Value::from("Bob")));
    }

    #[test]
    fn auto_increment_via_sql() {
        let (engine, session) = engine_with_users();
        engine
            .execute(&session, "INSERT INTO users (name) VALUES ('NoId')")
            .unwrap();
        let result = engine
            .execute(&session, "SELECT id FROM users WHERE name = 'NoId'")
            .unwrap();
        assert_eq!(result.rows[0].get("id"), Some(&Value::Int64(1)));
    }

    #[test]
    fn update_delete_via_sql() {
        let (engine, session) = engine_with_users();
        engine
            .execute(&session, "INSERT INTO users (id, name) VALUES (1, 'Alice')")
            .unwrap();
        let result = engine
            .execute(&session, "UPDATE users SET name = 'Alicia' WHERE id = 1")
            .unwrap();
        assert_eq!(result.affected_count(), Some(1));
        let result = engine
            .execute(&session, "DELETE FROM users WHERE id = 1")
            .unwrap();
        assert_eq!(result.affected_count(), Some(1));
        let result = engine.execute(&session, "SELECT * FROM users").unwrap();
        assert!(result.rows.is_empty());
    }

    #[test]
    fn group_by_via_sql() {
        let engine = Engine::new();
        let session = engine.connect();
        engine
            .execute(
                &session,
                "CREATE TABLE orders (id INT PRIMARY KEY, user_id INT, amount INT)",
            )
            .unwrap();
        engine
            .execute(
                &session,
                "INSERT INTO orders (user_id, amount) VALUES (1, 100), (1, 200), (2, 50)",
            )
            .unwrap();
        let result = engine
            .execute(
                &session,
                "SELECT user_id, SUM(amount) AS total FROM orders GROUP BY user_id \
                 ORDER BY total DESC",
            )
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].get("total"), Some(&Value::Int64(300)));
    }

    #[test]
    fn show_tables_and_columns() {
        let (engine, session) = engine_with_users();
        let result = engine.execute(&session, "SHOW TABLES").unwrap();
        let names: Vec<&str> = result
            .rows
            .iter()
            .filter_map(|r| r.get("table_name").and_then(Value::as_str))
            .collect();
        assert!(names.contains(&"users"));

        let result = engine.execute(&session, "SHOW COLUMNS FROM users").unwrap();
        assert_eq!(result.rows.len(), 2);

        let result = engine.execute(&session, "SHOW DATABASES").unwrap();
        assert!(!result.rows.is_empty());
    }

    #[test]
    fn show_variables_and_processlist() {
        let (engine, session) = engine_with_users();
        session.set_variable("max_connections", Value::Int64(42));
        let result = engine
            .execute(&session, "SHOW VARIABLES LIKE 'max_connections'")
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("Value"), Some(&Value::from("42")));

        // the SHOW VARIABLES query itself is not registered, but the DDL
        // above is still visible in the processlist
        let result = engine.execute(&session, "SHOW PROCESSLIST").unwrap();
        assert!(!result.rows.is_empty());
    }

    #[test]
    fn transactions_roll_back_on_default_source() {
        let (engine, session) = engine_with_users();
        engine
            .execute(&session, "INSERT INTO users (id, name) VALUES (1, 'Keep')")
            .unwrap();
        engine.execute(&session, "BEGIN").unwrap();
        engine
            .execute(&session, "INSERT INTO users (id, name) VALUES (2, 'Gone')")
            .unwrap();
        engine.execute(&session, "ROLLBACK").unwrap();
        let result = engine.execute(&session, "SELECT * FROM users").unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("name"), Some(&Value::from("Keep")));
    }

    #[test]
    fn use_statement_switches_database() {
        let (engine, session) = engine_with_users();
        engine.execute(&session, "USE analytics").unwrap();
        assert_eq!(session.database(), "analytics");
    }

    #[test]
    fn union_via_sql() {
        let (engine, session) = engine_with_users();
        engine
            .execute(
                &session,
                "INSERT INTO users (id, name) VALUES (1, 'A'), (2, 'B')",
            )
            .unwrap();
        let result = engine
            .execute(
                &session,
                "SELECT name FROM users WHERE id = 1 \
                 UNION ALL SELECT name FROM users WHERE id = 2",
            )
            .unwrap();
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn canceled_context_propagates() {
        let (engine, session) = engine_with_users();
        let ctx = QueryContext::new();
        ctx.cancel();
        assert!(matches!(
            engine.execute_with_context(&session, "SELECT * FROM users", &ctx),
            Err(MeshError::Canceled)
        ));
    }
}
