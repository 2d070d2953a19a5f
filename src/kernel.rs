// Kernel: parse -> route -> rewrite -> dispatch -> merge for one statement
use std::sync::Arc;

use crate::condition::GeneratedKey;
use crate::config::RuleConfiguration;
use crate::core::{ShardingError, Value};
use crate::executor::{CancellationToken, ExecutionDispatcher, ShardExecutor, ShardResult};
use crate::merge::{MergeEngine, MergedResultSet, QueryResult};
use crate::metadata::SchemaMetadata;
use crate::parser::parse_statement;
use crate::rewrite::{RewriteEngine, RewriteUnit};
use crate::route::{RouteContext, RouteEngine};
use crate::rule::RuleSet;
use crate::statement::StatementContext;

/// Logging target for logic and actual SQL when `sql_show` is on.
pub const SQL_SHOW_TARGET: &str = "shardrustql::sql";

/// A statement after routing and rewriting, ready for dispatch.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub statement: StatementContext,
    pub route_context: RouteContext,
    pub units: Vec<RewriteUnit>,
}

impl ExecutionContext {
    /// Keys of an INSERT, one per values row.
    #[must_use]
    pub fn generated_key(&self) -> Option<&GeneratedKey> {
        self.route_context.generated_key.as_ref()
    }
}

/// Outcome of a write statement.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    pub affected_rows: u64,
    pub generated_key: Option<GeneratedKey>,
}

/// Owns the immutable rule and metadata snapshots and runs statements
/// through the pipeline. Cheap to clone and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct ShardingKernel {
    rules: Arc<RuleSet>,
    metadata: Arc<SchemaMetadata>,
    dispatcher: ExecutionDispatcher,
}

impl ShardingKernel {
    #[must_use]
    pub fn new(rules: RuleSet, metadata: SchemaMetadata) -> Self {
        let dispatcher = ExecutionDispatcher::new(rules.props.dispatch, rules.props.max_parallelism);
        Self { rules: Arc::new(rules), metadata: Arc::new(metadata), dispatcher }
    }

    pub fn from_config(config: &RuleConfiguration) -> Result<Self, ShardingError> {
        let (rules, metadata) = config.build()?;
        Ok(Self::new(rules, metadata))
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    #[must_use]
    pub fn metadata(&self) -> &SchemaMetadata {
        &self.metadata
    }

    /// Routes and rewrites an already bound statement.
    pub fn prepare(
        &self,
        sql: &str,
        statement: StatementContext,
        parameters: &[Value],
    ) -> Result<ExecutionContext, ShardingError> {
        let route_context = RouteEngine::new(&self.rules, &self.metadata).route(&statement, parameters)?;
        let units = RewriteEngine::new(&self.rules, &self.metadata).rewrite(sql, &statement, parameters, &route_context)?;
        tracing::debug!(units = units.len(), single = route_context.is_single_routing(), "prepared statement");
        if self.rules.props.sql_show {
            tracing::info!(target: SQL_SHOW_TARGET, "Logic SQL: {sql}");
            for unit in &units {
                tracing::info!(target: SQL_SHOW_TARGET, "Actual SQL: {unit}");
            }
        }
        Ok(ExecutionContext { statement, route_context, units })
    }

    /// Parses `sql` with the bundled front-end, then prepares it.
    pub fn parse_and_prepare(&self, sql: &str, parameters: &[Value]) -> Result<ExecutionContext, ShardingError> {
        let statement = parse_statement(sql)?;
        self.prepare(sql, statement, parameters)
    }

    /// Merges raw shard results, given in route unit order.
    pub fn merge_query(
        &self,
        context: &ExecutionContext,
        parameters: &[Value],
        results: Vec<Box<dyn QueryResult>>,
        cancel: &CancellationToken,
    ) -> Result<MergedResultSet, ShardingError> {
        MergeEngine::new(&self.rules, &self.metadata).merge_query(&context.statement, parameters, results, cancel)
    }

    #[must_use]
    pub fn merge_update(&self, context: &ExecutionContext, counts: &[u64]) -> u64 {
        MergeEngine::merge_update(counts, context.route_context.accumulate)
    }

    /// Parses, prepares, dispatches and merges a SELECT.
    pub async fn execute_query(
        &self,
        executor: Arc<dyn ShardExecutor>,
        sql: &str,
        parameters: &[Value],
        cancel: &CancellationToken,
    ) -> Result<MergedResultSet, ShardingError> {
        let context = self.parse_and_prepare(sql, parameters)?;
        let raw = self.dispatcher.dispatch(executor, context.units.clone(), true, cancel).await?;
        let results = raw
            .into_iter()
            .map(|result| match result {
                ShardResult::Query(result) => Ok(result),
                ShardResult::Update(_) => Err(ShardingError::MergeInvariant("query unit returned an update count".to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.merge_query(&context, parameters, results, cancel)
    }

    /// Parses, prepares and dispatches an INSERT, UPDATE or DELETE.
    pub async fn execute_update(
        &self,
        executor: Arc<dyn ShardExecutor>,
        sql: &str,
        parameters: &[Value],
        cancel: &CancellationToken,
    ) -> Result<UpdateResult, ShardingError> {
        let context = self.parse_and_prepare(sql, parameters)?;
        let raw = self.dispatcher.dispatch(executor, context.units.clone(), false, cancel).await?;
        let counts = raw
            .into_iter()
            .map(|result| match result {
                ShardResult::Update(count) => Ok(count),
                ShardResult::Query(_) => Err(ShardingError::MergeInvariant("update unit returned rows".to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(UpdateResult {
            affected_rows: self.merge_update(&context, &counts),
            generated_key: context.route_context.generated_key,
        })
    }
}
