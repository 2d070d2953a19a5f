// Execution dispatch: hands rewrite units to an external executor, serially or on a worker pool
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::ShardingError;
use crate::merge::QueryResult;
use crate::rewrite::RewriteUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Serial,
    Parallel,
}

/// Shared abort flag between the dispatcher, shard cursors and the merged result.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Raw outcome of one rewrite unit.
pub enum ShardResult {
    Query(Box<dyn QueryResult>),
    Update(u64),
}

impl std::fmt::Debug for ShardResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query(result) => write!(f, "Query({:?})", result.columns()),
            Self::Update(count) => write!(f, "Update({count})"),
        }
    }
}

/// The physical `execute(sql, params) -> rows` capability.
///
/// Implementations may block; the parallel dispatcher runs them on blocking threads.
pub trait ShardExecutor: Send + Sync {
    fn execute(&self, unit: &RewriteUnit, is_query: bool, cancel: &CancellationToken) -> Result<ShardResult, ShardingError>;
}

#[derive(Debug, Clone)]
pub struct ExecutionDispatcher {
    mode: DispatchMode,
    max_parallelism: usize,
}

impl ExecutionDispatcher {
    #[must_use]
    pub fn new(mode: DispatchMode, max_parallelism: usize) -> Self {
        Self { mode, max_parallelism: max_parallelism.max(1) }
    }

    /// Runs every unit and returns results ordered by unit index, whatever the
    /// completion order. The first failure cancels the token and is returned.
    pub async fn dispatch(
        &self,
        executor: Arc<dyn ShardExecutor>,
        units: Vec<RewriteUnit>,
        is_query: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ShardResult>, ShardingError> {
        match self.mode {
            DispatchMode::Serial => Self::dispatch_serial(executor.as_ref(), &units, is_query, cancel),
            DispatchMode::Parallel if units.len() <= 1 => Self::dispatch_serial(executor.as_ref(), &units, is_query, cancel),
            DispatchMode::Parallel => self.dispatch_parallel(executor, units, is_query, cancel).await,
        }
    }

    fn dispatch_serial(
        executor: &dyn ShardExecutor,
        units: &[RewriteUnit],
        is_query: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ShardResult>, ShardingError> {
        let mut results = Vec::with_capacity(units.len());
        for unit in units {
            match executor.execute(unit, is_query, cancel) {
                Ok(result) => results.push(result),
                Err(err) => {
                    tracing::warn!(error = %err, data_source = %unit.data_source, "shard execution failed");
                    cancel.cancel();
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    async fn dispatch_parallel(
        &self,
        executor: Arc<dyn ShardExecutor>,
        units: Vec<RewriteUnit>,
        is_query: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ShardResult>, ShardingError> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallelism));
        let total = units.len();
        let mut tasks = JoinSet::new();
        for (position, unit) in units.into_iter().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| ShardingError::Execution { data_source: unit.data_source.clone(), message: e.to_string() })?;
            let executor = Arc::clone(&executor);
            let cancel = cancel.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = executor.execute(&unit, is_query, &cancel);
                (position, unit.data_source, result)
            });
        }

        let mut slots: Vec<Option<ShardResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (position, data_source, result) = joined.map_err(|e| ShardingError::Execution {
                data_source: "<worker>".to_string(),
                message: e.to_string(),
            })?;
            match result {
                Ok(result) => slots[position] = Some(result),
                Err(err) => {
                    tracing::warn!(error = %err, data_source = %data_source, "shard execution failed");
                    cancel.cancel();
                    tasks.abort_all();
                    return Err(err);
                }
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| ShardingError::Execution {
                    data_source: format!("unit #{i}"),
                    message: "no result produced".to_string(),
                })
            })
            .collect()
    }
}
