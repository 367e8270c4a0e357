//! Query execution: the storage capability trait, cancellation, and the
//! engine that ties parsing, planning, rendering, and materialization into
//! one bounded round trip per request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::dialect::Dialect;
use crate::error::Result;
use crate::materialize::{QueryResult, RowSet, materialize};
use crate::plan::{QueryRequest, plan};
use crate::schema::SchemaRegistry;
use crate::sql::render;
use crate::value::SqlValue;

/// The narrow capability the engine requires from storage. The concrete SQL
/// dialect and driver are entirely hidden behind this trait.
pub trait Executor {
    fn dialect(&self) -> Dialect;

    /// Executes one parameterized statement over one connection acquired for
    /// the duration of the call and released on all paths.
    fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        cancel: Option<&CancelToken>,
    ) -> Result<RowSet>;
}

type AbortHook = Box<dyn Fn() + Send>;

#[derive(Default)]
struct CancelInner {
    raised: AtomicBool,
    abort: Mutex<Option<AbortHook>>,
}

/// Clonable cancellation signal. Raising it aborts the in-flight statement
/// and the query fails with a cancellation outcome instead of a data result.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        if let Ok(hook) = self.inner.abort.lock()
            && let Some(abort) = hook.as_ref()
        {
            abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Installed by drivers for the duration of a statement so that `cancel`
    /// can interrupt it mid-flight.
    pub(crate) fn set_abort_hook(&self, hook: AbortHook) {
        if let Ok(mut slot) = self.inner.abort.lock() {
            *slot = Some(hook);
        }
    }

    pub(crate) fn clear_abort_hook(&self) {
        if let Ok(mut slot) = self.inner.abort.lock() {
            *slot = None;
        }
    }
}

/// The engine: a process-wide registry plus a storage capability. Each call
/// plans with a fresh, non-shared plan, so no locking happens at this layer.
pub struct Engine<E> {
    registry: Arc<SchemaRegistry>,
    executor: E,
}

impl<E: Executor> Engine<E> {
    pub fn new(registry: Arc<SchemaRegistry>, executor: E) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Executes one fetch request. Failures surface through the result
    /// document (`success: false`), never as an error crossing this boundary.
    pub fn fetch(&self, request: &QueryRequest) -> QueryResult {
        self.fetch_with_cancel(request, None)
    }

    pub fn fetch_with_cancel(
        &self,
        request: &QueryRequest,
        cancel: Option<&CancelToken>,
    ) -> QueryResult {
        match self.run(request, cancel) {
            Ok(result) => result,
            Err(error) => QueryResult::failure(&error),
        }
    }

    fn run(&self, request: &QueryRequest, cancel: Option<&CancelToken>) -> Result<QueryResult> {
        let plan = plan(&self.registry, self.executor.dialect(), request)?;
        for warning in &plan.warnings {
            warn!(entity = %plan.primary.name, "{warning}");
        }

        let (sql, params) = render(&plan);
        debug!(sql = %sql, params = params.len(), "graphfetch.query");

        let rows = self.executor.execute(&sql, &params, cancel)?;
        Ok(materialize(&plan, &rows))
    }
}
