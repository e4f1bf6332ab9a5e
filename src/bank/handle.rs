//! Shared cache snapshot with deduplicated background rebuilds.

use crate::bank::{CacheBuilder, ScaleSet, TemplateCache};
use crate::config::{ConfigTree, ItemPath, ScaleSweep};
use crate::trace::{trace_debug, trace_event};
use crate::util::{EngineError, EngineResult};
use crate::worker::{Ticket, TicketState, WorkerPool};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Inputs of one rebuild.
#[derive(Clone, Debug)]
pub struct RebuildRequest {
    pub tree: Arc<ConfigTree>,
    pub root_dir: PathBuf,
    pub window_scale: f32,
    pub capture_scale: f32,
    pub sweep: Option<ScaleSweep>,
}

/// Outcome of a finished rebuild.
#[derive(Clone, Debug, PartialEq)]
pub struct RebuildSummary {
    /// Generation number of the swapped-in cache.
    pub generation: u64,
    pub loaded: usize,
    pub skipped: Vec<(ItemPath, String)>,
    pub elapsed: Duration,
}

/// Result of a background rebuild, consumed once.
#[derive(Debug)]
pub struct RebuildTicket {
    inner: Ticket<EngineResult<RebuildSummary>>,
}

impl RebuildTicket {
    /// Non-blocking check.
    pub fn poll(&mut self) -> TicketState<EngineResult<RebuildSummary>> {
        self.inner.poll()
    }

    /// Blocks up to `timeout`.
    pub fn wait(self, timeout: Duration) -> TicketState<EngineResult<RebuildSummary>> {
        self.inner.wait(timeout)
    }
}

/// Mutex-guarded snapshot of the current cache.
#[derive(Debug)]
pub struct CacheHandle {
    current: Mutex<Arc<TemplateCache>>,
    rebuilding: AtomicBool,
    generation: AtomicU64,
}

struct RebuildFlag<'a>(&'a AtomicBool);

impl Drop for RebuildFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CacheHandle {
    pub fn new(cache: TemplateCache) -> Self {
        Self {
            current: Mutex::new(Arc::new(cache)),
            rebuilding: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Current snapshot; cheap to clone and never blocks on a rebuild.
    pub fn snapshot(&self) -> Arc<TemplateCache> {
        Arc::clone(&self.current.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of swaps so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::Acquire)
    }

    /// Swaps in `cache` and returns the new generation.
    pub fn replace(&self, cache: TemplateCache) -> u64 {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(cache);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Rebuilds on the calling thread. Fails when another rebuild is running.
    pub fn rebuild_now(&self, request: RebuildRequest) -> EngineResult<RebuildSummary> {
        if !self.try_begin() {
            return Err(EngineError::RebuildInProgress);
        }
        let _flag = RebuildFlag(&self.rebuilding);
        self.run(request)
    }

    /// Rebuilds on the worker pool. Returns `None` while a rebuild is in flight.
    pub fn request_rebuild(
        self: &Arc<Self>,
        pool: &WorkerPool,
        request: RebuildRequest,
    ) -> Option<RebuildTicket> {
        if !self.try_begin() {
            trace_debug!("rebuild_dropped", reason = "in progress");
            return None;
        }
        let handle = Arc::clone(self);
        let inner = pool.submit(move || {
            let _flag = RebuildFlag(&handle.rebuilding);
            handle.run(request)
        });
        Some(RebuildTicket { inner })
    }

    fn try_begin(&self) -> bool {
        self.rebuilding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn run(&self, request: RebuildRequest) -> EngineResult<RebuildSummary> {
        let started = Instant::now();
        let scales = ScaleSet::compute(
            request.window_scale,
            request.capture_scale,
            request.sweep.as_ref(),
        )?;
        let builder = CacheBuilder::new(request.root_dir, scales);
        let previous = self.snapshot();
        let (cache, report) = builder.build(&request.tree, Some(&previous), Instant::now());
        let generation = self.replace(cache);
        let elapsed = started.elapsed();
        trace_event!(
            "cache_swapped",
            generation = generation,
            loaded = report.loaded,
            elapsed_ms = elapsed.as_millis() as u64
        );
        Ok(RebuildSummary {
            generation,
            loaded: report.loaded,
            skipped: report.skipped,
            elapsed,
        })
    }
}
