//! Bounded worker pool and single-use result tickets.
//!
//! Two `rayon::ThreadPool`s: one for the per-tick match fan-out the
//! monitoring thread joins on, one for fire-and-forget jobs (rebuilds, OCR
//! evaluations). A slow background job therefore never delays a tick.
//! Background jobs report back through a `Ticket` backed by a one-slot
//! channel; a job that panics drops its sender and the ticket reports `Lost`.

use crate::trace::trace_warn;
use crate::util::{EngineError, EngineResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Shared worker threads, split into a matching lane and a background lane.
pub struct WorkerPool {
    matching: rayon::ThreadPool,
    background: rayon::ThreadPool,
}

fn build_lane(threads: usize, lane: &'static str) -> EngineResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(move |idx| format!("screenwatch-{lane}-{idx}"))
        .build()
        .map_err(|err| EngineError::Worker(err.to_string()))
}

impl WorkerPool {
    /// Builds both lanes with `threads` workers each.
    pub fn new(threads: usize) -> EngineResult<Self> {
        Ok(Self {
            matching: build_lane(threads, "match")?,
            background: build_lane(threads, "job")?,
        })
    }

    /// Number of worker threads per lane.
    pub fn threads(&self) -> usize {
        self.matching.current_num_threads()
    }

    /// Runs `op` on the matching lane so nested rayon iterators use its workers.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.matching.install(op)
    }

    /// Queues `job` on the background lane and returns a ticket for its result.
    pub fn submit<T, F>(&self, job: F) -> Ticket<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.background.spawn(move || match catch_unwind(AssertUnwindSafe(job)) {
            Ok(value) => {
                let _ = tx.send(value);
            }
            Err(_) => {
                trace_warn!("worker_job_panicked", result = "lost");
            }
        });
        Ticket { rx: Some(rx) }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish()
    }
}

/// Observed state of a ticket.
#[derive(Debug, PartialEq, Eq)]
pub enum TicketState<T> {
    /// The job has not finished.
    Pending,
    /// The job finished; the value is handed out exactly once.
    Ready(T),
    /// The job panicked or was dropped.
    Lost,
    /// The value was already handed out.
    Taken,
}

/// Single-use handle to the result of a submitted job.
#[derive(Debug)]
pub struct Ticket<T> {
    rx: Option<Receiver<T>>,
}

impl<T> Ticket<T> {
    /// Non-blocking check.
    pub fn poll(&mut self) -> TicketState<T> {
        let Some(rx) = self.rx.as_ref() else {
            return TicketState::Taken;
        };
        match rx.try_recv() {
            Ok(value) => {
                self.rx = None;
                TicketState::Ready(value)
            }
            Err(TryRecvError::Empty) => TicketState::Pending,
            Err(TryRecvError::Disconnected) => {
                self.rx = None;
                TicketState::Lost
            }
        }
    }

    /// Blocks up to `timeout` for the result.
    pub fn wait(mut self, timeout: Duration) -> TicketState<T> {
        let Some(rx) = self.rx.take() else {
            return TicketState::Taken;
        };
        match rx.recv_timeout(timeout) {
            Ok(value) => TicketState::Ready(value),
            Err(RecvTimeoutError::Timeout) => TicketState::Pending,
            Err(RecvTimeoutError::Disconnected) => TicketState::Lost,
        }
    }

    /// Returns true once the value was handed out or lost.
    pub fn is_spent(&self) -> bool {
        self.rx.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::{TicketState, WorkerPool};
    use std::time::Duration;

    #[test]
    fn ticket_yields_value_once() {
        let pool = WorkerPool::new(2).unwrap();
        let mut ticket = pool.submit(|| 6 * 7);
        let mut value = None;
        for _ in 0..200 {
            match ticket.poll() {
                TicketState::Ready(v) => {
                    value = Some(v);
                    break;
                }
                TicketState::Pending => std::thread::sleep(Duration::from_millis(5)),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(value, Some(42));
        assert_eq!(ticket.poll(), TicketState::Taken);
    }

    #[test]
    fn busy_background_lane_leaves_matching_free() {
        let pool = WorkerPool::new(1).unwrap();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let blocked = pool.submit(move || gate_rx.recv().is_ok());
        assert_eq!(pool.install(|| 2 + 2), 4);
        gate_tx.send(()).unwrap();
        assert_eq!(blocked.wait(Duration::from_secs(5)), TicketState::Ready(true));
    }

    #[test]
    fn panicking_job_is_lost() {
        let pool = WorkerPool::new(1).unwrap();
        let ticket = pool.submit(|| -> u32 { panic!("boom") });
        assert_eq!(ticket.wait(Duration::from_secs(5)), TicketState::Lost);
    }
}
