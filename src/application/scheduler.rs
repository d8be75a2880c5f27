//! Admission control for the shared conversion engine.
//!
//! The engine tolerates only a small fixed number of concurrent conversions,
//! so all access goes through one scheduler: `K` run slots plus a FIFO wait
//! queue bounded by `Qmax`. A request that finds the queue full is shed
//! immediately; a queued request that reaches its deadline gives up its place
//! without ever starting. Slot state lives entirely in the two semaphores, so
//! abandoning a wedged conversion releases its slot as soon as the adapter
//! stops waiting, regardless of what the underlying process does.

use std::num::NonZeroUsize;
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::RenderFailure;

use super::engine::{ConvertEngine, EngineJob};

pub const QUEUE_DEPTH_GAUGE: &str = "stampa_engine_queue_depth";
pub const ADMITTED_COUNTER: &str = "stampa_engine_admitted_total";
pub const REJECTED_COUNTER: &str = "stampa_engine_rejected_total";

pub struct AdmissionScheduler {
    engine: Arc<dyn ConvertEngine>,
    run_slots: Arc<Semaphore>,
    queue_tickets: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionScheduler {
    /// `slots` is the engine concurrency limit `K`; `queue_capacity` bounds
    /// how many additional jobs may wait for a slot.
    pub fn new(engine: Arc<dyn ConvertEngine>, slots: NonZeroUsize, queue_capacity: usize) -> Self {
        let capacity = slots.get() + queue_capacity;
        Self {
            engine,
            run_slots: Arc::new(Semaphore::new(slots.get())),
            queue_tickets: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Run one job under the engine concurrency limit.
    ///
    /// Suspends the caller until a slot frees, the job deadline elapses, or
    /// the queue sheds the request. Waiters are served in strict arrival
    /// order (tokio's semaphore queues fairly).
    pub async fn submit(&self, job: &EngineJob) -> Result<(), RenderFailure> {
        let Ok(ticket) = self.queue_tickets.try_acquire() else {
            counter!(REJECTED_COUNTER, "reason" => "overloaded").increment(1);
            debug!(
                target = "application::scheduler",
                request_id = %job.request_id,
                "Admission queue full; shedding request"
            );
            return Err(RenderFailure::Overloaded);
        };
        self.record_depth();

        let admitted = timeout(job.remaining(), self.run_slots.acquire()).await;
        let result = match admitted {
            Ok(Ok(_permit)) => {
                counter!(ADMITTED_COUNTER).increment(1);
                // The deadline also bounds the running conversion: when it
                // fires, the convert future is dropped and the slot frees as
                // the permit drops, whether or not the engine call has
                // actually terminated.
                match timeout(job.remaining(), self.engine.convert(job)).await {
                    Ok(result) => result,
                    Err(_) => {
                        counter!(REJECTED_COUNTER, "reason" => "deadline").increment(1);
                        Err(RenderFailure::Timeout)
                    }
                }
            }
            Ok(Err(_)) => Err(RenderFailure::io("admission scheduler unavailable")),
            Err(_) => {
                counter!(REJECTED_COUNTER, "reason" => "deadline").increment(1);
                Err(RenderFailure::Timeout)
            }
        };

        drop(ticket);
        self.record_depth();
        result
    }

    fn record_depth(&self) {
        let depth = self.capacity - self.queue_tickets.available_permits();
        gauge!(QUEUE_DEPTH_GAUGE).set(depth as f64);
    }
}
