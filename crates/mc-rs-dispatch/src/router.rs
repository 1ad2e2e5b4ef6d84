//! Thread-affinity router: sends each message to the worker that owns its
//! target object.

use std::sync::Arc;

use crate::affinity::{Affinity, AffinityTable, ObjectId, WorkerId};
use crate::error::DispatchError;
use crate::queue::DispatchQueue;
use crate::worker::Job;

struct Shared<M> {
    queues: Vec<DispatchQueue<Job<M>>>,
    table: AffinityTable,
}

/// Cloneable handle for routing messages into a [`WorkerPool`].
///
/// [`WorkerPool`]: crate::WorkerPool
pub struct Router<M> {
    shared: Arc<Shared<M>>,
}

impl<M> Clone for Router<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M> std::fmt::Debug for Router<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("workers", &self.shared.queues.len())
            .field("objects", &self.shared.table.len())
            .finish()
    }
}

impl<M: Send + 'static> Router<M> {
    pub(crate) fn new(worker_count: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                queues: (0..worker_count).map(|_| DispatchQueue::new()).collect(),
                table: AffinityTable::new(),
            }),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.shared.queues.len()
    }

    fn check_worker(&self, worker: WorkerId) -> Result<(), DispatchError> {
        if worker.0 < self.worker_count() {
            Ok(())
        } else {
            Err(DispatchError::NoSuchWorker(worker))
        }
    }

    /// Give `target` to `worker`.
    pub fn assign(&self, target: ObjectId, worker: WorkerId) -> Result<(), DispatchError> {
        self.check_worker(worker)?;
        self.shared.table.assign(target, worker)?;
        tracing::debug!("Assigned {target} to {worker}");
        Ok(())
    }

    /// Drop the ownership record for `target`. Messages still queued for it
    /// are discarded when dequeued.
    pub fn release(&self, target: ObjectId) -> Option<WorkerId> {
        let released = self.shared.table.release(target).map(|a| a.route_target());
        if let Some(worker) = released {
            tracing::debug!("Released {target} from {worker}");
        }
        released
    }

    pub fn owner(&self, target: ObjectId) -> Option<WorkerId> {
        self.shared.table.owner(target)
    }

    pub fn affinity(&self, target: ObjectId) -> Option<Affinity> {
        self.shared.table.get(target)
    }

    /// Objects whose new messages currently go to `worker`.
    pub fn owned_by(&self, worker: WorkerId) -> Vec<ObjectId> {
        self.shared.table.owned_by(worker)
    }

    /// Queue `message` for `target` on its owning worker.
    pub fn route(&self, target: ObjectId, message: M) -> Result<WorkerId, DispatchError> {
        self.send(target, Job::Deliver { target, message })
    }

    /// Queue a simulation tick for `target`.
    pub fn tick(&self, target: ObjectId) -> Result<WorkerId, DispatchError> {
        self.send(target, Job::Tick { target })
    }

    fn send(&self, target: ObjectId, job: Job<M>) -> Result<WorkerId, DispatchError> {
        self.shared
            .table
            .with_route(target, |worker| {
                let queue = &self.shared.queues[worker.0];
                if queue.is_closed() {
                    return Err(DispatchError::ShutDown);
                }
                queue.enqueue(job);
                Ok(worker)
            })
            .unwrap_or(Err(DispatchError::Unassigned(target)))
    }

    /// Re-send a job under the current routing record.
    pub(crate) fn forward(&self, job: Job<M>) -> Result<WorkerId, DispatchError> {
        self.send(job.target(), job)
    }

    pub(crate) fn enqueue(&self, worker: WorkerId, job: Job<M>) {
        self.shared.queues[worker.0].enqueue(job);
    }

    pub(crate) fn queue(&self, worker: WorkerId) -> &DispatchQueue<Job<M>> {
        &self.shared.queues[worker.0]
    }

    pub(crate) fn table(&self) -> &AffinityTable {
        &self.shared.table
    }

    pub(crate) fn close_all(&self) {
        for queue in &self.shared.queues {
            queue.close();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.queues.iter().all(|q| q.is_closed())
    }
}
