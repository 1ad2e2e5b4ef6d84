use thiserror::Error;

use crate::affinity::{ObjectId, WorkerId};

/// Routing and affinity errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{object} is already assigned to {owner}")]
    AlreadyAssigned { object: ObjectId, owner: WorkerId },

    #[error("{0} has no owning worker")]
    Unassigned(ObjectId),

    #[error("{worker} does not own {object}")]
    NotOwner { object: ObjectId, worker: WorkerId },

    #[error("{0} is not being handed off")]
    NotTransferring(ObjectId),

    #[error("no such worker: {0}")]
    NoSuchWorker(WorkerId),

    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("worker pool is shut down")]
    ShutDown,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}
