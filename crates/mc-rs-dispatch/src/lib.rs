//! Worker threads with per-object affinity.
//!
//! Every game object (player, entity, world, plugin) is owned by exactly one
//! worker. Messages for an object are routed to its owner's
//! [`DispatchQueue`] and executed there in arrival order, so object state is
//! only ever touched from one thread.

pub mod affinity;
pub mod error;
pub mod queue;
pub mod router;
pub mod worker;

pub use affinity::{Affinity, AffinityTable, ObjectId, ObjectKind, WorkerId};
pub use error::DispatchError;
pub use queue::DispatchQueue;
pub use router::Router;
pub use worker::{HandlerResult, WorkerContext, WorkerHandler, WorkerPool};
