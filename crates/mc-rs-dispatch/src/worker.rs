//! Worker threads and the handler interface they drive.
//!
//! # Hand-off
//!
//! 1. The owning worker calls [`WorkerContext::hand_off`]. The table moves to
//!    `Transferring { from, to }` and a barrier is queued behind everything
//!    already waiting on `from`.
//! 2. New messages route to `to`, which holds them.
//! 3. `from` keeps executing until it reaches the barrier, then marks `to`
//!    as the owner and queues an activation on `to`.
//! 4. `to` replays the held messages in arrival order.
//!
//! Nothing for the object runs on `from` after step 3, and nothing runs on
//! `to` before it.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use tracing::{debug, info, trace, warn};

use crate::affinity::{Affinity, ObjectId, WorkerId};
use crate::error::DispatchError;
use crate::router::Router;

/// Unit of work on a worker queue.
pub(crate) enum Job<M> {
    Deliver { target: ObjectId, message: M },
    Tick { target: ObjectId },
    HandOffBarrier { target: ObjectId, to: WorkerId },
    Activate { target: ObjectId },
}

impl<M> Job<M> {
    pub(crate) fn target(&self) -> ObjectId {
        match self {
            Self::Deliver { target, .. }
            | Self::Tick { target }
            | Self::HandOffBarrier { target, .. }
            | Self::Activate { target } => *target,
        }
    }
}

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Per-worker message handler. Each worker owns its own instance, so
/// handlers can keep plain (non-`Sync`) state for the objects they own.
pub trait WorkerHandler<M>: Send + 'static {
    fn handle(&mut self, ctx: &WorkerContext<'_, M>, target: ObjectId, message: M)
        -> HandlerResult;

    fn tick(&mut self, _ctx: &WorkerContext<'_, M>, _target: ObjectId) -> HandlerResult {
        Ok(())
    }
}

/// What a handler can see of the pool while it runs.
pub struct WorkerContext<'a, M> {
    worker: WorkerId,
    router: &'a Router<M>,
}

impl<M: Send + 'static> WorkerContext<'_, M> {
    pub fn worker_id(&self) -> WorkerId {
        self.worker
    }

    pub fn router(&self) -> &Router<M> {
        self.router
    }

    /// Move `target`, owned by this worker, to worker `to`.
    pub fn hand_off(&self, target: ObjectId, to: WorkerId) -> Result<(), DispatchError> {
        if to.0 >= self.router.worker_count() {
            return Err(DispatchError::NoSuchWorker(to));
        }
        self.router
            .table()
            .begin_hand_off(target, self.worker, to)?;
        if to != self.worker {
            debug!("Handing off {target} from {} to {to}", self.worker);
            self.router
                .enqueue(self.worker, Job::HandOffBarrier { target, to });
        }
        Ok(())
    }
}

struct Worker<M, H> {
    id: WorkerId,
    router: Router<M>,
    handler: H,
    /// Messages that arrived during an incoming hand-off, by object.
    held: HashMap<ObjectId, VecDeque<Job<M>>>,
}

impl<M: Send + 'static, H: WorkerHandler<M>> Worker<M, H> {
    fn run(mut self) {
        debug!("{} started", self.id);
        while let Some(job) = self.router.queue(self.id).dequeue() {
            self.process(job);
        }
        if !self.held.is_empty() {
            warn!(
                "{} stopped with {} objects awaiting hand-off",
                self.id,
                self.held.len()
            );
        }
        debug!("{} stopped", self.id);
    }

    fn process(&mut self, job: Job<M>) {
        match job {
            Job::HandOffBarrier { target, to } => {
                match self.router.table().complete_hand_off(target, self.id, to) {
                    Ok(()) => debug!("Hand-off of {target} from {} to {to} complete", self.id),
                    Err(e) => warn!("Hand-off of {target} from {} to {to} failed: {e}", self.id),
                }
                self.router.enqueue(to, Job::Activate { target });
            }
            Job::Activate { target } => {
                if let Some(held) = self.held.remove(&target) {
                    trace!("{} replaying {} held jobs for {target}", self.id, held.len());
                    for job in held {
                        self.deliver(job);
                    }
                }
            }
            job => self.deliver(job),
        }
    }

    fn deliver(&mut self, job: Job<M>) {
        let target = job.target();
        if let Some(held) = self.held.get_mut(&target) {
            held.push_back(job);
            return;
        }
        match self.router.table().get(target) {
            None => warn!("Dropping job for unassigned {target} on {}", self.id),
            Some(Affinity::Owned(owner)) if owner == self.id => self.execute(job),
            Some(Affinity::Transferring { from, .. }) if from == self.id => self.execute(job),
            Some(Affinity::Transferring { to, .. }) if to == self.id => {
                self.held.entry(target).or_default().push_back(job);
            }
            Some(affinity) => {
                trace!(
                    "Forwarding job for {target} from {} to {}",
                    self.id,
                    affinity.route_target()
                );
                if let Err(e) = self.router.forward(job) {
                    warn!("Dropping job for {target}: {e}");
                }
            }
        }
    }

    fn execute(&mut self, job: Job<M>) {
        let ctx = WorkerContext {
            worker: self.id,
            router: &self.router,
        };
        let handler = &mut self.handler;
        let (target, outcome) = match job {
            Job::Deliver { target, message } => (
                target,
                panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&ctx, target, message))),
            ),
            Job::Tick { target } => (
                target,
                panic::catch_unwind(AssertUnwindSafe(|| handler.tick(&ctx, target))),
            ),
            Job::HandOffBarrier { .. } | Job::Activate { .. } => return,
        };
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Handler error for {target} on {}: {e}", self.id),
            Err(payload) => warn!(
                "Handler panicked for {target} on {}: {}",
                self.id,
                panic_message(&*payload)
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

/// Fixed set of worker threads, one [`DispatchQueue`] each.
///
/// [`DispatchQueue`]: crate::DispatchQueue
pub struct WorkerPool<M: Send + 'static> {
    router: Router<M>,
    threads: Vec<JoinHandle<()>>,
}

impl<M: Send + 'static> WorkerPool<M> {
    /// Spawn `count` threads named `worker-N`, each with the handler built
    /// by `factory`.
    pub fn spawn<H, F>(count: usize, mut factory: F) -> Result<Self, DispatchError>
    where
        H: WorkerHandler<M>,
        F: FnMut(WorkerId) -> H,
    {
        if count == 0 {
            return Err(DispatchError::NoWorkers);
        }
        let mut pool = Self {
            router: Router::new(count),
            threads: Vec::with_capacity(count),
        };
        for index in 0..count {
            let id = WorkerId(index);
            let worker = Worker {
                id,
                router: pool.router.clone(),
                handler: factory(id),
                held: HashMap::new(),
            };
            let handle = std::thread::Builder::new()
                .name(id.to_string())
                .spawn(move || worker.run())
                .map_err(|e| DispatchError::Spawn(e.to_string()))?;
            pool.threads.push(handle);
        }
        info!("Started {count} worker threads");
        Ok(pool)
    }

    pub fn router(&self) -> &Router<M> {
        &self.router
    }

    /// Close every queue, let workers drain them, and join the threads.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.router.close_all();
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!("{name} panicked outside a handler");
            }
        }
        info!("Worker pool stopped");
    }
}

impl<M: Send + 'static> Drop for WorkerPool<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Debug)]
    enum Msg {
        Seq(u32),
        HandOff(WorkerId),
        Panic,
        Fail,
    }

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Handled {
            worker: WorkerId,
            target: ObjectId,
            seq: u32,
        },
        Ticked {
            worker: WorkerId,
            target: ObjectId,
        },
    }

    struct Recorder {
        events: Sender<Event>,
    }

    impl WorkerHandler<Msg> for Recorder {
        fn handle(
            &mut self,
            ctx: &WorkerContext<'_, Msg>,
            target: ObjectId,
            message: Msg,
        ) -> HandlerResult {
            match message {
                Msg::Seq(seq) => {
                    let _ = self.events.send(Event::Handled {
                        worker: ctx.worker_id(),
                        target,
                        seq,
                    });
                }
                Msg::HandOff(to) => ctx.hand_off(target, to)?,
                Msg::Panic => panic!("handler blew up"),
                Msg::Fail => return Err("handler failed".into()),
            }
            Ok(())
        }

        fn tick(&mut self, ctx: &WorkerContext<'_, Msg>, target: ObjectId) -> HandlerResult {
            let _ = self.events.send(Event::Ticked {
                worker: ctx.worker_id(),
                target,
            });
            Ok(())
        }
    }

    fn pool(count: usize) -> (WorkerPool<Msg>, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let pool = WorkerPool::spawn(count, |_| Recorder { events: tx.clone() }).unwrap();
        (pool, rx)
    }

    fn handled(rx: &Receiver<Event>, n: usize) -> Vec<(WorkerId, ObjectId, u32)> {
        (0..n)
            .map(|_| match rx.recv_timeout(TIMEOUT).unwrap() {
                Event::Handled {
                    worker,
                    target,
                    seq,
                } => (worker, target, seq),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn messages_run_on_owner_in_order() {
        let (pool, rx) = pool(4);
        let router = pool.router().clone();
        let objects: Vec<_> = (0..8).map(ObjectId::player).collect();
        for (i, obj) in objects.iter().enumerate() {
            router.assign(*obj, WorkerId(i % 4)).unwrap();
        }
        for seq in 0..50 {
            for obj in &objects {
                router.route(*obj, Msg::Seq(seq)).unwrap();
            }
        }

        let events = handled(&rx, 50 * objects.len());
        for (i, obj) in objects.iter().enumerate() {
            let mine: Vec<_> = events.iter().filter(|e| e.1 == *obj).collect();
            assert!(mine.iter().all(|e| e.0 == WorkerId(i % 4)));
            let seqs: Vec<_> = mine.iter().map(|e| e.2).collect();
            assert_eq!(seqs, (0..50).collect::<Vec<_>>());
        }
        pool.shutdown();
    }

    #[test]
    fn hand_off_preserves_order_and_stops_old_worker() {
        let (pool, rx) = pool(2);
        let router = pool.router().clone();
        let p = ObjectId::player(1);
        router.assign(p, WorkerId(0)).unwrap();

        for seq in 0..200 {
            if seq == 100 {
                router.route(p, Msg::HandOff(WorkerId(1))).unwrap();
            }
            router.route(p, Msg::Seq(seq)).unwrap();
        }

        let events = handled(&rx, 200);
        let seqs: Vec<_> = events.iter().map(|e| e.2).collect();
        assert_eq!(seqs, (0..200).collect::<Vec<_>>());

        // One cut point: everything before runs on worker 0, after on 1.
        let cut = events
            .iter()
            .position(|e| e.0 == WorkerId(1))
            .expect("hand-off never happened");
        assert!(cut >= 100);
        assert!(events[..cut].iter().all(|e| e.0 == WorkerId(0)));
        assert!(events[cut..].iter().all(|e| e.0 == WorkerId(1)));

        assert_eq!(router.affinity(p), Some(Affinity::Owned(WorkerId(1))));
        router.route(p, Msg::Seq(200)).unwrap();
        assert_eq!(handled(&rx, 1), vec![(WorkerId(1), p, 200)]);
        pool.shutdown();
    }

    #[test]
    fn panic_and_error_are_isolated() {
        let (pool, rx) = pool(1);
        let router = pool.router().clone();
        let a = ObjectId::entity(1);
        let b = ObjectId::entity(2);
        router.assign(a, WorkerId(0)).unwrap();
        router.assign(b, WorkerId(0)).unwrap();

        router.route(a, Msg::Panic).unwrap();
        router.route(b, Msg::Seq(1)).unwrap();
        router.route(a, Msg::Fail).unwrap();
        router.route(a, Msg::Seq(2)).unwrap();

        assert_eq!(
            handled(&rx, 2),
            vec![(WorkerId(0), b, 1), (WorkerId(0), a, 2)]
        );
        pool.shutdown();
    }

    #[test]
    fn stale_job_is_forwarded_to_owner() {
        let (pool, rx) = pool(2);
        let router = pool.router().clone();
        let p = ObjectId::player(3);
        router.assign(p, WorkerId(0)).unwrap();

        // Simulate a job that was queued before ownership moved.
        router.enqueue(
            WorkerId(1),
            Job::Deliver {
                target: p,
                message: Msg::Seq(9),
            },
        );
        assert_eq!(handled(&rx, 1), vec![(WorkerId(0), p, 9)]);
        pool.shutdown();
    }

    #[test]
    fn tick_reaches_owner() {
        let (pool, rx) = pool(3);
        let router = pool.router().clone();
        let w = ObjectId::world(0);
        router.assign(w, WorkerId(2)).unwrap();
        router.tick(w).unwrap();
        assert_eq!(
            rx.recv_timeout(TIMEOUT).unwrap(),
            Event::Ticked {
                worker: WorkerId(2),
                target: w
            }
        );
        pool.shutdown();
    }

    #[test]
    fn hand_off_requires_ownership() {
        let (pool, rx) = pool(2);
        let router = pool.router().clone();
        let p = ObjectId::player(4);
        router.assign(p, WorkerId(0)).unwrap();

        // Handing off to a worker that does not exist fails inside the
        // handler and leaves ownership unchanged.
        router.route(p, Msg::HandOff(WorkerId(9))).unwrap();
        router.route(p, Msg::Seq(1)).unwrap();
        assert_eq!(handled(&rx, 1), vec![(WorkerId(0), p, 1)]);
        assert_eq!(router.owner(p), Some(WorkerId(0)));
        pool.shutdown();
    }

    #[test]
    fn shutdown_joins_and_rejects_new_work() {
        let (pool, _rx) = pool(2);
        let router = pool.router().clone();
        let w = ObjectId::world(1);
        router.assign(w, WorkerId(1)).unwrap();
        pool.shutdown();
        assert!(matches!(
            router.route(w, Msg::Seq(0)),
            Err(DispatchError::ShutDown)
        ));
    }

    #[test]
    fn zero_workers_rejected() {
        let result = WorkerPool::<Msg>::spawn(0, |_| Recorder {
            events: mpsc::channel().0,
        });
        assert!(matches!(result, Err(DispatchError::NoWorkers)));
    }
}
