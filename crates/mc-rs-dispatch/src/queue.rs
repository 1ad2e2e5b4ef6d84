//! Unbounded multi-producer multi-consumer FIFO (Michael–Scott queue).
//!
//! The list always starts with a sentinel node whose payload has already
//! been taken (or was never set). `head` points at the sentinel, `tail` at
//! the last node or one step behind it; any thread that sees a lagging tail
//! swings it forward before retrying. Unlinked nodes are reclaimed through
//! `crossbeam-epoch` once no pinned thread can still be reading them.
//!
//! Blocking consumers park on a condition variable. The parking protocol is
//! a store/fence/load handshake on both sides: a consumer bumps `sleepers`
//! and re-checks the queue, a producer publishes its node and then checks
//! `sleepers`. At least one side always observes the other.

use std::mem::MaybeUninit;
use std::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::CachePadded;

struct Node<T> {
    /// Uninitialized in the sentinel.
    data: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

/// Lock-free FIFO with optional blocking dequeue.
pub struct DispatchQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
    closed: AtomicBool,
    sleepers: AtomicUsize,
    lock: Mutex<()>,
    available: Condvar,
}

// Nodes are only reachable through the queue; payloads move between threads.
unsafe impl<T: Send> Send for DispatchQueue<T> {}
unsafe impl<T: Send> Sync for DispatchQueue<T> {}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DispatchQueue<T> {
    pub fn new() -> Self {
        let queue = Self {
            head: CachePadded::new(Atomic::null()),
            tail: CachePadded::new(Atomic::null()),
            closed: AtomicBool::new(false),
            sleepers: AtomicUsize::new(0),
            lock: Mutex::new(()),
            available: Condvar::new(),
        };
        let sentinel = Owned::new(Node {
            data: MaybeUninit::uninit(),
            next: Atomic::null(),
        });
        // SAFETY: the queue is not shared yet.
        unsafe {
            let guard = epoch::unprotected();
            let sentinel = sentinel.into_shared(guard);
            queue.head.store(sentinel, Ordering::Relaxed);
            queue.tail.store(sentinel, Ordering::Relaxed);
        }
        queue
    }

    /// Append `item`. Never blocks; wakes one parked consumer if any.
    ///
    /// Items enqueued after [`close`](Self::close) are dropped with the
    /// queue unless a consumer is still draining it.
    pub fn enqueue(&self, item: T) {
        {
            let guard = &epoch::pin();
            let new = Owned::new(Node {
                data: MaybeUninit::new(item),
                next: Atomic::null(),
            })
            .into_shared(guard);
            loop {
                let tail = self.tail.load(Ordering::Acquire, guard);
                if self.push_internal(tail, new, guard) {
                    break;
                }
            }
        }
        self.wake_one();
    }

    /// Try to link `new` after `onto`. Returns false if `onto` was not the
    /// last node, after helping to advance `tail`.
    fn push_internal(
        &self,
        onto: Shared<'_, Node<T>>,
        new: Shared<'_, Node<T>>,
        guard: &Guard,
    ) -> bool {
        // SAFETY: `onto` was loaded under `guard` and nodes are never freed
        // while a pinned thread can reach them.
        let o = unsafe { onto.deref() };
        let next = o.next.load(Ordering::Acquire, guard);
        if !next.is_null() {
            let _ = self
                .tail
                .compare_exchange(onto, next, Ordering::Release, Ordering::Relaxed, guard);
            false
        } else {
            let linked = o
                .next
                .compare_exchange(Shared::null(), new, Ordering::Release, Ordering::Relaxed, guard)
                .is_ok();
            if linked {
                let _ = self
                    .tail
                    .compare_exchange(onto, new, Ordering::Release, Ordering::Relaxed, guard);
            }
            linked
        }
    }

    /// One attempt at unlinking the sentinel. `Err` means a concurrent
    /// consumer won the race and the caller should retry.
    fn pop_internal(&self, guard: &Guard) -> Result<Option<T>, ()> {
        let head = self.head.load(Ordering::Acquire, guard);
        // SAFETY: as in `push_internal`.
        let h = unsafe { head.deref() };
        let next = h.next.load(Ordering::Acquire, guard);
        // SAFETY: as above.
        match unsafe { next.as_ref() } {
            Some(n) => self
                .head
                .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, guard)
                .map(|_| {
                    let tail = self.tail.load(Ordering::Relaxed, guard);
                    if head == tail {
                        let _ = self.tail.compare_exchange(
                            tail,
                            next,
                            Ordering::Release,
                            Ordering::Relaxed,
                            guard,
                        );
                    }
                    // SAFETY: winning the CAS makes this thread the only one
                    // to take `next`'s payload; `next` becomes the sentinel.
                    // The old sentinel is unreachable for new readers.
                    unsafe {
                        guard.defer_destroy(head);
                        Some(n.data.assume_init_read())
                    }
                })
                .map_err(|_| ()),
            None => Ok(None),
        }
    }

    /// Pop the front item without blocking.
    pub fn try_dequeue(&self) -> Option<T> {
        let guard = &epoch::pin();
        loop {
            if let Ok(item) = self.pop_internal(guard) {
                return item;
            }
        }
    }

    /// Pop the front item, parking while the queue is empty.
    ///
    /// Returns `None` only once the queue is closed and drained.
    pub fn dequeue(&self) -> Option<T> {
        self.dequeue_until(None)
    }

    /// Like [`dequeue`](Self::dequeue), giving up after `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        self.dequeue_until(Some(Instant::now() + timeout))
    }

    fn dequeue_until(&self, deadline: Option<Instant>) -> Option<T> {
        loop {
            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }
            if self.is_closed() {
                return self.try_dequeue();
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return None;
            }

            let guard = self.lock_parking();
            self.sleepers.fetch_add(1, Ordering::SeqCst);
            fence(Ordering::SeqCst);
            if self.is_empty() && !self.is_closed() {
                let _guard = match deadline {
                    None => self
                        .available
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner),
                    Some(d) => {
                        let remaining = d.saturating_duration_since(Instant::now());
                        self.available
                            .wait_timeout(guard, remaining)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0
                    }
                };
            }
            self.sleepers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn lock_parking(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake_one(&self) {
        fence(Ordering::SeqCst);
        if self.sleepers.load(Ordering::Relaxed) > 0 {
            let _guard = self.lock_parking();
            self.available.notify_one();
        }
    }

    /// Stop blocking consumers once the queue drains.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _guard = self.lock_parking();
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Snapshot; may be stale by the time the caller acts on it.
    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        // SAFETY: as in `push_internal`.
        let h = unsafe { head.deref() };
        h.next.load(Ordering::Acquire, guard).is_null()
    }
}

impl<T> Drop for DispatchQueue<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread holds a reference.
        unsafe {
            let guard = epoch::unprotected();
            while let Ok(Some(item)) = self.pop_internal(guard) {
                drop(item);
            }
            let sentinel = self.head.load(Ordering::Relaxed, guard);
            drop(sentinel.into_owned());
        }
    }
}

impl<T> std::fmt::Debug for DispatchQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("closed", &self.is_closed())
            .field("empty", &self.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_single_thread() {
        let q = DispatchQueue::new();
        assert!(q.is_empty());
        for i in 0..10 {
            q.enqueue(i);
        }
        assert!(!q.is_empty());
        for i in 0..10 {
            assert_eq!(q.try_dequeue(), Some(i));
        }
        assert_eq!(q.try_dequeue(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn concurrent_no_loss_no_duplicates() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 10_000;

        let q = Arc::new(DispatchQueue::new());
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        q.enqueue((p, i));
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let q = q.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(item) = q.dequeue() {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        q.close();

        let mut all = HashSet::new();
        for c in consumers {
            let seen = c.join().unwrap();
            // Each consumer observes every producer's items in order.
            let mut last = [None; PRODUCERS];
            for &(p, i) in &seen {
                if let Some(prev) = last[p] {
                    assert!(i > prev, "producer {p}: {i} after {prev}");
                }
                last[p] = Some(i);
                assert!(all.insert((p, i)), "duplicate ({p}, {i})");
            }
        }
        assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
    }

    #[test]
    fn blocking_dequeue_wakes_on_enqueue() {
        let q = Arc::new(DispatchQueue::new());
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.dequeue())
        };
        thread::sleep(Duration::from_millis(20));
        q.enqueue(42u32);
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn close_releases_waiters_after_drain() {
        let q = Arc::new(DispatchQueue::<u32>::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let q = q.clone();
                thread::spawn(move || q.dequeue())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        q.close();
        for w in waiters {
            assert_eq!(w.join().unwrap(), None);
        }

        let q = DispatchQueue::new();
        q.enqueue(1);
        q.close();
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn dequeue_timeout_expires() {
        let q = DispatchQueue::<u8>::new();
        let start = Instant::now();
        assert_eq!(q.dequeue_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));

        q.enqueue(5);
        assert_eq!(q.dequeue_timeout(Duration::from_millis(30)), Some(5));
    }

    #[test]
    fn drop_releases_remaining_items() {
        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        {
            let q = DispatchQueue::new();
            for _ in 0..5 {
                q.enqueue(Counted(drops.clone()));
            }
            drop(q.try_dequeue());
            assert_eq!(drops.load(Ordering::SeqCst), 1);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }
}
