use crate::{
    semaphore::Semaphore,
    sync::{Mutex, lock},
};
use derive_more::Debug;
use std::collections::VecDeque;

/// FIFO of execution-ready items owned by one worker.
///
/// Every [`push`](Self::push) is followed by exactly one `notify` on the
/// queue's [`signal`](Self::signal), and every item removal is preceded by
/// exactly one successful claim on that signal. Because of this pairing the
/// number of queued items is never smaller than the signal count, so an owner
/// or a thief that holds a claim is guaranteed to find an item.
#[must_use]
#[derive(Debug)]
#[repr(align(128))]
pub struct ReadyQueue<T> {
    #[debug(skip)]
    items: Mutex<VecDeque<T>>,
    signal: Semaphore,
}

impl<T> Default for ReadyQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            signal: Semaphore::new(),
        }
    }
}

impl<T> ReadyQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item` and signal its availability.
    pub fn push(&self, item: T) {
        lock(&self.items).push_back(item);
        self.signal.notify();
    }

    /// Remove the front item.
    ///
    /// Callers are expected to have claimed the item on [`signal`](Self::signal)
    /// first; popping without a claim breaks the pairing other claimants rely on.
    pub fn pop(&self) -> Option<T> {
        lock(&self.items).pop_front()
    }

    /// Remove the front item after a successful claim on the signal.
    ///
    /// # Panics
    /// If the queue is empty: the claim had no matching item, which means the
    /// push/notify pairing was violated.
    pub fn pop_claimed(&self) -> T {
        self.pop()
            .expect("ReadyQueue::pop_claimed: signal claimed but queue is empty")
    }

    /// Work-availability signal paired with this queue.
    pub fn signal(&self) -> &Semaphore {
        &self.signal
    }

    /// Number of queued items. Only a snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    /// Whether the queue is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim and remove every item that is currently signalled.
    ///
    /// Items are taken through the normal claim-then-pop protocol, so a worker
    /// that claimed an item concurrently still finds it. Returns the number of
    /// items discarded.
    pub fn drain(&self) -> usize {
        let mut drained = 0;
        while self.signal.try_take() {
            drop(self.pop_claimed());
            drained += 1;
        }
        drained
    }

    /// Drop every item and zero the signal.
    ///
    /// Only sound while no other thread uses the queue, e.g. after the
    /// workers have been joined.
    pub fn clear(&self) {
        lock(&self.items).clear();
        self.signal.reset();
    }
}

/// The fixed set of per-worker ready queues.
#[must_use]
#[derive(Debug)]
pub struct ReadyQueues<T> {
    queues: Box<[ReadyQueue<T>]>,
}

impl<T> ReadyQueues<T> {
    /// Create `workers` empty queues.
    pub fn new(workers: usize) -> Self {
        Self {
            queues: (0..workers).map(|_| ReadyQueue::new()).collect(),
        }
    }

    /// Number of queues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Whether there are no queues at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Queue owned by `worker`.
    ///
    /// # Panics
    /// If `worker` is out of range.
    pub fn get(&self, worker: usize) -> &ReadyQueue<T> {
        &self.queues[worker]
    }

    /// Iterate over all queues in worker order.
    pub fn iter(&self) -> impl Iterator<Item = &ReadyQueue<T>> {
        self.queues.iter()
    }

    /// One stealing pass on behalf of the idle worker `thief`.
    ///
    /// Every other queue is visited once. A successful `try_take` on a
    /// victim's signal reserves one of its items; the front item is then moved
    /// to the thief's queue and the thief's signal is notified. At most one
    /// item is taken per victim. Returns how many items were moved.
    pub fn steal_into(&self, thief: usize) -> usize {
        let mut stolen = 0;
        for victim in (0..self.queues.len()).filter(|&victim| victim != thief) {
            if self.queues[victim].signal.try_take() {
                self.transfer(victim, thief);
                stolen += 1;
            }
        }
        stolen
    }

    /// Move the front item of `victim` to the back of `thief`.
    ///
    /// The caller holds a claim on the victim's signal. Both queue locks are
    /// held for the move, always acquired lower index first, so concurrent
    /// thieves targeting each other cannot deadlock and the item is never
    /// visible in two queues.
    fn transfer(&self, victim: usize, thief: usize) {
        debug_assert_ne!(victim, thief, "ReadyQueues::transfer: [1]");
        let (low, high) = if victim < thief {
            (victim, thief)
        } else {
            (thief, victim)
        };
        let mut low_items = lock(&self.queues[low].items);
        let mut high_items = lock(&self.queues[high].items);
        let (from, to) = if victim < thief {
            (&mut *low_items, &mut *high_items)
        } else {
            (&mut *high_items, &mut *low_items)
        };
        let item = from
            .pop_front()
            .expect("ReadyQueues::transfer: steal reservation without a queued item");
        to.push_back(item);
        drop(high_items);
        drop(low_items);
        self.queues[thief].signal.notify();
    }

    /// [`drain`](ReadyQueue::drain) every queue, returning the total number of
    /// discarded items.
    pub fn drain_all(&self) -> usize {
        self.queues.iter().map(ReadyQueue::drain).sum()
    }
}
