//! The bounded record queue between the session task and record iterators.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
    time::Duration,
};

use dbn::RecordEnum;
use tokio::sync::Notify;

/// The result of offering a record to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushResult {
    /// The record was enqueued.
    Pushed,
    /// The queue was full; the record was dropped.
    Dropped,
    /// No iterator is consuming the queue; the record was discarded.
    Disabled,
}

struct QueueState {
    items: VecDeque<RecordEnum>,
    /// Closed queues accept no further records; consumers drain what remains.
    open: bool,
    /// Records are only enqueued while an iterator is consuming them.
    enabled: bool,
    dropped: u64,
}

/// A bounded MPSC-style queue of records.
///
/// The producer never blocks: a full queue drops the record instead. Reading from
/// the transport is expected to pause while the queue sits at or above half
/// capacity, so drops only occur when a single decode batch overfills it.
pub(crate) struct RecordQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    /// Wakes blocking consumers.
    not_empty: Condvar,
    /// Wakes async consumers.
    consumer_notify: Notify,
    /// Wakes the producer once drained below the watermark.
    producer_notify: Notify,
}

impl RecordQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                open: true,
                enabled: false,
                dropped: 0,
            }),
            capacity,
            not_empty: Condvar::new(),
            consumer_notify: Notify::new(),
            producer_notify: Notify::new(),
        }
    }

    /// The queue length at which transport reading pauses, and below which it
    /// resumes.
    fn watermark(&self) -> usize {
        (self.capacity / 2).max(1)
    }

    /// Starts enqueuing records. Called when iteration begins.
    pub(crate) fn enable(&self) {
        self.state.lock().unwrap().enabled = true;
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    /// Offers a record, without ever blocking.
    pub(crate) fn push(&self, record: RecordEnum) -> PushResult {
        let mut state = self.state.lock().unwrap();
        if !state.enabled || !state.open {
            return PushResult::Disabled;
        }
        if state.items.len() >= self.capacity {
            state.dropped += 1;
            return PushResult::Dropped;
        }
        state.items.push_back(record);
        drop(state);
        self.not_empty.notify_one();
        self.consumer_notify.notify_one();
        PushResult::Pushed
    }

    /// Returns `true` while reading from the transport should stay paused.
    pub(crate) fn above_watermark(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.open && state.items.len() >= self.watermark()
    }

    /// Waits until the queue drains below the watermark or closes.
    pub(crate) async fn drained_below_watermark(&self) {
        loop {
            let notified = self.producer_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.state.lock().unwrap();
                if !state.open || state.items.len() < self.watermark() {
                    return;
                }
            }
            notified.await;
        }
    }

    fn pop_inner(&self) -> PopOutcome {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.items.pop_front() {
            if state.items.len() + 1 == self.watermark() {
                // just crossed below the pause watermark
                drop(state);
                self.producer_notify.notify_one();
            }
            PopOutcome::Item(record)
        } else if state.open {
            PopOutcome::Empty
        } else {
            PopOutcome::Closed
        }
    }

    /// Pops the next record, blocking until one arrives or the queue closes.
    /// Returns `None` once the queue is closed and drained.
    pub(crate) fn pop_blocking(&self) -> Option<RecordEnum> {
        loop {
            match self.pop_inner() {
                PopOutcome::Item(record) => return Some(record),
                PopOutcome::Closed => return None,
                PopOutcome::Empty => {
                    let state = self.state.lock().unwrap();
                    if !state.items.is_empty() || !state.open {
                        continue;
                    }
                    // wait with a timeout so a missed wakeup can't hang forever
                    let _unused = self
                        .not_empty
                        .wait_timeout(state, Duration::from_millis(100))
                        .unwrap();
                }
            }
        }
    }

    /// Pops the next record, suspending until one arrives or the queue closes.
    /// Returns `None` once the queue is closed and drained.
    pub(crate) async fn pop(&self) -> Option<RecordEnum> {
        loop {
            let notified = self.consumer_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            match self.pop_inner() {
                PopOutcome::Item(record) => return Some(record),
                PopOutcome::Closed => return None,
                PopOutcome::Empty => notified.await,
            }
        }
    }

    /// Closes the queue to further records and wakes every waiter. Queued records
    /// remain poppable.
    pub(crate) fn close(&self) {
        self.state.lock().unwrap().open = false;
        self.not_empty.notify_all();
        self.consumer_notify.notify_waiters();
        self.producer_notify.notify_waiters();
    }

    /// Discards all queued records.
    pub(crate) fn clear(&self) {
        self.state.lock().unwrap().items.clear();
        self.producer_notify.notify_waiters();
    }

    /// Returns the number of records dropped because the queue was full.
    pub(crate) fn dropped(&self) -> u64 {
        self.state.lock().unwrap().dropped
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }
}

enum PopOutcome {
    Item(RecordEnum),
    Empty,
    Closed,
}

#[cfg(test)]
mod tests {
    use dbn::TradeMsg;

    use super::*;

    fn record(sequence: u32) -> RecordEnum {
        RecordEnum::Trade(TradeMsg {
            sequence,
            ..Default::default()
        })
    }

    #[test]
    fn push_requires_consumer() {
        let queue = RecordQueue::new(4);
        assert_eq!(queue.push(record(0)), PushResult::Disabled);
        queue.enable();
        assert_eq!(queue.push(record(0)), PushResult::Pushed);
    }

    #[test]
    fn full_queue_drops_instead_of_erroring() {
        let queue = RecordQueue::new(2);
        queue.enable();
        assert_eq!(queue.push(record(0)), PushResult::Pushed);
        assert_eq!(queue.push(record(1)), PushResult::Pushed);
        assert_eq!(queue.push(record(2)), PushResult::Dropped);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn pop_drains_after_close_in_order(){
        let queue = RecordQueue::new(8);
        queue.enable();
        for sequence in 0..3 {
            queue.push(record(sequence));
        }
        queue.close();
        assert_eq!(queue.push(record(9)), PushResult::Disabled);
        for sequence in 0..3 {
            match queue.pop_blocking().unwrap() {
                RecordEnum::Trade(rec) => assert_eq!(rec.sequence, sequence),
                _ => panic!("unexpected record type"),
            }
        }
        assert!(queue.pop_blocking().is_none());
    }

    #[tokio::test]
    async fn async_pop_sees_close() {
        let queue = std::sync::Arc::new(RecordQueue::new(4));
        queue.enable();
        let popper = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        // give the popper a chance to start waiting
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(record(7));
        let res = popper.await.unwrap();
        assert!(matches!(res, Some(RecordEnum::Trade(rec)) if rec.sequence == 7));
        queue.close();
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn producer_waits_for_watermark() {
        let queue = std::sync::Arc::new(RecordQueue::new(4));
        queue.enable();
        queue.push(record(0));
        queue.push(record(1));
        assert!(queue.above_watermark());
        let waiter = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.drained_below_watermark().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        queue.pop_blocking().unwrap();
        waiter.await.unwrap();
        assert!(!queue.above_watermark());
    }
}
