//! Component G: `SynchronizedSingleReaderDelayLine`, the single-
//! producer/single-consumer queue a worker thread uses to hand a
//! direct-section result block back to the audio thread (spec §4.G).
//! Built directly on [`crossbeam::queue::ArrayQueue`] rather than a
//! hand-rolled ring buffer; the only behaviour this layer adds is
//! underrun counting (a non-fatal signal, never an error — spec §7)
//! and an optional write-ready callback a waiting reader can use to
//! avoid spinning.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Called by the producer every time a push succeeds, so a reader
/// parked on something other than this queue (e.g. a condvar) can be
/// woken without polling.
pub trait WriteReadyListener: Send + Sync {
    fn on_write_ready(&self);
}

pub struct SingleReaderDelayLine {
    queue: ArrayQueue<f64>,
    underrun_count: AtomicUsize,
    listener: Mutex<Option<Arc<dyn WriteReadyListener>>>,
}

impl SingleReaderDelayLine {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            underrun_count: AtomicUsize::new(0),
            listener: Mutex::new(None),
        }
    }

    pub fn set_write_ready_listener(&self, listener: Arc<dyn WriteReadyListener>) {
        *self.listener.lock().expect("listener mutex poisoned") = Some(listener);
    }

    /// Producer side. Returns `false` if the queue was full (a
    /// `WriteUnderrun` per spec §7's terminology, counted by the
    /// caller rather than here since only the consumer side tracks a
    /// counter on this type).
    pub fn push(&self, value: f64) -> bool {
        let pushed = self.queue.push(value).is_ok();
        if pushed {
            if let Some(listener) = self.listener.lock().expect("listener mutex poisoned").as_ref() {
                listener.on_write_ready();
            }
        }
        pushed
    }

    /// Consumer side. A miss increments the `ReaderUnderrun` counter
    /// instead of raising an error (spec §7); the audio thread is
    /// expected to substitute silence and keep going.
    pub fn pop(&self) -> Option<f64> {
        match self.queue.pop() {
            Some(value) => Some(value),
            None => {
                self.underrun_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct FlagListener(Arc<AtomicBool>);
    impl WriteReadyListener for FlagListener {
        fn on_write_ready(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn pop_on_empty_counts_underrun_without_erroring() {
        let line = SingleReaderDelayLine::new(4);
        assert_eq!(line.pop(), None);
        assert_eq!(line.underrun_count(), 1);
    }

    #[test]
    fn push_then_pop_round_trips() {
        let line = SingleReaderDelayLine::new(4);
        assert!(line.push(1.5));
        assert_eq!(line.pop(), Some(1.5));
        assert_eq!(line.underrun_count(), 0);
    }

    #[test]
    fn listener_fires_on_successful_push() {
        let line = SingleReaderDelayLine::new(4);
        let flagged = Arc::new(AtomicBool::new(false));
        line.set_write_ready_listener(Arc::new(FlagListener(flagged.clone())));
        line.push(1.0);
        assert!(flagged.load(Ordering::SeqCst));
    }
}
