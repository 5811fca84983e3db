//! Component F: `SynchronizedDelayLine`, a single-writer/multi-reader
//! power-of-two ring buffer. The audio thread writes continuously and
//! calls [`SynchronizedDelayLine::synch_write`] to publish a batch;
//! worker threads block in [`SynchronizedDelayLine::wait_for_more_read_data`]
//! until the publish point passes the sample they're waiting on.
//! [`SynchronizedDelayLine::close`] is the only cancellation path —
//! every blocked reader wakes with [`ConvolutionError::Closed`] instead
//! of hanging forever at shutdown (spec §4.F, §5).

use std::sync::{Condvar, Mutex};
use std::thread;

use crate::error::{ConvolutionError, Result};
use crate::priority;

struct State {
    buffer: Vec<f64>,
    mask: u64,
    write_pos: u64,
    read_tail: u64,
    closed: bool,
}

pub struct SynchronizedDelayLine {
    state: Mutex<State>,
    condvar: Condvar,
}

impl SynchronizedDelayLine {
    /// `capacity` must be a power of two; it bounds how far a reader
    /// may lag the writer before [`Self::at`]/[`Self::read_range`]
    /// report a [`ConvolutionError::ReadUnderrun`].
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "delay line capacity must be a power of two");
        Self {
            state: Mutex::new(State {
                buffer: vec![0.0; capacity],
                mask: capacity as u64 - 1,
                write_pos: 0,
                read_tail: 0,
                closed: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Writes one sample at the current write position without
    /// publishing it; readers cannot observe it until the next
    /// [`Self::synch_write`].
    pub fn write(&self, value: f64) {
        let mut s = self.state.lock().expect("delay line mutex poisoned");
        let idx = (s.write_pos & s.mask) as usize;
        s.buffer[idx] = value;
        s.write_pos += 1;
    }

    /// Publishes every sample written so far and wakes blocked readers.
    pub fn synch_write(&self) {
        let mut s = self.state.lock().expect("delay line mutex poisoned");
        s.read_tail = s.write_pos;
        drop(s);
        self.condvar.notify_all();
    }

    pub fn read_tail(&self) -> u64 {
        self.state.lock().expect("delay line mutex poisoned").read_tail
    }

    pub fn is_read_ready(&self, position: u64) -> bool {
        let s = self.state.lock().expect("delay line mutex poisoned");
        s.closed || position < s.read_tail
    }

    /// Blocks until sample `position` has been published, or the line
    /// is closed. Closed-while-waiting is reported as
    /// [`ConvolutionError::Closed`], never propagated further than the
    /// worker loop that catches it.
    pub fn wait_for_more_read_data(&self, position: u64) -> Result<()> {
        let mut s = self.state.lock().expect("delay line mutex poisoned");
        while !s.closed && position >= s.read_tail {
            s = self.condvar.wait(s).expect("delay line condvar poisoned");
        }
        if position >= s.read_tail {
            return Err(ConvolutionError::Closed);
        }
        Ok(())
    }

    /// Reads one published sample. Returns
    /// [`ConvolutionError::ReadUnderrun`] if `index` has already been
    /// overwritten by the writer lapping the ring buffer, or
    /// [`ConvolutionError::Closed`] if `index` was never published and
    /// the line has since closed.
    pub fn at(&self, index: u64) -> Result<f64> {
        let s = self.state.lock().expect("delay line mutex poisoned");
        if index >= s.read_tail {
            return Err(ConvolutionError::Closed);
        }
        let capacity = s.buffer.len() as u64;
        if index + capacity <= s.read_tail {
            return Err(ConvolutionError::ReadUnderrun);
        }
        Ok(s.buffer[(index & s.mask) as usize])
    }

    /// Copies `out.len()` consecutive samples starting at `start`,
    /// with ring-buffer wraparound, subject to the same underrun/closed
    /// rules as [`Self::at`].
    pub fn read_range(&self, start: u64, out: &mut [f64]) -> Result<()> {
        let s = self.state.lock().expect("delay line mutex poisoned");
        let end = start + out.len() as u64;
        if end > s.read_tail {
            return Err(ConvolutionError::Closed);
        }
        let capacity = s.buffer.len() as u64;
        for (i, slot) in out.iter_mut().enumerate() {
            let index = start + i as u64;
            if index + capacity <= s.read_tail {
                return Err(ConvolutionError::ReadUnderrun);
            }
            *slot = s.buffer[(index & s.mask) as usize];
        }
        Ok(())
    }

    /// Closes the line and wakes every blocked reader. The only
    /// cancellation path; there is no per-reader unsubscribe.
    pub fn close(&self) {
        let mut s = self.state.lock().expect("delay line mutex poisoned");
        s.closed = true;
        drop(s);
        self.condvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("delay line mutex poisoned").closed
    }
}

/// Spawns a worker thread at `priority_offset` below the caller's
/// current scheduling priority (best-effort, see [`crate::priority`]).
/// [`ConvolutionError::Closed`] from `body` is swallowed as a normal
/// shutdown; any other error aborts the process, mirroring the
/// reference implementation's `std::terminate()` on an unexpected
/// worker exception (spec §5).
pub fn spawn_worker<F>(name: impl Into<String>, priority_offset: i32, body: F) -> thread::JoinHandle<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let name = name.into();
    let thread_name = name.clone();
    thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            priority::lower_current_thread_priority(priority_offset);
            match body() {
                Ok(()) | Err(ConvolutionError::Closed) => {}
                Err(err) => {
                    log::error!("worker thread {name} terminated on unexpected error: {err}");
                    std::process::abort();
                }
            }
        })
        .expect("failed to spawn worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reader_blocks_until_published() {
        let line = Arc::new(SynchronizedDelayLine::new(16));
        let writer = line.clone();
        let handle = thread::spawn(move || {
            writer.wait_for_more_read_data(0).unwrap();
            writer.at(0).unwrap()
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        line.write(42.0);
        line.synch_write();

        assert_eq!(handle.join().unwrap(), 42.0);
    }

    #[test]
    fn close_wakes_blocked_reader_with_closed_error() {
        let line = Arc::new(SynchronizedDelayLine::new(16));
        let reader = line.clone();
        let handle = thread::spawn(move || reader.wait_for_more_read_data(5));

        std::thread::sleep(std::time::Duration::from_millis(20));
        line.close();

        assert!(matches!(handle.join().unwrap(), Err(ConvolutionError::Closed)));
    }

    #[test]
    fn lapped_sample_reports_underrun() {
        let line = SynchronizedDelayLine::new(4);
        for i in 0..10 {
            line.write(i as f64);
        }
        line.synch_write();
        assert!(matches!(line.at(0), Err(ConvolutionError::ReadUnderrun)));
        assert_eq!(line.at(9).unwrap(), 9.0);
    }
}
