//! Output side shared by the software encoders: a blocking queue that
//! reports the format first, then samples, then end-of-stream once.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use screen_record_core::models::media::{EncodedSample, MediaFormat};
use screen_record_core::traits::encoder::EncoderOutput;

#[derive(Debug, Default)]
struct QueueState {
    format: Option<MediaFormat>,
    format_reported: bool,
    samples: VecDeque<EncodedSample>,
    end_of_input: bool,
    end_reported: bool,
}

impl QueueState {
    fn next(&mut self) -> Option<EncoderOutput> {
        if !self.format_reported {
            let format = self.format.clone()?;
            self.format_reported = true;
            return Some(EncoderOutput::FormatChanged(format));
        }
        if let Some(sample) = self.samples.pop_front() {
            return Some(EncoderOutput::Sample(sample));
        }
        if self.end_of_input && !self.end_reported {
            self.end_reported = true;
            return Some(EncoderOutput::EndOfStream);
        }
        None
    }
}

#[derive(Debug, Default)]
pub(crate) struct OutputQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl OutputQueue {
    /// Clear everything and arm the queue to report `format` first.
    pub fn reset(&self, format: MediaFormat) {
        *self.state.lock() = QueueState {
            format: Some(format),
            ..Default::default()
        };
    }

    pub fn push(&self, sample: EncodedSample) {
        self.state.lock().samples.push_back(sample);
        self.cond.notify_all();
    }

    pub fn end_input(&self) {
        self.state.lock().end_of_input = true;
        self.cond.notify_all();
    }

    pub fn is_input_ended(&self) -> bool {
        self.state.lock().end_of_input
    }

    pub fn pending(&self) -> usize {
        self.state.lock().samples.len()
    }

    /// Wait up to `timeout` for the next output.
    pub fn dequeue(&self, timeout: Duration) -> EncoderOutput {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(output) = state.next() {
                return output;
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return state.next().unwrap_or(EncoderOutput::TryAgainLater);
            }
        }
    }

    pub fn clear(&self) {
        self.state.lock().samples.clear();
        self.cond.notify_all();
    }
}
