/// Fixed-capacity circular buffer staging interleaved PCM samples between
/// an audio input callback and the audio encoder thread.
///
/// Wrap in `Arc<parking_lot::Mutex<_>>` for cross-thread access.
/// Overflow drops the oldest samples.
#[derive(Debug)]
pub struct RingBuffer<T: Copy + Default = f32> {
    buffer: Vec<T>,
    write_index: usize,
    read_index: usize,
    available: usize,
    dropped: u64,
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![T::default(); capacity.max(1)],
            write_index: 0,
            read_index: 0,
            available: 0,
            dropped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Append samples, dropping the oldest ones on overflow.
    pub fn write(&mut self, samples: &[T]) {
        let capacity = self.capacity();
        let samples = if samples.len() > capacity {
            self.dropped += (samples.len() - capacity) as u64;
            &samples[samples.len() - capacity..]
        } else {
            samples
        };

        let overflow = (self.available + samples.len()).saturating_sub(capacity);
        if overflow > 0 {
            self.read_index = (self.read_index + overflow) % capacity;
            self.available -= overflow;
            self.dropped += overflow as u64;
        }

        for &sample in samples {
            self.buffer[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % capacity;
        }
        self.available += samples.len();
    }

    /// Remove up to `count` samples, appending them to `out`. Returns how many were read.
    pub fn read_into(&mut self, count: usize, out: &mut Vec<T>) -> usize {
        let capacity = self.capacity();
        let to_read = count.min(self.available);
        out.reserve(to_read);
        for i in 0..to_read {
            out.push(self.buffer[(self.read_index + i) % capacity]);
        }
        self.read_index = (self.read_index + to_read) % capacity;
        self.available -= to_read;
        to_read
    }

    pub fn read(&mut self, count: usize) -> Vec<T> {
        let mut out = Vec::new();
        self.read_into(count, &mut out);
        out
    }

    /// Throw away everything buffered. Returns the number of samples discarded.
    pub fn discard_all(&mut self) -> usize {
        let discarded = self.available;
        self.read_index = self.write_index;
        self.available = 0;
        discarded
    }

    pub fn count(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Samples lost to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
