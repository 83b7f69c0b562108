//! Circular store of the most recently played output samples.

/// Fixed-capacity ring of signed 16-bit samples written by the playback
/// worker and read by the spectrum analyzer.
///
/// All engine access goes through one mutex held for the full buffer
/// traversal on each side; the type itself is single-threaded.
pub struct OutputRingBuffer {
    samples: Vec<i16>,
    write_pos: usize,
    filled: bool,
}

impl OutputRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity],
            write_pos: 0,
            filled: false,
        }
    }

    /// Append new samples, advancing the write cursor and wrapping.
    pub fn write(&mut self, data: &[i16]) {
        for &sample in data {
            self.samples[self.write_pos] = sample;
            self.write_pos += 1;
            if self.write_pos == self.samples.len() {
                self.write_pos = 0;
                self.filled = true;
            }
        }
    }

    /// True once the write cursor has wrapped at least once.
    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// The `count` most recently written samples in chronological order,
    /// oldest first. `count` is capped at the buffer capacity.
    pub fn read_last_window(&self, count: usize) -> Vec<i16> {
        let capacity = self.samples.len();
        let count = count.min(capacity);
        let start = (self.write_pos + capacity - count) % capacity;

        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            out.push(self.samples[(start + i) % capacity]);
        }
        out
    }

    pub fn reset(&mut self) {
        self.samples.fill(0);
        self.write_pos = 0;
        self.filled = false;
    }
}
