// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Fixed-capacity circular byte buffer holding the tail of a session's output.
///
/// When the buffer wraps, older data is silently discarded; `tail()` always
/// returns the most recent bytes as lossy UTF-8, trimmed to a character
/// boundary so a wrap never yields a broken code point at the front.
#[derive(Debug)]
pub struct OutputRing {
    buf: Vec<u8>,
    capacity: usize,
    write_pos: usize,
    total_written: u64,
}

impl OutputRing {
    pub fn new(capacity: usize) -> Self {
        Self { buf: vec![0u8; capacity], capacity, write_pos: 0, total_written: 0 }
    }

    /// Append data, overwriting the oldest bytes when full.
    pub fn push(&mut self, data: &[u8]) {
        for chunk in data.chunks(self.capacity) {
            let start = self.write_pos;
            let end = start + chunk.len();

            if end <= self.capacity {
                self.buf[start..end].copy_from_slice(chunk);
            } else {
                let first = self.capacity - start;
                self.buf[start..self.capacity].copy_from_slice(&chunk[..first]);
                self.buf[..chunk.len() - first].copy_from_slice(&chunk[first..]);
            }

            self.write_pos = end % self.capacity;
            self.total_written += chunk.len() as u64;
        }
    }

    /// Current retained length in bytes.
    pub fn len(&self) -> usize {
        self.total_written.min(self.capacity as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total_written == 0
    }

    /// Total bytes ever pushed through this ring.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// The retained tail as text.
    ///
    /// A wrap can land mid code point; leading continuation bytes are skipped
    /// before decoding so the result starts on a character boundary.
    pub fn tail(&self) -> String {
        let available = self.len();
        if available == 0 {
            return String::new();
        }

        let start = if self.write_pos >= available {
            self.write_pos - available
        } else {
            self.capacity - (available - self.write_pos)
        };

        let mut bytes = Vec::with_capacity(available);
        if start + available <= self.capacity {
            bytes.extend_from_slice(&self.buf[start..start + available]);
        } else {
            bytes.extend_from_slice(&self.buf[start..self.capacity]);
            bytes.extend_from_slice(&self.buf[..available - (self.capacity - start)]);
        }

        let skip = bytes.iter().take_while(|b| (**b & 0xC0) == 0x80).count();
        String::from_utf8_lossy(&bytes[skip..]).into_owned()
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
