//! Capacity-bounded line reassembly buffer.

/// Accumulates bytes of one connection and yields complete `\n`-terminated lines.
///
/// Never grows past its capacity; a full buffer without a terminator is a
/// protocol violation the caller must handle.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl LineBuffer {
    /// Creates an empty buffer holding at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of buffered, not yet consumed bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    /// Free space left before the buffer is full.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Appends as much of `data` as fits and returns the number of bytes taken.
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.remaining());
        self.buf.extend_from_slice(&data[..take]);
        take
    }

    /// Removes and returns the next complete line, without `\n` or a trailing `\r`.
    ///
    /// Invalid UTF-8 is replaced, so such lines never match a command.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line = &self.buf[..pos];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        let text = String::from_utf8_lossy(line).into_owned();
        self.buf.drain(..=pos);
        Some(text)
    }
}
