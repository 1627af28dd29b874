/// Fixed-capacity FIFO byte buffer. Request bodies and pipe staging go
/// through here so a slow consumer bounds memory instead of growing it.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    start: usize,
    size: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            size: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.size
    }

    /// Appends as much of `data` as fits, returns the number of bytes
    /// written.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free());
        let cap = self.capacity();

        let write_pos = (self.start + self.size) % cap;
        let first = n.min(cap - write_pos);
        self.buf[write_pos..write_pos + first].copy_from_slice(&data[..first]);
        if first < n {
            self.buf[..n - first].copy_from_slice(&data[first..n]);
        }

        self.size += n;
        n
    }

    /// Copies up to `out.len()` bytes into `out` and consumes them.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = self.peek(out);
        self.advance(n);
        n
    }

    /// Copies without consuming.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.size);
        let cap = self.capacity();

        let first = n.min(cap - self.start);
        out[..first].copy_from_slice(&self.buf[self.start..self.start + first]);
        if first < n {
            out[first..n].copy_from_slice(&self.buf[..n - first]);
        }
        n
    }

    /// Discards up to `n` pending bytes, returns how many were dropped.
    pub fn advance(&mut self, n: usize) -> usize {
        let n = n.min(self.size);
        self.start = (self.start + n) % self.capacity();
        self.size -= n;
        n
    }

    /// Resets the indices. Only legal once the reader has consumed every
    /// pending byte.
    pub fn clear(&mut self) {
        debug_assert!(self.is_empty(), "clear() on a ring buffer with pending bytes");
        self.start = 0;
        self.size = 0;
    }
}
