use bytes::{Bytes, BytesMut};

/// Accumulates bytes received from the transport and hands them to the
/// parser incrementally.
///
/// Consumption is monotonic from the front. Every read is all-or-nothing:
/// when fewer bytes are buffered than requested the call returns `None` and
/// the buffer is untouched, so the same read can be retried after more data
/// arrives. A speculative take can be undone with
/// [`restore`](ByteBuffer::restore), which prepends the bytes so the next
/// take sees them again in their original order.
///
/// # Example
///
/// ```
/// use seqis::proto::buffer::ByteBuffer;
///
/// let mut buf = ByteBuffer::new();
/// buf.store(b"+OK\r\n");
/// assert_eq!(buf.take(1).unwrap().as_ref(), b"+");
/// assert_eq!(buf.take_until_crlf().unwrap().as_ref(), b"OK");
/// assert!(buf.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct ByteBuffer {
    buf: BytesMut,
}

impl ByteBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Appends bytes received from the transport.
    pub fn store(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered, not-yet-consumed bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Removes and returns the first `n` bytes, or `None` (without side
    /// effects) if fewer than `n` bytes are buffered.
    pub fn take(&mut self, n: usize) -> Option<Bytes> {
        if self.buf.len() < n {
            return None;
        }
        let data = self.buf.split_to(n).freeze();
        if self.buf.is_empty() {
            // drained: drop the split-off handle so the allocation is released
            self.buf = BytesMut::new();
        }
        Some(data)
    }

    /// Removes and returns all bytes before the next CRLF, discarding the
    /// CRLF itself. Returns `None` if no complete CRLF has arrived yet.
    ///
    /// A lone CR not followed by LF does not terminate the scan; it stays
    /// part of the returned bytes once a real CRLF shows up.
    pub fn take_until_crlf(&mut self) -> Option<Bytes> {
        let end = self.find_crlf()?;
        let data = self.take(end);
        let _ = self.take(2);
        data
    }

    /// Prepends bytes previously returned by a take, undoing it. Restored
    /// bytes must go back in their original relative order, before anything
    /// consumed after them is restored.
    pub fn restore(&mut self, data: Bytes) {
        if self.buf.is_empty() {
            self.buf = BytesMut::from(&data[..]);
            return;
        }
        let mut combined = BytesMut::with_capacity(data.len() + self.buf.len());
        combined.extend_from_slice(&data);
        combined.extend_from_slice(&self.buf);
        self.buf = combined;
    }

    /// Discards everything buffered.
    pub fn clear(&mut self) {
        self.buf = BytesMut::new();
    }

    fn find_crlf(&self) -> Option<usize> {
        if self.buf.len() < 2 {
            return None;
        }
        for i in 1..self.buf.len() {
            if self.buf[i - 1] == b'\r' && self.buf[i] == b'\n' {
                return Some(i - 1);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_exact() {
        let mut buf = ByteBuffer::new();
        buf.store(b"hello world");
        assert_eq!(buf.take(5).unwrap().as_ref(), b"hello");
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_take_insufficient_is_side_effect_free() {
        let mut buf = ByteBuffer::new();
        buf.store(b"abc");
        assert!(buf.take(4).is_none());
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.take(3).unwrap().as_ref(), b"abc");
    }

    #[test]
    fn test_take_until_crlf() {
        let mut buf = ByteBuffer::new();
        buf.store(b"12345\r\nrest");
        assert_eq!(buf.take_until_crlf().unwrap().as_ref(), b"12345");
        assert_eq!(buf.take(4).unwrap().as_ref(), b"rest");
    }

    #[test]
    fn test_take_until_crlf_empty_line() {
        let mut buf = ByteBuffer::new();
        buf.store(b"\r\n");
        assert_eq!(buf.take_until_crlf().unwrap().as_ref(), b"");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_take_until_crlf_waits_for_lf() {
        let mut buf = ByteBuffer::new();
        buf.store(b"OK\r");
        assert!(buf.take_until_crlf().is_none());
        buf.store(b"\r\n");
        // the lone CR is content, not a terminator
        assert_eq!(buf.take_until_crlf().unwrap().as_ref(), b"OK\r");
    }

    #[test]
    fn test_lone_cr_mid_line_is_content() {
        let mut buf = ByteBuffer::new();
        buf.store(b"a\rb\r\n");
        assert_eq!(buf.take_until_crlf().unwrap().as_ref(), b"a\rb");
    }

    #[test]
    fn test_restore_is_inverse_of_take() {
        let mut buf = ByteBuffer::new();
        buf.store(b"abcdef");
        let taken = buf.take(3).unwrap();
        buf.restore(taken.clone());
        assert_eq!(buf.take(3).unwrap(), taken);
        assert_eq!(buf.take(3).unwrap().as_ref(), b"def");
    }

    #[test]
    fn test_restore_into_empty_buffer() {
        let mut buf = ByteBuffer::new();
        buf.store(b"xyz");
        let taken = buf.take(3).unwrap();
        assert!(buf.is_empty());
        buf.restore(taken);
        assert_eq!(buf.take(3).unwrap().as_ref(), b"xyz");
    }

    #[test]
    fn test_chunked_store_equals_whole_store() {
        let payload = b"$5\r\nhello\r\n:42\r\n";
        for split in 0..payload.len() {
            let mut chunked = ByteBuffer::new();
            chunked.store(&payload[..split]);
            chunked.store(&payload[split..]);

            let mut whole = ByteBuffer::new();
            whole.store(payload);

            assert_eq!(chunked.take_until_crlf(), whole.take_until_crlf());
            assert_eq!(chunked.take(5), whole.take(5));
            assert_eq!(chunked.take_until_crlf(), whole.take_until_crlf());
            assert_eq!(chunked.take_until_crlf(), whole.take_until_crlf());
        }
    }

    #[test]
    fn test_clear() {
        let mut buf = ByteBuffer::new();
        buf.store(b"leftover");
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.take(1).is_none());
    }
}
