//! Growable byte buffers for outgoing and incoming messages.
//!
//! All integers are little-endian. No alignment padding, no
//! self-describing schema: the pack and unpack callbacks on the two
//! ends of a message must agree on the layout, and a disagreement
//! surfaces as [`BufferError::Underflow`] on the reading side.

use crate::error::BufferError;

/// An append-only byte buffer an outgoing message is packed into.
///
/// Owned by the buffer system entry for its destination rank. Writing
/// grows storage amortized O(1) per byte and never truncates. Once the
/// contents are handed to the transport the bytes move out wholesale
/// ([`take_bytes`](Self::take_bytes)); the buffer itself stays behind,
/// empty, for the next cycle.
#[derive(Clone, Debug, Default)]
pub struct SendBuffer {
    data: Vec<u8>,
}

impl SendBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with pre-reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Discard the contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// The bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Move the contents out, leaving the buffer empty.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    /// Consume the buffer into its backing bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Append raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append a single byte.
    pub fn put_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    /// Append a little-endian u32.
    pub fn put_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian u64.
    pub fn put_u64(&mut self, v: u64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian i32.
    pub fn put_i32(&mut self, v: i32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian i64.
    pub fn put_i64(&mut self, v: i64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian f32.
    pub fn put_f32(&mut self, v: f32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian f64.
    pub fn put_f64(&mut self, v: f64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }
}

/// A received message with a read cursor.
///
/// Filled in wholesale when a receive completes; the unpack callback
/// then extracts typed values sequentially. The cursor never advances
/// past the received length — over-reads fail with
/// [`BufferError::Underflow`], never with silent truncation.
#[derive(Clone, Debug, Default)]
pub struct RecvBuffer {
    data: Vec<u8>,
    cursor: usize,
}

impl RecvBuffer {
    /// Create an empty buffer (zero received bytes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of received bytes, independent of the cursor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the message was empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes remaining behind the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Whether every received byte has been extracted.
    pub fn is_exhausted(&self) -> bool {
        self.cursor == self.data.len()
    }

    /// Reset the cursor to the start without touching the contents.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Extract the next `n` raw bytes and advance the cursor.
    pub fn get_bytes(&mut self, n: usize) -> Result<&[u8], BufferError> {
        if n > self.remaining() {
            return Err(BufferError::Underflow {
                requested: n,
                remaining: self.remaining(),
            });
        }
        let start = self.cursor;
        self.cursor += n;
        Ok(&self.data[start..self.cursor])
    }

    /// Advance the cursor by `n` bytes without returning them.
    pub fn skip(&mut self, n: usize) -> Result<(), BufferError> {
        self.get_bytes(n).map(|_| ())
    }

    /// Extract a single byte.
    pub fn get_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.get_bytes(1)?[0])
    }

    /// Extract a little-endian u32.
    pub fn get_u32(&mut self) -> Result<u32, BufferError> {
        let bytes = self.get_bytes(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    /// Extract a little-endian u64.
    pub fn get_u64(&mut self) -> Result<u64, BufferError> {
        let bytes = self.get_bytes(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    /// Extract a little-endian i32.
    pub fn get_i32(&mut self) -> Result<i32, BufferError> {
        let bytes = self.get_bytes(4)?;
        Ok(i32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    /// Extract a little-endian i64.
    pub fn get_i64(&mut self) -> Result<i64, BufferError> {
        let bytes = self.get_bytes(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    /// Extract a little-endian f32.
    pub fn get_f32(&mut self) -> Result<f32, BufferError> {
        let bytes = self.get_bytes(4)?;
        Ok(f32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    /// Extract a little-endian f64.
    pub fn get_f64(&mut self) -> Result<f64, BufferError> {
        let bytes = self.get_bytes(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }
}

impl From<Vec<u8>> for RecvBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data, cursor: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn put_then_get_typed_values() {
        let mut send = SendBuffer::new();
        send.put_u8(0xAB);
        send.put_u32(1234);
        send.put_i64(-99);
        send.put_f64(2.5);
        assert_eq!(send.len(), 1 + 4 + 8 + 8);

        let mut recv = RecvBuffer::from(send.into_vec());
        assert_eq!(recv.get_u8().unwrap(), 0xAB);
        assert_eq!(recv.get_u32().unwrap(), 1234);
        assert_eq!(recv.get_i64().unwrap(), -99);
        assert_eq!(recv.get_f64().unwrap(), 2.5);
        assert!(recv.is_exhausted());
    }

    #[test]
    fn get_past_end_is_underflow() {
        let mut recv = RecvBuffer::from(vec![1u8, 2, 3]);
        assert_eq!(recv.get_bytes(2).unwrap(), &[1, 2]);
        match recv.get_u32() {
            Err(BufferError::Underflow {
                requested: 4,
                remaining: 1,
            }) => {}
            other => panic!("expected Underflow, got {other:?}"),
        }
        // Cursor is unchanged after a failed read.
        assert_eq!(recv.get_u8().unwrap(), 3);
    }

    #[test]
    fn empty_message_reads_nothing() {
        let mut recv = RecvBuffer::new();
        assert!(recv.is_empty());
        assert!(recv.is_exhausted());
        assert_eq!(recv.get_bytes(0).unwrap(), &[] as &[u8]);
        assert!(recv.get_u8().is_err());
    }

    #[test]
    fn take_bytes_leaves_buffer_empty() {
        let mut send = SendBuffer::new();
        send.put_u32(7);
        let bytes = send.take_bytes();
        assert_eq!(bytes.len(), 4);
        assert!(send.is_empty());
    }

    #[test]
    fn rewind_allows_rereading() {
        let mut recv = RecvBuffer::from(vec![9u8]);
        assert_eq!(recv.get_u8().unwrap(), 9);
        recv.rewind();
        assert_eq!(recv.get_u8().unwrap(), 9);
    }

    proptest! {
        /// Round-trip law: any mix of values packed by a sender is read
        /// back bit-identically by the receiver.
        #[test]
        fn roundtrip_mixed(
            a in any::<u32>(),
            b in any::<i64>(),
            c in any::<f64>(),
            raw in prop::collection::vec(any::<u8>(), 0..256),
        ) {
            let mut send = SendBuffer::new();
            send.put_u32(a);
            send.put_i64(b);
            send.put_f64(c);
            send.put_u64(raw.len() as u64);
            send.put_bytes(&raw);

            let mut recv = RecvBuffer::from(send.into_vec());
            prop_assert_eq!(recv.get_u32().unwrap(), a);
            prop_assert_eq!(recv.get_i64().unwrap(), b);
            prop_assert_eq!(recv.get_f64().unwrap().to_bits(), c.to_bits());
            let n = recv.get_u64().unwrap() as usize;
            prop_assert_eq!(recv.get_bytes(n).unwrap(), raw.as_slice());
            prop_assert!(recv.is_exhausted());
        }
    }
}
