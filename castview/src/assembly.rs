//! Fragment reassembly for one image transmission.
//!
//! Datagrams carry no sequence numbers, so there is nothing to reorder or
//! deduplicate: fragments are kept in the order the socket delivered them and
//! concatenated once the receiver decides the message has ended.
//!
//! # Memory Layout
//!
//! ```text
//! ReassemblyBuffer
//! └── fragments: Vec<Vec<u8>>   one owned copy per datagram, arrival order
//! └── total_len: usize          running sum of fragment lengths
//!
//! EncodedImage
//! └── bytes: Vec<u8>            single allocation of exactly total_len
//! ```

use crate::trace::trace;

/// Fragments collected for the image currently in flight.
///
/// Created fresh for every receive cycle and consumed by
/// [`finalize`](Self::finalize). Nothing carries over between cycles.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    fragments: Vec<Vec<u8>>,
    total_len: usize,
}

impl ReassemblyBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a copy of `chunk` after every fragment received so far.
    pub fn append(&mut self, chunk: &[u8]) {
        self.fragments.push(chunk.to_vec());
        self.total_len += chunk.len();

        trace!(
            fragment = self.fragments.len(),
            len = chunk.len(),
            total = self.total_len,
            "fragment appended"
        );
    }

    /// Total bytes appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.total_len
    }

    /// Returns `true` if no payload bytes have been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    /// Number of fragments appended so far, including empty ones.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Concatenates all fragments into one contiguous buffer.
    ///
    /// Allocates exactly once, sized to the tracked total, and copies each
    /// fragment at its running offset.
    #[must_use]
    pub fn finalize(self) -> EncodedImage {
        let mut bytes = vec![0u8; self.total_len];
        let mut offset = 0;

        for fragment in &self.fragments {
            bytes[offset..offset + fragment.len()].copy_from_slice(fragment);
            offset += fragment.len();
        }
        debug_assert_eq!(offset, self.total_len);

        EncodedImage { bytes }
    }
}

/// The reassembled, still-encoded image bytes of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
}

impl EncodedImage {
    /// Encoded length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the transmission carried no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take ownership of the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for EncodedImage {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl AsRef<[u8]> for EncodedImage {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
