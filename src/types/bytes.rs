//! Reference-counted byte buffer with copy-on-write semantics.

use crate::types::encoding::{read_bytes, Decode, DecodeError, Encode, EncodeSink};
use std::ops::Deref;
use std::sync::Arc;

/// A reference-counted, immutable byte buffer.
///
/// Wraps `Arc<Vec<u8>>` to provide cheap cloning and shared ownership.
/// Transaction payloads and contract code are shared between the pool, the
/// chain store and the executor, so copies must be free.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct Bytes(Arc<Vec<u8>>);

impl Bytes {
    /// Creates a new buffer from any type convertible to `Vec<u8>`.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(data.into()))
    }

    /// Creates a new buffer from an existing `Vec<u8>`.
    pub fn from_vec(v: Vec<u8>) -> Self {
        Self(Arc::new(v))
    }

    /// Creates an empty buffer with the specified capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self(Arc::new(Vec::with_capacity(cap)))
    }

    /// Returns the number of bytes in the buffer.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the buffer contents as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Copies the buffer contents into a new `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Returns a mutable reference to the underlying vector.
    ///
    /// Clones the data if other references exist (copy-on-write).
    pub fn make_mut(&mut self) -> &mut Vec<u8> {
        Arc::make_mut(&mut self.0)
    }

    /// Appends bytes to the buffer, cloning if necessary.
    pub fn extend_from_slice(&mut self, s: &[u8]) {
        self.make_mut().extend_from_slice(s);
    }
}

impl Clone for Bytes {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Deref for Bytes {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Encode for Bytes {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        out.write(self.as_slice());
    }
}

impl Decode for Bytes {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = usize::decode(input)?;
        let bytes = read_bytes(input, len)?;
        Ok(Bytes::from_vec(bytes.to_vec()))
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(s: &[u8]) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Bytes {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Bytes {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> From<[u8; N]> for Bytes {
    fn from(arr: [u8; N]) -> Self {
        Self::new(arr)
    }
}

impl<const N: usize> From<&[u8; N]> for Bytes {
    fn from(arr: &[u8; N]) -> Self {
        Self::new(arr.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};

    #[test]
    fn clone_shares_storage() {
        let a = Bytes::new(b"shared".as_slice());
        let b = a.clone();
        assert_eq!(a.as_slice(), b.as_slice());
        assert!(std::ptr::eq(a.as_slice(), b.as_slice()));
    }

    #[test]
    fn make_mut_copies_on_write() {
        let a = Bytes::new(b"abc".as_slice());
        let mut b = a.clone();
        b.make_mut().push(b'd');

        assert_eq!(a.as_slice(), b"abc");
        assert_eq!(b.as_slice(), b"abcd");
    }

    #[test]
    fn encode_decode_roundtrip() {
        let original = Bytes::new(vec![0u8, 1, 2, 253, 254, 255]);
        let encoded = original.to_bytes();
        let decoded = Bytes::from_bytes(encoded.as_slice()).expect("decode failed");
        assert_eq!(original, decoded);
    }

    #[test]
    fn encode_uses_length_prefix() {
        let b = Bytes::new(vec![9u8, 8, 7]);
        let encoded = b.to_bytes();
        assert_eq!(&encoded[0..4], &3u32.to_be_bytes());
        assert_eq!(&encoded[4..], &[9, 8, 7]);
    }

    #[test]
    fn decode_truncated_fails() {
        let b = Bytes::new(vec![1u8; 16]);
        let encoded = b.to_bytes();
        assert!(Bytes::from_bytes(&encoded[..8]).is_err());
    }

    #[test]
    fn empty_roundtrip() {
        let empty = Bytes::default();
        let decoded = Bytes::from_bytes(empty.to_bytes().as_slice()).unwrap();
        assert!(decoded.is_empty());
    }
}
