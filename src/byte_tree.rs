//! The byte-tree wire format.
//!
//! Every file this crate writes to disk, and every bulletin-board payload it
//! exchanges between parties, is the binary image of a [`ByteTree`]: a
//! recursive LEAF/NODE structure with no external schema. A `LEAF` carries an
//! opaque byte string; a `NODE` carries an ordered list of children. Decoding
//! is always bounded: callers supply a maximum recursion depth and a maximum
//! cumulative byte budget, so an adversarial or corrupted blob can never
//! force unbounded allocation or stack depth.
//!
//! Tag byte `0x00` marks a `LEAF`, `0x01` marks a `NODE`. The tag is followed
//! by a big-endian `u32` length: a byte count for `LEAF`, a child count for
//! `NODE`.

use std::convert::TryFrom;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::file_atomics;

const TAG_LEAF: u8 = 0x00;
const TAG_NODE: u8 = 0x01;

/// The recursive LEAF/NODE structure underlying every on-disk and on-wire
/// value in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteTree {
    Leaf(Vec<u8>),
    Node(Vec<ByteTree>),
}

/// Why a decode attempt failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    /// NODE nesting exceeded the caller's `max_depth`.
    #[error("byte-tree nesting exceeded the maximum depth of {max_depth}")]
    DepthExceeded { max_depth: usize },

    /// Cumulative decoded bytes would exceed the caller's `max_bytes`.
    #[error("byte-tree size exceeded the maximum of {max_bytes} bytes")]
    SizeExceeded { max_bytes: u64 },

    /// The buffer ended before a complete structure was read.
    #[error("byte-tree input was truncated")]
    Truncated,

    /// The tag byte was neither `0x00` (LEAF) nor `0x01` (NODE).
    #[error("byte-tree had an invalid tag byte {0:#04x}")]
    BadTag(u8),

    /// A length field was unusable (e.g. a leaf length that does not fit `usize`).
    #[error("byte-tree had an invalid length field")]
    BadLength,

    /// A decoded tree did not have the exact shape the caller requested
    /// (e.g. `as_i32` called on a `NODE`).
    #[error("byte-tree did not have the expected shape: {0}")]
    ShapeMismatch(String),
}

impl ByteTree {
    /// Builds a LEAF wrapping a big-endian `i32`.
    pub fn from_i32(value: i32) -> Self {
        ByteTree::Leaf(value.to_be_bytes().to_vec())
    }

    /// Builds a LEAF whose bytes are `0x00`/`0x01` for each entry.
    pub fn from_bool_array(values: &[bool]) -> Self {
        ByteTree::Leaf(values.iter().map(|&b| if b { 1 } else { 0 }).collect())
    }

    /// Builds a LEAF of UTF-8 bytes.
    pub fn from_string(value: &str) -> Self {
        ByteTree::Leaf(value.as_bytes().to_vec())
    }

    /// Decodes this tree as a big-endian `i32` LEAF.
    pub fn as_i32(&self) -> Result<i32, DecodeError> {
        match self {
            ByteTree::Leaf(bytes) if bytes.len() == 4 => {
                let array: [u8; 4] = bytes.as_slice().try_into().expect("length checked above");
                Ok(i32::from_be_bytes(array))
            }
            ByteTree::Leaf(bytes) => Err(DecodeError::ShapeMismatch(format!(
                "expected a 4-byte leaf for i32, got {} bytes",
                bytes.len()
            ))),
            ByteTree::Node(_) => Err(DecodeError::ShapeMismatch("expected a leaf, got a node".into())),
        }
    }

    /// Decodes this tree as a boolean-array LEAF.
    pub fn as_bool_array(&self) -> Result<Vec<bool>, DecodeError> {
        match self {
            ByteTree::Leaf(bytes) => bytes
                .iter()
                .map(|&b| match b {
                    0 => Ok(false),
                    1 => Ok(true),
                    other => Err(DecodeError::ShapeMismatch(format!(
                        "boolean leaf byte must be 0x00 or 0x01, got {other:#04x}"
                    ))),
                })
                .collect(),
            ByteTree::Node(_) => Err(DecodeError::ShapeMismatch("expected a leaf, got a node".into())),
        }
    }

    /// Decodes this tree as a UTF-8 string LEAF.
    pub fn as_string(&self) -> Result<String, DecodeError> {
        match self {
            ByteTree::Leaf(bytes) => String::from_utf8(bytes.clone())
                .map_err(|e| DecodeError::ShapeMismatch(format!("leaf was not valid UTF-8: {e}"))),
            ByteTree::Node(_) => Err(DecodeError::ShapeMismatch("expected a leaf, got a node".into())),
        }
    }

    /// Encodes this tree to its canonical byte image.
    ///
    /// The same tree always produces the same bytes; this is what lets peers
    /// compare a fetched payload against a re-derivation of the expected
    /// value without decoding it first.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            ByteTree::Leaf(bytes) => {
                out.push(TAG_LEAF);
                out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(bytes);
            }
            ByteTree::Node(children) => {
                out.push(TAG_NODE);
                out.extend_from_slice(&(children.len() as u32).to_be_bytes());
                for child in children {
                    child.encode_into(out);
                }
            }
        }
    }

    /// Atomically writes the encoded tree to `path` (tmp-file-then-rename).
    pub fn write(&self, path: &Path) -> Result<(), crate::error::CoreError> {
        let bytes = self.encode();
        file_atomics::write_atomic(path, &bytes)
    }

    /// Reads and decodes a byte-tree from `path`.
    pub fn read(path: &Path, max_depth: usize, max_bytes: u64) -> Result<Self, crate::error::CoreError> {
        let bytes = fs::read(path).map_err(|e| {
            crate::error::CoreError::resource(format!("reading byte-tree file {}", path.display()), e)
        })?;
        Ok(decode(&bytes, max_depth, max_bytes)?)
    }
}

impl fmt::Display for ByteTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteTree::Leaf(bytes) => write!(f, "Leaf({} bytes)", bytes.len()),
            ByteTree::Node(children) => write!(f, "Node({} children)", children.len()),
        }
    }
}

/// Encodes `tree` to its canonical byte image. Equivalent to `tree.encode()`.
pub fn encode(tree: &ByteTree) -> Vec<u8> {
    tree.encode()
}

/// Decodes a byte-tree from `bytes`, bounding both recursion depth and
/// cumulative allocated bytes.
///
/// `max_depth` bounds `NODE` nesting (a top-level `LEAF` or `NODE` is depth
/// 1). `max_bytes` bounds the sum of all leaf payload lengths decoded so
/// far, preventing a maliciously crafted small input from claiming an
/// enormous leaf length and triggering a huge allocation.
pub fn decode(bytes: &[u8], max_depth: usize, max_bytes: u64) -> Result<ByteTree, DecodeError> {
    let mut reader = Reader::new(bytes, max_bytes);
    let tree = reader.read_tree(1, max_depth)?;
    Ok(tree)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    budget_used: u64,
    max_bytes: u64,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], max_bytes: u64) -> Self {
        Self {
            bytes,
            pos: 0,
            budget_used: 0,
            max_bytes,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::BadLength)?;
        if end > self.bytes.len() {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn charge(&mut self, n: u64) -> Result<(), DecodeError> {
        self.budget_used = self.budget_used.checked_add(n).ok_or(DecodeError::SizeExceeded {
            max_bytes: self.max_bytes,
        })?;
        if self.budget_used > self.max_bytes {
            return Err(DecodeError::SizeExceeded {
                max_bytes: self.max_bytes,
            });
        }
        Ok(())
    }

    fn read_tree(&mut self, depth: usize, max_depth: usize) -> Result<ByteTree, DecodeError> {
        if depth > max_depth {
            return Err(DecodeError::DepthExceeded { max_depth });
        }

        let tag = self.take(1)?[0];
        let length_bytes = self.take(4)?;
        let length = u32::from_be_bytes(length_bytes.try_into().expect("exactly 4 bytes"));

        match tag {
            TAG_LEAF => {
                let length = usize::try_from(length).map_err(|_| DecodeError::BadLength)?;
                self.charge(length as u64)?;
                let payload = self.take(length)?;
                Ok(ByteTree::Leaf(payload.to_vec()))
            }
            TAG_NODE => {
                let count = usize::try_from(length).map_err(|_| DecodeError::BadLength)?;
                let mut children = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    children.push(self.read_tree(depth + 1, max_depth)?);
                }
                Ok(ByteTree::Node(children))
            }
            other => Err(DecodeError::BadTag(other)),
        }
    }
}
