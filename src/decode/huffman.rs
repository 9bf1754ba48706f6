//! Canonical Huffman trees for JPEG entropy decoding.
//!
//! A DHT segment only carries how many codes exist at each bit length plus
//! the symbols in code order. The tree is built bottom-up from that
//! histogram: starting at the longest length, the leaves of a level are
//! followed by the subtrees carried up from the level below, and
//! neighbouring items are paired into parents. Leaves placed first get the
//! numerically smaller codes, which is exactly the canonical assignment.

use crate::bits::BitCursor;
use crate::error::{Error, Result};

/// Longest JPEG Huffman code.
pub const MAX_CODE_LENGTH: usize = 16;

/// Most symbols a single table may define.
const MAX_SYMBOLS: usize = 256;

/// Table class from the DHT `Tc` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableClass {
    Dc,
    Ac,
}

impl TryFrom<u8> for TableClass {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(TableClass::Dc),
            1 => Ok(TableClass::Ac),
            _ => Err(Error::InvalidDecode(format!(
                "invalid Huffman table class {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Leaf(u8),
    Internal([Option<usize>; 2]),
}

/// Binary decoding tree for one (class, destination) table.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    nodes: Vec<Node>,
    root: [Option<usize>; 2],
}

impl HuffmanTree {
    /// Build a tree from the DHT length histogram and symbol list.
    ///
    /// `lengths[i]` is the number of codes that are `i + 1` bits long; the
    /// symbols are listed shortest code first.
    pub fn build(lengths: &[u8; MAX_CODE_LENGTH], symbols: &[u8]) -> Result<Self> {
        let total: usize = lengths.iter().map(|&n| n as usize).sum();
        if total != symbols.len() {
            return Err(Error::InvalidDecode(format!(
                "Huffman table declares {total} codes but lists {} symbols",
                symbols.len()
            )));
        }
        if total == 0 || total > MAX_SYMBOLS {
            return Err(Error::InvalidDecode(format!(
                "invalid Huffman symbol count {total}"
            )));
        }

        // Reject histograms with more codes at a length than the tree can hold.
        let mut available = 1u64;
        for (i, &count) in lengths.iter().enumerate() {
            available *= 2;
            if count as u64 > available {
                return Err(Error::InvalidDecode(format!(
                    "Huffman table oversubscribes {}-bit codes",
                    i + 1
                )));
            }
            available -= count as u64;
        }

        let mut starts = [0usize; MAX_CODE_LENGTH + 1];
        for i in 0..MAX_CODE_LENGTH {
            starts[i + 1] = starts[i] + lengths[i] as usize;
        }

        let mut nodes = Vec::with_capacity(total * 2);
        let mut carried: Vec<usize> = Vec::new();

        for len in (1..=MAX_CODE_LENGTH).rev() {
            let mut level = Vec::with_capacity(lengths[len - 1] as usize + carried.len());
            for &symbol in &symbols[starts[len - 1]..starts[len]] {
                nodes.push(Node::Leaf(symbol));
                level.push(nodes.len() - 1);
            }
            level.append(&mut carried);

            if len == 1 {
                carried = level;
                break;
            }

            // An odd item out keeps its depth by hanging off a parent
            // with no right child.
            for pair in level.chunks(2) {
                nodes.push(Node::Internal([Some(pair[0]), pair.get(1).copied()]));
                carried.push(nodes.len() - 1);
            }
        }

        if carried.is_empty() || carried.len() > 2 {
            return Err(Error::InvalidDecode(
                "Huffman table does not form a tree".into(),
            ));
        }

        Ok(Self {
            nodes,
            root: [carried.first().copied(), carried.get(1).copied()],
        })
    }

    /// Decode one symbol by walking the tree a bit at a time.
    pub fn decode(&self, cursor: &mut BitCursor<'_>) -> Result<u8> {
        let mut children = self.root;
        for _ in 0..MAX_CODE_LENGTH {
            let bit = cursor.read_bit()?;
            let index = children[bit as usize]
                .ok_or_else(|| Error::InvalidDecode("invalid Huffman code".into()))?;
            match self.nodes[index] {
                Node::Leaf(symbol) => return Ok(symbol),
                Node::Internal(next) => children = next,
            }
        }
        Err(Error::InvalidDecode("Huffman code longer than 16 bits".into()))
    }

    /// Every `(symbol, code, length)` in the tree, ordered by code.
    pub fn codes(&self) -> Vec<(u8, u16, u8)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, u16, u8)> = Vec::new();
        for bit in (0..2).rev() {
            if let Some(index) = self.root[bit] {
                stack.push((index, bit as u16, 1));
            }
        }
        while let Some((index, code, len)) = stack.pop() {
            match self.nodes[index] {
                Node::Leaf(symbol) => out.push((symbol, code, len)),
                Node::Internal(children) => {
                    for bit in (0..2).rev() {
                        if let Some(child) = children[bit] {
                            stack.push((child, (code << 1) | bit as u16, len + 1));
                        }
                    }
                }
            }
        }
        out
    }
}
