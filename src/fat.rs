//! The FAT allocator: an in-memory array of singly-linked chains of data
//! block indices.
//!
//! Allocation scans ascending from the first data block for a free slot,
//! marks it used, and links it onto the end of the caller's chain.

use crate::error::{FsError, FsResult};
use crate::wire::{ByteDe, ByteSer};

pub const FREE: u16 = 0x0000;
pub const END_OF_CHAIN: u16 = 0xFFFF;

/// Sentinel for "this file has no blocks yet" when stored as a directory
/// entry's `data_start`.
pub const EMPTY_CHAIN: u16 = END_OF_CHAIN;

/// Where a logical byte offset inside a chain lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLocation {
    /// The offset falls inside `block`, at `offset_in_block`.
    At {
        block: u16,
        offset_in_block: usize,
    },
    /// The offset is past the end of the chain.
    BeyondEnd,
}

/// The in-memory File Allocation Table.
#[derive(Debug, Clone)]
pub struct Fat {
    entries: Vec<u16>,
}

impl Fat {
    /// Builds a fresh FAT for `data_block_count` data blocks: every slot
    /// free except slot 0, which is always the whole-FAT terminator.
    pub fn fresh(data_block_count: u16) -> Self {
        let mut entries = vec![FREE; data_block_count as usize];
        if !entries.is_empty() {
            entries[0] = END_OF_CHAIN;
        }
        Self { entries }
    }

    /// Decodes `fat_block_count` 4096-byte blocks (2048 `u16` entries each)
    /// into a FAT.
    ///
    /// `data_block_count` truncates the decoded entries: each block holds
    /// 2048 entries regardless of how many are meaningful, and the tail of
    /// the last block is padding, not addressable FAT slots.
    pub fn decode(blocks: &[[u8; crate::block::BLOCK_SIZE]], data_block_count: u16) -> Self {
        let mut entries = Vec::with_capacity(blocks.len() * 2048);
        for block in blocks {
            for chunk in block.chunks_exact(2) {
                entries.push(u16::decode(chunk));
            }
        }
        entries.truncate(data_block_count as usize);
        Self { entries }
    }

    /// Encodes the FAT back into `fat_block_count` 4096-byte blocks.
    pub fn encode(&self, fat_block_count: u16) -> Vec<[u8; crate::block::BLOCK_SIZE]> {
        let mut blocks = vec![[0u8; crate::block::BLOCK_SIZE]; fat_block_count as usize];
        for (idx, entry) in self.entries.iter().enumerate() {
            let block_idx = idx / 2048;
            if block_idx >= blocks.len() {
                break;
            }
            let offset_in_block = (idx % 2048) * 2;
            entry.encode(&mut blocks[block_idx][offset_in_block..offset_in_block + 2]);
        }
        blocks
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, index: u16) -> u16 {
        self.entries[index as usize]
    }

    fn set(&mut self, index: u16, value: u16) {
        self.entries[index as usize] = value;
    }

    /// Returns the index of the last block in the chain starting at
    /// `start`, or [`END_OF_CHAIN`] if `start` is itself [`END_OF_CHAIN`]
    /// (the empty-file case).
    ///
    /// Bounded by `data_block_count` hops: a well-formed image cannot
    /// cycle, so this always terminates within that bound.
    pub fn chain_end(&self, start: u16) -> u16 {
        if start == END_OF_CHAIN {
            return END_OF_CHAIN;
        }

        let mut current = start;
        for _ in 0..self.len() {
            let next = self.get(current);
            if next == END_OF_CHAIN {
                return current;
            }
            current = next;
        }

        // Unreachable on a well-formed image; a cycle would only get here
        // after `len()` hops, which the invariant in spec §3 forbids.
        current
    }

    /// Counts the number of blocks in the chain starting at `start`, or
    /// `None` if it does not reach [`END_OF_CHAIN`] within `self.len()`
    /// hops — a cycle, or a chain that otherwise never terminates.
    pub fn chain_len(&self, start: u16) -> Option<usize> {
        if start == END_OF_CHAIN {
            return Some(0);
        }

        let mut current = start;
        let mut count = 1;
        for _ in 0..self.len() {
            let next = self.get(current);
            if next == END_OF_CHAIN {
                return Some(count);
            }
            current = next;
            count += 1;
        }
        None
    }

    /// Walks forward `offset_bytes / BLOCK_SIZE` links from `start` and
    /// reports the block and in-block byte offset for `offset_bytes`.
    pub fn chain_locate(&self, start: u16, offset_bytes: u32) -> ChainLocation {
        if start == END_OF_CHAIN {
            return ChainLocation::BeyondEnd;
        }

        let block_size = crate::block::BLOCK_SIZE as u32;
        let hops = offset_bytes / block_size;
        let offset_in_block = (offset_bytes % block_size) as usize;

        let mut current = start;
        for _ in 0..hops {
            let next = self.get(current);
            if next == END_OF_CHAIN {
                return ChainLocation::BeyondEnd;
            }
            current = next;
        }

        ChainLocation::At {
            block: current,
            offset_in_block,
        }
    }

    /// Scans linearly from index 0 for the first free slot, marks it
    /// end-of-chain, and links it after `chain_start` (or returns it as a
    /// fresh chain start if `chain_start` is [`END_OF_CHAIN`]).
    ///
    /// Returns the new index, and the new chain head to store back into
    /// the caller's directory entry.
    pub fn allocate(&mut self, chain_start: u16) -> FsResult<(u16, u16)> {
        let free_index = (1..self.len() as u16)
            .find(|&i| self.get(i) == FREE)
            .ok_or(FsError::ResourceExhausted {
                what: "no free data block",
            })?;

        self.set(free_index, END_OF_CHAIN);

        let new_chain_start = if chain_start == END_OF_CHAIN {
            free_index
        } else {
            let tail = self.chain_end(chain_start);
            self.set(tail, free_index);
            chain_start
        };

        Ok((free_index, new_chain_start))
    }

    /// Frees every block in the chain starting at `start`. No-op for an
    /// empty chain.
    pub fn free_chain(&mut self, start: u16) {
        if start == END_OF_CHAIN {
            return;
        }

        let mut current = start;
        loop {
            let next = self.get(current);
            self.set(current, FREE);
            if next == END_OF_CHAIN {
                break;
            }
            current = next;
        }
    }

    /// Count of entries equal to [`FREE`], out of `data_block_count`.
    pub fn free_count(&self, data_block_count: u16) -> u16 {
        self.entries[..data_block_count as usize]
            .iter()
            .filter(|&&e| e == FREE)
            .count() as u16
    }
}
