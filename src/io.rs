//! The read/write data path: walks a FAT chain block by block, using a
//! bounce buffer for any partial block at the head or tail of the
//! request.
//!
//! Structured the same way as a block-resolution-then-copy loop that
//! advances a small "progress" cursor (bytes done, current block, offset
//! within it) one block at a time rather than computing the whole
//! transfer's block list up front.

use crate::block::{BlockDevice, BLOCK_SIZE};
use crate::fat::{ChainLocation, Fat};

/// Tracks how far a transfer has gotten: a byte cursor into the file plus
/// how many bytes of the caller's buffer have been consumed so far.
struct Progress {
    file_offset: u32,
    buf_offset: usize,
}

/// Reads up to `buf.len()` bytes starting at `file_offset` from the chain
/// rooted at `chain_start`, stopping early at `file_size`.
///
/// Returns the number of bytes actually read.
pub fn read_chain<D: BlockDevice>(
    device: &mut D,
    fat: &Fat,
    chain_start: u16,
    data_start_block: u16,
    file_size: u32,
    file_offset: u32,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    if file_offset >= file_size {
        return Ok(0);
    }

    let want = (file_size - file_offset).min(buf.len() as u32) as usize;
    let mut progress = Progress {
        file_offset,
        buf_offset: 0,
    };

    let mut bounce = [0u8; BLOCK_SIZE];

    while progress.buf_offset < want {
        let location = fat.chain_locate(chain_start, progress.file_offset);
        let ChainLocation::At {
            block,
            offset_in_block,
        } = location
        else {
            break;
        };

        let absolute_block = data_start_block + block;
        device.read_block(absolute_block, &mut bounce)?;

        let remaining_in_block = BLOCK_SIZE - offset_in_block;
        let remaining_wanted = want - progress.buf_offset;
        let chunk = remaining_in_block.min(remaining_wanted);

        buf[progress.buf_offset..progress.buf_offset + chunk]
            .copy_from_slice(&bounce[offset_in_block..offset_in_block + chunk]);

        progress.buf_offset += chunk;
        progress.file_offset += chunk as u32;
    }

    Ok(progress.buf_offset)
}

/// Writes `buf` starting at `file_offset` into the chain rooted at
/// `chain_start`, extending the chain via `allocate` as needed.
///
/// Returns the number of bytes actually written (short only if block
/// allocation runs out mid-write) and the chain's (possibly new) start
/// index.
pub fn write_chain<D: BlockDevice>(
    device: &mut D,
    fat: &mut Fat,
    mut chain_start: u16,
    data_start_block: u16,
    file_offset: u32,
    buf: &[u8],
) -> std::io::Result<(usize, u16)> {
    let mut progress = Progress {
        file_offset,
        buf_offset: 0,
    };

    let mut bounce = [0u8; BLOCK_SIZE];

    while progress.buf_offset < buf.len() {
        let location = fat.chain_locate(chain_start, progress.file_offset);
        let (block, offset_in_block) = match location {
            ChainLocation::At {
                block,
                offset_in_block,
            } => (block, offset_in_block),
            ChainLocation::BeyondEnd => match fat.allocate(chain_start) {
                Ok((new_block, new_start)) => {
                    chain_start = new_start;
                    (new_block, 0)
                }
                Err(_) => break,
            },
        };

        let absolute_block = data_start_block + block;
        let remaining_in_block = BLOCK_SIZE - offset_in_block;
        let remaining_to_write = buf.len() - progress.buf_offset;
        let chunk = remaining_in_block.min(remaining_to_write);

        if chunk < BLOCK_SIZE {
            device.read_block(absolute_block, &mut bounce)?;
        }

        bounce[offset_in_block..offset_in_block + chunk]
            .copy_from_slice(&buf[progress.buf_offset..progress.buf_offset + chunk]);

        device.write_block(absolute_block, &bounce)?;

        progress.buf_offset += chunk;
        progress.file_offset += chunk as u32;
    }

    Ok((progress.buf_offset, chain_start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemoryBlockDevice;
    use crate::fat::END_OF_CHAIN;

    #[test]
    fn write_then_read_round_trips_across_a_block_boundary() {
        let mut device = MemoryBlockDevice::new(10);
        let mut fat = Fat::fresh(8);
        let data_start_block = 2u16;

        let payload: Vec<u8> = (0..(BLOCK_SIZE + 100) as u32).map(|b| (b % 251) as u8).collect();

        let (written, chain_start) =
            write_chain(&mut device, &mut fat, END_OF_CHAIN, data_start_block, 0, &payload)
                .unwrap();
        assert_eq!(written, payload.len());
        assert_eq!(fat.chain_len(chain_start), Some(2));

        let mut out = vec![0u8; payload.len()];
        let read = read_chain(
            &mut device,
            &fat,
            chain_start,
            data_start_block,
            payload.len() as u32,
            0,
            &mut out,
        )
        .unwrap();

        assert_eq!(read, payload.len());
        assert_eq!(out, payload);
    }

    #[test]
    fn read_stops_at_file_size_even_if_buffer_is_larger() {
        let mut device = MemoryBlockDevice::new(10);
        let mut fat = Fat::fresh(8);
        let data_start_block = 2u16;

        let payload = b"hello".to_vec();
        let (_, chain_start) =
            write_chain(&mut device, &mut fat, END_OF_CHAIN, data_start_block, 0, &payload)
                .unwrap();

        let mut out = [0u8; 64];
        let read = read_chain(
            &mut device,
            &fat,
            chain_start,
            data_start_block,
            payload.len() as u32,
            0,
            &mut out,
        )
        .unwrap();

        assert_eq!(read, payload.len());
        assert_eq!(&out[..read], &payload[..]);
    }

    #[test]
    fn write_preserves_unwritten_bytes_in_a_partial_block() {
        let mut device = MemoryBlockDevice::new(10);
        let mut fat = Fat::fresh(8);
        let data_start_block = 2u16;

        let first = vec![0xAAu8; 200];
        let (_, chain_start) =
            write_chain(&mut device, &mut fat, END_OF_CHAIN, data_start_block, 0, &first).unwrap();

        let second = vec![0xBBu8; 10];
        write_chain(&mut device, &mut fat, chain_start, data_start_block, 50, &second).unwrap();

        let mut out = vec![0u8; 200];
        read_chain(&mut device, &fat, chain_start, data_start_block, 200, 0, &mut out).unwrap();

        assert_eq!(&out[0..50], &[0xAAu8; 50][..]);
        assert_eq!(&out[50..60], &[0xBBu8; 10][..]);
        assert_eq!(&out[60..200], &[0xAAu8; 140][..]);
    }
}
