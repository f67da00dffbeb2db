//! The mounted volume: ties the superblock, FAT, root directory,
//! descriptor table, and live block device together into one handle.
//!
//! Grounded on the lineage's `Ext2Fs` struct, which plays the same role
//! (geometry plus a live device handle, with mount-time identification
//! separated from per-operation logic split across smaller modules).

use std::fmt::Write as _;
use std::path::Path;

use log::{debug, info, warn};

use crate::block::{BlockDevice, FileBlockDevice, BLOCK_SIZE};
use crate::descriptor::DescriptorTable;
use crate::directory::{validate_name, RootDirectory};
use crate::error::{FsError, FsResult};
use crate::fat::{Fat, EMPTY_CHAIN};
use crate::io::{read_chain, write_chain};
use crate::superblock::SuperBlock;

/// Options controlling how `mount` validates an image on the way in.
#[derive(Debug, Clone, Copy)]
pub struct MountOptions {
    /// Eagerly walk every directory entry's FAT chain at mount time,
    /// confirming it is finite, acyclic, and terminates within
    /// `data_block_count` hops. Disabling this skips the eager pass; the
    /// bounded walks used by reads and writes still cannot loop forever.
    pub verify_chains: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            verify_chains: true,
        }
    }
}

/// A mounted ECS150FS image and everything needed to serve operations
/// against it.
pub struct Volume<D: BlockDevice = FileBlockDevice> {
    device: D,
    superblock: SuperBlock,
    fat: Fat,
    root: RootDirectory,
    descriptors: DescriptorTable,
}

impl Volume<FileBlockDevice> {
    /// Opens `path` as a host file and mounts it with default options.
    pub fn mount<P: AsRef<Path>>(path: P) -> FsResult<Self> {
        Self::mount_with(path, MountOptions::default())
    }

    pub fn mount_with<P: AsRef<Path>>(path: P, options: MountOptions) -> FsResult<Self> {
        let device = FileBlockDevice::open(path)?;
        Self::mount_device(device, options)
    }
}

impl<D: BlockDevice> Volume<D> {
    /// Mounts an already-open block device, useful for tests that supply
    /// a [`crate::block::MemoryBlockDevice`].
    pub fn mount_device(mut device: D, options: MountOptions) -> FsResult<Self> {
        let mut block = [0u8; BLOCK_SIZE];
        device.read_block(0, &mut block)?;
        let superblock = SuperBlock::parse(&block, device.block_count())?;

        let mut fat_blocks = Vec::with_capacity(superblock.fat_block_count as usize);
        for i in 0..superblock.fat_block_count {
            let mut b = [0u8; BLOCK_SIZE];
            device.read_block(1 + i, &mut b)?;
            fat_blocks.push(b);
        }
        let fat = Fat::decode(&fat_blocks, superblock.data_block_count);

        let mut root_block = [0u8; BLOCK_SIZE];
        device.read_block(superblock.root_dir_index, &mut root_block)?;
        let root = RootDirectory::decode(&root_block);

        let volume = Self {
            device,
            superblock,
            fat,
            root,
            descriptors: DescriptorTable::new(),
        };

        if options.verify_chains {
            volume.verify_chain_integrity()?;
        }

        info!(
            "mounted volume: {} data blocks, {} fat blocks",
            volume.superblock.data_block_count, volume.superblock.fat_block_count
        );

        Ok(volume)
    }

    fn verify_chain_integrity(&self) -> FsResult<()> {
        for (index, entry) in self.root.iter_occupied() {
            if entry.data_start == EMPTY_CHAIN {
                continue;
            }

            let len = self.fat.chain_len(entry.data_start).ok_or(FsError::BadImage {
                reason: "directory entry's FAT chain does not terminate within data_block_count hops",
            })?;
            let expected_min_blocks = entry.file_size.div_ceil(BLOCK_SIZE as u32).max(1) as usize;
            if len < expected_min_blocks {
                return Err(FsError::BadImage {
                    reason: "directory entry's chain is shorter than its file size implies",
                });
            }

            debug!("verified chain for entry {index}: {len} blocks");
        }

        Ok(())
    }

    /// Flushes the FAT and root directory back to the block device. Does
    /// not close the underlying device; callers drop the `Volume` to do
    /// that.
    pub fn umount(mut self) -> FsResult<()> {
        self.flush()?;
        self.device.close().map_err(FsError::Device)?;
        info!("unmounted volume");
        Ok(())
    }

    fn flush(&mut self) -> FsResult<()> {
        let fat_blocks = self.fat.encode(self.superblock.fat_block_count);
        for (i, block) in fat_blocks.iter().enumerate() {
            self.device.write_block(1 + i as u16, block)?;
        }

        let root_block = self.root.encode();
        self.device
            .write_block(self.superblock.root_dir_index, &root_block)?;

        Ok(())
    }

    /// Renders the `FS Info:` report described in the external interface.
    pub fn info(&self) -> String {
        let fat_free = self.fat.free_count(self.superblock.data_block_count);
        let rdir_free = (crate::directory::ENTRY_COUNT
            - self.root.iter_occupied().count()) as u16;

        let mut out = String::new();
        let _ = writeln!(out, "FS Info:");
        let _ = writeln!(out, "total_blk_count={}", self.superblock.block_count);
        let _ = writeln!(out, "fat_blk_count={}", self.superblock.fat_block_count);
        let _ = writeln!(out, "rdir_blk={}", self.superblock.root_dir_index);
        let _ = writeln!(out, "data_blk={}", self.superblock.data_start_index);
        let _ = writeln!(out, "data_blk_count={}", self.superblock.data_block_count);
        let _ = writeln!(
            out,
            "fat_free_ratio={}/{}",
            fat_free, self.superblock.data_block_count
        );
        let _ = writeln!(
            out,
            "rdir_free_ratio={}/{}",
            rdir_free,
            crate::directory::ENTRY_COUNT
        );
        out
    }

    /// Renders the `FS Ls:` listing described in the external interface.
    pub fn ls(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "FS Ls:");
        for (_, entry) in self.root.iter_occupied() {
            let _ = writeln!(
                out,
                "file: {}, size: {}, data_blk: {}",
                entry.name_str(),
                entry.file_size,
                entry.data_start
            );
        }
        out
    }

    pub fn create(&mut self, name: &str) -> FsResult<()> {
        self.root.create(name)?;
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> FsResult<()> {
        validate_name(name)?;
        let index = self.root.find(name).ok_or(FsError::NotFound)?;

        if self.descriptors.is_entry_open(index) {
            return Err(FsError::Busy);
        }

        let entry = *self.root.entry(index);
        self.fat.free_chain(entry.data_start);
        self.root.clear(index);

        debug!("deleted '{name}', freed chain starting at {}", entry.data_start);
        Ok(())
    }

    pub fn open(&mut self, name: &str) -> FsResult<usize> {
        validate_name(name)?;
        let index = self.root.find(name).ok_or(FsError::NotFound)?;
        self.descriptors.open(index)
    }

    pub fn close(&mut self, fd: usize) -> FsResult<()> {
        self.descriptors.close(fd)
    }

    pub fn stat(&self, fd: usize) -> FsResult<u32> {
        let index = self.descriptors.entry_index(fd)?;
        Ok(self.root.entry(index).file_size)
    }

    pub fn lseek(&mut self, fd: usize, offset: u32) -> FsResult<()> {
        let index = self.descriptors.entry_index(fd)?;
        let file_size = self.root.entry(index).file_size;

        if offset > file_size {
            return Err(FsError::BadArgument {
                reason: "seek offset past end of file",
            });
        }

        self.descriptors.set_offset(fd, offset)
    }

    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> FsResult<usize> {
        let index = self.descriptors.entry_index(fd)?;
        let cursor = self.descriptors.offset(fd)?;
        let entry = *self.root.entry(index);

        let read = read_chain(
            &mut self.device,
            &self.fat,
            entry.data_start,
            self.superblock.data_start_index,
            entry.file_size,
            cursor,
            buf,
        )
        .map_err(FsError::Device)?;

        self.descriptors.set_offset(fd, cursor + read as u32)?;
        Ok(read)
    }

    pub fn write(&mut self, fd: usize, buf: &[u8]) -> FsResult<usize> {
        let index = self.descriptors.entry_index(fd)?;
        let cursor = self.descriptors.offset(fd)?;
        let mut entry = *self.root.entry(index);

        let (written, new_chain_start) = write_chain(
            &mut self.device,
            &mut self.fat,
            entry.data_start,
            self.superblock.data_start_index,
            cursor,
            buf,
        )
        .map_err(FsError::Device)?;

        if written < buf.len() {
            warn!(
                "short write on fd {fd}: wrote {written} of {} bytes, disk full",
                buf.len()
            );
        }

        entry.data_start = new_chain_start;
        let new_end = cursor + written as u32;
        if new_end > entry.file_size {
            entry.file_size = new_end;
        }
        *self.root.entry_mut(index) = entry;

        self.descriptors.set_offset(fd, new_end)?;
        Ok(written)
    }
}

/// Formats a freshly created, empty image of `data_block_count` data
/// blocks into `device`. Not part of the public flat API (image creation
/// tooling lives outside this crate), but used by tests to build
/// fixtures without shelling out to an external tool.
pub fn format<D: BlockDevice>(device: &mut D, data_block_count: u16) -> FsResult<()> {
    let superblock = SuperBlock::for_data_block_count(data_block_count);
    if superblock.block_count != device.block_count() {
        return Err(FsError::BadArgument {
            reason: "device block count does not match requested geometry",
        });
    }

    device.write_block(0, &superblock.encode())?;

    let fat = Fat::fresh(data_block_count);
    for (i, block) in fat.encode(superblock.fat_block_count).iter().enumerate() {
        device.write_block(1 + i as u16, block)?;
    }

    let root = RootDirectory::empty();
    device.write_block(superblock.root_dir_index, &root.encode())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemoryBlockDevice;

    fn fresh_volume(data_block_count: u16) -> Volume<MemoryBlockDevice> {
        let superblock = SuperBlock::for_data_block_count(data_block_count);
        let mut device = MemoryBlockDevice::new(superblock.block_count);
        format(&mut device, data_block_count).unwrap();
        Volume::mount_device(device, MountOptions::default()).unwrap()
    }

    #[test]
    fn create_open_write_read_round_trips() {
        let mut vol = fresh_volume(16);
        vol.create("a.txt").unwrap();

        let fd = vol.open("a.txt").unwrap();
        let written = vol.write(fd, b"hello world").unwrap();
        assert_eq!(written, 11);

        vol.lseek(fd, 0).unwrap();
        let mut buf = [0u8; 11];
        let read = vol.read(fd, &mut buf).unwrap();
        assert_eq!(read, 11);
        assert_eq!(&buf, b"hello world");

        assert_eq!(vol.stat(fd).unwrap(), 11);
    }

    #[test]
    fn delete_of_open_file_is_rejected_then_succeeds_once_closed() {
        let mut vol = fresh_volume(16);
        vol.create("a.txt").unwrap();
        let fd = vol.open("a.txt").unwrap();

        assert!(matches!(vol.delete("a.txt"), Err(FsError::Busy)));

        vol.close(fd).unwrap();
        vol.delete("a.txt").unwrap();
    }

    #[test]
    fn lseek_past_end_of_file_is_rejected() {
        let mut vol = fresh_volume(16);
        vol.create("a.txt").unwrap();
        let fd = vol.open("a.txt").unwrap();
        assert!(vol.lseek(fd, 1).is_err());
    }

    #[test]
    fn ls_and_info_render_expected_headers() {
        let mut vol = fresh_volume(4096);
        vol.create("a.txt").unwrap();

        let ls = vol.ls();
        assert!(ls.starts_with("FS Ls:\n"));
        assert!(ls.contains("file: a.txt, size: 0, data_blk: 65535"));

        let info = vol.info();
        assert!(info.starts_with("FS Info:\n"));
        assert!(info.contains("total_blk_count=4100"));
        assert!(info.contains("fat_blk_count=2"));
    }

    #[test]
    fn write_across_disk_full_is_a_short_transfer_not_an_error() {
        // data_block_count=2 leaves exactly one free data block: slot 0 is
        // always the whole-FAT terminator.
        let mut vol = fresh_volume(2);
        vol.create("a.txt").unwrap();
        let fd = vol.open("a.txt").unwrap();

        let payload = vec![0xAAu8; BLOCK_SIZE * 2];
        let written = vol.write(fd, &payload).unwrap();
        assert_eq!(written, BLOCK_SIZE);
    }
}
