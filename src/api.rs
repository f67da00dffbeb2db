//! The flat, POSIX-flavored `fs_*` API: a single process-wide mounted
//! volume behind a mutex, every failure collapsed to `-1`.
//!
//! The module-level slot pattern mirrors the thin global handle the
//! lineage crate's single-core kernel keeps for its one mounted volume;
//! here it is a `Mutex` rather than an unsynchronized static because a
//! hosted process may call in from more than one thread even though the
//! filesystem itself serializes access internally.

use std::sync::{Mutex, OnceLock};

use crate::block::FileBlockDevice;
use crate::volume::{MountOptions, Volume};

pub const FS_FILENAME_LEN: usize = 16;
pub const FS_FILE_MAX_COUNT: usize = crate::directory::ENTRY_COUNT;
pub const FS_OPEN_MAX_COUNT: usize = crate::descriptor::MAX_OPEN_FILES;
pub const BLOCK_SIZE: usize = crate::block::BLOCK_SIZE;

fn slot() -> &'static Mutex<Option<Volume<FileBlockDevice>>> {
    static SLOT: OnceLock<Mutex<Option<Volume<FileBlockDevice>>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

pub fn fs_mount(diskname: &str) -> i32 {
    let mut guard = slot().lock().unwrap();
    if guard.is_some() {
        return -1;
    }

    match Volume::mount_with(diskname, MountOptions::default()) {
        Ok(volume) => {
            *guard = Some(volume);
            0
        }
        Err(_) => -1,
    }
}

pub fn fs_umount() -> i32 {
    let mut guard = slot().lock().unwrap();
    match guard.take() {
        Some(volume) => match volume.umount() {
            Ok(()) => 0,
            Err(_) => -1,
        },
        None => -1,
    }
}

pub fn fs_info() -> i32 {
    let guard = slot().lock().unwrap();
    match guard.as_ref() {
        Some(volume) => {
            print!("{}", volume.info());
            0
        }
        None => -1,
    }
}

pub fn fs_ls() -> i32 {
    let guard = slot().lock().unwrap();
    match guard.as_ref() {
        Some(volume) => {
            print!("{}", volume.ls());
            0
        }
        None => -1,
    }
}

pub fn fs_create(name: &str) -> i32 {
    let mut guard = slot().lock().unwrap();
    match guard.as_mut() {
        Some(volume) => volume.create(name).map(|_| 0).unwrap_or(-1),
        None => -1,
    }
}

pub fn fs_delete(name: &str) -> i32 {
    let mut guard = slot().lock().unwrap();
    match guard.as_mut() {
        Some(volume) => volume.delete(name).map(|_| 0).unwrap_or(-1),
        None => -1,
    }
}

pub fn fs_open(name: &str) -> i32 {
    let mut guard = slot().lock().unwrap();
    match guard.as_mut() {
        Some(volume) => volume.open(name).map(|fd| fd as i32).unwrap_or(-1),
        None => -1,
    }
}

pub fn fs_close(fd: i32) -> i32 {
    let mut guard = slot().lock().unwrap();
    match guard.as_mut() {
        Some(volume) => fd_to_usize(fd)
            .and_then(|fd| volume.close(fd).ok())
            .map(|_| 0)
            .unwrap_or(-1),
        None => -1,
    }
}

/// Returns the file's size, or `-1` on any failure (not mounted, bad fd).
pub fn fs_stat(fd: i32) -> i32 {
    let guard = slot().lock().unwrap();
    match guard.as_ref() {
        Some(volume) => fd_to_usize(fd)
            .and_then(|fd| volume.stat(fd).ok())
            .map(|size| size as i32)
            .unwrap_or(-1),
        None => -1,
    }
}

pub fn fs_lseek(fd: i32, offset: u32) -> i32 {
    let mut guard = slot().lock().unwrap();
    match guard.as_mut() {
        Some(volume) => fd_to_usize(fd)
            .and_then(|fd| volume.lseek(fd, offset).ok())
            .map(|_| 0)
            .unwrap_or(-1),
        None => -1,
    }
}

/// Returns the number of bytes read, or `-1` on any failure.
pub fn fs_read(fd: i32, buf: &mut [u8]) -> i32 {
    let mut guard = slot().lock().unwrap();
    match guard.as_mut() {
        Some(volume) => fd_to_usize(fd)
            .and_then(|fd| volume.read(fd, buf).ok())
            .map(|n| n as i32)
            .unwrap_or(-1),
        None => -1,
    }
}

/// Returns the number of bytes written, or `-1` on any failure. A short
/// write (disk full) still returns a non-negative count.
pub fn fs_write(fd: i32, buf: &[u8]) -> i32 {
    let mut guard = slot().lock().unwrap();
    match guard.as_mut() {
        Some(volume) => fd_to_usize(fd)
            .and_then(|fd| volume.write(fd, buf).ok())
            .map(|n| n as i32)
            .unwrap_or(-1),
        None => -1,
    }
}

fn fd_to_usize(fd: i32) -> Option<usize> {
    if fd < 0 || fd as usize >= FS_OPEN_MAX_COUNT {
        None
    } else {
        Some(fd as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::sync::Mutex as StdMutex;

    // `fs_*` shares one process-wide slot, so tests that touch it must not
    // interleave with each other.
    static SERIAL: StdMutex<()> = StdMutex::new(());

    fn build_fixture(data_block_count: u16) -> tempfile::NamedTempFile {
        use crate::block::{BlockDevice, MemoryBlockDevice};
        use crate::superblock::SuperBlock;

        let superblock = SuperBlock::for_data_block_count(data_block_count);
        let mut device = MemoryBlockDevice::new(superblock.block_count);
        crate::volume::format(&mut device, data_block_count).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..superblock.block_count {
            let mut block = [0u8; BLOCK_SIZE];
            device.read_block(i, &mut block).unwrap();
            file.write_all(&block).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn mount_create_open_write_read_umount_round_trips() {
        let _lock = SERIAL.lock().unwrap();
        let fixture = build_fixture(16);

        assert_eq!(fs_mount(fixture.path().to_str().unwrap()), 0);
        assert_eq!(fs_create("hello.txt"), 0);

        let fd = fs_open("hello.txt");
        assert!(fd >= 0);
        assert_eq!(fs_write(fd, b"hi"), 2);

        assert_eq!(fs_lseek(fd, 0), 0);
        let mut buf = [0u8; 2];
        assert_eq!(fs_read(fd, &mut buf), 2);
        assert_eq!(&buf, b"hi");

        assert_eq!(fs_stat(fd), 2);
        assert_eq!(fs_close(fd), 0);
        assert_eq!(fs_umount(), 0);
    }

    #[test]
    fn operations_without_mount_fail() {
        let _lock = SERIAL.lock().unwrap();
        assert_eq!(fs_umount(), -1);
        assert_eq!(fs_create("x"), -1);
        assert_eq!(fs_stat(0), -1);
    }

    #[test]
    fn double_mount_is_rejected() {
        let _lock = SERIAL.lock().unwrap();
        let fixture = build_fixture(16);
        assert_eq!(fs_mount(fixture.path().to_str().unwrap()), 0);
        assert_eq!(fs_mount(fixture.path().to_str().unwrap()), -1);
        assert_eq!(fs_umount(), 0);
    }
}
