//! Byte-level layout of the backing image: region sizes, offsets, and the
//! on-disk record formats for inodes and directory entries.
//!
//! The image is one fixed-size file, carved into five regions back to back:
//! an inode bitmap, a block bitmap, the inode table, and the data blocks.
//! Nothing here is portable across platforms or versions; the image only
//! ever has to make sense to this crate's own reader.

use std::mem;
use std::mem::size_of;
use std::slice;

use crate::error::{FsError, FsResult};

/// Total image size in bytes. Fixed: this filesystem never grows or shrinks
/// its backing store.
pub const IMAGE_SIZE: usize = 1024 * 1024;

/// Number of inodes the inode table holds. Inode 0 is always the root
/// directory.
pub const NUM_INODES: usize = 64;

/// Number of 4 KiB data blocks the image provides.
pub const NUM_BLOCKS: usize = 250;

/// Size of a single data block.
pub const BLOCK_SIZE: usize = 4096;

/// Direct block pointers carried inline in an inode.
pub const DIRECT_BLOCKS: usize = 10;

/// Block pointers an indirect block can hold (`BLOCK_SIZE / size_of::<u32>()`).
pub const INDIRECT_CAPACITY: usize = BLOCK_SIZE / 4;

/// Largest number of blocks a single file can address: ten direct plus
/// everything the one indirect block can point at.
pub const MAX_BLOCKS_PER_INODE: usize = DIRECT_BLOCKS + INDIRECT_CAPACITY;

/// Longest file name a directory entry can hold, including no terminator
/// (the on-disk name field is zero-padded, not NUL-terminated by
/// convention, though trailing zero bytes double as both).
pub const NAME_LENGTH: usize = 59;

/// The inode bitmap is one bit per inode, rounded up to a byte per inode for
/// simplicity.
pub const INODE_BITMAP_OFFSET: usize = 0;
pub const INODE_BITMAP_SIZE: usize = NUM_INODES;

pub const BLOCK_BITMAP_OFFSET: usize = INODE_BITMAP_OFFSET + INODE_BITMAP_SIZE;
pub const BLOCK_BITMAP_SIZE: usize = NUM_BLOCKS;

pub const INODE_TABLE_OFFSET: usize = BLOCK_BITMAP_OFFSET + BLOCK_BITMAP_SIZE;

/// On-disk byte size of one inode record. Computed, not hardcoded, so the
/// region offsets below stay correct if a field is ever added.
pub const INODE_RECORD_SIZE: usize = 61 + DIRECT_BLOCKS * 4 + 4;

pub const INODE_TABLE_SIZE: usize = NUM_INODES * INODE_RECORD_SIZE;

pub const DATA_OFFSET: usize = INODE_TABLE_OFFSET + INODE_TABLE_SIZE;

/// On-disk byte size of one directory entry record (name + inum + flag).
pub const ENTRY_RECORD_SIZE: usize = NAME_LENGTH + 4 + 1;

/// Entries per 4 KiB directory block.
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / ENTRY_RECORD_SIZE;

/// The inode number of the filesystem root. Forced into existence the first
/// time an image is formatted and never reassigned afterwards.
pub const ROOT_INUM: u32 = 0;

const _: () = assert!(DATA_OFFSET + NUM_BLOCKS * BLOCK_SIZE <= IMAGE_SIZE);

/// File type an inode records. Only the two kinds this filesystem supports;
/// there are no symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
}

impl FileKind {
    fn to_byte(self) -> u8 {
        match self {
            FileKind::Directory => 0,
            FileKind::Regular => 1,
        }
    }

    fn from_byte(byte: u8) -> FsResult<Self> {
        match byte {
            0 => Ok(FileKind::Directory),
            1 => Ok(FileKind::Regular),
            _ => Err(FsError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "corrupt inode: unrecognized file kind byte",
            ))),
        }
    }
}

/// Where a logical block index within a file lives on disk: inline among
/// the inode's direct pointers, or indexed through its one indirect block.
///
/// Replaces the raw `index < DIRECT_BLOCKS ? direct[index] : indirect[...]`
/// arithmetic with a type the rest of the crate has to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAddr {
    Direct(usize),
    Indirect(usize),
}

impl BlockAddr {
    /// Classifies a logical block index into a file.
    pub fn of(logical_index: usize) -> FsResult<Self> {
        if logical_index < DIRECT_BLOCKS {
            Ok(BlockAddr::Direct(logical_index))
        } else if logical_index < MAX_BLOCKS_PER_INODE {
            Ok(BlockAddr::Indirect(logical_index - DIRECT_BLOCKS))
        } else {
            Err(FsError::NoSpace)
        }
    }
}

/// The on-disk inode record, field for field. `packed` so `size_of::<Self>()`
/// is exactly `INODE_RECORD_SIZE` with no compiler-inserted padding between
/// fields; never handed out past this module, since most of its fields
/// cannot be borrowed directly once packed.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct RawInode {
    dev: u32,
    mode: u32,
    nlink: u32,
    uid: u32,
    gid: u32,
    rdev: u32,
    size: u64,
    block_count: u32,
    atime: i64,
    mtime: i64,
    ctime: i64,
    kind: u8,
    blocks: [u32; DIRECT_BLOCKS],
    indirect: u32,
}

const _: () = assert!(size_of::<RawInode>() == INODE_RECORD_SIZE);

/// An in-memory, byte-order-native view of one inode record.
///
/// This is a value type: callers read it out of the image, mutate the
/// copy, and write it back. There is no live reference into the mapped
/// file, because the inode table's byte offset is not necessarily aligned
/// for the multi-byte fields it holds.
#[derive(Debug, Clone, Copy)]
pub struct Inode {
    /// The device the inode lives on. This crate only ever mounts one
    /// image at a time, so this is always 0; it is carried in the on-disk
    /// layout for parity with the format's full field set.
    pub dev: u32,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    /// The device number a `mknod`-created special file names. Always 0
    /// for regular files and directories.
    pub rdev: u32,
    pub kind: FileKind,
    pub size: u64,
    pub block_count: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub blocks: [u32; DIRECT_BLOCKS],
    pub indirect: u32,
}

impl Inode {
    /// An all-zero inode, as a freshly allocated inode table slot starts
    /// out. Not a valid file on its own; callers fill in kind/mode/etc.
    /// before using it.
    pub fn zeroed() -> Self {
        Inode {
            dev: 0,
            mode: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            rdev: 0,
            kind: FileKind::Regular,
            size: 0,
            block_count: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            blocks: [0; DIRECT_BLOCKS],
            indirect: 0,
        }
    }

    /// Deserializes an inode record out of its `INODE_RECORD_SIZE` bytes.
    pub fn from_bytes(bytes: &[u8]) -> FsResult<Self> {
        debug_assert_eq!(bytes.len(), INODE_RECORD_SIZE);
        let mut raw: RawInode = unsafe { mem::zeroed() };
        let dst = unsafe {
            slice::from_raw_parts_mut(&mut raw as *mut RawInode as *mut u8, size_of::<RawInode>())
        };
        dst.copy_from_slice(bytes);

        let kind = FileKind::from_byte(raw.kind)?;
        Ok(Inode {
            dev: raw.dev,
            mode: raw.mode,
            nlink: raw.nlink,
            uid: raw.uid,
            gid: raw.gid,
            rdev: raw.rdev,
            kind,
            size: raw.size,
            block_count: raw.block_count,
            atime: raw.atime,
            mtime: raw.mtime,
            ctime: raw.ctime,
            blocks: raw.blocks,
            indirect: raw.indirect,
        })
    }

    /// Serializes this inode into exactly `INODE_RECORD_SIZE` bytes.
    pub fn to_bytes(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), INODE_RECORD_SIZE);
        let raw = RawInode {
            dev: self.dev,
            mode: self.mode,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: self.rdev,
            size: self.size,
            block_count: self.block_count,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            kind: self.kind.to_byte(),
            blocks: self.blocks,
            indirect: self.indirect,
        };
        let src = unsafe {
            slice::from_raw_parts(&raw as *const RawInode as *const u8, size_of::<RawInode>())
        };
        out.copy_from_slice(src);
    }
}

/// The on-disk directory entry record: a fixed-width name field, the child
/// inum, and the active/tombstone flag, back to back with no padding.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct RawDirEntry {
    name: [u8; NAME_LENGTH],
    inum: u32,
    flag: u8,
}

const _: () = assert!(size_of::<RawDirEntry>() == ENTRY_RECORD_SIZE);

/// An in-memory view of one directory entry slot. A slot is either free
/// (a tombstone, reusable by the next `mknod`/`mkdir`/`link` in that
/// directory) or bound to a child inode under a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirEntry {
    Tombstone,
    Active { inum: u32, name: String },
}

impl DirEntry {
    pub fn from_bytes(bytes: &[u8]) -> FsResult<Self> {
        debug_assert_eq!(bytes.len(), ENTRY_RECORD_SIZE);
        let mut raw: RawDirEntry = unsafe { mem::zeroed() };
        let dst = unsafe {
            slice::from_raw_parts_mut(&mut raw as *mut RawDirEntry as *mut u8, size_of::<RawDirEntry>())
        };
        dst.copy_from_slice(bytes);

        if raw.flag == 0 {
            return Ok(DirEntry::Tombstone);
        }
        let len = raw.name.iter().position(|&b| b == 0).unwrap_or(NAME_LENGTH);
        let name = std::str::from_utf8(&raw.name[..len])
            .map_err(|_| {
                FsError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "corrupt directory entry: name is not valid utf-8",
                ))
            })?
            .to_string();
        Ok(DirEntry::Active { inum: raw.inum, name })
    }

    pub fn to_bytes(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), ENTRY_RECORD_SIZE);
        let raw = match self {
            DirEntry::Tombstone => RawDirEntry {
                name: [0; NAME_LENGTH],
                inum: 0,
                flag: 0,
            },
            DirEntry::Active { inum, name } => {
                let mut name_buf = [0u8; NAME_LENGTH];
                let bytes = name.as_bytes();
                name_buf[..bytes.len()].copy_from_slice(bytes);
                RawDirEntry {
                    name: name_buf,
                    inum: *inum,
                    flag: 1,
                }
            }
        };
        let src = unsafe {
            slice::from_raw_parts(&raw as *const RawDirEntry as *const u8, size_of::<RawDirEntry>())
        };
        out.copy_from_slice(src);
    }
}

/// Validates a prospective file name against the on-disk name field width.
pub fn check_name_length(name: &str) -> FsResult<()> {
    if name.as_bytes().len() > NAME_LENGTH {
        Err(FsError::NameTooLong)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_do_not_overlap_and_fit_in_the_image() {
        assert!(INODE_BITMAP_OFFSET + INODE_BITMAP_SIZE <= BLOCK_BITMAP_OFFSET);
        assert!(BLOCK_BITMAP_OFFSET + BLOCK_BITMAP_SIZE <= INODE_TABLE_OFFSET);
        assert!(INODE_TABLE_OFFSET + INODE_TABLE_SIZE <= DATA_OFFSET);
        assert!(DATA_OFFSET + NUM_BLOCKS * BLOCK_SIZE <= IMAGE_SIZE);
    }

    #[test]
    fn inode_round_trips_through_bytes() {
        let mut inode = Inode::zeroed();
        inode.kind = FileKind::Directory;
        inode.mode = 0o755;
        inode.nlink = 2;
        inode.size = 4096;
        inode.block_count = 1;
        inode.blocks[0] = 7;
        inode.indirect = 0;
        inode.atime = 1_700_000_000;

        let mut bytes = vec![0u8; INODE_RECORD_SIZE];
        inode.to_bytes(&mut bytes);
        let back = Inode::from_bytes(&bytes).unwrap();
        assert_eq!(back.mode, inode.mode);
        assert_eq!(back.kind, inode.kind);
        assert_eq!(back.size, inode.size);
        assert_eq!(back.blocks, inode.blocks);
        assert_eq!(back.atime, inode.atime);
    }

    #[test]
    fn tombstone_round_trips() {
        let mut bytes = vec![0xffu8; ENTRY_RECORD_SIZE];
        DirEntry::Tombstone.to_bytes(&mut bytes);
        assert_eq!(DirEntry::from_bytes(&bytes).unwrap(), DirEntry::Tombstone);
    }

    #[test]
    fn active_entry_round_trips_and_name_is_zero_padded() {
        let mut bytes = vec![0xaau8; ENTRY_RECORD_SIZE];
        let entry = DirEntry::Active {
            inum: 5,
            name: "hello".to_string(),
        };
        entry.to_bytes(&mut bytes);
        assert!(bytes[5..NAME_LENGTH].iter().all(|&b| b == 0));
        assert_eq!(DirEntry::from_bytes(&bytes).unwrap(), entry);
    }

    #[test]
    fn rejects_overlong_names() {
        let long_name = "a".repeat(NAME_LENGTH + 1);
        assert!(check_name_length(&long_name).is_err());
        assert!(check_name_length("a".repeat(NAME_LENGTH).as_str()).is_ok());
    }
}
