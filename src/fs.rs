//! The filesystem's operation surface: the handful of POSIX-shaped calls
//! everything above this module (the FUSE adapter, tests, tools) drives.
//! Every operation takes an absolute path and resolves it itself; there is
//! no directory-handle or path cache to keep in sync.

use std::path::Path;

use crate::bitmap::{allocate_inode, free_inode};
use crate::dir::{add_entry, entries, is_empty, remove_entry};
use crate::error::{FsError, FsResult};
use crate::image::Image;
use crate::layout::{FileKind, Inode, ROOT_INUM, check_name_length};
use crate::resolve::{resolve, resolve_parent};
use crate::{fileio, size, util};

/// Snapshot of an inode's metadata, handed back by `stat` and by every
/// mutating call that changes it.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub inum: u32,
    pub kind: FileKind,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub size: u64,
    pub block_count: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl Stat {
    fn from_inode(inum: u32, inode: &Inode) -> Self {
        Stat {
            inum,
            kind: inode.kind,
            mode: inode.mode,
            nlink: inode.nlink,
            uid: inode.uid,
            gid: inode.gid,
            rdev: inode.rdev,
            size: inode.size,
            block_count: inode.block_count,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        }
    }
}

/// Owns the mapped image and serves every filesystem operation against it.
/// There is exactly one of these per mount; it is not `Sync` (the FUSE
/// adapter serializes calls onto it).
pub struct Fs {
    image: Image,
}

impl Fs {
    /// Opens (or formats, if absent) the image at `path`.
    pub fn open(path: &Path) -> FsResult<Self> {
        Ok(Fs {
            image: Image::open(path)?,
        })
    }

    pub fn sync(&self) -> FsResult<()> {
        self.image.sync()
    }

    pub fn stat(&self, path: &str) -> FsResult<Stat> {
        let inum = resolve(&self.image, path)?;
        self.stat_inum(inum)
    }

    pub fn stat_inum(&self, inum: u32) -> FsResult<Stat> {
        let inode = self.image.read_inode(inum)?;
        Ok(Stat::from_inode(inum, &inode))
    }

    /// Lists a directory's entries, skipping tombstones.
    pub fn readdir(&self, path: &str) -> FsResult<Vec<(String, u32, FileKind)>> {
        let inum = resolve(&self.image, path)?;
        let inode = self.image.read_inode(inum)?;
        if inode.kind != FileKind::Directory {
            return Err(FsError::NotADirectory);
        }
        entries(&self.image, &inode)?
            .into_iter()
            .map(|(child_inum, name)| {
                let kind = self.image.read_inode(child_inum)?.kind;
                Ok((name, child_inum, kind))
            })
            .collect()
    }

    /// Creates a new regular file at `path`. `rdev` is the device number to
    /// record on the new inode; it is only meaningful for special device
    /// files and is 0 for an ordinary regular file.
    pub fn mknod(&mut self, path: &str, mode: u32, rdev: u32) -> FsResult<Stat> {
        self.create(path, mode, rdev, FileKind::Regular)
    }

    /// Creates a new directory at `path`. Like `mknod`, it is born with
    /// `nlink == 1`: the single active entry its parent now holds for it.
    /// This crate never materializes `.`/`..` as real directory entries
    /// (the FUSE adapter synthesizes them), so there is no second reference
    /// to count.
    pub fn mkdir(&mut self, path: &str, mode: u32) -> FsResult<Stat> {
        self.create(path, mode, 0, FileKind::Directory)
    }

    fn create(&mut self, path: &str, mode: u32, rdev: u32, kind: FileKind) -> FsResult<Stat> {
        let (parent_inum, name) = resolve_parent(&self.image, path)?;
        check_name_length(name)?;
        if crate::dir::lookup(&self.image, &self.image.read_inode(parent_inum)?, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }

        let inum = allocate_inode(&mut self.image)?;
        let now = util::now_secs();
        let mut inode = Inode::zeroed();
        inode.kind = kind;
        // Files are recorded with mode exactly as given; a directory's mode
        // always carries the directory type bit regardless of what the
        // caller passed, since FUSE's own mkdir only ever hands us
        // permission bits.
        inode.mode = match kind {
            FileKind::Directory => mode | libc::S_IFDIR as u32,
            FileKind::Regular => mode,
        };
        inode.rdev = rdev;
        inode.nlink = 1;
        inode.atime = now;
        inode.mtime = now;
        inode.ctime = now;
        self.image.write_inode(inum, &inode);

        let mut parent = self.image.read_inode(parent_inum)?;
        if let Err(e) = add_entry(&mut self.image, &mut parent, name, inum) {
            free_inode(&mut self.image, inum);
            return Err(e);
        }
        self.image.write_inode(parent_inum, &parent);

        Ok(Stat::from_inode(inum, &inode))
    }

    /// Removes the directory entry at `path` and, once its link count
    /// drops to zero, the file itself and every block it owns.
    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        let (parent_inum, name) = resolve_parent(&self.image, path)?;
        let inum = {
            let parent = self.image.read_inode(parent_inum)?;
            crate::dir::lookup(&self.image, &parent, name)?.ok_or(FsError::NotFound)?
        };
        self.unlink_entry(parent_inum, name, inum)
    }

    /// Removes an empty directory at `path`.
    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let (parent_inum, name) = resolve_parent(&self.image, path)?;
        let inum = {
            let parent = self.image.read_inode(parent_inum)?;
            crate::dir::lookup(&self.image, &parent, name)?.ok_or(FsError::NotFound)?
        };
        let inode = self.image.read_inode(inum)?;
        if inode.kind != FileKind::Directory {
            return Err(FsError::NotADirectory);
        }
        if !is_empty(&self.image, &inode)? {
            return Err(FsError::NotEmpty);
        }
        self.unlink_entry(parent_inum, name, inum)
    }

    fn unlink_entry(&mut self, parent_inum: u32, name: &str, inum: u32) -> FsResult<()> {
        let mut parent = self.image.read_inode(parent_inum)?;
        remove_entry(&mut self.image, &mut parent, name)?;
        self.image.write_inode(parent_inum, &parent);

        let mut inode = self.image.read_inode(inum)?;
        inode.nlink = inode.nlink.saturating_sub(1);
        if inode.nlink == 0 {
            while inode.block_count > 0 {
                crate::inode::pop_block(&mut self.image, &mut inode)?;
            }
            free_inode(&mut self.image, inum);
            self.image.write_inode(inum, &Inode::zeroed());
        } else {
            self.image.write_inode(inum, &inode);
        }
        Ok(())
    }

    /// Replaces the permission bits of `path`'s mode, leaving whatever type
    /// bit (directory vs. regular) is already recorded there untouched —
    /// `chmod`'s caller only ever hands over permission bits (`0o7777`),
    /// never the file type.
    pub fn chmod(&mut self, path: &str, mode: u32) -> FsResult<Stat> {
        let inum = resolve(&self.image, path)?;
        let mut inode = self.image.read_inode(inum)?;
        let type_bits = inode.mode & libc::S_IFMT as u32;
        inode.mode = type_bits | (mode & 0o7777);
        inode.ctime = util::now_secs();
        self.image.write_inode(inum, &inode);
        Ok(Stat::from_inode(inum, &inode))
    }

    /// Sets access and modification time, in whole seconds. A `None` leaves
    /// that field untouched, matching `utimens`' per-field granularity.
    pub fn set_time(&mut self, path: &str, atime: Option<i64>, mtime: Option<i64>) -> FsResult<Stat> {
        let inum = resolve(&self.image, path)?;
        let mut inode = self.image.read_inode(inum)?;
        if let Some(atime) = atime {
            inode.atime = atime;
        }
        if let Some(mtime) = mtime {
            inode.mtime = mtime;
        }
        inode.ctime = util::now_secs();
        self.image.write_inode(inum, &inode);
        Ok(Stat::from_inode(inum, &inode))
    }

    /// Creates `new_path` as another name for the file at `old_path`,
    /// bumping its link count. Directories cannot be hard-linked.
    pub fn link(&mut self, old_path: &str, new_path: &str) -> FsResult<Stat> {
        let inum = resolve(&self.image, old_path)?;
        let mut inode = self.image.read_inode(inum)?;
        if inode.kind == FileKind::Directory {
            return Err(FsError::NotADirectory);
        }

        let (parent_inum, name) = resolve_parent(&self.image, new_path)?;
        check_name_length(name)?;
        let mut parent = self.image.read_inode(parent_inum)?;
        add_entry(&mut self.image, &mut parent, name, inum)?;
        self.image.write_inode(parent_inum, &parent);

        inode.nlink += 1;
        inode.ctime = util::now_secs();
        self.image.write_inode(inum, &inode);
        Ok(Stat::from_inode(inum, &inode))
    }

    /// Moves `old_path` to `new_path`: link the new name, then unlink the
    /// old one. There is no atomic rename record; a crash between the two
    /// steps can leave both names pointing at the file.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> FsResult<()> {
        let inum = resolve(&self.image, old_path)?;

        let (new_parent_inum, new_name) = resolve_parent(&self.image, new_path)?;
        check_name_length(new_name)?;
        let mut new_parent = self.image.read_inode(new_parent_inum)?;
        add_entry(&mut self.image, &mut new_parent, new_name, inum)?;
        self.image.write_inode(new_parent_inum, &new_parent);

        let mut inode = self.image.read_inode(inum)?;
        inode.nlink += 1;
        self.image.write_inode(inum, &inode);

        let (old_parent_inum, old_name) = resolve_parent(&self.image, old_path)?;
        self.unlink_entry(old_parent_inum, old_name, inum)?;
        Ok(())
    }

    pub fn truncate(&mut self, path: &str, new_size: u64) -> FsResult<Stat> {
        let inum = resolve(&self.image, path)?;
        let mut inode = self.image.read_inode(inum)?;
        if inode.kind != FileKind::Regular {
            return Err(FsError::NotADirectory);
        }
        size::truncate(&mut self.image, &mut inode, new_size)?;
        self.image.write_inode(inum, &inode);
        Ok(Stat::from_inode(inum, &inode))
    }

    pub fn read(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let inum = resolve(&self.image, path)?;
        let mut inode = self.image.read_inode(inum)?;
        let n = fileio::read(&self.image, &inode, offset, buf)?;
        inode.atime = util::now_secs();
        self.image.write_inode(inum, &inode);
        Ok(n)
    }

    /// Writes to the file at `path`, creating it as a regular file (mode
    /// `0o755`, device 0) first if nothing is there yet. Ensures capacity
    /// via `truncate` before copying bytes in, so any hole between the old
    /// size and `offset` is zero-filled the same way a direct truncate-grow
    /// would zero it.
    pub fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> FsResult<usize> {
        let inum = match resolve(&self.image, path) {
            Ok(inum) => inum,
            Err(FsError::NotFound) => self.create(path, 0o755, 0, FileKind::Regular)?.inum,
            Err(e) => return Err(e),
        };
        let mut inode = self.image.read_inode(inum)?;
        if inode.kind != FileKind::Regular {
            return Err(FsError::NotADirectory);
        }
        let target_size = (offset + data.len() as u64).max(inode.size);
        if target_size > inode.size {
            size::truncate(&mut self.image, &mut inode, target_size)?;
        }
        let n = fileio::write(&mut self.image, &mut inode, offset, data)?;
        self.image.write_inode(inum, &inode);
        Ok(n)
    }

    /// Checks `mask` (a bitwise-or of `libc::{R,W,X}_OK`) against the
    /// inode's mode bits. Coarse and non-uid-aware: it does not consult the
    /// caller's uid/gid at all, only whether the requested bits are a
    /// subset of the mode's.
    pub fn access(&self, path: &str, mask: u32) -> FsResult<()> {
        let inum = resolve(&self.image, path)?;
        let inode = self.image.read_inode(inum)?;
        if inode.mode | mask > inode.mode {
            Err(FsError::PermissionDenied)
        } else {
            Ok(())
        }
    }

    pub fn root_inum(&self) -> u32 {
        ROOT_INUM
    }
}
