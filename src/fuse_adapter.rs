//! Translates between `fuser`'s ino-keyed callback surface and the
//! path-keyed operation surface in [`crate::fs::Fs`].
//!
//! FUSE identifies everything by a 64-bit inode number it expects this
//! filesystem to keep stable for the life of the mount; `Fs` identifies
//! everything by path, resolving from the root on every call, the way the
//! format it reads was designed. This module bridges the two by handing
//! out a FUSE ino per path the kernel has asked about and remembering the
//! mapping; it never invents its own notion of inode identity beyond that.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use log::{debug, warn};

use crate::error::FsError;
use crate::fs::{Fs, Stat};
use crate::layout::FileKind;

const TTL: Duration = Duration::from_secs(1);
const FUSE_ROOT_INO: u64 = 1;

/// Adapts a [`Fs`] to `fuser`'s `Filesystem` trait.
pub struct BoxFs {
    fs: Fs,
    ino_to_path: HashMap<u64, String>,
    path_to_ino: HashMap<String, u64>,
    next_ino: u64,
}

impl BoxFs {
    pub fn new(fs: Fs) -> Self {
        let mut ino_to_path = HashMap::new();
        let mut path_to_ino = HashMap::new();
        ino_to_path.insert(FUSE_ROOT_INO, "/".to_string());
        path_to_ino.insert("/".to_string(), FUSE_ROOT_INO);
        BoxFs {
            fs,
            ino_to_path,
            path_to_ino,
            next_ino: FUSE_ROOT_INO + 1,
        }
    }

    fn path_of(&self, ino: u64) -> Option<&str> {
        self.ino_to_path.get(&ino).map(String::as_str)
    }

    fn ino_for(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_ino.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.ino_to_path.insert(ino, path.to_string());
        self.path_to_ino.insert(path.to_string(), ino);
        ino
    }

    fn forget_path(&mut self, path: &str) {
        if path == "/" {
            return;
        }
        if let Some(ino) = self.path_to_ino.remove(path) {
            self.ino_to_path.remove(&ino);
        }
    }

    fn child_path(parent_path: &str, name: &str) -> String {
        if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        }
    }
}

fn secs_to_system_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn to_file_attr(stat: &Stat) -> FileAttr {
    let kind = match stat.kind {
        FileKind::Directory => FileType::Directory,
        FileKind::Regular => FileType::RegularFile,
    };
    // `st_blocks` counts 512-byte units of storage actually allocated, not
    // bytes of file content; this filesystem only ever allocates whole
    // 4 KiB blocks, so it is `block_count` scaled up.
    let blocks_512 = stat.block_count as u64 * (crate::layout::BLOCK_SIZE as u64 / 512);
    FileAttr {
        ino: 0, // overwritten by the caller, which knows the ino for this path
        size: stat.size,
        blocks: blocks_512,
        atime: secs_to_system_time(stat.atime),
        mtime: secs_to_system_time(stat.mtime),
        ctime: secs_to_system_time(stat.ctime),
        crtime: UNIX_EPOCH,
        kind,
        perm: (stat.mode & 0o7777) as u16,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: stat.rdev,
        blksize: crate::layout::BLOCK_SIZE as u32,
        flags: 0,
    }
}

fn name_to_str(name: &OsStr) -> Option<&str> {
    name.to_str()
}

impl Filesystem for BoxFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_of(parent).map(str::to_string) else {
            return reply.error(libc::ENOENT);
        };
        let Some(name) = name_to_str(name) else {
            return reply.error(libc::ENOENT);
        };
        let path = Self::child_path(&parent_path, name);
        match self.fs.stat(&path) {
            Ok(stat) => {
                let ino = self.ino_for(&path);
                let mut attr = to_file_attr(&stat);
                attr.ino = ino;
                reply.entry(&TTL, &attr, 0);
            }
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            return reply.error(libc::ENOENT);
        };
        match self.fs.stat(path) {
            Ok(stat) => {
                let mut attr = to_file_attr(&stat);
                attr.ino = ino;
                reply.attr(&TTL, &attr);
            }
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            return reply.error(libc::ENOENT);
        };

        let mut result: Result<Stat, FsError> = self.fs.stat(&path);
        if let Some(mode) = mode {
            result = self.fs.chmod(&path, mode);
        }
        if let Some(size) = size {
            result = self.fs.truncate(&path, size);
        }
        if atime.is_some() || mtime.is_some() {
            let to_secs = |t: TimeOrNow| -> i64 {
                match t {
                    TimeOrNow::SpecificTime(t) => t
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs() as i64)
                        .unwrap_or(0),
                    TimeOrNow::Now => crate::util::now_secs(),
                }
            };
            result = self
                .fs
                .set_time(&path, atime.map(to_secs), mtime.map(to_secs));
        }

        match result {
            Ok(stat) => {
                let mut attr = to_file_attr(&stat);
                attr.ino = ino;
                reply.attr(&TTL, &attr);
            }
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent).map(str::to_string) else {
            return reply.error(libc::ENOENT);
        };
        let Some(name) = name_to_str(name) else {
            return reply.error(libc::ENOENT);
        };
        let path = Self::child_path(&parent_path, name);
        match self.fs.mknod(&path, mode, rdev) {
            Ok(stat) => {
                let ino = self.ino_for(&path);
                let mut attr = to_file_attr(&stat);
                attr.ino = ino;
                reply.entry(&TTL, &attr, 0);
            }
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent).map(str::to_string) else {
            return reply.error(libc::ENOENT);
        };
        let Some(name) = name_to_str(name) else {
            return reply.error(libc::ENOENT);
        };
        let path = Self::child_path(&parent_path, name);
        match self.fs.mkdir(&path, mode) {
            Ok(stat) => {
                let ino = self.ino_for(&path);
                let mut attr = to_file_attr(&stat);
                attr.ino = ino;
                reply.entry(&TTL, &attr, 0);
            }
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent).map(str::to_string) else {
            return reply.error(libc::ENOENT);
        };
        let Some(name) = name_to_str(name) else {
            return reply.error(libc::ENOENT);
        };
        let path = Self::child_path(&parent_path, name);
        match self.fs.unlink(&path) {
            Ok(()) => {
                self.forget_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent).map(str::to_string) else {
            return reply.error(libc::ENOENT);
        };
        let Some(name) = name_to_str(name) else {
            return reply.error(libc::ENOENT);
        };
        let path = Self::child_path(&parent_path, name);
        match self.fs.rmdir(&path) {
            Ok(()) => {
                self.forget_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(parent_path), Some(new_parent_path)) = (
            self.path_of(parent).map(str::to_string),
            self.path_of(newparent).map(str::to_string),
        ) else {
            return reply.error(libc::ENOENT);
        };
        let (Some(name), Some(newname)) = (name_to_str(name), name_to_str(newname)) else {
            return reply.error(libc::ENOENT);
        };
        let old_path = Self::child_path(&parent_path, name);
        let new_path = Self::child_path(&new_parent_path, newname);
        match self.fs.rename(&old_path, &new_path) {
            Ok(()) => {
                self.forget_path(&old_path);
                reply.ok();
            }
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let (Some(old_path), Some(new_parent_path)) = (
            self.path_of(ino).map(str::to_string),
            self.path_of(newparent).map(str::to_string),
        ) else {
            return reply.error(libc::ENOENT);
        };
        let Some(newname) = name_to_str(newname) else {
            return reply.error(libc::ENOENT);
        };
        let new_path = Self::child_path(&new_parent_path, newname);
        match self.fs.link(&old_path, &new_path) {
            Ok(stat) => {
                let new_ino = self.ino_for(&new_path);
                let mut attr = to_file_attr(&stat);
                attr.ino = new_ino;
                reply.entry(&TTL, &attr, 0);
            }
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, _ino: u64, flags: i32, reply: ReplyOpen) {
        reply.opened(0, flags as u32);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            return reply.error(libc::ENOENT);
        };
        let mut buf = vec![0u8; size as usize];
        match self.fs.read(&path, offset.max(0) as u64, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            return reply.error(libc::ENOENT);
        };
        match self.fs.write(&path, offset.max(0) as u64, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if let Err(e) = self.fs.sync() {
            warn!("failed to sync image on release: {e}");
        }
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, flags: i32, reply: ReplyOpen) {
        reply.opened(0, flags as u32);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            return reply.error(libc::ENOENT);
        };
        let entries = match self.fs.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => return reply.error(e.to_libc_errno()),
        };

        // "." and ".." are synthesized here; the on-disk entry table only
        // ever records real children.
        let parent_ino = if path == "/" {
            ino
        } else {
            match crate::path::split_parent(&path) {
                Ok((parent_path, _)) => self.ino_for(&parent_path),
                Err(_) => ino,
            }
        };
        let mut listing = vec![(".".to_string(), ino, FileType::Directory)];
        listing.push(("..".to_string(), parent_ino, FileType::Directory));
        for (name, child_inum, kind) in entries {
            let child_path = Self::child_path(&path, &name);
            let child_ino = self.ino_for(&child_path);
            let _ = child_inum;
            let file_type = match kind {
                FileKind::Directory => FileType::Directory,
                FileKind::Regular => FileType::RegularFile,
            };
            listing.push((name, child_ino, file_type));
        }

        for (i, (name, entry_ino, kind)) in listing.into_iter().enumerate().skip(offset as usize) {
            if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let Some(path) = self.path_of(ino) else {
            return reply.error(libc::ENOENT);
        };
        match self.fs.access(path, mask as u32) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(parent_path) = self.path_of(parent).map(str::to_string) else {
            return reply.error(libc::ENOENT);
        };
        let Some(name) = name_to_str(name) else {
            return reply.error(libc::ENOENT);
        };
        let path = Self::child_path(&parent_path, name);
        match self.fs.mknod(&path, mode, 0) {
            Ok(stat) => {
                let ino = self.ino_for(&path);
                let mut attr = to_file_attr(&stat);
                attr.ino = ino;
                reply.created(&TTL, &attr, 0, 0, flags as u32);
            }
            Err(e) => reply.error(e.to_libc_errno()),
        }
    }

    fn destroy(&mut self) {
        if let Err(e) = self.fs.sync() {
            warn!("failed to sync image on unmount: {e}");
        } else {
            debug!("image synced on unmount");
        }
    }
}
