//! The thin adapter between `fuser`'s kernel-facing callbacks and the storage engine.
//!
//! This module holds no storage logic of its own: every callback resolves a path or inode number,
//! calls into [`Engine`], and translates the result (or [`FsError`]) into the `fuser` reply type.
//! The engine's inode numbers already follow the same 1-based convention `fuser` uses for
//! `FUSE_ROOT_ID`, so no separate inode-translation table is needed; the root directory is inode
//! 1 on both sides.

use crate::error::FsError;
use crate::fs::Engine;
use crate::inode::{Inode, InodeKind};
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use std::ffi::OsStr;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TTL: Duration = Duration::from_secs(1);

fn to_system_time(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn to_file_attr(ino: u32, inode: &Inode, block_size: u32) -> FileAttr {
    let kind = match inode.kind() {
        InodeKind::Directory => FileType::Directory,
        InodeKind::Regular => FileType::RegularFile,
    };
    let size = inode.size as u64;
    let blocks = (size + block_size as u64 - 1) / block_size as u64;
    FileAttr {
        ino: ino as u64,
        size,
        blocks,
        atime: to_system_time(inode.atime),
        mtime: to_system_time(inode.mtime),
        ctime: to_system_time(inode.ctime),
        crtime: to_system_time(inode.ctime),
        kind,
        perm: inode.perm(),
        nlink: inode.links_count,
        uid: inode.uid as u32,
        gid: inode.gid as u32,
        rdev: 0,
        blksize: block_size,
        flags: 0,
    }
}

/// The `fuser::Filesystem` implementation mounted by the CLI's `mount` subcommand.
pub struct FuseBridge {
    engine: Mutex<Engine>,
    block_size: u32,
}

impl FuseBridge {
    pub fn new(engine: Engine, block_size: u32) -> Self {
        Self {
            engine: Mutex::new(engine),
            block_size,
        }
    }

}

impl Filesystem for FuseBridge {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let mut engine = self.engine.lock().unwrap();
        let name_bytes = match name.to_str() {
            Some(s) => s.as_bytes(),
            None => return reply.error(libc::EINVAL),
        };
        let mut parent_inode = match engine.getattr(parent as u32) {
            Ok(i) => i,
            Err(e) => return reply.error(e.to_errno()),
        };
        match crate::dirent::lookup(&mut *engine, &mut parent_inode, name_bytes) {
            Ok(Some(ino)) => match engine.getattr(ino) {
                Ok(inode) => reply.entry(&TTL, &to_file_attr(ino, &inode, self.block_size), 0),
                Err(e) => reply.error(e.to_errno()),
            },
            Ok(None) => reply.error(libc::ENOENT),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let mut engine = self.engine.lock().unwrap();
        match engine.getattr(ino as u32) {
            Ok(inode) => reply.attr(&TTL, &to_file_attr(ino as u32, &inode, self.block_size)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let mut engine = self.engine.lock().unwrap();
        if let Some(perm) = mode {
            if let Err(e) = engine.chmod(ino as u32, perm as u16) {
                return reply.error(e.to_errno());
            }
        }
        if let Some(new_size) = size {
            if let Err(e) = engine.truncate(ino as u32, new_size) {
                return reply.error(e.to_errno());
            }
        }
        match engine.getattr(ino as u32) {
            Ok(inode) => reply.attr(&TTL, &to_file_attr(ino as u32, &inode, self.block_size)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut engine = self.engine.lock().unwrap();
        match engine.read(ino as u32, offset as u64, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let mut engine = self.engine.lock().unwrap();
        match engine.write(ino as u32, offset as u64, data) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let mut engine = self.engine.lock().unwrap();
        match engine.open(ino as u32) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let name_bytes = match name.to_str() {
            Some(s) => s.as_bytes(),
            None => return reply.error(libc::EINVAL),
        };
        let mut engine = self.engine.lock().unwrap();
        match engine.create_in(parent as u32, name_bytes, mode as u16, _req.uid(), _req.gid()) {
            Ok(ino) => match engine.getattr(ino) {
                Ok(inode) => reply.created(&TTL, &to_file_attr(ino, &inode, self.block_size), 0, 0, 0),
                Err(e) => reply.error(e.to_errno()),
            },
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name_bytes = match name.to_str() {
            Some(s) => s.as_bytes(),
            None => return reply.error(libc::EINVAL),
        };
        let mut engine = self.engine.lock().unwrap();
        match engine.mkdir_in(parent as u32, name_bytes, mode as u16, req.uid(), req.gid()) {
            Ok(ino) => match engine.getattr(ino) {
                Ok(inode) => reply.entry(&TTL, &to_file_attr(ino, &inode, self.block_size), 0),
                Err(e) => reply.error(e.to_errno()),
            },
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_bytes = match name.to_str() {
            Some(s) => s.as_bytes(),
            None => return reply.error(libc::EINVAL),
        };
        let mut engine = self.engine.lock().unwrap();
        match engine.unlink_in(parent as u32, name_bytes) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_bytes = match name.to_str() {
            Some(s) => s.as_bytes(),
            None => return reply.error(libc::EINVAL),
        };
        let mut engine = self.engine.lock().unwrap();
        match engine.rmdir_in(parent as u32, name_bytes) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (old_bytes, new_bytes) = match (name.to_str(), newname.to_str()) {
            (Some(o), Some(n)) => (o.as_bytes(), n.as_bytes()),
            _ => return reply.error(libc::EINVAL),
        };
        let mut engine = self.engine.lock().unwrap();
        match engine.rename_in(parent as u32, old_bytes, newparent as u32, new_bytes) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let mut engine = self.engine.lock().unwrap();
        let entries = match engine.readdir(ino as u32) {
            Ok(e) => e,
            Err(e) => return reply.error(e.to_errno()),
        };
        for (i, (child_ino, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            let kind = match engine.getattr(child_ino) {
                Ok(inode) => match inode.kind() {
                    InodeKind::Directory => FileType::Directory,
                    InodeKind::Regular => FileType::RegularFile,
                },
                Err(_) => FileType::RegularFile,
            };
            let name = String::from_utf8_lossy(&name).into_owned();
            if reply.add(child_ino as u64, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }
}

impl From<FsError> for i32 {
    fn from(e: FsError) -> Self {
        e.to_errno()
    }
}
