//! Fixed-width directory entries.
//!
//! A directory's content blocks are simply arrays of 256-byte records: a 4-byte inode number, a
//! 2-byte name length, and 250 bytes of name, zero-padded. An inode number of 0 marks a tombstone
//! left behind by a removed entry; slots are reused by later inserts before the directory grows.

use crate::error::{FsError, FsResult};
use crate::inode::{resolve_block, BlockAlloc, Inode};

/// Size in bytes of one directory entry record.
pub const DIRENT_SIZE: usize = 256;
/// Maximum length, in bytes, of a single path component.
pub const NAME_MAX: usize = 250;

const INODE_OFF: usize = 0;
const NAME_LEN_OFF: usize = 4;
const NAME_OFF: usize = 6;

fn validate_name(name: &[u8]) -> FsResult<()> {
    if name.is_empty() || name.len() > NAME_MAX || name.contains(&b'/') {
        return Err(FsError::InvalidName);
    }
    Ok(())
}

fn encode(inode: u32, name: &[u8]) -> [u8; DIRENT_SIZE] {
    let mut buf = [0u8; DIRENT_SIZE];
    buf[INODE_OFF..INODE_OFF + 4].copy_from_slice(&inode.to_le_bytes());
    buf[NAME_LEN_OFF..NAME_LEN_OFF + 2].copy_from_slice(&(name.len() as u16).to_le_bytes());
    buf[NAME_OFF..NAME_OFF + name.len()].copy_from_slice(name);
    buf
}

fn decode(buf: &[u8]) -> (u32, &[u8]) {
    let inode = u32::from_le_bytes(buf[INODE_OFF..INODE_OFF + 4].try_into().unwrap());
    let name_len = u16::from_le_bytes(buf[NAME_LEN_OFF..NAME_LEN_OFF + 2].try_into().unwrap()) as usize;
    let name_len = name_len.min(NAME_MAX);
    (inode, &buf[NAME_OFF..NAME_OFF + name_len])
}

fn div_ceil_u64(a: u64, b: u64) -> u64 {
    if a == 0 {
        0
    } else {
        (a + b - 1) / b
    }
}

fn allocated_blocks(alloc: &impl BlockAlloc, inode: &Inode) -> u64 {
    div_ceil_u64(inode.size as u64, alloc_block_size(alloc) as u64)
}

fn alloc_block_size(alloc: &impl BlockAlloc) -> u32 {
    alloc.layout().block_size
}

/// Looks up `name` among a directory's entries, returning its inode number if present.
pub fn lookup(alloc: &mut impl BlockAlloc, dir: &mut Inode, name: &[u8]) -> FsResult<Option<u32>> {
    validate_name(name)?;
    let block_size = alloc.layout().block_size as usize;
    let entries_per_block = block_size / DIRENT_SIZE;
    let total_blocks = allocated_blocks(alloc, dir);

    for logical in 0..total_blocks {
        let Some(abs) = resolve_block(alloc, dir, logical as u32, false)? else {
            continue;
        };
        let buf = alloc.image().read_block(abs as u64)?;
        for slot in 0..entries_per_block {
            let off = slot * DIRENT_SIZE;
            let (ino, ename) = decode(&buf[off..off + DIRENT_SIZE]);
            if ino != 0 && ename == name {
                return Ok(Some(ino));
            }
        }
    }
    Ok(None)
}

/// Adds a `name -> inode` mapping to a directory, reusing a tombstoned slot if one exists and
/// growing the directory by one block otherwise.
///
/// Fails with [`FsError::Exists`] if `name` is already present.
pub fn insert(alloc: &mut impl BlockAlloc, dir: &mut Inode, inode: u32, name: &[u8]) -> FsResult<()> {
    validate_name(name)?;
    if lookup(alloc, dir, name)?.is_some() {
        return Err(FsError::Exists);
    }

    let block_size = alloc.layout().block_size as usize;
    let entries_per_block = block_size / DIRENT_SIZE;
    let total_blocks = allocated_blocks(alloc, dir);

    for logical in 0..total_blocks {
        let abs = resolve_block(alloc, dir, logical as u32, false)?.expect("allocated block missing");
        let mut buf = alloc.image().read_block(abs as u64)?;
        for slot in 0..entries_per_block {
            let off = slot * DIRENT_SIZE;
            let (ino, _) = decode(&buf[off..off + DIRENT_SIZE]);
            if ino == 0 {
                buf[off..off + DIRENT_SIZE].copy_from_slice(&encode(inode, name));
                alloc.image().write_block(abs as u64, &buf)?;
                return Ok(());
            }
        }
    }

    let abs = resolve_block(alloc, dir, total_blocks as u32, true)?.expect("just allocated");
    let mut buf = alloc.image().read_block(abs as u64)?;
    buf[0..DIRENT_SIZE].copy_from_slice(&encode(inode, name));
    alloc.image().write_block(abs as u64, &buf)?;
    dir.size += block_size as u32;
    Ok(())
}

/// Removes the entry named `name`, leaving a tombstone in its place.
///
/// Returns the removed entry's inode number, or `Ok(None)` if `name` was not present.
pub fn remove(alloc: &mut impl BlockAlloc, dir: &mut Inode, name: &[u8]) -> FsResult<Option<u32>> {
    validate_name(name)?;
    let block_size = alloc.layout().block_size as usize;
    let entries_per_block = block_size / DIRENT_SIZE;
    let total_blocks = allocated_blocks(alloc, dir);

    for logical in 0..total_blocks {
        let Some(abs) = resolve_block(alloc, dir, logical as u32, false)? else {
            continue;
        };
        let mut buf = alloc.image().read_block(abs as u64)?;
        for slot in 0..entries_per_block {
            let off = slot * DIRENT_SIZE;
            let (ino, ename) = decode(&buf[off..off + DIRENT_SIZE]);
            if ino != 0 && ename == name {
                buf[off..off + DIRENT_SIZE].copy_from_slice(&[0u8; DIRENT_SIZE]);
                alloc.image().write_block(abs as u64, &buf)?;
                return Ok(Some(ino));
            }
        }
    }
    Ok(None)
}

/// Lists every live (non-tombstone) entry in a directory.
pub fn enumerate(alloc: &mut impl BlockAlloc, dir: &mut Inode) -> FsResult<Vec<(u32, Vec<u8>)>> {
    let block_size = alloc.layout().block_size as usize;
    let entries_per_block = block_size / DIRENT_SIZE;
    let total_blocks = allocated_blocks(alloc, dir);
    let mut out = Vec::new();

    for logical in 0..total_blocks {
        let Some(abs) = resolve_block(alloc, dir, logical as u32, false)? else {
            continue;
        };
        let buf = alloc.image().read_block(abs as u64)?;
        for slot in 0..entries_per_block {
            let off = slot * DIRENT_SIZE;
            let (ino, ename) = decode(&buf[off..off + DIRENT_SIZE]);
            if ino != 0 {
                out.push((ino, ename.to_vec()));
            }
        }
    }
    Ok(out)
}

/// Tells whether a directory contains nothing but `.` and `..`.
pub fn is_empty(alloc: &mut impl BlockAlloc, dir: &mut Inode) -> FsResult<bool> {
    let entries = enumerate(alloc, dir)?;
    Ok(entries.iter().all(|(_, name)| name == b"." || name == b".."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let raw = encode(7, b"hello.txt");
        let (ino, name) = decode(&raw);
        assert_eq!(ino, 7);
        assert_eq!(name, b"hello.txt");
    }

    #[test]
    fn rejects_bad_names() {
        assert!(validate_name(b"").is_err());
        assert!(validate_name(b"a/b").is_err());
        assert!(validate_name(&vec![b'a'; NAME_MAX + 1]).is_err());
        assert!(validate_name(b"ok").is_ok());
    }
}
