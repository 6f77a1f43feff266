//! The storage engine: bitmap-backed allocation, the inode table, and the directory-tree
//! operations built on top of them.
//!
//! `Engine` owns the image and both bitmaps and is the sole point through which every other
//! component touches the disk image. The FUSE bridge (see `fuse_bridge.rs`) holds one behind a
//! mutex and translates kernel requests into calls here.

use crate::bitmap::Bitmap;
use crate::dirent;
use crate::error::{FsError, FsResult};
use crate::image::Image;
use crate::inode::{self, resolve_block, BlockAlloc, Inode, InodeKind};
use crate::superblock::{Layout, Superblock, ROOT_INODE};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn split_components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// The mounted filesystem: image, superblock and both bitmaps.
pub struct Engine {
    image: Image,
    sb: Superblock,
    inode_bitmap: Bitmap,
    block_bitmap: Bitmap,
}

impl BlockAlloc for Engine {
    fn alloc_block(&mut self) -> FsResult<u32> {
        let relative = self
            .block_bitmap
            .alloc(&mut self.image)?
            .ok_or(FsError::NoSpace)?;
        self.sb.free_blocks -= 1;
        self.sb.flush(&mut self.image)?;
        Ok(self.sb.layout.data_block(relative) as u32)
    }

    fn free_block(&mut self, absolute: u32) -> FsResult<()> {
        self.sb.layout.check_block(absolute)?;
        let relative = self.sb.layout.to_relative(absolute);
        if self.block_bitmap.free(&mut self.image, relative)? {
            self.sb.free_blocks += 1;
            self.sb.flush(&mut self.image)?;
        }
        Ok(())
    }

    fn image(&mut self) -> &mut Image {
        &mut self.image
    }

    fn layout(&self) -> &Layout {
        &self.sb.layout
    }
}

impl Engine {
    fn inode_location(&self, ino: u32) -> (u64, usize) {
        let index = ino - 1;
        let per_block = self.sb.layout.block_size / crate::superblock::INODE_SIZE;
        let block = self.sb.layout.inode_table_start + (index / per_block) as u64;
        let offset = (index % per_block) as usize * crate::superblock::INODE_SIZE as usize;
        (block, offset)
    }

    pub fn read_inode(&mut self, ino: u32) -> FsResult<Inode> {
        let (block, offset) = self.inode_location(ino);
        let buf = self.image.read_block(block)?;
        Ok(Inode::from_bytes(&buf[offset..offset + crate::superblock::INODE_SIZE as usize]))
    }

    pub fn write_inode(&mut self, ino: u32, inode: &Inode) -> FsResult<()> {
        let (block, offset) = self.inode_location(ino);
        let mut buf = self.image.read_block(block)?;
        buf[offset..offset + crate::superblock::INODE_SIZE as usize].copy_from_slice(&inode.to_bytes());
        self.image.write_block(block, &buf)
    }

    fn alloc_inode(&mut self) -> FsResult<u32> {
        let relative = self
            .inode_bitmap
            .alloc(&mut self.image)?
            .ok_or(FsError::NoSpace)?;
        self.sb.free_inodes -= 1;
        self.sb.flush(&mut self.image)?;
        Ok(relative + 1)
    }

    fn free_inode(&mut self, ino: u32) -> FsResult<()> {
        let relative = ino - 1;
        if self.inode_bitmap.free(&mut self.image, relative)? {
            self.sb.free_inodes += 1;
            self.sb.flush(&mut self.image)?;
        }
        Ok(())
    }

    /// Initializes a fresh image: superblock, empty bitmaps, and a root directory containing
    /// `.` and `..`.
    pub fn format<P: AsRef<Path>>(
        path: P,
        block_size: u32,
        block_count: u32,
        inode_count: u32,
    ) -> FsResult<()> {
        let layout = Layout::new(block_size, block_count, inode_count);
        let mut image = Image::create(path, block_size, layout.total_blocks)?;
        let sb = Superblock::fresh(block_size, block_count, inode_count);
        sb.flush(&mut image)?;

        let inode_bitmap = Bitmap::load(
            &mut image,
            layout.inode_bitmap_start,
            layout.inode_bitmap_blocks,
            inode_count,
        )?;
        let block_bitmap = Bitmap::load(
            &mut image,
            layout.block_bitmap_start,
            layout.block_bitmap_blocks,
            block_count,
        )?;

        let mut engine = Self {
            image,
            sb,
            inode_bitmap,
            block_bitmap,
        };

        engine.inode_bitmap.mark_used(&mut engine.image, ROOT_INODE - 1)?;
        engine.sb.free_inodes -= 1;
        engine.sb.flush(&mut engine.image)?;

        let now = now_secs();
        let mut root = Inode::new(InodeKind::Directory, 0o755, 0, 0, now);
        root.links_count = 2;
        dirent::insert(&mut engine, &mut root, ROOT_INODE, b".")?;
        dirent::insert(&mut engine, &mut root, ROOT_INODE, b"..")?;
        engine.write_inode(ROOT_INODE, &root)?;

        engine.image.sync()?;
        log::info!(
            "formatted image: {} blocks of {} bytes, {} inodes",
            block_count, block_size, inode_count
        );
        Ok(())
    }

    /// Opens an already-formatted image.
    pub fn mount<P: AsRef<Path>>(path: P) -> FsResult<Self> {
        let path = path.as_ref();
        let (block_size, block_count, inode_count) = Superblock::peek_header(path)?;
        let probe = Layout::new(block_size, block_count, inode_count);
        let mut image = Image::open(path, block_size, probe.total_blocks)?;

        let sb_buf = image.read_block(0)?;
        let sb = Superblock::from_bytes(&sb_buf)?;

        let inode_bitmap = Bitmap::load(
            &mut image,
            sb.layout.inode_bitmap_start,
            sb.layout.inode_bitmap_blocks,
            sb.layout.inode_count,
        )?;
        let block_bitmap = Bitmap::load(
            &mut image,
            sb.layout.block_bitmap_start,
            sb.layout.block_bitmap_blocks,
            sb.layout.block_count,
        )?;

        log::info!("mounted image with {} free blocks, {} free inodes", sb.free_blocks, sb.free_inodes);
        Ok(Self {
            image,
            sb,
            inode_bitmap,
            block_bitmap,
        })
    }

    /// Resolves an absolute, `/`-separated path to an inode number.
    pub fn resolve(&mut self, path: &str) -> FsResult<u32> {
        let mut current = ROOT_INODE;
        for comp in split_components(path) {
            let mut dir = self.read_inode(current)?;
            if !dir.is_dir() {
                return Err(FsError::NotADirectory);
            }
            current = dirent::lookup(self, &mut dir, comp.as_bytes())?.ok_or(FsError::NotFound)?;
        }
        Ok(current)
    }

    /// Resolves the parent directory and final component name of a path, without requiring the
    /// final component itself to exist.
    pub fn resolve_parent(&mut self, path: &str) -> FsResult<(u32, Vec<u8>)> {
        let comps = split_components(path);
        let (last, rest) = comps.split_last().ok_or(FsError::InvalidName)?;
        let mut current = ROOT_INODE;
        for comp in rest {
            let mut dir = self.read_inode(current)?;
            if !dir.is_dir() {
                return Err(FsError::NotADirectory);
            }
            current = dirent::lookup(self, &mut dir, comp.as_bytes())?.ok_or(FsError::NotFound)?;
        }
        Ok((current, last.as_bytes().to_vec()))
    }

    pub fn getattr(&mut self, ino: u32) -> FsResult<Inode> {
        self.read_inode(ino)
    }

    pub fn block_size(&self) -> u32 {
        self.sb.layout.block_size
    }

    /// Resolves `ino` and verifies it names a regular file.
    pub fn open(&mut self, ino: u32) -> FsResult<()> {
        let inode = self.read_inode(ino)?;
        if inode.is_dir() {
            return Err(FsError::IsDirectory);
        }
        Ok(())
    }

    /// Looks up `name` directly under the directory named by `parent_ino`.
    pub fn lookup_in(&mut self, parent_ino: u32, name: &[u8]) -> FsResult<Option<u32>> {
        let mut parent = self.read_inode(parent_ino)?;
        if !parent.is_dir() {
            return Err(FsError::NotADirectory);
        }
        dirent::lookup(self, &mut parent, name)
    }

    pub fn create_in(&mut self, parent_ino: u32, name: &[u8], perm: u16, uid: u32, gid: u32) -> FsResult<u32> {
        let mut parent = self.read_inode(parent_ino)?;
        if !parent.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if dirent::lookup(self, &mut parent, name)?.is_some() {
            return Err(FsError::Exists);
        }

        let new_ino = self.alloc_inode()?;
        let mut file = Inode::new(InodeKind::Regular, perm, uid, gid, now_secs());
        file.links_count = 1;
        self.write_inode(new_ino, &file)?;

        dirent::insert(self, &mut parent, new_ino, name)?;
        self.write_inode(parent_ino, &parent)?;
        Ok(new_ino)
    }

    pub fn mkdir_in(&mut self, parent_ino: u32, name: &[u8], perm: u16, uid: u32, gid: u32) -> FsResult<u32> {
        let mut parent = self.read_inode(parent_ino)?;
        if !parent.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if dirent::lookup(self, &mut parent, name)?.is_some() {
            return Err(FsError::Exists);
        }

        let new_ino = self.alloc_inode()?;
        let mut dir = Inode::new(InodeKind::Directory, perm, uid, gid, now_secs());
        dir.links_count = 2;
        dirent::insert(self, &mut dir, new_ino, b".")?;
        dirent::insert(self, &mut dir, parent_ino, b"..")?;
        self.write_inode(new_ino, &dir)?;

        dirent::insert(self, &mut parent, new_ino, name)?;
        parent.links_count += 1;
        self.write_inode(parent_ino, &parent)?;
        Ok(new_ino)
    }

    pub fn unlink_in(&mut self, parent_ino: u32, name: &[u8]) -> FsResult<()> {
        let mut parent = self.read_inode(parent_ino)?;
        let target_ino = dirent::lookup(self, &mut parent, name)?.ok_or(FsError::NotFound)?;
        let mut target = self.read_inode(target_ino)?;
        if target.is_dir() {
            return Err(FsError::IsDirectory);
        }

        dirent::remove(self, &mut parent, name)?;
        self.write_inode(parent_ino, &parent)?;

        target.links_count = target.links_count.saturating_sub(1);
        if target.links_count == 0 {
            inode::free_from_logical(self, &mut target, 0)?;
            self.free_inode(target_ino)?;
        } else {
            self.write_inode(target_ino, &target)?;
        }
        Ok(())
    }

    pub fn rmdir_in(&mut self, parent_ino: u32, name: &[u8]) -> FsResult<()> {
        let mut parent = self.read_inode(parent_ino)?;
        let target_ino = dirent::lookup(self, &mut parent, name)?.ok_or(FsError::NotFound)?;
        let mut target = self.read_inode(target_ino)?;
        if !target.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if !dirent::is_empty(self, &mut target)? {
            return Err(FsError::NotEmpty);
        }

        dirent::remove(self, &mut parent, name)?;
        parent.links_count = parent.links_count.saturating_sub(1);
        self.write_inode(parent_ino, &parent)?;

        inode::free_from_logical(self, &mut target, 0)?;
        self.free_inode(target_ino)?;
        Ok(())
    }

    pub fn create(&mut self, path: &str, perm: u16, uid: u32, gid: u32) -> FsResult<u32> {
        let (parent_ino, name) = self.resolve_parent(path)?;
        self.create_in(parent_ino, &name, perm, uid, gid)
    }

    pub fn mkdir(&mut self, path: &str, perm: u16, uid: u32, gid: u32) -> FsResult<u32> {
        let (parent_ino, name) = self.resolve_parent(path)?;
        self.mkdir_in(parent_ino, &name, perm, uid, gid)
    }

    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        let (parent_ino, name) = self.resolve_parent(path)?;
        self.unlink_in(parent_ino, &name)
    }

    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let (parent_ino, name) = self.resolve_parent(path)?;
        self.rmdir_in(parent_ino, &name)
    }

    pub fn read(&mut self, ino: u32, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        let mut file = self.read_inode(ino)?;
        if file.is_dir() {
            return Err(FsError::IsDirectory);
        }
        let block_size = self.sb.layout.block_size as u64;
        let mut out = Vec::new();
        if offset >= file.size as u64 {
            return Ok(out);
        }
        let end = (offset + size as u64).min(file.size as u64);
        let mut pos = offset;
        while pos < end {
            let logical = (pos / block_size) as u32;
            let in_block_off = (pos % block_size) as usize;
            let chunk_len = ((end - pos).min(block_size - in_block_off as u64)) as usize;
            match resolve_block(self, &mut file, logical, false)? {
                Some(abs) => {
                    let buf = self.image.read_block(abs as u64)?;
                    out.extend_from_slice(&buf[in_block_off..in_block_off + chunk_len]);
                }
                None => out.extend(std::iter::repeat(0u8).take(chunk_len)),
            }
            pos += chunk_len as u64;
        }
        Ok(out)
    }

    pub fn write(&mut self, ino: u32, offset: u64, data: &[u8]) -> FsResult<u32> {
        let mut file = self.read_inode(ino)?;
        if file.is_dir() {
            return Err(FsError::IsDirectory);
        }
        let block_size = self.sb.layout.block_size as u64;
        let end = offset + data.len() as u64;
        if end > u32::MAX as u64 {
            return Err(FsError::TooLarge);
        }
        let mut pos = offset;
        let mut written = 0usize;
        while pos < end {
            let logical = (pos / block_size) as u32;
            let in_block_off = (pos % block_size) as usize;
            let chunk_len = ((end - pos).min(block_size - in_block_off as u64)) as usize;
            let abs = resolve_block(self, &mut file, logical, true)?.expect("create always allocates");
            let mut buf = self.image.read_block(abs as u64)?;
            buf[in_block_off..in_block_off + chunk_len]
                .copy_from_slice(&data[written..written + chunk_len]);
            self.image.write_block(abs as u64, &buf)?;
            pos += chunk_len as u64;
            written += chunk_len;
        }
        if end as u32 > file.size {
            file.size = end as u32;
        }
        file.mtime = now_secs();
        self.write_inode(ino, &file)?;
        Ok(written as u32)
    }

    pub fn truncate(&mut self, ino: u32, new_size: u64) -> FsResult<()> {
        let mut file = self.read_inode(ino)?;
        if file.is_dir() {
            return Err(FsError::IsDirectory);
        }
        if new_size > u32::MAX as u64 {
            return Err(FsError::TooLarge);
        }
        let new_size = new_size as u32;
        let block_size = self.sb.layout.block_size;

        if new_size < file.size {
            let tail = new_size % block_size;
            let from_logical = new_size / block_size + if tail != 0 { 1 } else { 0 };
            inode::free_from_logical(self, &mut file, from_logical)?;

            if tail != 0 {
                let last_logical = new_size / block_size;
                if let Some(abs) = resolve_block(self, &mut file, last_logical, false)? {
                    let mut buf = self.image.read_block(abs as u64)?;
                    for b in buf[tail as usize..].iter_mut() {
                        *b = 0;
                    }
                    self.image.write_block(abs as u64, &buf)?;
                }
            }
        }

        file.size = new_size;
        file.mtime = now_secs();
        self.write_inode(ino, &file)
    }

    pub fn chmod(&mut self, ino: u32, perm: u16) -> FsResult<()> {
        let mut inode = self.read_inode(ino)?;
        inode.mode = (inode.mode & 0xF000) | (perm & !0xF000);
        inode.ctime = now_secs();
        self.write_inode(ino, &inode)
    }

    pub fn readdir(&mut self, ino: u32) -> FsResult<Vec<(u32, Vec<u8>)>> {
        let mut dir = self.read_inode(ino)?;
        if !dir.is_dir() {
            return Err(FsError::NotADirectory);
        }
        dirent::enumerate(self, &mut dir)
    }

    fn replace_directory_entry_target(
        &mut self,
        existing_ino: u32,
        target_is_dir: bool,
        parent: &mut Inode,
        name: &[u8],
    ) -> FsResult<()> {
        let mut existing = self.read_inode(existing_ino)?;
        if existing.is_dir() != target_is_dir {
            return Err(FsError::IsDirectory);
        }
        if existing.is_dir() && !dirent::is_empty(self, &mut existing)? {
            return Err(FsError::NotEmpty);
        }
        dirent::remove(self, parent, name)?;
        existing.links_count = existing.links_count.saturating_sub(1);
        if existing.links_count == 0 {
            inode::free_from_logical(self, &mut existing, 0)?;
            self.free_inode(existing_ino)?;
        } else {
            self.write_inode(existing_ino, &existing)?;
        }
        Ok(())
    }

    pub fn rename(&mut self, old_path: &str, new_path: &str) -> FsResult<()> {
        let (old_parent_ino, old_name) = self.resolve_parent(old_path)?;
        let (new_parent_ino, new_name) = self.resolve_parent(new_path)?;
        self.rename_in(old_parent_ino, &old_name, new_parent_ino, &new_name)
    }

    pub fn rename_in(
        &mut self,
        old_parent_ino: u32,
        old_name: &[u8],
        new_parent_ino: u32,
        new_name: &[u8],
    ) -> FsResult<()> {
        let mut old_parent = self.read_inode(old_parent_ino)?;
        let target_ino = dirent::lookup(self, &mut old_parent, old_name)?.ok_or(FsError::NotFound)?;
        let target_is_dir = self.read_inode(target_ino)?.is_dir();

        let mut new_parent = self.read_inode(new_parent_ino)?;
        if let Some(existing_ino) = dirent::lookup(self, &mut new_parent, new_name)? {
            if existing_ino != target_ino {
                self.replace_directory_entry_target(existing_ino, target_is_dir, &mut new_parent, new_name)?;
            }
        }

        dirent::remove(self, &mut old_parent, old_name)?;
        self.write_inode(old_parent_ino, &old_parent)?;
        dirent::insert(self, &mut new_parent, target_ino, new_name)?;

        let mut target = self.read_inode(target_ino)?;
        if target.is_dir() && new_parent_ino != old_parent_ino {
            dirent::remove(self, &mut target, b"..")?;
            dirent::insert(self, &mut target, new_parent_ino, b"..")?;
            self.write_inode(target_ino, &target)?;

            old_parent.links_count = old_parent.links_count.saturating_sub(1);
            new_parent.links_count += 1;
            self.write_inode(old_parent_ino, &old_parent)?;
        }
        self.write_inode(new_parent_ino, &new_parent)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::NamedTempFile, Engine) {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        Engine::format(tmp.path(), 512, 64, 32).unwrap();
        let engine = Engine::mount(tmp.path()).unwrap();
        (tmp, engine)
    }

    #[test]
    fn format_creates_root_with_dot_entries() {
        let (_tmp, mut engine) = setup();
        let entries = engine.readdir(ROOT_INODE).unwrap();
        let names: Vec<_> = entries.iter().map(|(_, n)| n.as_slice()).collect();
        assert!(names.contains(&b".".as_slice()));
        assert!(names.contains(&b"..".as_slice()));
    }

    #[test]
    fn create_write_read_roundtrip() {
        let (_tmp, mut engine) = setup();
        let ino = engine.create("/hello.txt", 0o644, 0, 0).unwrap();
        let written = engine.write(ino, 0, b"hello world").unwrap();
        assert_eq!(written, 11);
        let data = engine.read(ino, 0, 11).unwrap();
        assert_eq!(&data, b"hello world");
    }

    #[test]
    fn write_spanning_multiple_blocks() {
        let (_tmp, mut engine) = setup();
        let ino = engine.create("/big.bin", 0o644, 0, 0).unwrap();
        let data = vec![0xAAu8; 1500];
        engine.write(ino, 0, &data).unwrap();
        let read_back = engine.read(ino, 0, 1500).unwrap();
        assert_eq!(read_back, data);
    }

    #[test]
    fn sparse_read_returns_zeros() {
        let (_tmp, mut engine) = setup();
        let ino = engine.create("/sparse.bin", 0o644, 0, 0).unwrap();
        engine.write(ino, 1000, b"end").unwrap();
        let data = engine.read(ino, 0, 1003).unwrap();
        assert_eq!(data.len(), 1003);
        assert!(data[0..1000].iter().all(|&b| b == 0));
        assert_eq!(&data[1000..1003], b"end");
    }

    #[test]
    fn truncate_grow_reads_as_zero() {
        let (_tmp, mut engine) = setup();
        let ino = engine.create("/grow.bin", 0o644, 0, 0).unwrap();
        engine.write(ino, 0, b"abc").unwrap();
        engine.truncate(ino, 10).unwrap();
        let data = engine.read(ino, 0, 10).unwrap();
        assert_eq!(&data[0..3], b"abc");
        assert!(data[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn truncate_shrink_frees_blocks() {
        let (_tmp, mut engine) = setup();
        let ino = engine.create("/shrink.bin", 0o644, 0, 0).unwrap();
        engine.write(ino, 0, &vec![1u8; 2000]).unwrap();
        let free_before = engine.sb.free_blocks;
        engine.truncate(ino, 10).unwrap();
        assert!(engine.sb.free_blocks > free_before);
        let data = engine.read(ino, 0, 10).unwrap();
        assert_eq!(data, vec![1u8; 10]);
    }

    #[test]
    fn mkdir_and_nested_create() {
        let (_tmp, mut engine) = setup();
        engine.mkdir("/sub", 0o755, 0, 0).unwrap();
        let ino = engine.create("/sub/file.txt", 0o644, 0, 0).unwrap();
        let resolved = engine.resolve("/sub/file.txt").unwrap();
        assert_eq!(resolved, ino);
    }

    #[test]
    fn unlink_frees_inode_and_blocks() {
        let (_tmp, mut engine) = setup();
        let ino = engine.create("/doomed.txt", 0o644, 0, 0).unwrap();
        engine.write(ino, 0, b"data").unwrap();
        let free_inodes_before = engine.sb.free_inodes;
        engine.unlink("/doomed.txt").unwrap();
        assert_eq!(engine.sb.free_inodes, free_inodes_before + 1);
        assert!(matches!(engine.resolve("/doomed.txt"), Err(FsError::NotFound)));
    }

    #[test]
    fn rmdir_refuses_non_empty() {
        let (_tmp, mut engine) = setup();
        engine.mkdir("/sub", 0o755, 0, 0).unwrap();
        engine.create("/sub/file.txt", 0o644, 0, 0).unwrap();
        assert!(matches!(engine.rmdir("/sub"), Err(FsError::NotEmpty)));
    }

    #[test]
    fn rename_moves_across_directories() {
        let (_tmp, mut engine) = setup();
        engine.mkdir("/a", 0o755, 0, 0).unwrap();
        engine.mkdir("/b", 0o755, 0, 0).unwrap();
        let ino = engine.create("/a/file.txt", 0o644, 0, 0).unwrap();
        engine.rename("/a/file.txt", "/b/file.txt").unwrap();
        assert!(matches!(engine.resolve("/a/file.txt"), Err(FsError::NotFound)));
        assert_eq!(engine.resolve("/b/file.txt").unwrap(), ino);
    }

    #[test]
    fn open_rejects_directories() {
        let (_tmp, mut engine) = setup();
        let ino = engine.create("/file.txt", 0o644, 0, 0).unwrap();
        assert!(engine.open(ino).is_ok());
        engine.mkdir("/dir", 0o755, 0, 0).unwrap();
        let dir_ino = engine.resolve("/dir").unwrap();
        assert!(matches!(engine.open(dir_ino), Err(FsError::IsDirectory)));
    }

    #[test]
    fn rename_onto_mismatched_kind_fails() {
        let (_tmp, mut engine) = setup();
        engine.mkdir("/adir", 0o755, 0, 0).unwrap();
        engine.create("/afile.txt", 0o644, 0, 0).unwrap();
        assert!(matches!(
            engine.rename("/afile.txt", "/adir"),
            Err(FsError::IsDirectory)
        ));
        engine.mkdir("/anotherdir", 0o755, 0, 0).unwrap();
        assert!(matches!(
            engine.rename("/anotherdir", "/afile.txt"),
            Err(FsError::IsDirectory)
        ));
    }

    #[test]
    fn write_past_direct_blocks_allocates_single_indirect() {
        let (_tmp, mut engine) = setup();
        let ino = engine.create("/indirect.bin", 0o644, 0, 0).unwrap();
        let block_size = engine.block_size() as usize;
        let direct_capacity = inode::DIRECT_COUNT * block_size;
        let data = vec![0x5Au8; direct_capacity + block_size * 3 + 17];
        engine.write(ino, 0, &data).unwrap();

        let stored = engine.read_inode(ino).unwrap();
        assert_ne!(stored.single_indirect, 0);

        let read_back = engine.read(ino, 0, data.len() as u32).unwrap();
        assert_eq!(read_back, data);
    }

    #[test]
    fn truncate_shrinks_back_across_indirect_boundary() {
        let (_tmp, mut engine) = setup();
        let ino = engine.create("/shrink_indirect.bin", 0o644, 0, 0).unwrap();
        let block_size = engine.block_size() as usize;
        let direct_capacity = inode::DIRECT_COUNT * block_size;
        let data: Vec<u8> = (0..(direct_capacity + block_size * 2))
            .map(|i| (i % 256) as u8)
            .collect();
        engine.write(ino, 0, &data).unwrap();
        let stored = engine.read_inode(ino).unwrap();
        assert_ne!(stored.single_indirect, 0);

        let free_before = engine.sb.free_blocks;
        engine.truncate(ino, 100).unwrap();

        let stored = engine.read_inode(ino).unwrap();
        assert_eq!(stored.single_indirect, 0);
        assert!(engine.sb.free_blocks > free_before);

        let read_back = engine.read(ino, 0, 100).unwrap();
        assert_eq!(&read_back[..], &data[..100]);
    }

    #[test]
    fn no_space_when_blocks_exhausted() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        Engine::format(tmp.path(), 512, 20, 16).unwrap();
        let mut engine = Engine::mount(tmp.path()).unwrap();
        let ino = engine.create("/f", 0o644, 0, 0).unwrap();
        let big = vec![0u8; 512 * 32];
        assert!(matches!(engine.write(ino, 0, &big), Err(FsError::NoSpace)));
    }

    #[test]
    fn persists_across_remount() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        Engine::format(tmp.path(), 512, 64, 32).unwrap();
        {
            let mut engine = Engine::mount(tmp.path()).unwrap();
            let ino = engine.create("/persisted.txt", 0o644, 0, 0).unwrap();
            engine.write(ino, 0, b"still here").unwrap();
        }
        let mut engine = Engine::mount(tmp.path()).unwrap();
        let ino = engine.resolve("/persisted.txt").unwrap();
        let data = engine.read(ino, 0, 10).unwrap();
        assert_eq!(&data, b"still here");
    }
}
