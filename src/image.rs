//! Fixed-size block I/O on top of a single host file.
//!
//! This is the bottom of the stack: every other component reads and writes the image exclusively
//! through [`Image::read_block`] and [`Image::write_block`]. Partial-block access does not exist
//! below this layer; callers wanting to modify part of a block must read it, mutate the buffer,
//! and write the whole block back.

use crate::error::{FsError, FsResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A block-addressable view of a single backing file.
#[derive(Debug)]
pub struct Image {
    file: File,
    block_size: u32,
    block_count: u64,
}

impl Image {
    /// Opens an existing image file for read-write access.
    ///
    /// `block_size` and `block_count` describe the total addressable range; they are supplied by
    /// the caller (the superblock, once read) rather than inferred from the file's length, since
    /// [`Image`] itself has no notion of a superblock.
    pub fn open<P: AsRef<Path>>(path: P, block_size: u32, block_count: u64) -> FsResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            block_size,
            block_count,
        })
    }

    /// Creates a new image file of the given total block count, truncating it if it already
    /// exists.
    pub fn create<P: AsRef<Path>>(path: P, block_size: u32, block_count: u64) -> FsResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(block_size as u64 * block_count)?;
        Ok(Self {
            file,
            block_size,
            block_count,
        })
    }

    /// Returns the configured block size in bytes.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Returns the total number of addressable blocks.
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    fn check_bounds(&self, index: u64) -> FsResult<()> {
        if index >= self.block_count {
            return Err(FsError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("block {index} out of bounds ({} blocks total)", self.block_count),
            )));
        }
        Ok(())
    }

    /// Reads the block at index `index`, returning exactly `block_size` bytes.
    pub fn read_block(&mut self, index: u64) -> FsResult<Vec<u8>> {
        self.check_bounds(index)?;
        let mut buf = vec![0u8; self.block_size as usize];
        self.file.seek(SeekFrom::Start(index * self.block_size as u64))?;
        self.file.read_exact(&mut buf)?;
        log::trace!("read block {index}");
        Ok(buf)
    }

    /// Writes `data` (exactly `block_size` bytes) to the block at index `index`.
    pub fn write_block(&mut self, index: u64, data: &[u8]) -> FsResult<()> {
        self.check_bounds(index)?;
        debug_assert_eq!(data.len(), self.block_size as usize);
        self.file.seek(SeekFrom::Start(index * self.block_size as u64))?;
        self.file.write_all(data)?;
        log::trace!("wrote block {index}");
        Ok(())
    }

    /// Flushes any host-level buffering to the backing file.
    pub fn sync(&mut self) -> FsResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_sizes_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let image = Image::create(tmp.path(), 512, 10).unwrap();
        drop(image);
        assert_eq!(tmp.path().metadata().unwrap().len(), 512 * 10);
    }

    #[test]
    fn write_then_read_roundtrip() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut image = Image::create(tmp.path(), 512, 4).unwrap();
        let mut data = vec![0u8; 512];
        data[0] = 0xAB;
        data[511] = 0xCD;
        image.write_block(2, &data).unwrap();
        let read = image.read_block(2).unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn out_of_bounds_fails() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut image = Image::create(tmp.path(), 512, 4).unwrap();
        assert!(image.read_block(4).is_err());
        assert!(image.write_block(100, &vec![0; 512]).is_err());
    }
}
