//! The on-image superblock and the derived block layout.
//!
//! The superblock occupies block 0 in full. Only a handful of fields are meaningful; the
//! remainder of the block is reserved and always written back as zero.

use crate::error::{FsError, FsResult};
use crate::image::Image;

/// 8-byte literal identifying the image format. Mounting a file whose first 8 bytes differ fails
/// with [`FsError::BadImage`].
pub const MAGIC: &[u8; 8] = b"BLKFS1\0\0";

/// Size in bytes of a fixed inode record (§3).
pub const INODE_SIZE: u32 = 128;

/// The root directory's inode number. Never freed.
pub const ROOT_INODE: u32 = 1;

const HEADER_LEN: usize = 8 + 4 * 5;

fn div_ceil_u64(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// The block layout derived from block size, block count and inode count.
///
/// This is not stored on disk separately from the three counts it is computed from; any mount
/// recomputes it from the superblock's `inode_count`, `block_count` and `block_size` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub block_size: u32,
    pub inode_count: u32,
    pub block_count: u32,
    pub inode_bitmap_blocks: u32,
    pub block_bitmap_blocks: u32,
    pub inode_table_blocks: u32,
    pub inode_bitmap_start: u64,
    pub block_bitmap_start: u64,
    pub inode_table_start: u64,
    pub data_start: u64,
    /// Total number of blocks the image must contain, including block 0.
    pub total_blocks: u64,
}

impl Layout {
    pub fn new(block_size: u32, block_count: u32, inode_count: u32) -> Self {
        let bits_per_block = block_size as u64 * 8;
        let inode_bitmap_blocks = div_ceil_u64(inode_count as u64, bits_per_block) as u32;
        let block_bitmap_blocks = div_ceil_u64(block_count as u64, bits_per_block) as u32;
        let inode_table_blocks =
            div_ceil_u64(inode_count as u64 * INODE_SIZE as u64, block_size as u64) as u32;

        let inode_bitmap_start = 1;
        let block_bitmap_start = inode_bitmap_start + inode_bitmap_blocks as u64;
        let inode_table_start = block_bitmap_start + block_bitmap_blocks as u64;
        let data_start = inode_table_start + inode_table_blocks as u64;
        let total_blocks = data_start + block_count as u64;

        Self {
            block_size,
            inode_count,
            block_count,
            inode_bitmap_blocks,
            block_bitmap_blocks,
            inode_table_blocks,
            inode_bitmap_start,
            block_bitmap_start,
            inode_table_start,
            data_start,
            total_blocks,
        }
    }

    /// Returns the number of 4-byte block pointers that fit in one block.
    pub fn pointers_per_block(&self) -> u32 {
        self.block_size / 4
    }

    /// Converts a data-block-region-relative index into an absolute image block index.
    pub fn data_block(&self, relative: u32) -> u64 {
        self.data_start + relative as u64
    }

    /// Converts an absolute image block index back into a data-region-relative index.
    ///
    /// Panics if `absolute` does not lie in the data region; callers validate via
    /// [`Layout::check_block`] first.
    pub fn to_relative(&self, absolute: u32) -> u32 {
        (absolute as u64 - self.data_start) as u32
    }

    /// Validates that `absolute` is a valid, in-range data block index.
    pub fn check_block(&self, absolute: u32) -> FsResult<()> {
        if (absolute as u64) < self.data_start || (absolute as u64) >= self.total_blocks {
            return Err(FsError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "block pointer out of range",
            )));
        }
        Ok(())
    }
}

/// The in-memory superblock: the handful of persisted counters, plus the derived [`Layout`].
#[derive(Debug)]
pub struct Superblock {
    pub free_blocks: u32,
    pub free_inodes: u32,
    pub layout: Layout,
}

impl Superblock {
    /// Builds a fresh superblock for a newly formatted image with every block and inode free,
    /// before the root directory is carved out.
    pub fn fresh(block_size: u32, block_count: u32, inode_count: u32) -> Self {
        Self {
            free_blocks: block_count,
            free_inodes: inode_count,
            layout: Layout::new(block_size, block_count, inode_count),
        }
    }

    /// Serializes the superblock into exactly `block_size` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.layout.block_size as usize];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&self.layout.inode_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.layout.block_count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.layout.block_size.to_le_bytes());
        buf[20..24].copy_from_slice(&self.free_blocks.to_le_bytes());
        buf[24..28].copy_from_slice(&self.free_inodes.to_le_bytes());
        buf
    }

    /// Parses a superblock out of a raw block-0 buffer.
    ///
    /// Fails with [`FsError::BadImage`] if the magic header does not match.
    pub fn from_bytes(buf: &[u8]) -> FsResult<Self> {
        if buf.len() < HEADER_LEN || &buf[0..8] != MAGIC {
            return Err(FsError::BadImage);
        }
        let inode_count = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let block_count = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        let block_size = u32::from_le_bytes(buf[16..20].try_into().unwrap());
        let free_blocks = u32::from_le_bytes(buf[20..24].try_into().unwrap());
        let free_inodes = u32::from_le_bytes(buf[24..28].try_into().unwrap());
        Ok(Self {
            free_blocks,
            free_inodes,
            layout: Layout::new(block_size, block_count, inode_count),
        })
    }

    /// Reads the raw 8-byte magic header plus the three layout fields from the start of an image
    /// file, without requiring the block size to already be known.
    ///
    /// Used at mount time to bootstrap [`crate::image::Image`], which itself needs a block size
    /// to be constructed.
    pub fn peek_header<P: AsRef<std::path::Path>>(path: P) -> FsResult<(u32, u32, u32)> {
        use std::io::Read;
        let mut file = std::fs::File::open(path)?;
        let mut header = [0u8; HEADER_LEN];
        file.read_exact(&mut header)?;
        if &header[0..8] != MAGIC {
            return Err(FsError::BadImage);
        }
        let inode_count = u32::from_le_bytes(header[8..12].try_into().unwrap());
        let block_count = u32::from_le_bytes(header[12..16].try_into().unwrap());
        let block_size = u32::from_le_bytes(header[16..20].try_into().unwrap());
        Ok((block_size, block_count, inode_count))
    }

    /// Writes the superblock back to block 0 of `image`.
    pub fn flush(&self, image: &mut Image) -> FsResult<()> {
        image.write_block(0, &self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_spec_formula() {
        // format img 4096 256 64 (block_size, block_count, inode_count)
        let layout = Layout::new(4096, 256, 64);
        let expected_total =
            1 + layout.inode_bitmap_blocks as u64 + layout.block_bitmap_blocks as u64
                + layout.inode_table_blocks as u64
                + 256;
        assert_eq!(layout.total_blocks, expected_total);
        assert_eq!(layout.block_bitmap_blocks, 1); // 256 bits fit in one 4096-byte block
        assert_eq!(layout.inode_bitmap_blocks, 1); // 64 bits fit in one 4096-byte block
        assert_eq!(layout.inode_table_blocks, 2); // 64 * 128 / 4096 = 2
    }

    #[test]
    fn roundtrip_bytes() {
        let sb = Superblock::fresh(512, 100, 32);
        let bytes = sb.to_bytes();
        let parsed = Superblock::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.free_blocks, 100);
        assert_eq!(parsed.free_inodes, 32);
        assert_eq!(parsed.layout, sb.layout);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut buf = vec![0u8; 512];
        buf[0..8].copy_from_slice(b"NOTAMAG\0");
        assert!(matches!(Superblock::from_bytes(&buf), Err(FsError::BadImage)));
    }
}
