//! A userspace block-filesystem engine: on-disk layout, allocation, and directory-tree
//! operations, fronted by a `fuser` FUSE adapter.

pub mod bitmap;
pub mod dirent;
pub mod error;
pub mod fs;
pub mod fuse_bridge;
pub mod image;
pub mod inode;
pub mod superblock;

pub use error::{FsError, FsResult};
pub use fs::Engine;
