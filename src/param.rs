//! File-system wide constants.

use core::mem;

/// Size of one device sector in bytes.
pub const SECTOR_SIZE: usize = 512;

/// Identifies an on-disk inode.
pub const INODE_MAGIC: u32 = 0x494e_4f44;

/// Direct data pointers held in the disk inode itself.
pub const NDIRECT: usize = 123;

/// Sector pointers held in one index sector.
pub const NINDIRECT: usize = SECTOR_SIZE / mem::size_of::<u32>();

/// Maximum length of one file-name component, excluding the terminator.
pub const DIRSIZ: usize = 14;

/// Sector holding the free map's inode.
pub const FREE_MAP_SECTOR: u32 = 0;

/// Sector holding the root directory's inode.
pub const ROOT_DIR_SECTOR: u32 = 1;

/// Size of the disk sector cache.
pub const NBUF: usize = 64;

/// Entries the root directory is created with.
pub const ROOT_DIR_ENTRIES: u32 = 16;

/// Bytes addressable through the direct pointers.
pub const DIRECT_BYTES: u32 = (NDIRECT * SECTOR_SIZE) as u32;

/// Bytes addressable through direct plus single-indirect pointers.
pub const INDIRECT_BYTES: u32 = DIRECT_BYTES + (NINDIRECT * SECTOR_SIZE) as u32;

/// Bytes addressable in total; the maximum file length.
pub const MAX_LENGTH: u32 = INDIRECT_BYTES + (NINDIRECT * NINDIRECT * SECTOR_SIZE) as u32;
