//! Directories.
//!
//! A directory is an inode with its kind flag set whose file contents are a
//! packed array of fixed-stride entries, each binding a name to an inode
//! sector. An entry not in use is a reusable slot; adding past the last slot
//! grows the directory through ordinary inode extension. Every directory
//! holds `.` and `..` entries; the root is its own parent.

use core::mem;
use std::sync::Arc;

use arrayvec::ArrayString;
use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use super::inode::{self, RcInode};
use super::path::FileName;
use super::FsCore;
use crate::error::{FsError, Result};
use crate::param::{DIRSIZ, ROOT_DIR_SECTOR};

/// A single on-disk directory entry.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
struct Dirent {
    /// Sector of the entry's inode.
    inode_sector: u32,
    /// NUL-terminated name.
    name: [u8; DIRSIZ + 1],
    /// Nonzero while the slot is bound.
    in_use: u8,
}

pub(crate) const DIRENT_SIZE: usize = mem::size_of::<Dirent>();
const_assert_eq!(DIRENT_SIZE, 20);

impl Dirent {
    fn empty() -> Dirent {
        Dirent {
            inode_sector: 0,
            name: [0; DIRSIZ + 1],
            in_use: 0,
        }
    }

    /// Fills in the name, NUL-padded to the full field.
    fn set_name(&mut self, name: &FileName) {
        let name = name.as_bytes();
        self.name = [0; DIRSIZ + 1];
        self.name[..name.len()].copy_from_slice(name);
    }

    /// The name bytes up to the terminator.
    fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(DIRSIZ);
        &self.name[..len]
    }

    fn is(&self, name: &FileName) -> bool {
        self.in_use != 0 && self.name() == name.as_bytes()
    }
}

/// An open directory: an inode reference plus an iteration position.
pub struct Dir {
    inode: RcInode,
    pos: u32,
}

/// Creates a directory inode at `sector` with room for `entries` entries.
pub(crate) fn create(core: &Arc<FsCore>, sector: u32, entries: u32) -> Result<()> {
    inode::create(core, sector, entries * DIRENT_SIZE as u32, true)
}

impl Dir {
    /// Opens the directory backed by `inode`.
    pub(crate) fn open(inode: RcInode) -> Result<Dir> {
        if !inode.is_dir() {
            return Err(FsError::NotDir);
        }
        Ok(Dir { inode, pos: 0 })
    }

    /// A fresh handle on the same directory, rewound to the start.
    pub fn reopen(&self) -> Dir {
        Dir {
            inode: self.inode.clone(),
            pos: 0,
        }
    }

    pub(crate) fn inode(&self) -> &RcInode {
        &self.inode
    }

    pub fn inumber(&self) -> u32 {
        self.inode.inumber()
    }

    fn entry_at(&self, off: u32) -> Option<Dirent> {
        let mut de = Dirent::empty();
        if self.inode.read_at(de.as_bytes_mut(), off) == DIRENT_SIZE {
            Some(de)
        } else {
            None
        }
    }

    /// Scans for an in-use entry named `name` and opens its inode.
    pub fn lookup(&self, name: &FileName) -> Result<RcInode> {
        let len = self.inode.len();
        for off in (0..len).step_by(DIRENT_SIZE) {
            if let Some(de) = self.entry_at(off) {
                if de.is(name) {
                    return Ok(inode::iopen(self.inode.core(), de.inode_sector));
                }
            }
        }
        Err(FsError::NotFound)
    }

    /// Binds `name` to `sector` in this directory, reusing a free slot or
    /// appending one past the end. The whole check-and-insert runs under the
    /// directory lock, so two concurrent additions of one name cannot both
    /// succeed.
    pub(crate) fn add(&self, name: &FileName, sector: u32) -> Result<()> {
        let _dir = self.inode.dir_guard();

        let len = self.inode.len();
        let mut free_slot = None;
        for off in (0..len).step_by(DIRENT_SIZE) {
            if let Some(de) = self.entry_at(off) {
                if de.is(name) {
                    return Err(FsError::Exists);
                }
                if de.in_use == 0 {
                    free_slot.get_or_insert(off);
                }
            }
        }

        let off = free_slot.unwrap_or(len);
        let mut de = Dirent::empty();
        de.inode_sector = sector;
        de.set_name(name);
        de.in_use = 1;
        if self.inode.write_at(de.as_bytes(), off) != DIRENT_SIZE {
            return Err(FsError::NoSpace);
        }
        Ok(())
    }

    /// Unbinds `name` and marks its inode for deletion at the last close.
    ///
    /// `.` and `..` are not removable; neither is the root, a directory with
    /// entries left, or a directory someone still has open (which includes
    /// every working directory).
    pub(crate) fn remove(&self, name: &FileName) -> Result<()> {
        if name.is_dot() {
            return Err(FsError::BadName);
        }
        let _dir = self.inode.dir_guard();

        let len = self.inode.len();
        for off in (0..len).step_by(DIRENT_SIZE) {
            let mut de = match self.entry_at(off) {
                Some(de) => de,
                None => break,
            };
            if !de.is(name) {
                continue;
            }

            let target = inode::iopen(self.inode.core(), de.inode_sector);
            if target.is_dir() {
                if target.inumber() == ROOT_DIR_SECTOR {
                    return Err(FsError::Busy);
                }
                // Our probe handle is the one permitted opener.
                if target.open_count() > 1 {
                    return Err(FsError::Busy);
                }
                if !is_empty_dir(&target) {
                    return Err(FsError::NotEmpty);
                }
            }

            de.in_use = 0;
            if self.inode.write_at(de.as_bytes(), off) != DIRENT_SIZE {
                return Err(FsError::NoSpace);
            }
            log::trace!(
                "dir {}: removed {:?}, inode {}",
                self.inode.inumber(),
                name.as_str(),
                target.inumber()
            );
            target.remove();
            return Ok(());
        }
        Err(FsError::NotFound)
    }

    /// Copies out the next in-use entry name, skipping `.` and `..`;
    /// `None` at end of directory.
    pub fn read_entry(&mut self) -> Option<ArrayString<DIRSIZ>> {
        let len = self.inode.len();
        while self.pos < len {
            let de = self.entry_at(self.pos)?;
            self.pos += DIRENT_SIZE as u32;
            if de.in_use == 0 {
                continue;
            }
            let name = core::str::from_utf8(de.name()).ok()?;
            if name == "." || name == ".." {
                continue;
            }
            return ArrayString::from(name).ok();
        }
        None
    }
}

/// Empty except for `.` and `..`?
fn is_empty_dir(inode: &RcInode) -> bool {
    let len = inode.len();
    let mut de = Dirent::empty();
    for off in (0..len).step_by(DIRENT_SIZE) {
        if inode.read_at(de.as_bytes_mut(), off) != DIRENT_SIZE {
            break;
        }
        if de.in_use != 0 && de.name() != b"." && de.name() != b".." {
            return false;
        }
    }
    true
}
