//! A small hierarchical file system over a fixed-size device of 512-byte
//! sectors.
//!
//! Files grow through a three-level pointer tree (direct, single-indirect,
//! double-indirect) to just over 8 MiB. All sector traffic funnels through a
//! fixed-capacity write-back LRU cache; writes reach the device only on
//! eviction or at the explicit [`FileSystem::done`] flush. Directories store
//! their entries as ordinary file contents, every directory carries `.` and
//! `..`, and paths resolve from the root or from a per-session working
//! directory.
//!
//! Operations tolerate interleaving: opens of one sector share a single
//! in-memory inode, removal defers storage release to the last close, and
//! the deny-write protocol waits for in-flight writers before barring new
//! ones.
//!
//! ```
//! use sectorfs::{FileSystem, MemDisk, Session};
//!
//! let fs = FileSystem::format(MemDisk::new(1024)).unwrap();
//! let mut session = Session::new(fs.clone());
//! session.create("/notes", 0).unwrap();
//! let fd = session.open("/notes").unwrap();
//! session.write(fd, b"hello").unwrap();
//! session.seek(fd, 0).unwrap();
//! let mut buf = [0u8; 5];
//! session.read(fd, &mut buf).unwrap();
//! assert_eq!(&buf, b"hello");
//! fs.done();
//! ```

mod bio;
mod device;
mod error;
mod file;
mod freemap;
mod fs;
pub mod param;
mod session;

pub use crate::device::{BlockDevice, MemDisk};
pub use crate::error::{FsError, Result};
pub use crate::file::{File, Handle};
pub use crate::fs::{Dir, FileName, FileSystem, Path, RcInode};
pub use crate::session::Session;
