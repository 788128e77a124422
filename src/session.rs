//! A client of the file system: a working directory plus a descriptor
//! table. This is the per-process bookkeeping a kernel would keep for each
//! user program, without the process.
//!
//! Descriptors number from 2; 0 and 1 belong to the console, which is not
//! this crate's concern. Dropping the session closes every descriptor and
//! the working directory, as process exit would.

use arrayvec::ArrayString;

use crate::error::{FsError, Result};
use crate::file::{File, Handle};
use crate::fs::{Dir, FileSystem};
use crate::param::DIRSIZ;

const FD_BASE: u32 = 2;

pub struct Session {
    fs: FileSystem,
    cwd: Option<Dir>,
    fds: Vec<Option<Handle>>,
}

impl Session {
    /// A session rooted at `/` with no working directory set.
    pub fn new(fs: FileSystem) -> Session {
        Session {
            fs,
            cwd: None,
            fds: Vec::new(),
        }
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    fn slot(&self, fd: u32) -> Result<&Handle> {
        let index = fd.checked_sub(FD_BASE).ok_or(FsError::BadFd)? as usize;
        match self.fds.get(index) {
            Some(Some(handle)) => Ok(handle),
            _ => Err(FsError::BadFd),
        }
    }

    fn slot_mut(&mut self, fd: u32) -> Result<&mut Handle> {
        let index = fd.checked_sub(FD_BASE).ok_or(FsError::BadFd)? as usize;
        match self.fds.get_mut(index) {
            Some(Some(handle)) => Ok(handle),
            _ => Err(FsError::BadFd),
        }
    }

    fn file(&self, fd: u32) -> Result<&File> {
        match self.slot(fd)? {
            Handle::File(file) => Ok(file),
            Handle::Dir(_) => Err(FsError::BadFd),
        }
    }

    fn file_mut(&mut self, fd: u32) -> Result<&mut File> {
        match self.slot_mut(fd)? {
            Handle::File(file) => Ok(file),
            Handle::Dir(_) => Err(FsError::BadFd),
        }
    }

    /// Creates a file of `initial_size` zero bytes.
    pub fn create(&self, path: &str, initial_size: u32) -> Result<()> {
        self.fs.create(path, initial_size, self.cwd.as_ref())
    }

    /// Removes a file or an empty, unused directory.
    pub fn remove(&self, path: &str) -> Result<()> {
        self.fs.remove(path, self.cwd.as_ref())
    }

    pub fn mkdir(&self, path: &str) -> Result<()> {
        self.fs.mkdir(path, self.cwd.as_ref())
    }

    /// Opens `path` and returns its descriptor.
    pub fn open(&mut self, path: &str) -> Result<u32> {
        let handle = self.fs.open(path, self.cwd.as_ref())?;
        let index = match self.fds.iter().position(|h| h.is_none()) {
            Some(free) => {
                self.fds[free] = Some(handle);
                free
            }
            None => {
                self.fds.push(Some(handle));
                self.fds.len() - 1
            }
        };
        Ok(index as u32 + FD_BASE)
    }

    pub fn close(&mut self, fd: u32) -> Result<()> {
        let index = fd.checked_sub(FD_BASE).ok_or(FsError::BadFd)? as usize;
        match self.fds.get_mut(index) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(FsError::BadFd),
        }
    }

    pub fn filesize(&self, fd: u32) -> Result<u32> {
        Ok(self.file(fd)?.len())
    }

    pub fn read(&mut self, fd: u32, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file_mut(fd)?.read(buf))
    }

    pub fn write(&mut self, fd: u32, buf: &[u8]) -> Result<usize> {
        Ok(self.file_mut(fd)?.write(buf))
    }

    pub fn seek(&mut self, fd: u32, pos: u32) -> Result<()> {
        self.file_mut(fd)?.seek(pos);
        Ok(())
    }

    pub fn tell(&self, fd: u32) -> Result<u32> {
        Ok(self.file(fd)?.tell())
    }

    /// The next entry name in the directory open at `fd`, skipping `.` and
    /// `..`; `None` at end of directory.
    pub fn readdir(&mut self, fd: u32) -> Result<Option<ArrayString<DIRSIZ>>> {
        match self.slot_mut(fd)? {
            Handle::Dir(dir) => Ok(dir.read_entry()),
            Handle::File(_) => Err(FsError::BadFd),
        }
    }

    pub fn isdir(&self, fd: u32) -> Result<bool> {
        Ok(self.slot(fd)?.is_dir())
    }

    pub fn inumber(&self, fd: u32) -> Result<u32> {
        Ok(self.slot(fd)?.inumber())
    }

    /// Replaces the working directory, closing the previous one.
    pub fn chdir(&mut self, path: &str) -> Result<()> {
        let dir = self.fs.resolve_dir(path, self.cwd.as_ref())?;
        self.cwd = Some(dir);
        Ok(())
    }
}
