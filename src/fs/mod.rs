//! File-system assembly. Five layers, leaves first:
//!   + Device: raw sector reads and writes.
//!   + Cache: write-back LRU over sectors; the sole path to the device.
//!   + Inodes: growable files addressed through a pointer tree.
//!   + Directories: inodes whose contents name other inodes.
//!   + Names: slash-separated paths resolved from the root or a working
//!     directory.
//!
//! This module owns the shared state and the path-level entry points; the
//! descriptor-level surface lives in `session`.

use std::sync::Arc;

use scopeguard::ScopeGuard;

use crate::bio::Bcache;
use crate::device::BlockDevice;
use crate::error::{FsError, Result};
use crate::file::{File, Handle};
use crate::freemap::FreeMap;
use crate::param::{FREE_MAP_SECTOR, ROOT_DIR_ENTRIES, ROOT_DIR_SECTOR};

pub mod dir;
pub mod inode;
pub mod path;

pub use dir::Dir;
pub use inode::RcInode;
pub use path::{FileName, Path};

/// Everything one mounted file system shares: the cache, the free map, and
/// the open-inode registry. Handles keep it alive through an `Arc`.
pub(crate) struct FsCore {
    pub(crate) cache: Bcache,
    pub(crate) freemap: FreeMap,
    pub(crate) itable: inode::Itable,
}

/// A mounted file system. Cloning yields another reference to the same
/// instance.
#[derive(Clone)]
pub struct FileSystem {
    core: Arc<FsCore>,
}

impl FileSystem {
    fn assemble(dev: Arc<dyn BlockDevice>) -> FileSystem {
        let sectors = dev.sector_count();
        FileSystem {
            core: Arc::new(FsCore {
                cache: Bcache::new(dev),
                freemap: FreeMap::new(sectors),
                itable: inode::Itable::new(),
            }),
        }
    }

    /// Formats `dev` with a free map file and an empty root directory, and
    /// mounts it.
    pub fn format(dev: Arc<dyn BlockDevice>) -> Result<FileSystem> {
        let fs = Self::assemble(dev);
        let sectors = fs.core.cache.sector_count();
        log::debug!("formatting file system: {} sectors", sectors);

        // Sectors 0 and 1 are spoken for before anything else allocates.
        let fm = fs.core.freemap.allocate(1).ok_or(FsError::NoSpace)?;
        assert_eq!(fm, FREE_MAP_SECTOR);
        let rd = fs.core.freemap.allocate(1).ok_or(FsError::NoSpace)?;
        assert_eq!(rd, ROOT_DIR_SECTOR);

        // The free map lives in a file of its own, created at its full size
        // up front so saving it never needs to grow it.
        inode::create(&fs.core, FREE_MAP_SECTOR, FreeMap::byte_len(sectors), false)?;
        dir::create(&fs.core, ROOT_DIR_SECTOR, ROOT_DIR_ENTRIES)?;
        {
            let root = fs.open_root();
            root.add(FileName::new(".")?, ROOT_DIR_SECTOR)?;
            // The root is its own parent.
            root.add(FileName::new("..")?, ROOT_DIR_SECTOR)?;
        }

        fs.save_free_map();
        Ok(fs)
    }

    /// Mounts a previously formatted device, reading the free map back from
    /// its file.
    pub fn mount(dev: Arc<dyn BlockDevice>) -> FileSystem {
        let fs = Self::assemble(dev);
        let fm = inode::iopen(&fs.core, FREE_MAP_SECTOR);
        let mut image = vec![0u8; fm.len() as usize];
        let read = fm.read_at(&mut image, 0);
        assert_eq!(read, image.len(), "free map file is truncated");
        fs.core.freemap.restore(&image);
        log::debug!(
            "mounted file system: {} sectors, {} free",
            fs.core.cache.sector_count(),
            fs.core.freemap.free_count()
        );
        fs
    }

    /// Writes everything back: the free map into its file, then every dirty
    /// cache entry to the device. The only durability point.
    pub fn done(&self) {
        self.save_free_map();
        self.core.cache.flush();
        log::debug!("file system flushed");
    }

    fn save_free_map(&self) {
        let image = self.core.freemap.snapshot();
        let fm = inode::iopen(&self.core, FREE_MAP_SECTOR);
        let written = fm.write_at(&image, 0);
        debug_assert_eq!(written, image.len());
    }

    /// Cache hits since the previous call; resets the counter.
    pub fn hit_rate(&self) -> u64 {
        self.core.cache.hit_rate()
    }

    /// Live in-memory inodes (for invariant checks).
    pub fn open_inode_count(&self) -> usize {
        self.core.itable.live_count()
    }

    /// Free sectors remaining on the device.
    pub fn free_sectors(&self) -> u32 {
        self.core.freemap.free_count()
    }

    /// A handle on the root directory.
    pub fn open_root(&self) -> Dir {
        Dir::open(inode::iopen(&self.core, ROOT_DIR_SECTOR)).expect("root is a directory")
    }

    /// The directory a walk of `path` begins in: the root for absolute
    /// paths, otherwise the working directory when one exists (and has not
    /// been removed), otherwise the root again.
    fn start_dir(&self, path: &Path, cwd: Option<&Dir>) -> Result<Dir> {
        if path.is_absolute() {
            return Ok(self.open_root());
        }
        match cwd {
            Some(dir) if dir.inode().is_removed() => Err(FsError::NotFound),
            Some(dir) => Ok(dir.reopen()),
            None => Ok(self.open_root()),
        }
    }

    /// Follows every component of `path` downward from `from`.
    fn walk(&self, from: Dir, path: &Path) -> Result<Dir> {
        let mut dir = from;
        let mut rest = path;
        while let Some((name, next)) = rest.skipelem()? {
            dir = Dir::open(dir.lookup(name)?)?;
            rest = next;
        }
        Ok(dir)
    }

    /// Splits `path`, walks to the containing directory, and returns it
    /// together with the final component.
    fn resolve_parent<'p>(&self, path: &'p Path, cwd: Option<&Dir>) -> Result<(Dir, &'p FileName)> {
        let (parent, name) = path.split_parent();
        let name = FileName::new(name)?;
        let start = self.start_dir(path, cwd)?;
        let dir = match parent {
            Some(parent) => self.walk(start, parent)?,
            None => start,
        };
        Ok((dir, name))
    }

    /// Creates a file at `path` holding `initial_size` zero bytes.
    pub fn create(&self, path: &str, initial_size: u32, cwd: Option<&Dir>) -> Result<()> {
        self.create_node(Path::new(path), initial_size, false, cwd)
    }

    /// Creates an empty directory at `path`; it grows as entries are added.
    pub fn mkdir(&self, path: &str, cwd: Option<&Dir>) -> Result<()> {
        self.create_node(Path::new(path), 0, true, cwd)
    }

    fn create_node(
        &self,
        path: &Path,
        initial_size: u32,
        is_dir: bool,
        cwd: Option<&Dir>,
    ) -> Result<()> {
        let (parent, name) = self.resolve_parent(path, cwd)?;

        let sector = self.core.freemap.allocate(1).ok_or(FsError::NoSpace)?;
        // Until the new entry is linked below, everything allocated here is
        // handed back on the way out.
        let sector = scopeguard::guard(sector, |sector| {
            let _ = inode::resize(&self.core, sector, 0);
            self.core.freemap.release(sector, 1);
        });

        inode::create(&self.core, *sector, initial_size, is_dir)?;
        if is_dir {
            let child = Dir::open(inode::iopen(&self.core, *sector))?;
            child.add(FileName::new(".")?, *sector)?;
            child.add(FileName::new("..")?, parent.inumber())?;
        }
        parent.add(name, *sector)?;

        let _ = ScopeGuard::into_inner(sector);
        Ok(())
    }

    /// Opens `path` as a file or directory handle, by the on-disk kind flag.
    pub fn open(&self, path: &str, cwd: Option<&Dir>) -> Result<Handle> {
        let (parent, name) = self.resolve_parent(Path::new(path), cwd)?;
        let inode = parent.lookup(name)?;
        if inode.is_dir() {
            Ok(Handle::Dir(Dir::open(inode)?))
        } else {
            Ok(Handle::File(File::open(inode)))
        }
    }

    /// Removes the entry at `path`. Plain files go even while open; their
    /// storage returns to the free map at the last close.
    pub fn remove(&self, path: &str, cwd: Option<&Dir>) -> Result<()> {
        let (parent, name) = self.resolve_parent(Path::new(path), cwd)?;
        parent.remove(name)
    }

    /// Resolves `path` to a directory handle (the chdir primitive). The
    /// empty path and a path of only slashes name the root.
    pub fn resolve_dir(&self, path: &str, cwd: Option<&Dir>) -> Result<Dir> {
        let path = Path::new(path);
        if path.is_empty() {
            return Ok(self.open_root());
        }
        let start = self.start_dir(path, cwd)?;
        self.walk(start, path)
    }
}
