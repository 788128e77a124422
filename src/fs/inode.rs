//! Inodes.
//!
//! An inode describes a single unnamed file. The disk inode occupies exactly
//! one sector and holds the file's length, its kind, and the pointer tree
//! naming its data sectors: 123 direct pointers, one single-indirect index
//! sector of 128 pointers, and one double-indirect sector of 128 pointers to
//! further index sectors. A zero pointer is a hole and reads as zero bytes.
//!
//! A table of live in-memory inodes provides the place to synchronize access
//! by multiple threads. At most one in-memory inode exists per sector; the
//! registry lookup in `iopen` enforces that. The in-memory inode
//! deliberately caches nothing from disk — the length and pointers are
//! re-read through the buffer cache so every reader observes concurrent
//! growth.
//!
//! An in-memory inode carries:
//!
//! * `meta`: the opener count and the removed mark. A removed inode loses
//!   its data sectors and its own sector at the last close, not before, so
//!   existing handles keep working after removal.
//! * `tree_lock`: serializes every reader and writer of the on-disk pointer
//!   tree. A write that triggers growth holds it across the whole grow pass.
//! * `gate`: the deny-write protocol. Writers enroll before touching the
//!   tree; `deny_write` waits until enrolled writers drain, and writers
//!   arriving while denial is in force write nothing.
//! * `dir_lock`: taken by the directory layer around entry mutation when
//!   this inode is a directory.
//!
//! Handles are reference counted: cloning an [`RcInode`] reopens the inode,
//! dropping it closes, and the last drop of a removed inode gives its
//! storage back to the free map.

use core::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use static_assertions::const_assert_eq;

use super::FsCore;
use crate::error::{FsError, Result};
use crate::param::{
    DIRECT_BYTES, INDIRECT_BYTES, INODE_MAGIC, MAX_LENGTH, NDIRECT, NINDIRECT, SECTOR_SIZE,
};

/// On-disk inode. Must be exactly one sector.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct DiskInode {
    /// File size in bytes.
    length: i32,
    /// Nonzero if this inode is a directory.
    is_dir: u32,
    /// Must be `INODE_MAGIC`.
    magic: u32,
    /// Direct data sector pointers.
    direct: [u32; NDIRECT],
    /// Index sector of 128 data pointers.
    indirect: u32,
    /// Index sector of 128 pointers to index sectors.
    double_indirect: u32,
}

const_assert_eq!(mem::size_of::<DiskInode>(), SECTOR_SIZE);

impl DiskInode {
    fn new(is_dir: bool) -> DiskInode {
        DiskInode {
            length: 0,
            is_dir: is_dir as u32,
            magic: INODE_MAGIC,
            direct: [0; NDIRECT],
            indirect: 0,
            double_indirect: 0,
        }
    }

    fn length(&self) -> u32 {
        debug_assert!(self.length >= 0);
        self.length as u32
    }

    fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        // SAFETY: `DiskInode` is `repr(C)`, is statically asserted to be
        // exactly one sector, and every field is a plain integer, so its
        // bytes may be viewed directly.
        unsafe { &*(self as *const DiskInode as *const [u8; SECTOR_SIZE]) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8; SECTOR_SIZE] {
        // SAFETY: as in `as_bytes`; in addition every byte pattern is a
        // valid `DiskInode`, so writes through the view are fine.
        unsafe { &mut *(self as *mut DiskInode as *mut [u8; SECTOR_SIZE]) }
    }
}

/// One index sector's worth of pointers.
type PtrBlock = [u32; NINDIRECT];

fn block_bytes(blk: &PtrBlock) -> &[u8; SECTOR_SIZE] {
    // SAFETY: `[u32; 128]` is exactly one padding-free sector and `u8` has
    // no alignment requirement.
    unsafe { &*(blk as *const PtrBlock as *const [u8; SECTOR_SIZE]) }
}

fn block_bytes_mut(blk: &mut PtrBlock) -> &mut [u8; SECTOR_SIZE] {
    // SAFETY: as in `block_bytes`, and every byte pattern is a valid block.
    unsafe { &mut *(blk as *mut PtrBlock as *mut [u8; SECTOR_SIZE]) }
}

/// Reads the disk inode at `sector` through the cache.
fn read_dinode(core: &FsCore, sector: u32) -> DiskInode {
    let mut di = DiskInode::new(false);
    core.cache.read(sector, di.as_bytes_mut(), 0);
    debug_assert_eq!(di.magic, INODE_MAGIC, "sector {} is not an inode", sector);
    di
}

fn write_dinode(core: &FsCore, sector: u32, di: &DiskInode) {
    core.cache.write(sector, di.as_bytes(), 0);
}

struct InodeMeta {
    /// Number of openers; the in-memory inode lives while this is nonzero.
    open_cnt: u32,
    /// Marked for deletion at the last close.
    removed: bool,
}

struct WriteGate {
    /// 0: writes ok, >0: writes return 0 bytes.
    deny_write_cnt: u32,
    /// Writers currently in flight.
    writers: u32,
}

/// In-memory inode; see the module header for the locking roles.
pub(crate) struct Inode {
    sector: u32,
    meta: spin::Mutex<InodeMeta>,
    tree_lock: Mutex<()>,
    gate: Mutex<WriteGate>,
    gate_cond: Condvar,
    dir_lock: Mutex<()>,
}

impl Inode {
    fn new(sector: u32) -> Inode {
        Inode {
            sector,
            meta: spin::Mutex::new(InodeMeta {
                open_cnt: 1,
                removed: false,
            }),
            tree_lock: Mutex::new(()),
            gate: Mutex::new(WriteGate {
                deny_write_cnt: 0,
                writers: 0,
            }),
            gate_cond: Condvar::new(),
            dir_lock: Mutex::new(()),
        }
    }
}

/// Registry of live in-memory inodes, so that opening a sector twice yields
/// the same inode.
pub(crate) struct Itable {
    list: spin::Mutex<Vec<Arc<Inode>>>,
}

impl Itable {
    pub fn new() -> Itable {
        Itable {
            list: spin::Mutex::new(Vec::new()),
        }
    }

    /// Live in-memory inodes (for invariant checks).
    pub fn live_count(&self) -> usize {
        self.list.lock().len()
    }
}

/// Returns a handle on the in-memory inode for `sector`, reusing the live
/// one if the registry already holds it.
pub(crate) fn iopen(core: &Arc<FsCore>, sector: u32) -> RcInode {
    let mut list = core.itable.list.lock();
    if let Some(ip) = list.iter().find(|ip| ip.sector == sector) {
        ip.meta.lock().open_cnt += 1;
        return RcInode {
            core: core.clone(),
            ip: ip.clone(),
        };
    }
    let ip = Arc::new(Inode::new(sector));
    list.push(ip.clone());
    RcInode {
        core: core.clone(),
        ip,
    }
}

/// A counted handle on an in-memory inode. Cloning reopens; dropping closes.
pub struct RcInode {
    core: Arc<FsCore>,
    ip: Arc<Inode>,
}

impl std::fmt::Debug for RcInode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcInode").field("sector", &self.ip.sector).finish()
    }
}

impl Clone for RcInode {
    fn clone(&self) -> RcInode {
        self.ip.meta.lock().open_cnt += 1;
        RcInode {
            core: self.core.clone(),
            ip: self.ip.clone(),
        }
    }
}

impl Drop for RcInode {
    fn drop(&mut self) {
        let deallocate = {
            let mut list = self.core.itable.list.lock();
            let mut meta = self.ip.meta.lock();
            meta.open_cnt -= 1;
            if meta.open_cnt > 0 {
                false
            } else {
                let pos = list
                    .iter()
                    .position(|e| Arc::ptr_eq(e, &self.ip))
                    .expect("open inode missing from registry");
                list.remove(pos);
                meta.removed
            }
        };
        if deallocate {
            // Last close of a removed inode: give back its contents and the
            // inode sector itself.
            log::trace!("inode {}: deallocating at last close", self.ip.sector);
            let _tree = self.ip.tree_lock.lock().unwrap();
            resize(&self.core, self.ip.sector, 0).expect("shrinking cannot fail");
            self.core.freemap.release(self.ip.sector, 1);
        }
    }
}

impl RcInode {
    pub(crate) fn core(&self) -> &Arc<FsCore> {
        &self.core
    }

    /// The inode's number: the sector holding it.
    pub fn inumber(&self) -> u32 {
        self.ip.sector
    }

    /// Whether two handles name the same in-memory inode.
    pub fn ptr_eq(&self, other: &RcInode) -> bool {
        Arc::ptr_eq(&self.ip, &other.ip)
    }

    /// Current file length in bytes.
    pub fn len(&self) -> u32 {
        let _tree = self.ip.tree_lock.lock().unwrap();
        read_dinode(&self.core, self.ip.sector).length()
    }

    pub fn is_dir(&self) -> bool {
        let _tree = self.ip.tree_lock.lock().unwrap();
        read_dinode(&self.core, self.ip.sector).is_dir != 0
    }

    /// Marks the inode for deletion at the last close.
    pub fn remove(&self) {
        self.ip.meta.lock().removed = true;
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.ip.meta.lock().removed
    }

    pub(crate) fn open_count(&self) -> u32 {
        self.ip.meta.lock().open_cnt
    }

    pub(crate) fn dir_guard(&self) -> MutexGuard<'_, ()> {
        self.ip.dir_lock.lock().unwrap()
    }

    /// Reads up to `buf.len()` bytes at `offset`, stopping at end of file.
    /// Holes read as zero bytes.
    pub fn read_at(&self, buf: &mut [u8], offset: u32) -> usize {
        let _tree = self.ip.tree_lock.lock().unwrap();
        let length = read_dinode(&self.core, self.ip.sector).length();

        let mut off = offset;
        let mut total = 0;
        while total < buf.len() && off < length {
            let sector_ofs = (off as usize) % SECTOR_SIZE;
            let sector_left = SECTOR_SIZE - sector_ofs;
            let inode_left = (length - off) as usize;
            let chunk = (buf.len() - total).min(sector_left).min(inode_left);

            let dst = &mut buf[total..total + chunk];
            match byte_to_sector(&self.core, self.ip.sector, off) {
                Some(sector) => self.core.cache.read(sector, dst, sector_ofs),
                // A zero pointer inside the length is a hole.
                None => dst.fill(0),
            }
            total += chunk;
            off += chunk as u32;
        }
        total
    }

    /// Writes `buf` at `offset`, growing the file first if it ends past the
    /// current length. Returns the bytes written: 0 when writes are denied
    /// or the grow fails, `buf.len()` otherwise.
    pub fn write_at(&self, buf: &[u8], offset: u32) -> usize {
        {
            let mut gate = self.ip.gate.lock().unwrap();
            if gate.deny_write_cnt > 0 {
                return 0;
            }
            gate.writers += 1;
        }
        let written = self.write_body(buf, offset);
        let mut gate = self.ip.gate.lock().unwrap();
        gate.writers -= 1;
        if gate.writers == 0 {
            self.ip.gate_cond.notify_all();
        }
        written
    }

    fn write_body(&self, buf: &[u8], offset: u32) -> usize {
        let end = match offset.checked_add(buf.len() as u32) {
            Some(end) if end <= MAX_LENGTH => end,
            _ => return 0,
        };
        let _tree = self.ip.tree_lock.lock().unwrap();
        let length = read_dinode(&self.core, self.ip.sector).length();
        if end > length && resize(&self.core, self.ip.sector, end).is_err() {
            return 0;
        }

        let mut off = offset;
        let mut total = 0;
        while total < buf.len() {
            let sector_ofs = (off as usize) % SECTOR_SIZE;
            let chunk = (buf.len() - total).min(SECTOR_SIZE - sector_ofs);
            let sector = byte_to_sector(&self.core, self.ip.sector, off)
                .expect("write within length hit a hole");
            self.core.cache.write(sector, &buf[total..total + chunk], sector_ofs);
            total += chunk;
            off += chunk as u32;
        }
        total
    }

    /// Bars writes to the inode, waiting first for in-flight writers to
    /// drain. May be called at most once per opener.
    pub fn deny_write(&self) {
        let open_cnt = self.ip.meta.lock().open_cnt;
        let mut gate = self.ip.gate.lock().unwrap();
        while gate.writers > 0 {
            gate = self.ip.gate_cond.wait(gate).unwrap();
        }
        gate.deny_write_cnt += 1;
        debug_assert!(gate.deny_write_cnt <= open_cnt);
    }

    /// Re-permits writes. Must be called once per `deny_write`.
    pub fn allow_write(&self) {
        let mut gate = self.ip.gate.lock().unwrap();
        debug_assert!(gate.deny_write_cnt > 0);
        gate.deny_write_cnt -= 1;
    }
}

/// Writes a fresh disk inode to `sector` and grows it to `length` bytes.
/// A failed grow leaves the inode at length zero with nothing allocated.
pub(crate) fn create(core: &FsCore, sector: u32, length: u32, is_dir: bool) -> Result<()> {
    write_dinode(core, sector, &DiskInode::new(is_dir));
    if length > MAX_LENGTH {
        return Err(FsError::NoSpace);
    }
    resize(core, sector, length)
}

/// Grows or shrinks the file at `id_sector` to `target` bytes in one
/// top-down pass over the pointer tree, releasing pointers past the target
/// and allocating zeroed sectors below it. Index sectors materialize on
/// first need and are reclaimed when their whole region falls past the
/// target. The length lands on disk together with the updated pointers.
///
/// On an allocation failure the pass is re-run at the previous length —
/// which only shrinks, and so cannot fail — undoing every provisional
/// allocation before the error is reported.
///
/// Callers with a live in-memory inode hold its `tree_lock`; `create` runs
/// before the sector is reachable from any directory.
pub(crate) fn resize(core: &FsCore, id_sector: u32, target: u32) -> Result<()> {
    let mut di = read_dinode(core, id_sector);
    let old = di.length();
    match resize_pass(core, &mut di, target) {
        Ok(()) => {
            di.length = target as i32;
            write_dinode(core, id_sector, &di);
            Ok(())
        }
        Err(err) => {
            // The pass already persisted every index sector it touched;
            // re-running it at the old length walks the provisional
            // allocations back out of the scratch inode before it lands.
            log::debug!(
                "inode {}: grow to {} failed, rolling back to {}",
                id_sector,
                target,
                old
            );
            resize_pass(core, &mut di, old).expect("rollback only shrinks");
            di.length = old as i32;
            write_dinode(core, id_sector, &di);
            Err(err)
        }
    }
}

/// One reconciliation pass. Leaves every index sector it touched written
/// back to the cache, even on failure; the caller persists `di` itself.
fn resize_pass(core: &FsCore, di: &mut DiskInode, target: u32) -> Result<()> {
    for i in 0..NDIRECT {
        reconcile(core, &mut di.direct[i], (i * SECTOR_SIZE) as u32, target)?;
    }
    resize_index(core, &mut di.indirect, DIRECT_BYTES, target)?;
    resize_double(core, &mut di.double_indirect, target)
}

/// Reconciles one data-slot pointer with `target`.
fn reconcile(core: &FsCore, slot: &mut u32, slot_off: u32, target: u32) -> Result<()> {
    if target <= slot_off && *slot != 0 {
        core.freemap.release(*slot, 1);
        *slot = 0;
    }
    if target > slot_off && *slot == 0 {
        *slot = alloc_zeroed(core)?;
    }
    Ok(())
}

/// Allocates one sector and zeroes it through the cache, so new file bytes
/// read as zero.
fn alloc_zeroed(core: &FsCore) -> Result<u32> {
    let sector = core.freemap.allocate(1).ok_or(FsError::NoSpace)?;
    core.cache.zero(sector);
    Ok(sector)
}

/// Reconciles the index sector at `*root`, covering the data slots for
/// bytes `base..base + 128 * SECTOR_SIZE`.
fn resize_index(core: &FsCore, root: &mut u32, base: u32, target: u32) -> Result<()> {
    if *root == 0 && target <= base {
        return Ok(());
    }
    let fresh = *root == 0;
    if fresh {
        *root = alloc_zeroed(core)?;
    }
    let mut blk: PtrBlock = [0; NINDIRECT];
    if !fresh {
        core.cache.read(*root, block_bytes_mut(&mut blk), 0);
    }

    let mut result = Ok(());
    for (i, slot) in blk.iter_mut().enumerate() {
        let off = base + (i * SECTOR_SIZE) as u32;
        if let Err(err) = reconcile(core, slot, off, target) {
            result = Err(err);
            break;
        }
    }

    if result.is_ok() && target <= base {
        // The whole region fell past the target: the index sector itself
        // goes back too.
        core.freemap.release(*root, 1);
        *root = 0;
    } else {
        core.cache.write(*root, block_bytes(&blk), 0);
    }
    result
}

/// Reconciles the double-indirect tree: up to 128 second-level index
/// sectors, each covering 128 data slots.
fn resize_double(core: &FsCore, root: &mut u32, target: u32) -> Result<()> {
    if *root == 0 && target <= INDIRECT_BYTES {
        return Ok(());
    }
    let fresh = *root == 0;
    if fresh {
        *root = alloc_zeroed(core)?;
    }
    let mut blk: PtrBlock = [0; NINDIRECT];
    if !fresh {
        core.cache.read(*root, block_bytes_mut(&mut blk), 0);
    }

    let mut result = Ok(());
    for (i, second) in blk.iter_mut().enumerate() {
        let base = INDIRECT_BYTES + (i * NINDIRECT * SECTOR_SIZE) as u32;
        if let Err(err) = resize_index(core, second, base, target) {
            result = Err(err);
            break;
        }
    }

    if result.is_ok() && target <= INDIRECT_BYTES {
        core.freemap.release(*root, 1);
        *root = 0;
    } else {
        core.cache.write(*root, block_bytes(&blk), 0);
    }
    result
}

/// Maps byte offset `pos` to its data sector, reading the disk inode and at
/// most two index sectors through the cache. `None` is a hole.
fn byte_to_sector(core: &FsCore, id_sector: u32, pos: u32) -> Option<u32> {
    let di = read_dinode(core, id_sector);
    let sector = if pos < DIRECT_BYTES {
        di.direct[(pos as usize) / SECTOR_SIZE]
    } else if pos < INDIRECT_BYTES {
        if di.indirect == 0 {
            0
        } else {
            let mut blk: PtrBlock = [0; NINDIRECT];
            core.cache.read(di.indirect, block_bytes_mut(&mut blk), 0);
            blk[((pos - DIRECT_BYTES) as usize) / SECTOR_SIZE]
        }
    } else if pos < MAX_LENGTH {
        if di.double_indirect == 0 {
            0
        } else {
            let mut blk: PtrBlock = [0; NINDIRECT];
            core.cache.read(di.double_indirect, block_bytes_mut(&mut blk), 0);
            let slot = ((pos - INDIRECT_BYTES) as usize) / SECTOR_SIZE;
            let second = blk[slot / NINDIRECT];
            if second == 0 {
                0
            } else {
                core.cache.read(second, block_bytes_mut(&mut blk), 0);
                blk[slot % NINDIRECT]
            }
        }
    } else {
        0
    };
    if sector == 0 {
        None
    } else {
        Some(sector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::Bcache;
    use crate::device::MemDisk;
    use crate::freemap::FreeMap;

    fn test_core(sectors: u32) -> Arc<FsCore> {
        let core = Arc::new(FsCore {
            cache: Bcache::new(MemDisk::new(sectors)),
            freemap: FreeMap::new(sectors),
            itable: Itable::new(),
        });
        // Keep sector 0 out of the way so 0 stays the hole marker.
        core.freemap.allocate(1);
        core
    }

    fn sectors_for(len: u32) -> u32 {
        (len + SECTOR_SIZE as u32 - 1) / SECTOR_SIZE as u32
    }

    #[test]
    fn disk_inode_is_one_sector() {
        assert_eq!(mem::size_of::<DiskInode>(), SECTOR_SIZE);
    }

    #[test]
    fn create_allocates_zeroed_direct_sectors() {
        let core = test_core(256);
        let sector = core.freemap.allocate(1).unwrap();
        let free_before = core.freemap.free_count();
        create(&core, sector, 3 * SECTOR_SIZE as u32 + 1, false).unwrap();
        assert_eq!(core.freemap.free_count(), free_before - 4);

        let di = read_dinode(&core, sector);
        assert_eq!(di.length(), 3 * SECTOR_SIZE as u32 + 1);
        for i in 0..4 {
            assert_ne!(di.direct[i], 0);
            assert!(core.freemap.is_allocated(di.direct[i]));
        }
        assert_eq!(di.direct[4], 0);
        assert_eq!(di.indirect, 0);
    }

    #[test]
    fn grow_into_indirect_and_back() {
        let core = test_core(512);
        let sector = core.freemap.allocate(1).unwrap();
        create(&core, sector, 0, false).unwrap();

        let free_start = core.freemap.free_count();
        let len = DIRECT_BYTES + 5 * SECTOR_SIZE as u32;
        resize(&core, sector, len).unwrap();
        // Data sectors plus the single-indirect index sector.
        assert_eq!(core.freemap.free_count(), free_start - sectors_for(len) - 1);
        assert_ne!(read_dinode(&core, sector).indirect, 0);

        // Shrinking below the direct region reclaims the index sector too.
        resize(&core, sector, SECTOR_SIZE as u32).unwrap();
        assert_eq!(read_dinode(&core, sector).indirect, 0);
        assert_eq!(core.freemap.free_count(), free_start - 1);

        resize(&core, sector, 0).unwrap();
        assert_eq!(core.freemap.free_count(), free_start);
    }

    #[test]
    fn double_indirect_mapping_round_trips() {
        let core = test_core(2048);
        let sector = core.freemap.allocate(1).unwrap();
        // Two sectors into the double-indirect region.
        let len = INDIRECT_BYTES + 2 * SECTOR_SIZE as u32;
        create(&core, sector, len, false).unwrap();

        let di = read_dinode(&core, sector);
        assert_ne!(di.double_indirect, 0);

        let first_double = byte_to_sector(&core, sector, INDIRECT_BYTES).unwrap();
        assert!(core.freemap.is_allocated(first_double));
        assert_eq!(byte_to_sector(&core, sector, len), None);

        resize(&core, sector, 0).unwrap();
        assert_eq!(read_dinode(&core, sector).double_indirect, 0);
    }

    #[test]
    fn failed_grow_rolls_back_completely() {
        let core = test_core(64);
        let sector = core.freemap.allocate(1).unwrap();
        create(&core, sector, 4 * SECTOR_SIZE as u32, false).unwrap();
        let di_before = read_dinode(&core, sector);
        let free_before = core.freemap.free_count();

        // More sectors than the device has left.
        assert_eq!(
            resize(&core, sector, 200 * SECTOR_SIZE as u32),
            Err(FsError::NoSpace)
        );

        let di_after = read_dinode(&core, sector);
        assert_eq!(di_after.length(), di_before.length());
        assert_eq!(di_after.direct, di_before.direct);
        assert_eq!(di_after.indirect, di_before.indirect);
        assert_eq!(core.freemap.free_count(), free_before);
    }

    #[test]
    fn registry_deduplicates_open_inodes() {
        let core = test_core(64);
        let sector = core.freemap.allocate(1).unwrap();
        create(&core, sector, 0, false).unwrap();

        let a = iopen(&core, sector);
        let b = iopen(&core, sector);
        assert!(a.ptr_eq(&b));
        assert_eq!(a.open_count(), 2);
        assert_eq!(core.itable.live_count(), 1);

        drop(a);
        assert_eq!(b.open_count(), 1);
        drop(b);
        assert_eq!(core.itable.live_count(), 0);
    }

    #[test]
    fn removed_inode_frees_storage_at_last_close() {
        let core = test_core(64);
        let sector = core.freemap.allocate(1).unwrap();
        let free_after_probe = core.freemap.free_count();
        create(&core, sector, 2 * SECTOR_SIZE as u32, false).unwrap();

        let a = iopen(&core, sector);
        let b = a.clone();
        a.remove();
        drop(a);
        // Still open elsewhere: nothing released yet, data still readable.
        assert!(core.freemap.is_allocated(sector));
        let mut buf = [1u8; 4];
        assert_eq!(b.read_at(&mut buf, 0), 4);
        assert_eq!(buf, [0u8; 4]);

        drop(b);
        assert!(!core.freemap.is_allocated(sector));
        assert_eq!(core.freemap.free_count(), free_after_probe + 1);
    }

    #[test]
    fn write_read_round_trip_with_growth() {
        let core = test_core(256);
        let sector = core.freemap.allocate(1).unwrap();
        create(&core, sector, 0, false).unwrap();
        let ip = iopen(&core, sector);

        assert_eq!(ip.write_at(b"abcdef", 510), 6);
        assert_eq!(ip.len(), 516);
        let mut buf = [0u8; 6];
        assert_eq!(ip.read_at(&mut buf, 510), 6);
        assert_eq!(&buf, b"abcdef");

        // Reads stop at end of file; reads past it return nothing.
        assert_eq!(ip.read_at(&mut buf, 514), 2);
        assert_eq!(ip.read_at(&mut buf, 1000), 0);
    }

    #[test]
    fn deny_write_blocks_new_writers() {
        let core = test_core(64);
        let sector = core.freemap.allocate(1).unwrap();
        create(&core, sector, 0, false).unwrap();
        let ip = iopen(&core, sector);

        ip.deny_write();
        assert_eq!(ip.write_at(b"x", 0), 0);
        assert_eq!(ip.len(), 0);
        ip.allow_write();
        assert_eq!(ip.write_at(b"x", 0), 1);
    }
}
