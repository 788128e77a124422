//! Buffer cache.
//!
//! The buffer cache is an ordered list of entries holding cached copies of
//! device sector contents. Caching sectors in memory reduces the number of
//! device reads and also provides a synchronization point for sectors used by
//! multiple threads.
//!
//! The list is kept in recency order and evicts from the cold end; writes
//! stay in the cache until their entry is evicted or the cache is flushed.
//!
//! Two levels of locking: the list lock covers membership and recency and is
//! released before the fill read on a miss; each entry's lock covers its
//! 512-byte buffer and is held while copying and while reading the sector in
//! on a miss. No holder of an entry lock ever takes the list lock, so
//! blocking on an entry lock with the list lock held cannot deadlock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::device::BlockDevice;
use crate::param::{NBUF, SECTOR_SIZE};

struct BufInner {
    dirty: bool,
    data: [u8; SECTOR_SIZE],
}

struct BufEntry {
    sector: u32,
    inner: Mutex<BufInner>,
}

/// Write-back LRU cache over a block device. All sector traffic above the
/// device goes through here.
pub(crate) struct Bcache {
    dev: Arc<dyn BlockDevice>,
    /// Recency order: least recently used first, most recent last.
    list: Mutex<Vec<Arc<BufEntry>>>,
    hits: AtomicU64,
}

impl Bcache {
    /// An empty cache; entries appear on demand, up to `NBUF`.
    pub fn new(dev: Arc<dyn BlockDevice>) -> Bcache {
        Bcache {
            dev,
            list: Mutex::new(Vec::with_capacity(NBUF)),
            hits: AtomicU64::new(0),
        }
    }

    pub fn sector_count(&self) -> u32 {
        self.dev.sector_count()
    }

    /// Copies `dst.len()` bytes out of `sector`, starting `offset` bytes in.
    pub fn read(&self, sector: u32, dst: &mut [u8], offset: usize) {
        assert!(offset + dst.len() <= SECTOR_SIZE);
        self.with_entry(sector, |inner| {
            dst.copy_from_slice(&inner.data[offset..offset + dst.len()]);
        })
    }

    /// Copies `src` into `sector` at `offset` and marks the entry dirty.
    pub fn write(&self, sector: u32, src: &[u8], offset: usize) {
        assert!(offset + src.len() <= SECTOR_SIZE);
        self.with_entry(sector, |inner| {
            inner.data[offset..offset + src.len()].copy_from_slice(src);
            inner.dirty = true;
        })
    }

    /// Fills `sector` with zeroes.
    pub fn zero(&self, sector: u32) {
        self.write(sector, &[0u8; SECTOR_SIZE], 0)
    }

    /// Runs `f` on the cached copy of `sector`, loading it on a miss.
    fn with_entry<R>(&self, sector: u32, f: impl FnOnce(&mut BufInner) -> R) -> R {
        let mut list = self.list.lock().unwrap();

        if let Some(pos) = list.iter().position(|e| e.sector == sector) {
            let entry = list.remove(pos);
            list.push(entry.clone());
            // Entry lock taken before the list lock drops, so the entry
            // cannot be evicted out from under us.
            let mut guard = entry.inner.lock().unwrap();
            drop(list);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return f(&mut guard);
        }

        // Miss. Make room, then insert the new entry while still holding the
        // list lock: a concurrent miss on the same sector must find it
        // rather than insert a duplicate. The victim's write-back happens
        // under its own lock and before the list lock drops, or a miss on
        // the victim's sector could read stale device contents.
        if list.len() == NBUF {
            let victim = list.remove(0);
            let inner = victim.inner.lock().unwrap();
            if inner.dirty {
                log::trace!("bcache: evicting dirty sector {}", victim.sector);
                self.dev.write(victim.sector, &inner.data);
            }
        }

        let entry = Arc::new(BufEntry {
            sector,
            inner: Mutex::new(BufInner {
                dirty: false,
                data: [0; SECTOR_SIZE],
            }),
        });
        list.push(entry.clone());
        let mut guard = entry.inner.lock().unwrap();
        drop(list);

        // The fill read happens with only the entry lock held.
        self.dev.read(sector, &mut guard.data);
        f(&mut guard)
    }

    /// Writes every dirty entry back to the device and empties the cache.
    pub fn flush(&self) {
        let drained: Vec<Arc<BufEntry>> = {
            let mut list = self.list.lock().unwrap();
            list.drain(..).collect()
        };
        for entry in drained {
            let inner = entry.inner.lock().unwrap();
            if inner.dirty {
                self.dev.write(entry.sector, &inner.data);
            }
        }
    }

    /// Returns the hits accumulated since the previous call and resets the
    /// counter. Misses are not counted.
    pub fn hit_rate(&self) -> u64 {
        self.hits.swap(0, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDisk;

    #[test]
    fn read_after_write_before_any_flush() {
        let disk = MemDisk::new(16);
        let cache = Bcache::new(disk.clone());

        cache.write(5, b"hello", 100);
        let mut out = [0u8; 5];
        cache.read(5, &mut out, 100);
        assert_eq!(&out, b"hello");
        // Write-back: the device has not seen the data yet.
        assert_eq!(disk.write_count(), 0);
    }

    #[test]
    fn flush_writes_dirty_entries_and_empties() {
        let disk = MemDisk::new(16);
        let cache = Bcache::new(disk.clone());

        cache.write(2, &[7u8; SECTOR_SIZE], 0);
        cache.read(3, &mut [0u8; 4], 0);
        cache.flush();
        // Only the dirty sector went out.
        assert_eq!(disk.write_count(), 1);

        // Cold again: the next read misses and goes to the device.
        let before = disk.read_count();
        let mut out = [0u8; 1];
        cache.read(2, &mut out, 0);
        assert_eq!(out[0], 7);
        assert_eq!(disk.read_count(), before + 1);
    }

    #[test]
    fn lru_eviction_writes_back_cold_dirty_sector() {
        let disk = MemDisk::new(256);
        let cache = Bcache::new(disk.clone());

        cache.write(0, &[1u8; SECTOR_SIZE], 0);
        // Touch NBUF other sectors; sector 0 becomes the LRU entry and must
        // be written back when capacity is exceeded.
        for s in 1..=NBUF as u32 {
            cache.read(s, &mut [0u8; 1], 0);
        }
        assert_eq!(disk.write_count(), 1);

        // The data survived the round trip through the device.
        let mut out = [0u8; 1];
        cache.read(0, &mut out, 0);
        assert_eq!(out[0], 1);
    }

    #[test]
    fn hit_counter_resets_on_snapshot() {
        let disk = MemDisk::new(16);
        let cache = Bcache::new(disk);

        cache.read(1, &mut [0u8; 1], 0); // miss
        cache.read(1, &mut [0u8; 1], 0); // hit
        cache.read(1, &mut [0u8; 1], 0); // hit
        assert_eq!(cache.hit_rate(), 2);
        assert_eq!(cache.hit_rate(), 0);
    }

    #[test]
    fn capacity_is_bounded() {
        let disk = MemDisk::new(512);
        let cache = Bcache::new(disk);
        for s in 0..300u32 {
            cache.read(s, &mut [0u8; 1], 0);
        }
        assert!(cache.list.lock().unwrap().len() <= NBUF);
    }
}
