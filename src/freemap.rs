//! Free-sector map.
//!
//! Tracks which device sectors are allocated, one bit per sector. Callers may
//! hold inode or cache locks across these calls: the map is a lock-ordering
//! leaf and never re-enters the cache. Its on-disk image is a plain byte
//! dump of the bits, kept in a file whose inode lives at `FREE_MAP_SECTOR`;
//! reading and writing that file is the mount layer's business.

use itertools::Itertools;
use spin::Mutex;

struct Bits {
    bytes: Vec<u8>,
    len: u32,
}

impl Bits {
    fn test(&self, sector: u32) -> bool {
        self.bytes[(sector / 8) as usize] & (1 << (sector % 8)) != 0
    }

    fn set(&mut self, sector: u32) {
        self.bytes[(sector / 8) as usize] |= 1 << (sector % 8);
    }

    fn clear(&mut self, sector: u32) {
        self.bytes[(sector / 8) as usize] &= !(1 << (sector % 8));
    }
}

/// Bitmap allocator handing out runs of contiguous sectors.
pub(crate) struct FreeMap {
    inner: Mutex<Bits>,
}

impl FreeMap {
    /// A map of `sector_count` sectors, all free.
    pub fn new(sector_count: u32) -> FreeMap {
        FreeMap {
            inner: Mutex::new(Bits {
                bytes: vec![0; Self::byte_len(sector_count) as usize],
                len: sector_count,
            }),
        }
    }

    /// Length of the map's on-disk image in bytes.
    pub fn byte_len(sector_count: u32) -> u32 {
        (sector_count + 7) / 8
    }

    /// Allocates `cnt` contiguous sectors; returns the first, or `None` if
    /// no long-enough run of free sectors exists.
    pub fn allocate(&self, cnt: u32) -> Option<u32> {
        debug_assert!(cnt > 0);
        let mut bits = self.inner.lock();
        let start = {
            let runs = (0..bits.len).group_by(|&s| bits.test(s));
            let mut found = None;
            for (used, mut run) in &runs {
                if used {
                    continue;
                }
                let first = run.next().unwrap();
                if run.count() as u32 + 1 >= cnt {
                    found = Some(first);
                    break;
                }
            }
            found
        }?;
        for s in start..start + cnt {
            bits.set(s);
        }
        Some(start)
    }

    /// Releases `cnt` sectors starting at `start`. Releasing a free sector
    /// is a caller bug.
    pub fn release(&self, start: u32, cnt: u32) {
        let mut bits = self.inner.lock();
        for s in start..start + cnt {
            debug_assert!(bits.test(s), "releasing free sector {}", s);
            bits.clear(s);
        }
    }

    pub fn is_allocated(&self, sector: u32) -> bool {
        self.inner.lock().test(sector)
    }

    /// Free sectors remaining.
    pub fn free_count(&self) -> u32 {
        let bits = self.inner.lock();
        (0..bits.len).filter(|&s| !bits.test(s)).count() as u32
    }

    /// The map's on-disk image.
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().bytes.clone()
    }

    /// Replaces the map's state with an on-disk image read back at mount.
    pub fn restore(&self, image: &[u8]) {
        let mut bits = self.inner.lock();
        let len = bits.bytes.len().min(image.len());
        bits.bytes[..len].copy_from_slice(&image[..len]);
    }
}
