// This file is part of the shakmaty-tbprobe library.
// Copyright (C) 2026 The shakmaty-tbprobe developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::atomic::{AtomicU64, Ordering},
};

use arrayvec::ArrayVec;
use rustc_hash::FxHasher;
use tracing::{debug, trace, warn};

use crate::{
    errors::{ProbeResultExt as _, SyzygyResult},
    lazy::Lazy,
    material::{Material, MaterialKey},
    table::{TableEntry, TableLoader},
    types::Metric,
};

/// Number of bits of the hash used to select a bucket.
pub(crate) const HASH_BITS: u32 = 10;

/// Maximum number of tables in a bucket.
pub(crate) const HASH_MAX: usize = 5;

/// Number of DTZ tables kept loaded.
pub const DTZ_ENTRIES: usize = 4;

fn bucket_index(key: MaterialKey) -> usize {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    (hasher.finish() >> (64 - HASH_BITS)) as usize
}

/// Zero is never the key of a material configuration with kings.
const INVALID_KEY: u64 = 0;

#[derive(Debug)]
struct Slot {
    key: AtomicU64,
    entry: usize,
}

#[derive(Debug)]
pub(crate) struct WdlCell<D> {
    material: Material,
    key: MaterialKey,
    table: Lazy<TableEntry<D>>,
}

impl<D> WdlCell<D> {
    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn key(&self) -> MaterialKey {
        self.key
    }

    fn keys(&self) -> ArrayVec<MaterialKey, 2> {
        let mut keys = ArrayVec::new();
        keys.push(self.key);
        if !self.material.is_symmetric() {
            keys.push(self.key.mirrored());
        }
        keys
    }
}

/// Index of all available WDL tables, loaded on first use.
///
/// Tables are found by their material key or its mirror.
pub(crate) struct TableCache<D> {
    buckets: Box<[ArrayVec<Slot, HASH_MAX>]>,
    cells: Vec<WdlCell<D>>,
}

impl<D> fmt::Debug for TableCache<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.cells.iter().map(|cell| &cell.material)).finish()
    }
}

impl<D> TableCache<D> {
    pub fn new() -> TableCache<D> {
        TableCache {
            buckets: (0..1 << HASH_BITS).map(|_| ArrayVec::new()).collect(),
            cells: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.cells.iter().map(|cell| &cell.material)
    }

    /// Registers a table. Returns `false` if it is already registered or
    /// there is no space left in the hash buckets.
    pub fn insert(&mut self, material: Material) -> bool {
        let key = material.key();
        if self.find(key).is_some() {
            return false;
        }

        let cell = WdlCell {
            key,
            table: Lazy::new(),
            material,
        };
        let keys = cell.keys();

        let fits = match keys.as_slice() {
            [a, b] if bucket_index(*a) == bucket_index(*b) => {
                self.buckets[bucket_index(*a)].remaining_capacity() >= 2
            }
            _ => keys.iter().all(|key| !self.buckets[bucket_index(*key)].is_full()),
        };
        if !fits {
            warn!(material = %cell.material, "hash bucket full, table skipped");
            return false;
        }

        let entry = self.cells.len();
        for key in keys {
            self.buckets[bucket_index(key)].push(Slot {
                key: AtomicU64::new(key.0),
                entry,
            });
        }
        self.cells.push(cell);
        true
    }

    /// Finds the registered table for a material key.
    pub fn find(&self, key: MaterialKey) -> Option<&WdlCell<D>> {
        self.buckets[bucket_index(key)]
            .iter()
            .find(|slot| slot.key.load(Ordering::Acquire) == key.0)
            .map(|slot| &self.cells[slot.entry])
    }

    /// Gets the table for a material key, loading it if required.
    ///
    /// Returns `Ok(None)` if there is no such table. If loading fails, the
    /// table is removed from the index, so that following probes report it
    /// as missing.
    pub fn get<L>(&self, key: MaterialKey, loader: &L) -> SyzygyResult<Option<&TableEntry<D>>>
    where
        L: TableLoader<Data = D>,
    {
        let Some(cell) = self.find(key) else {
            return Ok(None);
        };

        cell.table
            .get_or_try_init(|| {
                debug!(material = %cell.material, "loading wdl table");
                loader.load(&cell.material, Metric::Wdl)
            })
            .map(Some)
            .inspect_err(|error| {
                warn!(material = %cell.material, %error, "failed to load wdl table");
                self.invalidate(cell);
            })
            .ctx(Metric::Wdl, &cell.material)
    }

    fn invalidate(&self, cell: &WdlCell<D>) {
        for key in cell.keys() {
            for slot in &self.buckets[bucket_index(key)] {
                if self.cells[slot.entry].key == cell.key {
                    slot.key.store(INVALID_KEY, Ordering::Release);
                }
            }
        }
    }
}

#[derive(Debug)]
struct DtzSlot<T> {
    key1: MaterialKey,
    key2: MaterialKey,
    entry: Option<T>,
}

/// Most recently used DTZ tables, front first.
///
/// A failed load is remembered as a slot without entry.
#[derive(Debug)]
pub(crate) struct DtzCache<T> {
    slots: ArrayVec<DtzSlot<T>, DTZ_ENTRIES>,
}

impl<T> DtzCache<T> {
    pub fn new() -> DtzCache<T> {
        DtzCache {
            slots: ArrayVec::new(),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Moves the slot matching `key` to the front. Returns `false` if there
    /// is no such slot.
    pub fn promote(&mut self, key: MaterialKey) -> bool {
        match self.slots.iter().position(|slot| slot.key1 == key || slot.key2 == key) {
            Some(i) => {
                self.slots[..=i].rotate_right(1);
                true
            }
            None => false,
        }
    }

    /// The most recently used entry.
    pub fn front(&self) -> Option<&T> {
        self.slots.first().and_then(|slot| slot.entry.as_ref())
    }

    /// Inserts at the front, evicting the least recently used slot if full.
    pub fn insert(&mut self, key1: MaterialKey, key2: MaterialKey, entry: Option<T>) {
        if self.slots.is_full() {
            if let Some(evicted) = self.slots.pop() {
                trace!(key = evicted.key1.0, "evicting dtz table");
            }
        }
        self.slots.insert(0, DtzSlot { key1, key2, entry });
    }
}
