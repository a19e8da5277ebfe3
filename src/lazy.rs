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
    cell::UnsafeCell,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, PoisonError,
    },
};

/// A cell that is initialized at most once, by the first caller whose
/// initializer succeeds.
///
/// Readers on the fast path only perform an acquire load of the ready flag.
pub struct Lazy<T> {
    ready: AtomicBool,
    lock: Mutex<()>,
    value: UnsafeCell<Option<T>>,
}

// The value is only written while holding the lock and before the ready
// flag is published. After that it is only ever read.
unsafe impl<T: Send + Sync> Sync for Lazy<T> {}
unsafe impl<T: Send> Send for Lazy<T> {}

impl<T> Default for Lazy<T> {
    fn default() -> Lazy<T> {
        Lazy::new()
    }
}

impl<T> Lazy<T> {
    pub fn new() -> Lazy<T> {
        Lazy {
            ready: AtomicBool::new(false),
            lock: Mutex::new(()),
            value: UnsafeCell::new(None),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn get(&self) -> Option<&T> {
        if self.is_ready() {
            // Safety: published with release ordering, never written again.
            unsafe { &*self.value.get() }.as_ref()
        } else {
            None
        }
    }

    /// Gets the value, initializing it with `f` if no previous
    /// initialization succeeded.
    ///
    /// On error the cell stays empty and a later call may try again.
    pub fn get_or_try_init<F, E>(&self, f: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        // Double-checked locking:
        // https://stackoverflow.com/a/45692413/722291

        if let Some(value) = self.get() {
            return Ok(value);
        }

        let _lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.ready.load(Ordering::Relaxed) {
            let value = f()?;
            // Safety: exclusive under the lock, and no reader observes the
            // slot before the ready flag is set.
            unsafe { *self.value.get() = Some(value) };
            self.ready.store(true, Ordering::Release);
        }

        // Safety: ready, so the value is initialized and immutable.
        match unsafe { &*self.value.get() } {
            Some(value) => Ok(value),
            None => unreachable!("lazy value ready but empty"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Lazy").field(value).finish(),
            None => f.write_str("Lazy(<uninit>)"),
        }
    }
}
