//! Low-level primitives used by [`crate::mutex`] and [`crate::shared_mutex`]:
//! atomics, the address-keyed park/unpark facility, and an `UnsafeCell`
//! wrapper.
//!
//! When built with `--cfg loom`, all of the above are swapped for loom's
//! models instead of the real platform primitives, so the interleavings
//! exercised in `tests/` are checked exhaustively rather than by chance.
//!
//! This module is `pub` only so the integration tests under `tests/` (the
//! recommended place to write loom tests) can reach it. It is not meant for
//! use by other crates.

#[cfg(not(loom))]
pub use core::sync::atomic;
#[cfg(not(loom))]
pub use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(loom)]
pub use loom::sync::atomic;
#[cfg(loom)]
pub use loom::sync::atomic::{AtomicU32, Ordering};

#[cfg(not(loom))]
use rustix::io::Errno;

/// Parks the calling thread while `word` still holds `expect`.
///
/// Returns once the kernel (or loom) has observed a potential change, a
/// signal interrupted the wait, or the comparison failed outright (the
/// caller always re-checks `word` afterward, so any of these outcomes are
/// handled identically by callers).
#[cfg(not(loom))]
pub fn futex_wait(word: &AtomicU32, expect: u32) -> Result<(), Errno> {
    match rustix::thread::futex::wait(
        word,
        rustix::thread::futex::Flags::empty(),
        expect,
        None,
    ) {
        Ok(_) => Ok(()),
        Err(Errno::AGAIN) | Err(Errno::INTR) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(loom)]
pub fn futex_wait(word: &AtomicU32, expect: u32) -> Result<(), ()> {
    let mut hashmap = FUTEXES.lock().unwrap();
    if word.load(Ordering::Relaxed) != expect {
        return Ok(());
    }
    let condvar = hashmap
        .entry(word as *const _ as usize)
        .or_insert_with(|| Arc::new(loom::sync::Condvar::new()))
        .clone();
    // We may get a spurious wakeup here, which is fine: real futexes are
    // subject to them too, and every caller loops on its own predicate.
    condvar.wait(hashmap).unwrap();
    Ok(())
}

/// Wakes at most one thread parked on `word`.
#[cfg(not(loom))]
pub fn futex_wake_one(word: &AtomicU32) -> Result<(), Errno> {
    rustix::thread::futex::wake(word, rustix::thread::futex::Flags::empty(), 1).map(|_| ())
}

#[cfg(loom)]
pub fn futex_wake_one(word: &AtomicU32) -> Result<(), ()> {
    let hashmap = FUTEXES.lock().unwrap();
    if let Some(condvar) = hashmap.get(&(word as *const _ as usize)) {
        condvar.notify_one();
    }
    Ok(())
}

#[cfg(loom)]
use loom::sync::{Condvar, Mutex as StdMutex};
#[cfg(loom)]
pub use loom::sync::Arc;
#[cfg(loom)]
use std::collections::HashMap;

// Maps a *virtual* address to the condvar standing in for its futex queue.
// Doesn't support loom tests that straddle multiple processes or multiple
// virtual addresses for the same object, but neither does this crate.
#[cfg(loom)]
loom::lazy_static! {
    static ref FUTEXES: StdMutex<HashMap<usize, Arc<Condvar>>> = StdMutex::new(HashMap::new());
}

/// Clears loom's global futex table between model iterations.
#[cfg(loom)]
pub fn loom_reset() {
    FUTEXES.lock().unwrap().clear();
}

#[cfg(not(loom))]
pub struct MutPtr<T: ?Sized>(*mut T);
#[cfg(not(loom))]
impl<T: ?Sized> MutPtr<T> {
    /// # Safety
    ///
    /// See `loom::cell::MutPtr::deref`.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn deref(&self) -> &mut T {
        unsafe { &mut *self.0 }
    }

    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(*mut T) -> R,
    {
        f(self.0)
    }
}
// loom's MutPtr is otherwise !Send; wrap it so our guards can still be Send.
// https://github.com/tokio-rs/loom/issues/294
#[cfg(loom)]
pub struct MutPtr<T: ?Sized>(loom::cell::MutPtr<T>);
#[cfg(loom)]
impl<T: ?Sized> MutPtr<T> {
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn deref(&self) -> &mut T {
        unsafe { self.0.deref() }
    }

    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(*mut T) -> R,
    {
        self.0.with(f)
    }
}

unsafe impl<T: ?Sized> Send for MutPtr<T> where T: Send {}

// From https://docs.rs/loom/latest/loom/#handling-loom-api-differences
#[cfg(not(loom))]
#[derive(Debug)]
#[repr(transparent)]
pub struct UnsafeCell<T>(core::cell::UnsafeCell<T>);
#[cfg(not(loom))]
impl<T> UnsafeCell<T> {
    pub const fn new(data: T) -> UnsafeCell<T> {
        UnsafeCell(core::cell::UnsafeCell::new(data))
    }

    pub fn get_mut(&self) -> MutPtr<T> {
        MutPtr(self.0.get())
    }
}
#[cfg(loom)]
#[derive(Debug)]
pub struct UnsafeCell<T>(loom::cell::UnsafeCell<T>);
#[cfg(loom)]
impl<T> UnsafeCell<T> {
    pub fn new(data: T) -> UnsafeCell<T> {
        UnsafeCell(loom::cell::UnsafeCell::new(data))
    }

    pub fn get_mut(&self) -> MutPtr<T> {
        MutPtr(self.0.get_mut())
    }
}
