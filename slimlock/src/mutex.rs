//! An exclusive-only mutex whose entire state fits in one 32-bit word.
//!
//! [`RawMutex`] is the bare lock-word primitive: it stores no payload, never
//! allocates, and is a valid unlocked mutex the moment its storage is
//! zeroed. [`Mutex<T>`] layers an [`UnsafeCell<T>`](core::cell::UnsafeCell)
//! and a guard-returning API on top, the way `std::sync::Mutex` does over
//! an OS mutex.

use core::marker::PhantomData;

use crate::sync;

/// High bit of the lock word: set iff some thread considers itself the
/// exclusive owner. The remaining bits are a count of threads parked (or
/// about to park) waiting for the lock.
const HOLDER: u32 = 1 << 31;

const fn is_holder(word: u32) -> bool {
    word & HOLDER != 0
}

const fn waiters(word: u32) -> u32 {
    word & !HOLDER
}

/// The bare, data-free lock word described by this crate's specification:
/// `0` is unlocked-idle, `HOLDER` set means exclusively held, and the low
/// bits are a waiter count.
///
/// All operations are non-blocking except [`RawMutex::lock`],
/// [`RawMutex::spin_lock`], and the parking phase of `spin_lock`'s fallback.
/// None of them ever fail: the only observable outcomes are "done" or
/// "blocked".
#[repr(transparent)]
pub struct RawMutex {
    word: sync::AtomicU32,
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl RawMutex {
    /// A freshly zeroed `RawMutex` is unlocked with no waiters; this is
    /// just a named way to write that zero value.
    pub fn new() -> Self {
        Self {
            word: sync::AtomicU32::new(0),
        }
    }

    // TODO: merge with `new` if and when loom's `AtomicU32` gets a const `new`.
    /// As [`RawMutex::new`], usable in `const` contexts.
    #[cfg(not(loom))]
    pub const fn const_new() -> Self {
        Self {
            word: sync::AtomicU32::new(0),
        }
    }

    /// Attempts to transition the word from `0` (unlocked, no waiters) to
    /// `HOLDER`. Never blocks.
    pub fn try_lock(&self) -> bool {
        self.word
            .compare_exchange(0, HOLDER, sync::Ordering::Acquire, sync::Ordering::Relaxed)
            .is_ok()
    }

    /// Blocks until the lock is held by the calling thread.
    ///
    /// On an uncontended lock this resolves with a single atomic
    /// read-modify-write and never reaches the kernel. On contention, the
    /// calling thread registers itself in the waiter count and parks on the
    /// word's address until it wins the race to install `HOLDER`.
    pub fn lock(&self) {
        if self.try_lock() {
            return;
        }
        self.lock_contended();
    }

    /// As [`RawMutex::lock`], but first spins for up to `rounds` relaxed
    /// reads (each followed by a `try_lock` attempt when the read shows the
    /// lock free) before falling back to parking. The spin body only reads;
    /// it never issues a syscall.
    pub fn spin_lock(&self, rounds: u32) {
        for _ in 0..rounds {
            let seen = self.word.load(sync::Ordering::Relaxed);
            if !is_holder(seen) && self.try_lock() {
                return;
            }
            core::hint::spin_loop();
        }
        self.lock();
    }

    /// The contended path: register as a waiter, then repeatedly park until
    /// we win the race to install `HOLDER`, consuming our own waiter unit
    /// in the same compare-and-swap that sets it.
    fn lock_contended(&self) {
        // Registering as a waiter is a read-modify-write, so it can't break
        // the release sequence since the last unlock.
        let mut seen = self.word.fetch_add(1, sync::Ordering::AcqRel).wrapping_add(1);
        loop {
            while is_holder(seen) {
                match sync::futex_wait(&self.word, seen) {
                    Ok(()) => {}
                    #[cfg(not(loom))]
                    Err(e) => panic!("unexpected futex_wait error: {e:?}"),
                    #[cfg(loom)]
                    Err(()) => unreachable!(),
                }
                seen = self.word.load(sync::Ordering::Relaxed);
            }
            // `HOLDER` is clear and our waiter unit is still counted in
            // `seen`'s low bits. Spurious wakeups just send us back to the
            // top of this loop having learned nothing, which is fine.
            debug_assert!(waiters(seen) >= 1);
            match self.word.compare_exchange_weak(
                seen,
                HOLDER | (waiters(seen) - 1),
                sync::Ordering::Acquire,
                sync::Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(v) => seen = v,
            }
        }
    }

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// The caller (or some other thread the caller coordinated with; this
    /// primitive doesn't track ownership) must currently hold the lock.
    /// Calling this on an unheld lock, or calling it twice for one
    /// acquisition, corrupts the waiter count and is a logic error.
    pub unsafe fn unlock(&self) {
        let prev = self.word.fetch_and(!HOLDER, sync::Ordering::Release);
        debug_assert!(is_holder(prev), "unlock() called without holding the lock");
        if waiters(prev) > 0 {
            sync::futex_wake_one(&self.word).unwrap();
        }
    }

    /// True iff some thread currently holds the lock. Relaxed load:
    /// intended for instrumentation and lock-elision fast paths, not for
    /// program logic (a `true`/`false` result can be stale before the
    /// caller even observes it).
    pub fn is_locked(&self) -> bool {
        is_holder(self.word.load(sync::Ordering::Relaxed))
    }

    /// True iff the word is non-zero: held, waited on, or both. Same
    /// advisory caveat as [`RawMutex::is_locked`].
    pub fn is_locked_or_waiting(&self) -> bool {
        self.word.load(sync::Ordering::Relaxed) != 0
    }
}

/// A mutex guarding a `T`, built on [`RawMutex`].
///
/// Zero-initialized storage holding a zero-initialized `T` is a valid,
/// unlocked `Mutex<T>` — no constructor work beyond zeroing is required,
/// matching the bare `RawMutex`'s own zero-is-valid contract.
#[repr(C)]
pub struct Mutex<T> {
    raw: RawMutex,
    val: sync::UnsafeCell<T>,
}

unsafe impl<T> Send for Mutex<T> where T: Send {}
unsafe impl<T> Sync for Mutex<T> where T: Send {}

impl<T> Mutex<T> {
    pub fn new(val: T) -> Self {
        Self {
            raw: RawMutex::new(),
            val: sync::UnsafeCell::new(val),
        }
    }

    // TODO: merge with `new` if and when loom's `AtomicU32` gets a const `new`.
    /// As [`Mutex::new`], usable in `const` contexts.
    #[cfg(not(loom))]
    pub const fn const_new(val: T) -> Self {
        Self {
            raw: RawMutex::const_new(),
            val: sync::UnsafeCell::new(val),
        }
    }

    /// Blocks until the lock is acquired, then returns a guard granting
    /// access to the payload.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw.lock();
        MutexGuard {
            mutex: Some(self),
            ptr: Some(self.val.get_mut()),
            _phantom: PhantomData,
        }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.raw.try_lock() {
            Some(MutexGuard {
                mutex: Some(self),
                ptr: Some(self.val.get_mut()),
                _phantom: PhantomData,
            })
        } else {
            None
        }
    }

    /// As [`Mutex::lock`], but spins up to `rounds` times before parking.
    pub fn spin_lock(&self, rounds: u32) -> MutexGuard<'_, T> {
        self.raw.spin_lock(rounds);
        MutexGuard {
            mutex: Some(self),
            ptr: Some(self.val.get_mut()),
            _phantom: PhantomData,
        }
    }

    /// See [`RawMutex::is_locked`].
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// See [`RawMutex::is_locked_or_waiting`].
    pub fn is_locked_or_waiting(&self) -> bool {
        self.raw.is_locked_or_waiting()
    }

    /// Unsynchronized access to the payload, available only when the
    /// caller statically holds the only reference to the `Mutex`.
    pub fn get_mut(&mut self) -> &mut T {
        self.val.get_mut().with(|p| unsafe { &mut *p })
    }
}

pub struct MutexGuard<'a, T> {
    mutex: Option<&'a Mutex<T>>,
    ptr: Option<sync::MutPtr<T>>,
    // For Send/Sync purposes this type should behave like `&mut T`.
    _phantom: PhantomData<&'a mut T>,
}

impl<'a, T> MutexGuard<'a, T> {
    /// Drops the guard *without releasing the lock*.
    ///
    /// Useful when a lock must stay held across a span of code where
    /// threading the guard through by value isn't practical (e.g. across an
    /// FFI boundary). Pair with [`MutexGuard::reconnect`].
    pub fn disconnect(mut self) -> MutexGuardDisconnected<'a, T> {
        let mutex = self.mutex.take().expect("guard already disconnected");
        self.ptr.take();
        MutexGuardDisconnected { mutex }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(mutex) = self.mutex.take() {
            // Drop the pointer before unlocking: under loom this avoids
            // overlapping it with the next lock's mutable reference.
            drop(self.ptr.take());
            // SAFETY: this guard's existence proves we hold the lock.
            unsafe { mutex.raw.unlock() };
        }
    }
}

impl<T> core::ops::Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Avoid `ptr.deref()` here: that produces `&mut T`, and a `&T`
        // borrowed from `&self` could already be outstanding.
        self.ptr.as_ref().unwrap().with(|p| unsafe { &*p })
    }
}

impl<T> core::ops::DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { self.ptr.as_ref().unwrap().deref() }
    }
}

/// A lock held by a [`MutexGuard`] that was dropped via
/// [`MutexGuard::disconnect`], without releasing it.
pub struct MutexGuardDisconnected<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> MutexGuardDisconnected<'a, T> {
    /// Reconstitutes the guard. Safe to call from a different thread than
    /// the one that disconnected it, though the caller is responsible for
    /// making sure the disconnect has actually happened-before this call.
    pub fn reconnect(self) -> MutexGuard<'a, T> {
        debug_assert!(self.mutex.raw.is_locked());
        MutexGuard {
            mutex: Some(self.mutex),
            ptr: Some(self.mutex.val.get_mut()),
            _phantom: PhantomData,
        }
    }
}

static_assertions::assert_eq_size!(RawMutex, u32);

// SAFETY: `RawMutex` is a single atomic word with no address-dependent
// data. `Mutex<T>` inherits that property from `T`.
#[cfg(feature = "shareable-layout")]
unsafe impl slimlock_layout::ShareableLayout for RawMutex {}
#[cfg(feature = "shareable-layout")]
unsafe impl<T: slimlock_layout::ShareableLayout> slimlock_layout::ShareableLayout for Mutex<T> {}
