//! A three-mode (exclusive / shared / update) lock composed from an
//! [`RawMutex`] "outer" gate plus a second atomic "inner" word tracking
//! reader/update occupancy and exclusive-pending state.
//!
//! See the module invariants in this crate's specification: exclusive and
//! update admission always go through `outer`; shared acquisition never
//! touches `outer` except to briefly queue behind a pending writer.

use core::marker::PhantomData;

use crate::mutex::RawMutex;
use crate::sync;

/// High bit of the inner word: set while a writer is either installed or
/// waiting for readers to drain. The remaining bits count current shared
/// holders plus the current update holder (update counts as one unit).
const X: u32 = 1 << 31;

const fn is_x(word: u32) -> bool {
    word & X != 0
}

const fn occupants(word: u32) -> u32 {
    word & !X
}

/// The bare, data-free reader/writer/updater lock word described by this
/// crate's specification.
///
/// Exclusive and update admission serialize through the embedded
/// [`RawMutex`] ("outer"); shared holders only ever touch the inner atomic
/// word, and briefly queue behind `outer` solely to avoid starving a
/// pending writer.
#[repr(C)]
pub struct RawSharedMutex {
    outer: RawMutex,
    inner: sync::AtomicU32,
}

impl Default for RawSharedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSharedMutex {
    pub fn new() -> Self {
        Self {
            outer: RawMutex::new(),
            inner: sync::AtomicU32::new(0),
        }
    }

    // TODO: merge with `new` if and when loom's `AtomicU32` gets a const `new`.
    /// As [`RawSharedMutex::new`], usable in `const` contexts.
    #[cfg(not(loom))]
    pub const fn const_new() -> Self {
        Self {
            outer: RawMutex::const_new(),
            inner: sync::AtomicU32::new(0),
        }
    }

    // ---- exclusive ----------------------------------------------------

    /// Attempts to acquire exclusive access without blocking.
    ///
    /// Because a single-shot `try_lock` must not block even for a moment
    /// spent waiting on readers to drain, this only succeeds when `outer`
    /// and `inner` are *both* free at the test point; if readers are
    /// present it releases `outer` again and returns `false` rather than
    /// waiting for them.
    pub fn try_lock(&self) -> bool {
        if !self.outer.try_lock() {
            return false;
        }
        match self
            .inner
            .compare_exchange(0, X, sync::Ordering::Acquire, sync::Ordering::Relaxed)
        {
            Ok(_) => true,
            Err(_) => {
                // SAFETY: we just took `outer` above.
                unsafe { self.outer.unlock() };
                false
            }
        }
    }

    /// Blocks until exclusive access is granted: takes `outer`, installs
    /// `X`, then waits for any draining readers.
    pub fn lock(&self) {
        self.outer.lock();
        self.lock_inner_after_outer();
    }

    /// As [`RawSharedMutex::lock`], but spins up to `rounds` times on each
    /// stage (acquiring `outer`, then draining readers) before parking.
    pub fn spin_lock(&self, rounds: u32) {
        self.outer.spin_lock(rounds);
        self.spin_lock_inner_after_outer(rounds);
    }

    /// Installs `X` and waits for readers to drain. Caller must already
    /// hold `outer`.
    fn lock_inner_after_outer(&self) {
        let prev = self.inner.fetch_or(X, sync::Ordering::Acquire);
        let mut seen = prev | X;
        while occupants(seen) > 0 {
            match sync::futex_wait(&self.inner, seen) {
                Ok(()) => {}
                #[cfg(not(loom))]
                Err(e) => panic!("unexpected futex_wait error: {e:?}"),
                #[cfg(loom)]
                Err(()) => unreachable!(),
            }
            seen = self.inner.load(sync::Ordering::Acquire);
        }
    }

    fn spin_lock_inner_after_outer(&self, rounds: u32) {
        let prev = self.inner.fetch_or(X, sync::Ordering::Acquire);
        if occupants(prev) == 0 {
            return;
        }
        for _ in 0..rounds {
            if occupants(self.inner.load(sync::Ordering::Acquire)) == 0 {
                return;
            }
            core::hint::spin_loop();
        }
        let mut seen = self.inner.load(sync::Ordering::Acquire);
        while occupants(seen) > 0 {
            match sync::futex_wait(&self.inner, seen) {
                Ok(()) => {}
                #[cfg(not(loom))]
                Err(e) => panic!("unexpected futex_wait error: {e:?}"),
                #[cfg(loom)]
                Err(()) => unreachable!(),
            }
            seen = self.inner.load(sync::Ordering::Acquire);
        }
    }

    /// Releases exclusive access.
    ///
    /// # Safety
    ///
    /// The caller must currently hold exclusive access (having returned
    /// from [`RawSharedMutex::lock`]/`try_lock`/`spin_lock`, and not yet
    /// called `unlock`/`update_lock_downgrade` for that acquisition).
    pub unsafe fn unlock(&self) {
        self.inner.store(0, sync::Ordering::Release);
        sync::futex_wake_one(&self.inner).unwrap();
        // SAFETY: forwarded from caller.
        unsafe { self.outer.unlock() };
    }

    // ---- shared ---------------------------------------------------------

    /// Attempts to acquire shared access without blocking.
    pub fn try_lock_shared(&self) -> bool {
        let mut seen = self.inner.load(sync::Ordering::Relaxed);
        loop {
            if is_x(seen) {
                return false;
            }
            match self.inner.compare_exchange_weak(
                seen,
                seen + 1,
                sync::Ordering::Acquire,
                sync::Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(v) => seen = v,
            }
        }
    }

    /// Blocks until shared access is granted. Never takes `outer` except to
    /// briefly queue behind a pending or installed writer, so it can't
    /// starve indefinitely as long as writers eventually release.
    pub fn lock_shared(&self) {
        loop {
            if self.try_lock_shared() {
                return;
            }
            self.outer.lock();
            let acquired = self.try_lock_shared();
            // SAFETY: we just took `outer` above.
            unsafe { self.outer.unlock() };
            if acquired {
                return;
            }
        }
    }

    /// As [`RawSharedMutex::lock_shared`], but spins up to `rounds` times
    /// before falling back to the queue-behind-`outer` retry loop.
    pub fn spin_lock_shared(&self, rounds: u32) {
        for _ in 0..rounds {
            if self.try_lock_shared() {
                return;
            }
            core::hint::spin_loop();
        }
        self.lock_shared();
    }

    /// Releases shared access.
    ///
    /// # Safety
    ///
    /// The caller must currently hold shared access.
    pub unsafe fn unlock_shared(&self) {
        let prev = self.inner.fetch_sub(1, sync::Ordering::Release);
        debug_assert!(occupants(prev) >= 1, "unlock_shared() without a shared holder");
        if prev.wrapping_sub(1) == X {
            // We were the last reader draining for a pending exclusive.
            sync::futex_wake_one(&self.inner).unwrap();
        }
    }

    // ---- update -----------------------------------------------------------

    /// Attempts to acquire the update slot without blocking.
    pub fn try_lock_update(&self) -> bool {
        if !self.outer.try_lock() {
            return false;
        }
        // `X` can't be set here: installing `X` requires holding `outer`,
        // which we just took.
        self.inner.fetch_add(1, sync::Ordering::Acquire);
        true
    }

    /// Blocks until the update slot is granted.
    pub fn lock_update(&self) {
        self.outer.lock();
        self.inner.fetch_add(1, sync::Ordering::Acquire);
    }

    /// As [`RawSharedMutex::lock_update`], but spins on `outer` up to
    /// `rounds` times before parking.
    pub fn spin_lock_update(&self, rounds: u32) {
        self.outer.spin_lock(rounds);
        self.inner.fetch_add(1, sync::Ordering::Acquire);
    }

    /// Releases the update slot.
    ///
    /// # Safety
    ///
    /// The caller must currently hold the update slot.
    pub unsafe fn unlock_update(&self) {
        let prev = self.inner.fetch_sub(1, sync::Ordering::Release);
        debug_assert!(occupants(prev) >= 1, "unlock_update() without the update slot");
        if prev.wrapping_sub(1) == X {
            sync::futex_wake_one(&self.inner).unwrap();
        }
        // SAFETY: forwarded from caller.
        unsafe { self.outer.unlock() };
    }

    // ---- upgrade / downgrade ----------------------------------------------

    /// Upgrades the calling thread's update hold to exclusive, blocking
    /// until any concurrent readers drain. `outer` remains held throughout.
    ///
    /// # Safety
    ///
    /// The caller must currently hold the update slot.
    pub unsafe fn update_lock_upgrade(&self) {
        // Cancels our own update unit while installing `X`, in one step.
        let prev = self.inner.fetch_add(X.wrapping_sub(1), sync::Ordering::AcqRel);
        let mut seen = prev.wrapping_add(X.wrapping_sub(1));
        while occupants(seen) > 0 {
            match sync::futex_wait(&self.inner, seen) {
                Ok(()) => {}
                #[cfg(not(loom))]
                Err(e) => panic!("unexpected futex_wait error: {e:?}"),
                #[cfg(loom)]
                Err(()) => unreachable!(),
            }
            seen = self.inner.load(sync::Ordering::Acquire);
        }
    }

    /// Downgrades the calling thread's exclusive hold back to update.
    /// `outer` remains held throughout. No wake is needed: any reader that
    /// arrives after this store simply finds `X` clear and succeeds, and no
    /// shared waiter could exist from before (they can't increment past a
    /// set `X`).
    ///
    /// # Safety
    ///
    /// The caller must currently hold exclusive access.
    pub unsafe fn update_lock_downgrade(&self) {
        self.inner.store(1, sync::Ordering::Release);
    }

    // ---- predicates ---------------------------------------------------

    /// True iff an exclusive writer is pending or installed (the `X` bit).
    pub fn is_waiting(&self) -> bool {
        is_x(self.inner.load(sync::Ordering::Relaxed))
    }

    /// True iff the exclusive holder is installed with no readers or
    /// update holder draining (`inner == X`).
    pub fn is_locked(&self) -> bool {
        self.inner.load(sync::Ordering::Relaxed) == X
    }

    /// True iff any holder or waiter exists at all: shared, update,
    /// exclusive, or a thread parked on `outer`.
    pub fn is_locked_or_waiting(&self) -> bool {
        self.inner.load(sync::Ordering::Relaxed) != 0 || self.outer.is_locked_or_waiting()
    }
}

static_assertions::assert_eq_size!(RawSharedMutex, [u32; 2]);

// SAFETY: `RawSharedMutex` is two atomic words with no address-dependent
// data. `SharedMutex<T>` inherits that property from `T`.
#[cfg(feature = "shareable-layout")]
unsafe impl slimlock_layout::ShareableLayout for RawSharedMutex {}
#[cfg(feature = "shareable-layout")]
unsafe impl<T: slimlock_layout::ShareableLayout> slimlock_layout::ShareableLayout
    for SharedMutex<T>
{
}

/// A three-mode reader/writer/updater lock guarding a `T`, built on
/// [`RawSharedMutex`].
///
/// Zero-initialized storage holding a zero-initialized `T` is a valid,
/// unlocked `SharedMutex<T>`.
#[repr(C)]
pub struct SharedMutex<T> {
    raw: RawSharedMutex,
    val: sync::UnsafeCell<T>,
}

unsafe impl<T> Send for SharedMutex<T> where T: Send {}
unsafe impl<T> Sync for SharedMutex<T> where T: Send + Sync {}

impl<T> SharedMutex<T> {
    pub fn new(val: T) -> Self {
        Self {
            raw: RawSharedMutex::new(),
            val: sync::UnsafeCell::new(val),
        }
    }

    // TODO: merge with `new` if and when loom's `AtomicU32` gets a const `new`.
    /// As [`SharedMutex::new`], usable in `const` contexts.
    #[cfg(not(loom))]
    pub const fn const_new(val: T) -> Self {
        Self {
            raw: RawSharedMutex::const_new(),
            val: sync::UnsafeCell::new(val),
        }
    }

    /// Blocks until exclusive (write) access is granted.
    pub fn lock(&self) -> SharedMutexWriteGuard<'_, T> {
        self.raw.lock();
        self.write_guard()
    }

    /// Attempts to acquire exclusive access without blocking.
    pub fn try_lock(&self) -> Option<SharedMutexWriteGuard<'_, T>> {
        self.raw.try_lock().then(|| self.write_guard())
    }

    /// As [`SharedMutex::lock`], but spins up to `rounds` times before
    /// parking.
    pub fn spin_lock(&self, rounds: u32) -> SharedMutexWriteGuard<'_, T> {
        self.raw.spin_lock(rounds);
        self.write_guard()
    }

    /// As [`SharedMutex::lock`].
    pub fn write(&self) -> SharedMutexWriteGuard<'_, T> {
        self.lock()
    }

    /// As [`SharedMutex::try_lock`].
    pub fn try_write(&self) -> Option<SharedMutexWriteGuard<'_, T>> {
        self.try_lock()
    }

    /// Blocks until shared (read) access is granted.
    pub fn lock_shared(&self) -> SharedMutexReadGuard<'_, T> {
        self.raw.lock_shared();
        self.read_guard()
    }

    /// Attempts to acquire shared access without blocking.
    pub fn try_lock_shared(&self) -> Option<SharedMutexReadGuard<'_, T>> {
        self.raw.try_lock_shared().then(|| self.read_guard())
    }

    /// As [`SharedMutex::lock_shared`], but spins up to `rounds` times before
    /// falling back to the queue-behind-`outer` retry loop.
    pub fn spin_lock_shared(&self, rounds: u32) -> SharedMutexReadGuard<'_, T> {
        self.raw.spin_lock_shared(rounds);
        self.read_guard()
    }

    /// As [`SharedMutex::lock_shared`].
    pub fn read(&self) -> SharedMutexReadGuard<'_, T> {
        self.lock_shared()
    }

    /// As [`SharedMutex::try_lock_shared`].
    pub fn try_read(&self) -> Option<SharedMutexReadGuard<'_, T>> {
        self.try_lock_shared()
    }

    /// Blocks until the update slot is granted. An update holder coexists
    /// with shared readers but not with another update holder or a writer.
    pub fn lock_update(&self) -> SharedMutexUpdateGuard<'_, T> {
        self.raw.lock_update();
        self.update_guard()
    }

    /// Attempts to acquire the update slot without blocking.
    pub fn try_lock_update(&self) -> Option<SharedMutexUpdateGuard<'_, T>> {
        self.raw.try_lock_update().then(|| self.update_guard())
    }

    /// As [`SharedMutex::lock_update`], but spins on `outer` up to `rounds`
    /// times before parking.
    pub fn spin_lock_update(&self, rounds: u32) -> SharedMutexUpdateGuard<'_, T> {
        self.raw.spin_lock_update(rounds);
        self.update_guard()
    }

    /// As [`SharedMutex::lock_update`].
    pub fn update(&self) -> SharedMutexUpdateGuard<'_, T> {
        self.lock_update()
    }

    /// As [`SharedMutex::try_lock_update`].
    pub fn try_update(&self) -> Option<SharedMutexUpdateGuard<'_, T>> {
        self.try_lock_update()
    }

    /// True iff an exclusive writer is pending or installed.
    pub fn is_waiting(&self) -> bool {
        self.raw.is_waiting()
    }

    /// True iff exclusive access is currently held.
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// True iff any holder or waiter exists in any mode.
    pub fn is_locked_or_waiting(&self) -> bool {
        self.raw.is_locked_or_waiting()
    }

    /// Unsynchronized access to the payload, available only when the
    /// caller statically holds the only reference to the `SharedMutex`.
    pub fn get_mut(&mut self) -> &mut T {
        self.val.get_mut().with(|p| unsafe { &mut *p })
    }

    fn read_guard(&self) -> SharedMutexReadGuard<'_, T> {
        SharedMutexReadGuard {
            mutex: self,
            ptr: self.val.get_mut(),
            _phantom: PhantomData,
        }
    }

    fn update_guard(&self) -> SharedMutexUpdateGuard<'_, T> {
        SharedMutexUpdateGuard {
            mutex: self,
            ptr: self.val.get_mut(),
            _phantom: PhantomData,
        }
    }

    fn write_guard(&self) -> SharedMutexWriteGuard<'_, T> {
        SharedMutexWriteGuard {
            mutex: self,
            ptr: self.val.get_mut(),
            _phantom: PhantomData,
        }
    }
}

/// RAII guard for shared (read) access. Dropping it releases the hold.
pub struct SharedMutexReadGuard<'a, T> {
    mutex: &'a SharedMutex<T>,
    ptr: sync::MutPtr<T>,
    _phantom: PhantomData<&'a T>,
}

impl<T> Drop for SharedMutexReadGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: this guard's existence proves we hold shared access.
        unsafe { self.mutex.raw.unlock_shared() };
    }
}

impl<T> core::ops::Deref for SharedMutexReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.ptr.with(|p| unsafe { &*p })
    }
}

/// RAII guard for the update slot: shared-compatible, but exclusive with
/// itself and with writers. Dropping it releases the hold; call
/// [`SharedMutexUpdateGuard::upgrade`] to escalate to exclusive instead.
pub struct SharedMutexUpdateGuard<'a, T> {
    mutex: &'a SharedMutex<T>,
    ptr: sync::MutPtr<T>,
    _phantom: PhantomData<&'a T>,
}

impl<'a, T> SharedMutexUpdateGuard<'a, T> {
    /// Upgrades to exclusive access, blocking until any concurrent readers
    /// drain. `outer` stays held across the upgrade, so no other thread can
    /// interleave an acquisition in between.
    pub fn upgrade(self) -> SharedMutexWriteGuard<'a, T> {
        let mutex = self.mutex;
        // Release our own guard's Drop glue without unlocking: the update
        // slot is being traded directly for exclusive, not released.
        core::mem::forget(self);
        // SAFETY: this guard's existence proves we hold the update slot.
        unsafe { mutex.raw.update_lock_upgrade() };
        mutex.write_guard()
    }
}

impl<T> Drop for SharedMutexUpdateGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: this guard's existence proves we hold the update slot.
        unsafe { self.mutex.raw.unlock_update() };
    }
}

impl<T> core::ops::Deref for SharedMutexUpdateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.ptr.with(|p| unsafe { &*p })
    }
}

/// RAII guard for exclusive (write) access. Dropping it releases the hold;
/// call [`SharedMutexWriteGuard::downgrade_to_update`] to hand it back as
/// the update slot instead of releasing it outright.
pub struct SharedMutexWriteGuard<'a, T> {
    mutex: &'a SharedMutex<T>,
    ptr: sync::MutPtr<T>,
    _phantom: PhantomData<&'a mut T>,
}

impl<'a, T> SharedMutexWriteGuard<'a, T> {
    /// Downgrades to the update slot, retaining `outer` throughout.
    pub fn downgrade_to_update(self) -> SharedMutexUpdateGuard<'a, T> {
        let mutex = self.mutex;
        core::mem::forget(self);
        // SAFETY: this guard's existence proves we hold exclusive access.
        unsafe { mutex.raw.update_lock_downgrade() };
        mutex.update_guard()
    }
}

impl<T> Drop for SharedMutexWriteGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: this guard's existence proves we hold exclusive access.
        unsafe { self.mutex.raw.unlock() };
    }
}

impl<T> core::ops::Deref for SharedMutexWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.ptr.with(|p| unsafe { &*p })
    }
}

impl<T> core::ops::DerefMut for SharedMutexWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { self.ptr.deref() }
    }
}

