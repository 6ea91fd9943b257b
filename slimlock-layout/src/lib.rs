//! A marker trait for types whose layout contains no address-dependent
//! data: no `Box`, no reference, no raw pointer (unless the field is
//! explicitly asserted safe).
//!
//! This doesn't mean much on its own, but it's the bound
//! [`Mutex<T>`](https://docs.rs/slimlock/latest/slimlock/mutex/struct.Mutex.html)
//! and `SharedMutex<T>` apply to `T` when the `shareable-layout` feature is
//! enabled: a lock built from atomics has no internal indirection either, so
//! a payload that's also free of it can, in principle, live in memory shared
//! across address spaces (e.g. a memory-mapped buffer pool) without the lock
//! itself needing to know or care.
//!
//! `ShareableLayout` makes no promises about what the *other* side of that
//! shared mapping does with the memory; it only asserts that this type's own
//! bytes don't encode an address.
#![cfg_attr(not(test), no_std)]

#[cfg(test)]
extern crate std as alloc;
#[cfg(not(test))]
extern crate alloc;

pub use slimlock_layout_macro::ShareableLayout;

/// # Safety
///
/// Implementors assert that their layout contains no address-dependent
/// data. Don't implement this manually; use `#[derive(ShareableLayout)]`,
/// which validates every field recursively.
pub unsafe trait ShareableLayout {
    // Only used by the derive macro, to force field types to be checked.
    #[doc(hidden)]
    const IGNORE: () = ();
}

macro_rules! impl_shareable_for_primitive {
    ($($t:ty),* $(,)?) => {
        $(
            // SAFETY: primitive scalars contain no pointers.
            unsafe impl ShareableLayout for $t {}
        )*
    };
}

impl_shareable_for_primitive!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
);

mod atomics {
    use super::ShareableLayout;
    use core::sync::atomic::{
        AtomicBool, AtomicI8, AtomicI16, AtomicI32, AtomicI64, AtomicIsize, AtomicU8, AtomicU16,
        AtomicU32, AtomicU64, AtomicUsize,
    };

    macro_rules! impl_shareable_for_atomic {
        ($($t:ty),* $(,)?) => {
            $(
                // SAFETY: atomics are plain integers with interior mutability,
                // not address-dependent.
                unsafe impl ShareableLayout for $t {}
            )*
        };
    }

    impl_shareable_for_atomic!(
        AtomicBool, AtomicI8, AtomicI16, AtomicI32, AtomicI64, AtomicIsize, AtomicU8, AtomicU16,
        AtomicU32, AtomicU64, AtomicUsize,
    );
}

// SAFETY: an array's layout is just its element's layout repeated.
unsafe impl<T: ShareableLayout, const N: usize> ShareableLayout for [T; N] {}

// SAFETY: `Option<T>` has no address-dependent data beyond what `T` has.
unsafe impl<T: ShareableLayout> ShareableLayout for Option<T> {}

// SAFETY: `UnsafeCell<T>` has the same layout as `T`.
unsafe impl<T: ShareableLayout> ShareableLayout for core::cell::UnsafeCell<T> {}

static_assertions::assert_impl_all!(u32: ShareableLayout);
static_assertions::assert_impl_all!([u8; 16]: ShareableLayout);
static_assertions::assert_not_impl_all!(&'static u32: ShareableLayout);
static_assertions::assert_not_impl_all!(*const u32: ShareableLayout);
static_assertions::assert_not_impl_all!(alloc::boxed::Box<u32>: ShareableLayout);
