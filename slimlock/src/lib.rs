//! Slim, memory-efficient synchronization primitives for processes that
//! instantiate very large numbers of locks — one per buffer-pool page
//! descriptor, or interleaved with pointers inside hash-table cache lines.
//!
//! [`mutex::Mutex`] fits its whole state in a single 32-bit word: high bit
//! is the exclusive-holder flag, the rest is a waiter count. [`shared_mutex::SharedMutex`]
//! adds a second 32-bit word on top, giving exclusive/shared/update modes
//! with upgrade and downgrade between update and exclusive. Both resolve
//! the uncontended path with a single atomic read-modify-write and never
//! reach the kernel unless there's contention.
//!
//! This module contains tests designed to run under [loom]. From this
//! crate's directory:
//!
//! ```shell
//! LOOM_MAX_PREEMPTIONS=3 \
//! RUSTFLAGS="--cfg loom" \
//! cargo test --target-dir=loomtarget -- --nocapture
//! ```
//!
//! Setting `--target-dir` avoids thrashing the build cache back and forth
//! between a loom build and a normal one. In case of failure, see the loom
//! documentation for `LOOM_LOG`/`LOOM_LOCATIONS`.
//!
//! [loom]: <https://docs.rs/loom/latest/loom/>

// https://github.com/rust-lang/rfcs/blob/master/text/2585-unsafe-block-in-unsafe-fn.md
#![deny(unsafe_op_in_unsafe_fn)]
#![cfg_attr(all(not(test), not(loom)), no_std)]

pub mod mutex;
pub mod shared_mutex;

/// Public only so the integration tests under `tests/` (the recommended
/// place to write loom tests) can reach it. Not intended for use by other
/// crates.
pub mod sync;
