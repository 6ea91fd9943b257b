//! Reusable utilities for the integration tests in this directory. It's in
//! a subdirectory of `tests` to avoid being interpreted as an integration
//! test itself. See
//! https://doc.rust-lang.org/book/ch11-03-test-organization.html#submodules-in-integration-tests

// Not every test uses every item in here.
#![allow(unused)]

#[cfg(loom)]
pub fn model<F>(f: F)
where
    F: Fn() + Sync + Send + 'static,
{
    loom::model(move || {
        f();
        slimlock::sync::loom_reset();
    });
}
#[cfg(not(loom))]
pub fn model<F>(f: F)
where
    F: Fn() + Sync + Send + 'static,
{
    f()
}

/// Like `model`, but bounds the number of preemptions loom explores per
/// interleaving. Several of our tests spawn enough threads that an
/// unbounded exploration would never finish; a small bound still catches
/// the bugs we care about (see the loom docs on combinatorial explosion).
#[cfg(loom)]
pub fn model_with_max_preemptions<F>(max_preemptions: usize, f: F)
where
    F: Fn() + Sync + Send + 'static,
{
    loom::model::Builder {
        preemption_bound: Some(max_preemptions),
        ..Default::default()
    }
    .check(move || {
        f();
        slimlock::sync::loom_reset();
    });
}
#[cfg(not(loom))]
pub fn model_with_max_preemptions<F>(_max_preemptions: usize, f: F)
where
    F: Fn() + Sync + Send + 'static,
{
    f()
}

#[cfg(not(loom))]
pub use std::sync::Arc;
#[cfg(not(loom))]
pub use std::thread;

#[cfg(loom)]
pub use loom::sync::Arc;
#[cfg(loom)]
pub use loom::thread;

#[cfg(loom)]
pub fn rand_sleep() {}
#[cfg(not(loom))]
pub fn rand_sleep() {
    std::thread::sleep(std::time::Duration::from_nanos(
        rand::random::<u64>() % 10_000_000,
    ));
}
