use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Bencher, Criterion};
use rustix::process::{CpuSet, Pid};
use slimlock::mutex::Mutex;

const PID_ZERO: Option<Pid> = Pid::from_raw(0);

fn uncontended(bencher: &mut Bencher) {
    let mutex = Mutex::new(0u64);
    bencher.iter(|| {
        let mut guard = mutex.lock();
        *guard = guard.wrapping_add(1);
    });
}

/// Two threads repeatedly handing the lock back and forth. Measures the
/// cost of the park/wake path, not just the uncontended fast path above.
fn ping_pong(bencher: &mut Bencher, do_pinning: bool) {
    let initial_cpu_set = rustix::process::sched_getaffinity(PID_ZERO).unwrap();
    let pinned_cpu_id = (0..).find(|i| initial_cpu_set.is_set(*i)).unwrap();
    let pinned_cpu_set = {
        let mut s = CpuSet::new();
        s.set(pinned_cpu_id);
        s
    };
    if do_pinning {
        rustix::process::sched_setaffinity(PID_ZERO, &pinned_cpu_set).unwrap();
    }

    let mutex = Arc::new(Mutex::new(0u64));
    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));

    let other_thread = {
        let mutex = mutex.clone();
        let running = running.clone();
        std::thread::spawn(move || {
            if do_pinning {
                rustix::process::sched_setaffinity(PID_ZERO, &pinned_cpu_set).unwrap();
            }
            while running.load(std::sync::atomic::Ordering::Relaxed) {
                let mut guard = mutex.lock();
                *guard = guard.wrapping_add(1);
            }
        })
    };

    bencher.iter(|| {
        let mut guard = mutex.lock();
        *guard = guard.wrapping_add(1);
    });

    running.store(false, std::sync::atomic::Ordering::Relaxed);
    // Nudge the other thread out of its final park, if any.
    let _ = mutex.try_lock();
    other_thread.join().unwrap();
    if do_pinning {
        rustix::process::sched_setaffinity(PID_ZERO, &initial_cpu_set).unwrap();
    }
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("mutex uncontended", |b| uncontended(b));
    c.bench_function("mutex ping pong", |b| ping_pong(b, false));
    c.bench_function("mutex ping pong pinned", |b| ping_pong(b, true));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
