use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Bencher, Criterion};
use slimlock::shared_mutex::SharedMutex;

fn uncontended_shared(bencher: &mut Bencher) {
    let mutex = SharedMutex::new(0u64);
    bencher.iter(|| {
        let guard = mutex.lock_shared();
        core::hint::black_box(&*guard);
    });
}

fn uncontended_exclusive(bencher: &mut Bencher) {
    let mutex = SharedMutex::new(0u64);
    bencher.iter(|| {
        let mut guard = mutex.lock();
        *guard = guard.wrapping_add(1);
    });
}

/// Several reader threads running concurrently with the benchmarked
/// thread's own shared acquisitions; there should be no contention on
/// `outer` since readers never touch it in the uncontended path.
fn readers_under_reader_load(bencher: &mut Bencher) {
    let mutex = Arc::new(SharedMutex::new(0u64));
    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));

    let other_threads: Vec<_> = (0..3)
        .map(|_| {
            let mutex = mutex.clone();
            let running = running.clone();
            std::thread::spawn(move || {
                while running.load(std::sync::atomic::Ordering::Relaxed) {
                    let guard = mutex.lock_shared();
                    core::hint::black_box(&*guard);
                }
            })
        })
        .collect();

    bencher.iter(|| {
        let guard = mutex.lock_shared();
        core::hint::black_box(&*guard);
    });

    running.store(false, std::sync::atomic::Ordering::Relaxed);
    for thread in other_threads {
        thread.join().unwrap();
    }
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("shared_mutex uncontended shared", |b| uncontended_shared(b));
    c.bench_function("shared_mutex uncontended exclusive", |b| {
        uncontended_exclusive(b)
    });
    c.bench_function("shared_mutex readers under reader load", |b| {
        readers_under_reader_load(b)
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
