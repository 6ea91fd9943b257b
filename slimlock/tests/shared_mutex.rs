//! End-to-end scenarios run with real threads and the real futex syscall
//! (not under loom). These correspond to the literal scenarios in this
//! crate's specification.

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use slimlock::shared_mutex::SharedMutex;

#[test]
fn many_readers_never_touch_outer() {
    let m = Arc::new(SharedMutex::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let m = m.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let guard = m.lock_shared();
                thread::sleep(Duration::from_millis(5));
                drop(guard);
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }

    assert!(!m.is_locked_or_waiting());
    assert_eq!(*m.lock(), 0);
}

#[test]
fn writer_preference_over_late_readers() {
    let m = Arc::new(SharedMutex::new(0));

    // T1..T3 take shared access.
    let g1 = m.lock_shared();
    let g2 = m.lock_shared();
    let g3 = m.lock_shared();

    // T4 queues for exclusive access; it must park with X set and 3
    // readers still draining.
    let writer = {
        let m = m.clone();
        thread::spawn(move || {
            let mut guard = m.lock();
            *guard += 1;
        })
    };

    // Give the writer a chance to install X and start waiting.
    thread::sleep(Duration::from_millis(20));
    assert!(m.is_waiting());

    // T5 attempts shared access: it must queue behind the pending writer
    // rather than being granted immediately.
    let late_reader = {
        let m = m.clone();
        thread::spawn(move || {
            let guard = m.lock_shared();
            *guard
        })
    };

    drop(g1);
    drop(g2);
    drop(g3);

    writer.join().unwrap();
    let seen = late_reader.join().unwrap();
    assert_eq!(seen, 1);
}

#[test]
fn update_readers_then_upgrade_and_downgrade() {
    let m = Arc::new(SharedMutex::new(0));

    let update = m.lock_update();

    let r1 = {
        let m = m.clone();
        thread::spawn(move || drop(m.lock_shared()))
    };
    let r2 = {
        let m = m.clone();
        thread::spawn(move || drop(m.lock_shared()))
    };
    r1.join().unwrap();
    r2.join().unwrap();

    let mut write = update.upgrade();
    *write += 1;
    let update = write.downgrade_to_update();
    assert_eq!(*update, 1);
    drop(update);

    assert!(!m.is_locked_or_waiting());
    assert_eq!(*m.lock(), 1);
}

#[test]
fn try_lock_does_not_block_on_draining_readers() {
    let m = SharedMutex::new(0);
    let reader = m.lock_shared();
    assert!(m.try_lock().is_none());
    // `outer` must have been released again: a second try_lock_shared from
    // the same thread should still succeed.
    assert!(m.try_lock_shared().is_some());
    drop(reader);
}

#[test]
fn spin_lock_variants_acquire_uncontended() {
    let m = SharedMutex::new(0);
    {
        let mut guard = m.spin_lock(1000);
        *guard += 1;
    }
    {
        let guard = m.spin_lock_shared(1000);
        assert_eq!(*guard, 1);
    }
    {
        let mut guard = m.spin_lock_update(1000);
        *guard += 1;
    }
    assert_eq!(*m.lock(), 2);
}

static STATIC_SHARED_MUTEX: SharedMutex<u32> = SharedMutex::const_new(0);

#[test]
fn const_new_is_usable_in_a_static() {
    assert!(!STATIC_SHARED_MUTEX.is_locked_or_waiting());
    *STATIC_SHARED_MUTEX.lock() += 1;
    assert_eq!(*STATIC_SHARED_MUTEX.lock_shared(), 1);
}

#[test]
fn many_updaters_serialize() {
    let m = Arc::new(SharedMutex::new(0usize));
    let threads: Vec<_> = (0..16)
        .map(|_| {
            let m = m.clone();
            thread::spawn(move || {
                let mut guard = m.lock_update();
                *guard += 1;
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(*m.lock(), 16);
}
