//! Tests intended to be run under [loom]. See the crate-level docs for how
//! to invoke these with `--cfg loom`.
//!
//! [loom]: <https://docs.rs/loom/latest/loom/>
use slimlock::mutex::Mutex;

mod sync;

mod mutex_tests {
    use super::*;

    #[test]
    fn test_basic() {
        sync::model(|| {
            let mutex = Mutex::new(0);
            let mut guard = mutex.lock();
            *guard += 1;
            assert_eq!(*guard, 1);
        })
    }

    #[test]
    fn test_disconnect_reconnect() {
        sync::model(|| {
            let mutex = Mutex::new(0);
            let mut guard = mutex.lock();
            *guard += 1;
            let disconnected = guard.disconnect();
            let mut guard = disconnected.reconnect();
            assert_eq!(*guard, 1);
            *guard += 1;
        })
    }

    #[test]
    fn test_disconnect_from_other_thread() {
        sync::model(|| {
            let mutex = sync::Arc::new(Mutex::new(0));

            {
                let mutex = mutex.clone();
                sync::thread::spawn(move || {
                    let mut guard = mutex.lock();
                    *guard += 1;
                    guard.disconnect();
                })
                .join()
                .unwrap();
            }

            let guard = mutex.lock();
            assert_eq!(*guard, 1);
        })
    }

    #[test]
    fn test_threads() {
        sync::model_with_max_preemptions(2, || {
            let mutex = sync::Arc::new(Mutex::new(0));

            #[cfg(loom)]
            let nthreads = loom::MAX_THREADS - 1;
            #[cfg(not(loom))]
            let nthreads = 100;

            let threads: Vec<_> = (0..nthreads)
                .map(|i| {
                    let mutex = mutex.clone();
                    sync::thread::spawn(move || {
                        if i % 2 == 0 {
                            let mut guard = mutex.lock();
                            sync::rand_sleep();
                            *guard += 1;
                        } else {
                            let guard = mutex.lock();
                            let disconnected = guard.disconnect();
                            sync::rand_sleep();
                            let mut guard = disconnected.reconnect();
                            *guard += 1;
                        }
                    })
                })
                .collect();

            for thread in threads {
                thread.join().unwrap();
            }

            let guard = mutex.lock();
            assert_eq!(*guard, nthreads);
        })
    }
}
