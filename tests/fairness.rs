use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use lendpool::{Manager, Pool, PoolError};

struct Unit;

impl Manager for Unit {
    type Type = ();
    type Error = Infallible;

    fn create(&self) -> Result<(), Infallible> {
        Ok(())
    }
}

#[test]
fn blocking_waiters_fifo() {
    let pool = Pool::builder(Unit).max_size(1).build();
    let held = pool.get().unwrap().unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..5 {
        let pool_clone = pool.clone();
        let order = Arc::clone(&order);
        handles.push(thread::spawn(move || {
            let obj = pool_clone
                .timeout_get(Some(Duration::from_secs(10)))
                .unwrap()
                .unwrap();
            order.lock().unwrap().push(i);
            thread::sleep(Duration::from_millis(5));
            drop(obj);
        }));
        // Don't start the next waiter until this one is parked, so the
        // enrolment order is the spawn order.
        while pool.status().blocking_waiters <= i {
            thread::sleep(Duration::from_millis(1));
        }
    }

    drop(held);
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn cross_kind_enrolment_order() {
    let pool = Pool::builder(Unit).max_size(1).build();
    let held = pool.get().unwrap().unwrap();

    // Deferred waiter enrols first.
    let deferred = pool.get_deferred();
    assert_eq!(pool.status().deferred_waiters, 1);

    // Blocking waiter enrols second, on its own thread.
    let blocking = {
        let pool = pool.clone();
        thread::spawn(move || pool.timeout_get(Some(Duration::from_secs(10))))
    };
    while pool.status().blocking_waiters == 0 {
        thread::sleep(Duration::from_millis(1));
    }

    // The first release serves the deferred waiter...
    drop(held);
    let obj = deferred.await.unwrap();
    // ...while the blocking waiter is still parked.
    assert_eq!(pool.status().blocking_waiters, 1);

    // The second release serves the blocking waiter.
    drop(obj);
    let got = blocking.join().unwrap().unwrap();
    assert!(got.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_deferred_is_skipped() {
    let pool = Pool::builder(Unit).max_size(1).build();
    let held = pool.get().unwrap().unwrap();

    let cancelled = pool.get_deferred();
    let second = pool.get_deferred();
    assert_eq!(pool.status().deferred_waiters, 2);
    drop(cancelled);

    // The release skips the cancelled waiter and resolves the next one.
    drop(held);
    let obj = second.await.unwrap();
    drop(obj);
    assert_eq!(pool.status().deferred_waiters, 0);
    assert_eq!(pool.status().available, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_deferred_returns_slot_to_free_list() {
    let pool = Pool::builder(Unit).max_size(1).build();
    let held = pool.get().unwrap().unwrap();

    let cancelled = pool.get_deferred();
    drop(cancelled);

    drop(held);
    assert_eq!(pool.status().available, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn deferred_queue_capacity() {
    let pool = Pool::builder(Unit)
        .max_size(1)
        .deferred_capacity(3)
        .build();
    let held = pool.get().unwrap().unwrap();

    let first = pool.get_deferred();
    let second = pool.get_deferred();
    // The third deferred waiter hits the capacity limit.
    let third = pool.get_deferred();
    assert!(matches!(third.await, Err(PoolError::QueueFull)));

    drop(held);
    let obj = first.await.unwrap();
    // Room again once a release resolved the head waiter.
    let fourth = pool.get_deferred();
    drop(obj);
    let obj = second.await.unwrap();
    drop(obj);
    let obj = fourth.await.unwrap();
    drop(obj);
    assert_eq!(pool.status().available, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn deferred_fast_path() {
    let pool = Pool::builder(Unit).max_size(1).build();
    let obj = pool.get_deferred().await.unwrap();
    assert_eq!(pool.status().size, 1);
    drop(obj);

    // An unawaited ready future hands its slot back when dropped.
    let ready = pool.get_deferred();
    drop(ready);
    assert_eq!(pool.status().available, 1);
}
