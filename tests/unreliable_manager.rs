use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use itertools::Itertools;

use lendpool::{Manager, Metrics, Pool, PoolError};

struct Fragile {
    create_fail: bool,
}

impl Manager for Fragile {
    type Type = ();
    type Error = String;

    fn create(&self) -> Result<(), String> {
        if self.create_fail {
            Err("create failed".to_string())
        } else {
            Ok(())
        }
    }
}

#[test]
fn failing_create() {
    let pool = Pool::builder(Fragile { create_fail: true })
        .max_size(16)
        .build();
    assert!(matches!(pool.get(), Err(PoolError::Backend(_))));
    let status = pool.status();
    assert_eq!(status.size, 0);
    assert_eq!(status.available, 0);

    // The capacity reserved for the failed create was released again.
    assert!(matches!(pool.get(), Err(PoolError::Backend(_))));
    assert_eq!(pool.status().size, 0);
}

#[derive(Default)]
struct Alternating {
    toggle: AtomicBool,
}

impl Manager for Alternating {
    type Type = ();
    type Error = String;

    fn create(&self) -> Result<(), String> {
        Ok(())
    }

    fn on_get(&self, _obj: &mut (), _metrics: &Metrics) -> Result<(), String> {
        if self.toggle.fetch_xor(true, Ordering::SeqCst) {
            Err("rejected".to_string())
        } else {
            Ok(())
        }
    }
}

#[test]
fn alternating_on_get_failures() {
    let pool = Pool::builder(Alternating::default()).max_size(2).build();
    let mut failures = 0;
    for _ in 0..10 {
        match pool.get() {
            Ok(Some(obj)) => drop(obj),
            Ok(None) => unreachable!(),
            Err(PoolError::Backend(_)) => failures += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(failures, 5);

    // A rejected lend puts the slot back; nothing leaks, nothing grows.
    let status = pool.status();
    assert_eq!(status.size, 1);
    assert_eq!(status.available, 1);
}

#[derive(Default)]
struct RejectsReturns {
    fail_returns: AtomicBool,
}

impl Manager for RejectsReturns {
    type Type = ();
    type Error = String;

    fn create(&self) -> Result<(), String> {
        Ok(())
    }

    fn on_return(&self, _obj: &mut ()) -> Result<(), String> {
        if self.fail_returns.load(Ordering::SeqCst) {
            Err("no thanks".to_string())
        } else {
            Ok(())
        }
    }
}

#[test]
fn on_return_failure_keeps_the_slot() {
    let pool = Pool::builder(RejectsReturns::default()).max_size(1).build();
    let obj = pool.get().unwrap().unwrap();
    pool.manager().fail_returns.store(true, Ordering::SeqCst);

    // The error surfaces, but only after the slot is back on the free list.
    assert!(matches!(pool.release(obj, false), Err(PoolError::Backend(_))));
    assert_eq!(pool.status().available, 1);

    // The drop path only logs the failure.
    let obj = pool.get().unwrap().unwrap();
    drop(obj);
    assert_eq!(pool.status().available, 1);
}

#[derive(Default)]
struct Sequence {
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl Manager for Sequence {
    type Type = usize;
    type Error = String;

    fn create(&self) -> Result<usize, String> {
        Ok(self.created.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn destroy(&self, _obj: usize) {
        let _ = self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn release_with_recreate() {
    let pool = Pool::builder(Sequence::default()).max_size(2).build();
    let obj = pool.get().unwrap().unwrap();
    assert_eq!(*obj, 1);

    pool.release(obj, true).unwrap();
    assert_eq!(pool.manager().destroyed.load(Ordering::SeqCst), 1);

    let obj = pool.get().unwrap().unwrap();
    assert_eq!(*obj, 2);
    assert_eq!(pool.status().size, 1);
}

#[derive(Default)]
struct OneShotCreate {
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl Manager for OneShotCreate {
    type Type = usize;
    type Error = String;

    fn create(&self) -> Result<usize, String> {
        if self.created.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(1)
        } else {
            Err("backend gone".to_string())
        }
    }

    fn destroy(&self, _obj: usize) {
        let _ = self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn failed_recreate_keeps_the_slot() {
    let pool = Pool::builder(OneShotCreate::default()).max_size(2).build();
    let obj = pool.get().unwrap().unwrap();
    assert_eq!(*obj, 1);

    // The replacement create fails; the old value stays in its slot, which
    // is back in the pool before the error surfaces.
    assert!(matches!(pool.release(obj, true), Err(PoolError::Backend(_))));
    assert_eq!(pool.manager().destroyed.load(Ordering::SeqCst), 0);
    let status = pool.status();
    assert_eq!(status.size, 1);
    assert_eq!(status.available, 1);

    let obj = pool.get().unwrap().unwrap();
    assert_eq!(*obj, 1);
}

#[derive(Copy, Clone, Debug)]
enum Gate {
    Open,
    Closed,
}

impl Gate {
    fn pass(self) -> Result<(), String> {
        match self {
            Gate::Open => Ok(()),
            Gate::Closed => Err("gate closed".to_string()),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Gates {
    create: Gate,
    get: Gate,
    ret: Gate,
}

struct GatedManager {
    gates: Gates,
}

impl Manager for GatedManager {
    type Type = ();
    type Error = String;

    fn create(&self) -> Result<(), String> {
        self.gates.create.pass()
    }

    fn on_get(&self, _obj: &mut (), _metrics: &Metrics) -> Result<(), String> {
        self.gates.get.pass()
    }

    fn on_return(&self, _obj: &mut ()) -> Result<(), String> {
        self.gates.ret.pass()
    }
}

// Exercises succeeding and failing managers in every combination under
// contention; whatever the gates do, the pool must neither leak slots nor
// exceed its capacity.
#[test]
fn gated_manager_combinations() {
    let configs = (0..3)
        .map(|_| &[Gate::Open, Gate::Closed])
        .multi_cartesian_product()
        .map(|gates| Gates {
            create: *gates[0],
            get: *gates[1],
            ret: *gates[2],
        });

    for gates in configs {
        let pool = Pool::builder(GatedManager { gates })
            .max_size(2)
            .timeout(Some(Duration::from_millis(10)))
            .build();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        match pool.get() {
                            Ok(Some(obj)) => drop(obj),
                            Ok(None) | Err(_) => {}
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let status = pool.status();
        assert!(
            status.size <= status.max_size,
            "size({}) > max_size({}), gates: {:?}",
            status.size,
            status.max_size,
            gates
        );
        assert_eq!(
            status.available, status.size,
            "a slot leaked, gates: {:?}",
            gates
        );
    }
}
