use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use refcom::{
    declare_interface, implements, make, unknown_object, CntPtr, IUnknown, Interface,
    QueryCastList, UnknownObject, WeakPtr, WeakRefCount,
};

static TEST_LOCK: Mutex<()> = Mutex::new(());
static DROP_COUNT: AtomicU32 = AtomicU32::new(0);

fn lock() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

declare_interface! {
    #[guid("E7D1C0B2-4A39-4E5F-9C86-1D2E3F4A5B60")]
    pub trait ISensor: IUnknown {
        fn reading(&self) -> u32;
    }
}

const ALIVE: u32 = 0x5EED_CAFE;
const DEAD: u32 = 0xDEAD_DEAD;

#[repr(C)]
struct Sensor {
    base: UnknownObject<WeakRefCount>,
    state: AtomicU32,
}

impl Sensor {
    fn new() -> Self {
        Sensor {
            base: UnknownObject::new(),
            state: AtomicU32::new(ALIVE),
        }
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        self.state.store(DEAD, Ordering::SeqCst);
        DROP_COUNT.fetch_add(1, Ordering::SeqCst);
    }
}

impl ISensor for Sensor {
    fn reading(&self) -> u32 {
        self.state.load(Ordering::SeqCst)
    }
}

implements!(Sensor: ISensor);

unknown_object! {
    impl Sensor {
        base: base,
        policy: WeakRefCount,
        query_cast: QueryCastList<(Interface<dyn ISensor>,)>,
    }
}

#[test]
fn releasing_the_strong_pointer_expires_the_weak_one() {
    let _guard = lock();
    DROP_COUNT.store(0, Ordering::SeqCst);

    let strong: CntPtr<dyn ISensor> = make(Sensor::new()).upcast();
    let weak = WeakPtr::from_cnt(&strong);
    assert!(!weak.is_expired());

    drop(strong);
    assert!(weak.is_expired());
    assert!(weak.get_strong_ptr().get().is_none());
    assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 1);
}

#[test]
fn every_observer_expires() {
    let _guard = lock();
    DROP_COUNT.store(0, Ordering::SeqCst);

    let strong = make(Sensor::new());
    let extra = strong.clone();
    let observers: Vec<WeakPtr<Sensor>> = (0..8).map(|_| WeakPtr::from_cnt(&strong)).collect();
    assert_eq!(strong.base.weak_ref().unwrap().weak_ref_count(), 9);

    drop(strong);
    assert!(observers.iter().all(|weak| !weak.is_expired()));
    drop(extra);

    assert!(observers.iter().all(WeakPtr::is_expired));
    assert!(observers.iter().all(|weak| weak.get_strong_ptr().is_empty()));
    assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 1);
}

#[test]
fn weak_pointer_outlives_the_object_and_frees_last() {
    let _guard = lock();
    let strong = make(Sensor::new());
    let weak = WeakPtr::<dyn ISensor>::from_ref(&*strong);
    let copy = weak.clone();
    drop(strong);
    drop(weak);
    assert!(copy.is_expired());
    assert_eq!(copy.weak_ref().unwrap().weak_ref_count(), 1);
    assert_eq!(copy.weak_ref().unwrap().ref_count(), 0);
}

#[test]
fn upgrade_is_never_observed_on_a_destroyed_object() {
    let _guard = lock();
    const ROUNDS: usize = 200;
    const THREADS: usize = 4;

    for _ in 0..ROUNDS {
        DROP_COUNT.store(0, Ordering::SeqCst);
        let strong = make(Sensor::new());
        let weak = WeakPtr::<Sensor>::from_cnt(&strong);
        let barrier = Arc::new(Barrier::new(THREADS + 1));
        let saw_dead = Arc::new(AtomicBool::new(false));

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let weak = weak.clone();
                let barrier = Arc::clone(&barrier);
                let saw_dead = Arc::clone(&saw_dead);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..64 {
                        match weak.upgrade() {
                            Some(object) => {
                                if object.reading() != ALIVE {
                                    saw_dead.store(true, Ordering::SeqCst);
                                }
                            }
                            None => {
                                assert!(weak.is_expired());
                                break;
                            }
                        }
                    }
                })
            })
            .collect();

        barrier.wait();
        drop(strong);
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(!saw_dead.load(Ordering::SeqCst));
        assert!(weak.is_expired());
        assert!(weak.upgrade().is_none());
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 1);
    }
}
