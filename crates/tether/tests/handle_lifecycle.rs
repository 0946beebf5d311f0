use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    ptr::NonNull,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use tether::{Guid, Handle, Interface, LogicError};

///Bookkeeping that outlives the object.
#[derive(Default)]
struct Stats {
    add_refs: AtomicUsize,
    releases: AtomicUsize,
    destroyed: AtomicUsize,
}

impl Stats {
    fn add_refs(&self) -> usize {
        self.add_refs.load(Ordering::SeqCst)
    }
    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
    fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

///Heap object that frees itself once its count reaches zero, like a COM object does.
struct Surface {
    refs: AtomicUsize,
    refuse_add_ref: AtomicBool,
    stats: Arc<Stats>,
}

impl Surface {
    ///Returns the object with its initial reference, which belongs to the caller.
    fn create(stats: &Arc<Stats>) -> *mut Surface {
        Box::into_raw(Box::new(Surface {
            refs: AtomicUsize::new(1),
            refuse_add_ref: AtomicBool::new(false),
            stats: stats.clone(),
        }))
    }

    fn refs(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }
}

unsafe impl Interface for Surface {
    const IID: Guid = Guid::from_u128(0x6f15aaf2_d208_4e89_9ab4_489535d34f9c);

    unsafe fn add_ref(this: NonNull<Self>) {
        let this = unsafe { this.as_ref() };
        if this.refuse_add_ref.load(Ordering::SeqCst) {
            panic!("AddRef refused");
        }
        this.refs.fetch_add(1, Ordering::SeqCst);
        this.stats.add_refs.fetch_add(1, Ordering::SeqCst);
    }

    unsafe fn release(this: NonNull<Self>) {
        let stats = unsafe { this.as_ref() }.stats.clone();
        stats.releases.fetch_add(1, Ordering::SeqCst);
        if unsafe { this.as_ref() }.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            drop(unsafe { Box::from_raw(this.as_ptr()) });
            stats.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn acquires_match_releases() {
    let stats = Arc::new(Stats::default());
    let a = unsafe { Handle::attach(Surface::create(&stats)) };
    let b = unsafe { Handle::attach(Surface::create(&stats)) };

    let mut x = a.clone();
    let mut y = x.clone();
    x.clone_from(&b);
    y.reset();
    y = b.clone();
    let mut z = Handle::<Surface>::null();
    z.clone_from(&y);
    z.clone_from(&a);
    drop(a);
    y.swap(&mut z);
    drop((b, x, y, z));

    assert_eq!(stats.destroyed(), 2);
    //the two initial references were attached, not acquired
    assert_eq!(stats.add_refs() + 2, stats.releases());
}

#[test]
fn self_assignment_keeps_count() {
    let stats = Arc::new(Stats::default());
    let mut a = unsafe { Handle::attach(Surface::create(&stats)) };
    assert_eq!(a.refs(), 1);

    a = a.clone();
    assert_eq!(a.refs(), 1);

    let same = a.clone();
    a.clone_from(&same);
    drop(same);
    assert_eq!(a.refs(), 1);
    assert_eq!(stats.destroyed(), 0);
}

#[test]
fn reset_of_null_makes_no_call() {
    let stats = Arc::new(Stats::default());
    let mut handle = Handle::<Surface>::null();
    handle.reset();
    drop(handle);
    assert_eq!(stats.add_refs(), 0);
    assert_eq!(stats.releases(), 0);
}

#[test]
fn failed_acquire_leaves_target_untouched() {
    let stats = Arc::new(Stats::default());
    let mut target = unsafe { Handle::attach(Surface::create(&stats)) };
    let source = unsafe { Handle::attach(Surface::create(&stats)) };
    let original = target.as_raw();

    source.refuse_add_ref.store(true, Ordering::SeqCst);
    let result = catch_unwind(AssertUnwindSafe(|| target.clone_from(&source)));
    assert!(result.is_err());

    assert_eq!(target.as_raw(), original);
    assert_eq!(target.refs(), 1);
    assert_eq!(source.refs(), 1);
    assert_eq!(stats.add_refs(), 0);
    assert_eq!(stats.releases(), 0);

    drop((target, source));
    assert_eq!(stats.destroyed(), 2);
}

#[test]
fn equality_by_address() {
    let stats = Arc::new(Stats::default());
    let raw_a = Surface::create(&stats);
    let raw_b = Surface::create(&stats);

    let a1 = unsafe { Handle::wrap(raw_a) };
    let a2 = unsafe { Handle::wrap(raw_a) };
    let b = unsafe { Handle::attach(raw_b) };

    assert_eq!(a1, a2);
    assert_ne!(a1, b);
    assert_eq!(a1.refs(), 3);

    //give back the creation reference of `raw_a`
    drop(unsafe { Handle::attach(raw_a) });
    drop((a1, a2, b));
    assert_eq!(stats.destroyed(), 2);
}

#[test]
fn end_to_end() {
    let stats = Arc::new(Stats::default());
    let raw = Surface::create(&stats);

    let a = unsafe { Handle::wrap(raw) };
    //the handle holds its own reference now, drop the creation reference
    unsafe { Surface::release(NonNull::new_unchecked(raw)) };
    assert_eq!(a.refs(), 1);

    let mut b = a.clone();
    assert_eq!(b.refs(), 2);

    drop(a);
    assert_eq!(b.refs(), 1);

    b.reset();
    assert_eq!(stats.destroyed(), 1);
    let releases = stats.releases();

    b.reset();
    drop(b);
    assert_eq!(stats.releases(), releases);
    assert_eq!(stats.add_refs(), 2);
}

#[test]
fn slot_receives_factory_result() {
    fn create_surface(stats: &Arc<Stats>, iid: &Guid, out: *mut *mut std::ffi::c_void) -> bool {
        if *iid != Surface::IID {
            return false;
        }
        unsafe { *out = Surface::create(stats).cast() };
        true
    }

    let stats = Arc::new(Stats::default());
    let mut handle = Handle::<Surface>::null();
    assert!(create_surface(&stats, &Handle::<Surface>::iid(), handle.slot()));
    assert!(handle.is_some());
    assert_eq!(handle.refs(), 1);

    drop(handle);
    assert_eq!(stats.destroyed(), 1);
    assert_eq!(stats.add_refs(), 0);
}

#[test]
fn deref_of_null_raises() {
    let handle = Handle::<Surface>::null();
    let payload = catch_unwind(AssertUnwindSafe(|| handle.refs())).unwrap_err();
    let err = LogicError::from_panic(payload).unwrap();
    assert!(matches!(err, LogicError::AssertionFailed { .. }));
    assert!(err.to_string().contains("self.raw.is_some()"));
}

#[test]
fn clones_move_across_threads() {
    let stats = Arc::new(Stats::default());
    let handle = unsafe { Handle::attach(Surface::create(&stats)) };

    let workers = (0..4)
        .map(|_| {
            let copy = handle.clone();
            std::thread::spawn(move || {
                let again = copy.clone();
                again.refs() >= 2
            })
        })
        .collect::<Vec<_>>();

    for worker in workers {
        assert!(worker.join().unwrap());
    }
    assert_eq!(handle.refs(), 1);
    drop(handle);
    assert_eq!(stats.destroyed(), 1);
}
