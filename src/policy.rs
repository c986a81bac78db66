// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::alloc::Layout;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};
use core::sync::atomic::{fence, AtomicU32, Ordering};

use crate::allocator::{try_alloc_layout, Allocator};
use crate::fatal::{fatal, FailureTag};
use crate::refcount;
use crate::trace::refcount_event;
use crate::unknown::{base_of, RawUnknown, UnknownObject, UnknownObjectType, UnknownVtbl};
use crate::weak::ObjectWeakRef;

/// Ref-count state stored in an object's [`UnknownObject`] header.
///
/// # Safety
/// `DETACHED` must be safe to call on an object that was never placed, and
/// `weak_ref` must only return the control block of the object holding `self`.
pub unsafe trait RefCountPolicy: Sized + Send + Sync + 'static {
    /// Header state of a freshly constructed object.
    const INIT: Self;
    /// Whether QueryCast and QueryInterface answer at all.
    const QUERYABLE: bool;
    /// Vtable used until the object is placed.
    const DETACHED: &'static UnknownVtbl;

    fn ref_count(&self) -> u32;

    fn weak_ref(&self) -> Option<&ObjectWeakRef> {
        None
    }
}

/// Policies whose objects live in an allocation produced by [`make`](crate::make).
///
/// # Safety
/// The returned pointer must be a live object carrying a strong count of 1
/// owned by the caller, with a vtable that destroys it at zero.
pub unsafe trait MakeRefCount: RefCountPolicy {
    fn place<T, A>(value: T, alloc: A) -> Option<NonNull<T>>
    where
        T: UnknownObjectType<Policy = Self>,
        A: Allocator;
}

/// Receives an object whose strong count just reached zero.
///
/// The deleter decides when destruction happens; the object stays valid until
/// the [`PendingDestroy`] is run or dropped.
pub trait Deleter: 'static {
    fn delete(object: PendingDestroy);
}

/// Destroys immediately.
pub struct DefaultDeleter;

impl Deleter for DefaultDeleter {
    #[inline]
    fn delete(object: PendingDestroy) {
        object.run();
    }
}

/// An object waiting for destruction. Dropping it destroys the object.
pub struct PendingDestroy {
    object: NonNull<RawUnknown>,
    destroy: unsafe fn(NonNull<RawUnknown>),
}

// SAFETY: every placed object is `Send + Sync` and no reference to it remains.
unsafe impl Send for PendingDestroy {}

impl PendingDestroy {
    /// # Safety
    /// `destroy` must be the destruction routine for `object`, which must have
    /// no remaining strong references.
    #[inline]
    pub(crate) unsafe fn new(
        object: NonNull<RawUnknown>,
        destroy: unsafe fn(NonNull<RawUnknown>),
    ) -> Self {
        Self { object, destroy }
    }

    /// Identity of the dying object.
    #[inline]
    pub fn object(&self) -> NonNull<RawUnknown> {
        self.object
    }

    #[inline]
    pub fn run(self) {
        drop(self);
    }
}

impl Drop for PendingDestroy {
    fn drop(&mut self) {
        refcount_event("destroy", self.object.as_ptr() as *const (), 0);
        // SAFETY: constructed with a matching routine; drop runs once.
        unsafe { (self.destroy)(self.object) };
    }
}

impl core::fmt::Debug for PendingDestroy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingDestroy")
            .field("object", &self.object)
            .finish()
    }
}

#[cold]
#[inline(never)]
fn not_made() -> ! {
    fatal(
        FailureTag::NOT_MADE,
        format_args!("ref-counted object was not created through make"),
    )
}

unsafe fn detached_add_ref(_this: NonNull<RawUnknown>) -> u32 {
    not_made()
}

unsafe fn detached_release(_this: NonNull<RawUnknown>) -> u32 {
    not_made()
}

const NOT_MADE_VTBL: &UnknownVtbl = &UnknownVtbl {
    AddRef: detached_add_ref,
    Release: detached_release,
};

/// Single atomic strong count, destroyed through `D` at zero.
///
/// `QUERYABLE = false` gives [`SimpleNoQueryRefCount`].
pub struct SimpleRefCount<D: Deleter = DefaultDeleter, const QUERYABLE: bool = true> {
    count: AtomicU32,
    _deleter: PhantomData<fn() -> D>,
}

/// Ref-counted but never answers a query.
pub type SimpleNoQueryRefCount<D = DefaultDeleter> = SimpleRefCount<D, false>;

unsafe impl<D: Deleter, const QUERYABLE: bool> RefCountPolicy for SimpleRefCount<D, QUERYABLE> {
    const INIT: Self = Self {
        count: AtomicU32::new(1),
        _deleter: PhantomData,
    };
    const QUERYABLE: bool = QUERYABLE;
    const DETACHED: &'static UnknownVtbl = NOT_MADE_VTBL;

    #[inline]
    fn ref_count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }
}

#[repr(C)]
struct SimpleAllocation<T, A> {
    object: T,
    alloc: ManuallyDrop<A>,
}

struct SimpleShim<T, A, D, const Q: bool>(PhantomData<fn() -> (T, A, D)>);

impl<T, A, D, const Q: bool> SimpleShim<T, A, D, Q>
where
    T: UnknownObjectType<Policy = SimpleRefCount<D, Q>>,
    A: Allocator,
    D: Deleter,
{
    const VTBL: &'static UnknownVtbl = &UnknownVtbl {
        AddRef: Self::add_ref,
        Release: Self::release,
    };

    #[inline]
    unsafe fn count<'a>(this: NonNull<RawUnknown>) -> &'a AtomicU32 {
        unsafe { &(*base_of(this.cast::<T>())).policy.count }
    }

    unsafe fn add_ref(this: NonNull<RawUnknown>) -> u32 {
        let count = refcount::add_ref(unsafe { Self::count(this) });
        refcount_event("addref", this.as_ptr() as *const (), count);
        count
    }

    unsafe fn release(this: NonNull<RawUnknown>) -> u32 {
        let count = refcount::release(unsafe { Self::count(this) });
        refcount_event("release", this.as_ptr() as *const (), count);
        if count == 0 {
            fence(Ordering::Acquire);
            D::delete(unsafe { PendingDestroy::new(this, Self::destroy) });
        }
        count
    }

    unsafe fn destroy(this: NonNull<RawUnknown>) {
        let allocation = this.cast::<SimpleAllocation<T, A>>().as_ptr();
        let _free = FreeSimple(allocation);
        unsafe { ptr::drop_in_place(ptr::addr_of_mut!((*allocation).object)) };
    }
}

/// Hands a Simple allocation back to its allocator, also when the payload's
/// `Drop` unwinds.
struct FreeSimple<T, A: Allocator>(*mut SimpleAllocation<T, A>);

impl<T, A: Allocator> Drop for FreeSimple<T, A> {
    fn drop(&mut self) {
        // SAFETY: the payload is gone and the allocator is taken exactly once.
        unsafe {
            let alloc = ManuallyDrop::take(&mut (*self.0).alloc);
            alloc.dealloc(self.0.cast(), Layout::new::<SimpleAllocation<T, A>>());
        }
    }
}

unsafe impl<D: Deleter, const QUERYABLE: bool> MakeRefCount for SimpleRefCount<D, QUERYABLE> {
    fn place<T, A>(value: T, alloc: A) -> Option<NonNull<T>>
    where
        T: UnknownObjectType<Policy = Self>,
        A: Allocator,
    {
        let layout = Layout::new::<SimpleAllocation<T, A>>();
        let allocation = try_alloc_layout(&alloc, layout)?.cast::<SimpleAllocation<T, A>>();
        unsafe {
            allocation.as_ptr().write(SimpleAllocation {
                object: value,
                alloc: ManuallyDrop::new(alloc),
            });
            let object = NonNull::new_unchecked(ptr::addr_of_mut!((*allocation.as_ptr()).object));
            UnknownObject::install(base_of(object), SimpleShim::<T, A, D, QUERYABLE>::VTBL);
            Some(object)
        }
    }
}

/// Strong and weak counts kept in an [`ObjectWeakRef`] placed in front of the
/// object, so the object can be observed by [`WeakPtr`](crate::WeakPtr).
pub struct WeakRefCount<D: Deleter = DefaultDeleter> {
    weak_ref: Option<NonNull<ObjectWeakRef>>,
    _deleter: PhantomData<fn() -> D>,
}

// SAFETY: the control block is only touched through atomics.
unsafe impl<D: Deleter> Send for WeakRefCount<D> {}
unsafe impl<D: Deleter> Sync for WeakRefCount<D> {}

unsafe impl<D: Deleter> RefCountPolicy for WeakRefCount<D> {
    const INIT: Self = Self {
        weak_ref: None,
        _deleter: PhantomData,
    };
    const QUERYABLE: bool = true;
    const DETACHED: &'static UnknownVtbl = NOT_MADE_VTBL;

    #[inline]
    fn ref_count(&self) -> u32 {
        self.weak_ref().map_or(1, ObjectWeakRef::ref_count)
    }

    #[inline]
    fn weak_ref(&self) -> Option<&ObjectWeakRef> {
        // SAFETY: the control block outlives the object that points at it.
        self.weak_ref.map(|weak_ref| unsafe { weak_ref.as_ref() })
    }
}

#[repr(C)]
struct WeakAllocation<T, A> {
    weak_ref: ObjectWeakRef,
    object: T,
    alloc: ManuallyDrop<A>,
}

struct WeakShim<T, A, D>(PhantomData<fn() -> (T, A, D)>);

impl<T, A, D> WeakShim<T, A, D>
where
    T: UnknownObjectType<Policy = WeakRefCount<D>>,
    A: Allocator,
    D: Deleter,
{
    const VTBL: &'static UnknownVtbl = &UnknownVtbl {
        AddRef: Self::add_ref,
        Release: Self::release,
    };

    #[inline]
    unsafe fn control(this: NonNull<RawUnknown>) -> NonNull<ObjectWeakRef> {
        match unsafe { (*base_of(this.cast::<T>())).policy.weak_ref } {
            Some(weak_ref) => weak_ref,
            None => not_made(),
        }
    }

    unsafe fn add_ref(this: NonNull<RawUnknown>) -> u32 {
        let count = unsafe { Self::control(this).as_ref() }.add_ref();
        refcount_event("addref", this.as_ptr() as *const (), count);
        count
    }

    unsafe fn release(this: NonNull<RawUnknown>) -> u32 {
        let count = unsafe { Self::control(this).as_ref() }.release_strong();
        refcount_event("release", this.as_ptr() as *const (), count);
        if count == 0 {
            fence(Ordering::Acquire);
            D::delete(unsafe { PendingDestroy::new(this, Self::destroy) });
        }
        count
    }

    /// Drops the payload and gives up the weak reference the object held.
    unsafe fn destroy(this: NonNull<RawUnknown>) {
        let _release = ReleaseWeak(unsafe { Self::control(this) });
        unsafe { ptr::drop_in_place(this.cast::<T>().as_ptr()) };
    }

    unsafe fn free(weak_ref: NonNull<ObjectWeakRef>) {
        let allocation = weak_ref.cast::<WeakAllocation<T, A>>().as_ptr();
        unsafe {
            let alloc = ManuallyDrop::take(&mut (*allocation).alloc);
            alloc.dealloc(allocation.cast(), Layout::new::<WeakAllocation<T, A>>());
        }
    }
}

/// Gives up the weak reference held by a dying object, also when the payload's
/// `Drop` unwinds.
struct ReleaseWeak(NonNull<ObjectWeakRef>);

impl Drop for ReleaseWeak {
    fn drop(&mut self) {
        // SAFETY: the object owned this weak reference and is now gone.
        unsafe { ObjectWeakRef::release_weak_ref(self.0) };
    }
}

unsafe impl<D: Deleter> MakeRefCount for WeakRefCount<D> {
    fn place<T, A>(value: T, alloc: A) -> Option<NonNull<T>>
    where
        T: UnknownObjectType<Policy = Self>,
        A: Allocator,
    {
        let layout = Layout::new::<WeakAllocation<T, A>>();
        let allocation = try_alloc_layout(&alloc, layout)?.cast::<WeakAllocation<T, A>>();
        unsafe {
            allocation.as_ptr().write(WeakAllocation {
                weak_ref: ObjectWeakRef::new(WeakShim::<T, A, D>::free),
                object: value,
                alloc: ManuallyDrop::new(alloc),
            });
            let weak_ref =
                NonNull::new_unchecked(ptr::addr_of_mut!((*allocation.as_ptr()).weak_ref));
            let object = NonNull::new_unchecked(ptr::addr_of_mut!((*allocation.as_ptr()).object));
            let base = base_of(object);
            ptr::addr_of_mut!((*base).policy.weak_ref).write(Some(weak_ref));
            UnknownObject::install(base, WeakShim::<T, A, D>::VTBL);
            Some(object)
        }
    }
}

/// No counting at all: AddRef and Release return 1 and never destroy.
///
/// For objects whose lifetime is managed elsewhere (statics, stack values,
/// members of another object).
pub struct NoRefCount<const QUERYABLE: bool = true>;

/// Neither counted nor queryable.
pub type NoRefCountNoQuery = NoRefCount<false>;

unsafe fn constant_add_ref(_this: NonNull<RawUnknown>) -> u32 {
    1
}

unsafe fn constant_release(_this: NonNull<RawUnknown>) -> u32 {
    1
}

const CONSTANT_VTBL: &UnknownVtbl = &UnknownVtbl {
    AddRef: constant_add_ref,
    Release: constant_release,
};

unsafe impl<const QUERYABLE: bool> RefCountPolicy for NoRefCount<QUERYABLE> {
    const INIT: Self = NoRefCount;
    const QUERYABLE: bool = QUERYABLE;
    const DETACHED: &'static UnknownVtbl = CONSTANT_VTBL;

    #[inline]
    fn ref_count(&self) -> u32 {
        1
    }
}
