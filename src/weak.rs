// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{fence, AtomicU32, Ordering};

use crate::cnt_ptr::CntPtr;
use crate::guid::{HasGuid, GUID, IID_OBJECT_WEAK_REF};
use crate::query_cast::query_cast;
use crate::refcount;
use crate::trace::refcount_event;
use crate::unknown::IUnknown;

/// Control block shared by an object with a weak-capable policy and its
/// [`WeakPtr`]s.
///
/// The strong count is the object's ref count. The weak count starts at 1,
/// held by the live object, so the block outlives both the object and the
/// last weak pointer.
#[repr(C)]
pub struct ObjectWeakRef {
    strong: AtomicU32,
    weak: AtomicU32,
    free: unsafe fn(NonNull<ObjectWeakRef>),
}

impl HasGuid for ObjectWeakRef {
    const GUID: GUID = IID_OBJECT_WEAK_REF;
}

impl ObjectWeakRef {
    #[inline]
    pub(crate) const fn new(free: unsafe fn(NonNull<ObjectWeakRef>)) -> Self {
        Self {
            strong: AtomicU32::new(1),
            weak: AtomicU32::new(1),
            free,
        }
    }

    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.strong.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn weak_ref_count(&self) -> u32 {
        self.weak.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.strong.load(Ordering::Acquire) == 0
    }

    /// Takes a strong reference unless the object is already gone.
    ///
    /// On success the caller owns one reference to the object.
    #[inline]
    pub fn increment_ref_count_if_not_zero(&self) -> bool {
        let upgraded = refcount::increment_if_not_zero(&self.strong);
        if upgraded {
            refcount_event("upgrade", self as *const Self as *const (), self.ref_count());
        }
        upgraded
    }

    #[inline]
    pub(crate) fn add_ref(&self) -> u32 {
        refcount::add_ref(&self.strong)
    }

    #[inline]
    pub(crate) fn release_strong(&self) -> u32 {
        refcount::release(&self.strong)
    }

    #[inline]
    pub fn add_weak_ref(&self) -> u32 {
        let count = refcount::add_weak(&self.weak);
        refcount_event("weak addref", self as *const Self as *const (), count);
        count
    }

    /// Drops one weak reference and frees the block at zero.
    ///
    /// # Safety
    /// `this` must be live and the caller must own the weak reference.
    pub unsafe fn release_weak_ref(this: NonNull<Self>) -> u32 {
        let (free, count) = unsafe {
            let block = this.as_ref();
            (block.free, refcount::release_weak(&block.weak))
        };
        refcount_event("weak release", this.as_ptr() as *const (), count);
        if count == 0 {
            fence(Ordering::Acquire);
            unsafe { free(this) };
        }
        count
    }
}

impl fmt::Debug for ObjectWeakRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectWeakRef")
            .field("strong", &self.ref_count())
            .field("weak", &self.weak_ref_count())
            .finish()
    }
}

/// Non-owning pointer to an object with a weak-capable policy.
///
/// Keeps the control block alive, never the object.
pub struct WeakPtr<I: ?Sized + IUnknown> {
    inner: Option<(NonNull<I>, NonNull<ObjectWeakRef>)>,
}

// SAFETY: interfaces are `Send + Sync` and the control block is atomic.
unsafe impl<I: ?Sized + IUnknown> Send for WeakPtr<I> {}
unsafe impl<I: ?Sized + IUnknown> Sync for WeakPtr<I> {}

impl<I: ?Sized + IUnknown> WeakPtr<I> {
    #[inline]
    pub const fn new() -> Self {
        Self { inner: None }
    }

    /// Observes `object`. Empty if the object has no weak support.
    pub fn from_ref(object: &I) -> Self {
        let Some(weak_ref) = query_cast::<ObjectWeakRef, I>(object) else {
            return Self::new();
        };
        weak_ref.add_weak_ref();
        Self {
            inner: Some((NonNull::from(object), NonNull::from(weak_ref))),
        }
    }

    #[inline]
    pub fn from_cnt(object: &CntPtr<I>) -> Self {
        object.get().map_or_else(Self::new, Self::from_ref)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// True when empty or when the object has been released.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.weak_ref().map_or(true, ObjectWeakRef::is_expired)
    }

    /// A strong pointer to the object, or an empty one if it is gone.
    pub fn get_strong_ptr(&self) -> CntPtr<I> {
        match self.inner {
            Some((object, weak_ref))
                if unsafe { weak_ref.as_ref() }.increment_ref_count_if_not_zero() =>
            {
                // SAFETY: the successful increment is the reference adopted here.
                unsafe { CntPtr::from_raw(object.as_ptr()) }
            }
            _ => CntPtr::new(),
        }
    }

    #[inline]
    pub fn upgrade(&self) -> Option<CntPtr<I>> {
        let strong = self.get_strong_ptr();
        (!strong.is_empty()).then_some(strong)
    }

    pub fn clear(&mut self) {
        if let Some((_, weak_ref)) = self.inner.take() {
            // SAFETY: this pointer owned one weak reference.
            unsafe { ObjectWeakRef::release_weak_ref(weak_ref) };
        }
    }

    #[inline]
    pub fn weak_ref(&self) -> Option<&ObjectWeakRef> {
        // SAFETY: the weak reference held here keeps the block alive.
        self.inner.map(|(_, weak_ref)| unsafe { &*weak_ref.as_ptr() })
    }
}

impl<I: ?Sized + IUnknown> Clone for WeakPtr<I> {
    fn clone(&self) -> Self {
        if let Some(weak_ref) = self.weak_ref() {
            weak_ref.add_weak_ref();
        }
        Self { inner: self.inner }
    }
}

impl<I: ?Sized + IUnknown> Drop for WeakPtr<I> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<I: ?Sized + IUnknown> Default for WeakPtr<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ?Sized + IUnknown> fmt::Debug for WeakPtr<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.weak_ref() {
            Some(weak_ref) => f
                .debug_struct("WeakPtr")
                .field("object", &self.inner.map(|(object, _)| object.cast::<()>()))
                .field("control", weak_ref)
                .finish(),
            None => f.write_str("WeakPtr(empty)"),
        }
    }
}
