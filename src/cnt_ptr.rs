// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;

use crate::fatal::{fatal, FailureTag};
use crate::guid::HasGuid;
use crate::query_cast::Facet;
use crate::status::{Status, StatusResult};
use crate::unknown::{self, IUnknown, Implements};

/// Counted pointer to an object or one of its interfaces.
///
/// Holds one strong reference while non-empty. `T` is either a concrete object
/// type or a `dyn Interface`.
pub struct CntPtr<T: ?Sized + IUnknown> {
    ptr: Option<NonNull<T>>,
}

// SAFETY: every `IUnknown` is `Send + Sync` and counts atomically.
unsafe impl<T: ?Sized + IUnknown> Send for CntPtr<T> {}
unsafe impl<T: ?Sized + IUnknown> Sync for CntPtr<T> {}

impl<T: ?Sized + IUnknown> CntPtr<T> {
    #[inline]
    pub const fn new() -> Self {
        Self { ptr: None }
    }

    /// Adopts a reference without calling `AddRef`.
    ///
    /// # Safety
    /// `ptr` must be null or a live object whose reference the caller owns.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self {
            ptr: NonNull::new(ptr),
        }
    }

    /// Takes a new reference by calling `AddRef` first.
    ///
    /// # Safety
    /// `ptr` must be null or a live object.
    pub unsafe fn from_raw_addref(ptr: *mut T) -> Self {
        let ptr = NonNull::new(ptr);
        if let Some(ptr) = ptr {
            // SAFETY: caller guarantees `ptr` is live.
            unsafe { unknown::add_ref(ptr.as_ref().unknown()) };
        }
        Self { ptr }
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: the held reference keeps the object alive.
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }

    /// Releases the held reference, if any.
    pub fn clear(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { release_ptr(ptr) };
        }
    }

    /// Gives up the reference without releasing it.
    #[inline]
    pub fn detach(&mut self) -> Option<NonNull<T>> {
        self.ptr.take()
    }

    #[inline]
    pub fn into_raw(self) -> Option<NonNull<T>> {
        ManuallyDrop::new(self).ptr
    }

    /// Adopts `ptr`, then releases the previously held reference.
    ///
    /// # Safety
    /// Same as [`CntPtr::from_raw`].
    pub unsafe fn attach(&mut self, ptr: *mut T) {
        if let Some(old) = core::mem::replace(&mut self.ptr, NonNull::new(ptr)) {
            unsafe { release_ptr(old) };
        }
    }

    /// Points at `other`'s object. Safe when both already share it.
    pub fn assign(&mut self, other: &CntPtr<T>) {
        let old = core::mem::replace(self, other.clone());
        drop(old);
    }

    /// Moves the reference out, leaving `self` empty.
    #[inline]
    pub fn take(&mut self) -> CntPtr<T> {
        CntPtr {
            ptr: self.ptr.take(),
        }
    }

    #[inline]
    pub fn swap(&mut self, other: &mut CntPtr<T>) {
        core::mem::swap(&mut self.ptr, &mut other.ptr);
    }

    /// Same object, compared by address.
    #[inline]
    pub fn ptr_eq(&self, other: &CntPtr<T>) -> bool {
        self.ptr.map(|ptr| ptr.cast::<()>()) == other.ptr.map(|ptr| ptr.cast::<()>())
    }

    /// Compile-time checked conversion to a base interface.
    pub fn upcast<U>(self) -> CntPtr<U>
    where
        U: ?Sized + IUnknown,
        T: Implements<U>,
    {
        let Some(object) = self.into_raw() else {
            return CntPtr::new();
        };
        // SAFETY: the reference taken out of `self` keeps the object alive.
        let object = unsafe { &*object.as_ptr() };
        let facet = <T as Implements<U>>::as_interface(object);
        if facet.unknown() != object.unknown() {
            fatal(
                FailureTag::FOREIGN_UPCAST,
                format_args!("upcast produced a facet of another object"),
            );
        }
        CntPtr {
            ptr: Some(NonNull::from(facet)),
        }
    }

    /// QueryInterface for `U`, returning a new counted pointer.
    pub fn query<U>(&self) -> StatusResult<CntPtr<U>>
    where
        U: ?Sized + IUnknown + HasGuid,
    {
        let object = self.get().ok_or(Status::INVALID_PARAMETER)?;
        let mut slot: Option<NonNull<U>> = None;
        object
            .query_interface(&U::GUID, &mut Facet::new(&mut slot))
            .to_result()?;
        slot.map(|ptr| CntPtr { ptr: Some(ptr) })
            .ok_or(Status::NOINTERFACE)
    }

    /// Borrowed QueryCast; does not change the ref count.
    #[inline]
    pub fn query_cast<U>(&self) -> Option<&U>
    where
        U: ?Sized + HasGuid + 'static,
    {
        self.get().and_then(crate::query_cast::query_cast::<U, T>)
    }

    #[inline]
    pub fn static_cast<U>(&self) -> Option<&U>
    where
        U: ?Sized,
        T: Implements<U>,
    {
        self.get().map(<T as Implements<U>>::as_interface)
    }
}

unsafe fn release_ptr<T: ?Sized + IUnknown>(ptr: NonNull<T>) {
    let unknown = unsafe { ptr.as_ref() }.unknown();
    unsafe { unknown::release(unknown) };
}

impl<T: ?Sized + IUnknown> Clone for CntPtr<T> {
    fn clone(&self) -> Self {
        if let Some(object) = self.get() {
            unsafe { unknown::add_ref(object.unknown()) };
        }
        Self { ptr: self.ptr }
    }
}

impl<T: ?Sized + IUnknown> Drop for CntPtr<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: ?Sized + IUnknown> Default for CntPtr<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + IUnknown> core::ops::Deref for CntPtr<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(object) => object,
            None => fatal(
                FailureTag::EMPTY_DEREF,
                format_args!("dereferenced an empty CntPtr"),
            ),
        }
    }
}

impl<T: ?Sized + IUnknown> PartialEq for CntPtr<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: ?Sized + IUnknown> Eq for CntPtr<T> {}

impl<T: ?Sized + IUnknown> fmt::Debug for CntPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CntPtr")
            .field(&self.ptr.map(|ptr| ptr.cast::<()>()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make::make;
    use crate::policy::SimpleRefCount;
    use crate::query_cast::{Interface, QueryCastList};
    use crate::unknown::UnknownObject;
    use core::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    static DROP_COUNT: AtomicU32 = AtomicU32::new(0);
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    crate::declare_interface! {
        #[guid("C4F1E8A2-7D3B-4E69-9A15-2B8D0C6E4F11")]
        trait IName: IUnknown {
            fn name(&self) -> &'static str;
        }
    }

    crate::declare_interface! {
        #[guid("C4F1E8A2-7D3B-4E69-9A15-2B8D0C6E4F12")]
        trait IMissing: IUnknown {}
    }

    #[repr(C)]
    struct Named {
        base: UnknownObject<SimpleRefCount>,
        name: &'static str,
    }

    impl Drop for Named {
        fn drop(&mut self) {
            DROP_COUNT.fetch_add(1, Ordering::Relaxed);
        }
    }

    impl IName for Named {
        fn name(&self) -> &'static str {
            self.name
        }
    }

    crate::implements!(Named: IName);

    crate::unknown_object! {
        impl Named {
            base: base,
            policy: SimpleRefCount,
            query_cast: QueryCastList<(Interface<dyn IName>,)>,
        }
    }

    fn named(name: &'static str) -> CntPtr<Named> {
        make(Named {
            base: UnknownObject::new(),
            name,
        })
    }

    #[test]
    fn clones_destroy_once() {
        let _guard = TEST_LOCK.lock().unwrap();
        DROP_COUNT.store(0, Ordering::Relaxed);
        let first = named("a");
        let clones: alloc::vec::Vec<_> = (0..8).map(|_| first.clone()).collect();
        assert_eq!(first.base.ref_count(), 9);
        drop(first);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 0);
        drop(clones);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn self_assignment_keeps_the_object() {
        let _guard = TEST_LOCK.lock().unwrap();
        DROP_COUNT.store(0, Ordering::Relaxed);
        let mut ptr = named("self");
        let alias = ptr.clone();
        ptr.assign(&alias);
        drop(alias);
        assert_eq!(ptr.base.ref_count(), 1);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 0);
        assert_eq!(ptr.name(), "self");
    }

    #[test]
    fn assign_releases_the_previous_object() {
        let _guard = TEST_LOCK.lock().unwrap();
        DROP_COUNT.store(0, Ordering::Relaxed);
        let mut ptr = named("old");
        let other = named("new");
        ptr.assign(&other);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
        assert!(ptr == other);
        assert_eq!(other.base.ref_count(), 2);
    }

    #[test]
    fn take_and_detach_move_ownership() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut source = named("moved");
        let moved = source.take();
        assert!(source.is_empty());
        assert_eq!(moved.base.ref_count(), 1);

        let mut holder = moved;
        let raw = holder.detach().unwrap();
        assert!(holder.is_empty());
        let mut adopted = CntPtr::<Named>::new();
        unsafe { adopted.attach(raw.as_ptr()) };
        assert_eq!(adopted.base.ref_count(), 1);

        let mut other = CntPtr::<Named>::new();
        other.swap(&mut adopted);
        assert!(adopted.is_empty());
        assert_eq!(other.name(), "moved");
    }

    #[test]
    fn query_and_upcast_share_identity() {
        let _guard = TEST_LOCK.lock().unwrap();
        let object = named("q");
        let by_query = object.query::<dyn IName>().unwrap();
        assert_eq!(object.base.ref_count(), 2);
        let by_upcast: CntPtr<dyn IName> = object.clone().upcast();
        assert_eq!(by_query.unknown(), by_upcast.unknown());
        assert_eq!(by_upcast.name(), "q");
        assert_eq!(object.query::<dyn IMissing>().unwrap_err(), Status::NOINTERFACE);
        assert_eq!(object.base.ref_count(), 3);
    }

    #[test]
    fn empty_pointer_behaviour() {
        let empty = CntPtr::<dyn IName>::default();
        assert!(empty.is_empty());
        assert!(empty.get().is_none());
        assert!(empty.query_cast::<dyn IName>().is_none());
        assert_eq!(
            empty.query::<dyn IName>().unwrap_err(),
            Status::INVALID_PARAMETER
        );
        assert!(empty.clone() == CntPtr::new());
        let upcast: CntPtr<dyn IName> = CntPtr::<dyn IName>::new().upcast();
        assert!(upcast.is_empty());
    }

    #[test]
    #[should_panic(expected = "empty CntPtr")]
    fn deref_of_empty_pointer_crashes() {
        let empty = CntPtr::<dyn IName>::new();
        let _ = empty.name();
    }

    #[test]
    fn from_raw_addref_balances_release() {
        let _guard = TEST_LOCK.lock().unwrap();
        let object = named("raw");
        let raw = object.as_ptr().unwrap().as_ptr();
        let second = unsafe { CntPtr::from_raw_addref(raw) };
        assert_eq!(object.base.ref_count(), 2);
        drop(second);
        assert_eq!(object.base.ref_count(), 1);
        let via_static = object.static_cast::<dyn IName>().unwrap();
        assert_eq!(via_static.name(), "raw");
    }
}
