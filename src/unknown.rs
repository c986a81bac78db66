// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::ptr::{self, NonNull};

use crate::fatal::{fatal, FailureTag};
use crate::guid::{HasGuid, GUID, IID_IUNKNOWN, IID_OBJECT_WEAK_REF};
use crate::policy::RefCountPolicy;
use crate::query_cast::{Facet, QueryCastStrategy};
use crate::status::Status;
use crate::weak::ObjectWeakRef;

/// Raw view of an object header. The vtable pointer is the first word of every
/// object, so the object address doubles as its `RawUnknown` address.
#[repr(C)]
pub struct RawUnknown {
    pub vtbl: &'static UnknownVtbl,
}

/// Counting half of the three-method contract. Both entries take the raw
/// header so `Release` may free the object it was called on.
#[repr(C)]
#[derive(Clone, Copy)]
#[allow(non_snake_case)]
pub struct UnknownVtbl {
    pub AddRef: unsafe fn(NonNull<RawUnknown>) -> u32,
    pub Release: unsafe fn(NonNull<RawUnknown>) -> u32,
}

/// # Safety
/// `this` must point at the header of a live object.
#[inline]
pub unsafe fn add_ref(this: NonNull<RawUnknown>) -> u32 {
    let vtbl = unsafe { (*this.as_ptr()).vtbl };
    unsafe { (vtbl.AddRef)(this) }
}

/// # Safety
/// `this` must point at the header of a live object and the caller must own
/// the reference being released. The object may be gone when this returns.
#[inline]
pub unsafe fn release(this: NonNull<RawUnknown>) -> u32 {
    let vtbl = unsafe { (*this.as_ptr()).vtbl };
    unsafe { (vtbl.Release)(this) }
}

/// Root capability implemented by every object and inherited by every
/// interface trait.
///
/// # Safety
/// `unknown` must return the header of the object that owns `self`, and
/// `query_cast` may only fill facets that live inside that same object.
pub unsafe trait IUnknown: Send + Sync + 'static {
    /// Identity of the owning object.
    fn unknown(&self) -> NonNull<RawUnknown>;

    /// Looks up the facet named by `riid` without touching the ref count.
    fn query_cast<'o>(&'o self, riid: &GUID, out: &mut Facet<'o, '_>) -> bool;

    /// QueryCast followed by AddRef on success.
    fn query_interface<'o>(&'o self, riid: &GUID, out: &mut Facet<'o, '_>) -> Status;
}

impl HasGuid for dyn IUnknown {
    const GUID: GUID = IID_IUNKNOWN;
}

/// Ref-count header embedded as the first field of a concrete object.
///
/// ```ignore
/// #[repr(C)]
/// struct Widget {
///     base: UnknownObject<SimpleRefCount>,
///     value: u32,
/// }
/// ```
#[repr(C)]
pub struct UnknownObject<P: RefCountPolicy> {
    header: RawUnknown,
    pub(crate) policy: P,
}

impl<P: RefCountPolicy> UnknownObject<P> {
    /// A header whose strong count is 1, owned by whoever places the object.
    #[inline]
    pub const fn new() -> Self {
        Self {
            header: RawUnknown { vtbl: P::DETACHED },
            policy: P::INIT,
        }
    }

    #[inline]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.policy.ref_count()
    }

    #[inline]
    pub fn weak_ref(&self) -> Option<&ObjectWeakRef> {
        self.policy.weak_ref()
    }

    /// Swaps in the vtable of a placed object.
    ///
    /// # Safety
    /// `base` must be valid for writes and not yet shared.
    #[inline]
    pub(crate) unsafe fn install(base: *mut Self, vtbl: &'static UnknownVtbl) {
        unsafe { ptr::addr_of_mut!((*base).header.vtbl).write(vtbl) };
    }
}

impl<P: RefCountPolicy> Default for UnknownObject<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// A concrete type built on an [`UnknownObject`] header.
///
/// Usually implemented through [`unknown_object!`](crate::unknown_object).
///
/// # Safety
/// `base` must return the embedded header, located `BASE_OFFSET` bytes into
/// the object. Any use of the object model asserts at compile time that
/// `BASE_OFFSET` is zero.
pub unsafe trait UnknownObjectType: Sized + Send + Sync + 'static {
    type Policy: RefCountPolicy;
    type QueryCast: QueryCastStrategy<Self>;

    const BASE_OFFSET: usize;

    fn base(&self) -> &UnknownObject<Self::Policy>;
}

#[inline(always)]
pub(crate) fn assert_base_first<T: UnknownObjectType>() {
    const {
        assert!(
            T::BASE_OFFSET == 0,
            "UnknownObject must be the first field of the object"
        )
    };
}

/// Header pointer of a placed object.
#[inline]
pub(crate) fn base_of<T: UnknownObjectType>(object: NonNull<T>) -> *mut UnknownObject<T::Policy> {
    assert_base_first::<T>();
    object.as_ptr().cast()
}

unsafe impl<T: UnknownObjectType> IUnknown for T {
    #[inline]
    fn unknown(&self) -> NonNull<RawUnknown> {
        assert_base_first::<T>();
        NonNull::from(self).cast()
    }

    fn query_cast<'o>(&'o self, riid: &GUID, out: &mut Facet<'o, '_>) -> bool {
        if !<T::Policy as RefCountPolicy>::QUERYABLE {
            return false;
        }
        if *riid == IID_IUNKNOWN {
            return out.fill::<dyn IUnknown>(self);
        }
        if *riid == IID_OBJECT_WEAK_REF {
            if let Some(weak_ref) = self.base().weak_ref() {
                return out.fill_weak_ref(weak_ref, self.unknown());
            }
        }
        <T::QueryCast as QueryCastStrategy<T>>::query_cast(self, riid, out)
    }

    fn query_interface<'o>(&'o self, riid: &GUID, out: &mut Facet<'o, '_>) -> Status {
        if !<T::Policy as RefCountPolicy>::QUERYABLE {
            return Status::UNSUCCESSFUL;
        }
        if !self.query_cast(riid, out) {
            return Status::NOINTERFACE;
        }
        if out.owner() != Some(self.unknown()) {
            fatal(
                FailureTag::FOREIGN_UPCAST,
                format_args!("query answered with a facet of another object"),
            );
        }
        // SAFETY: `self` is live for the duration of the call.
        unsafe { add_ref(self.unknown()) };
        Status::SUCCESS
    }
}

/// Compile-time checked conversion from an object to one of its interfaces.
///
/// This is the static upcast: it only exists where the conversion does.
pub trait Implements<I: ?Sized> {
    fn as_interface(&self) -> &I;
}

impl<T: ?Sized> Implements<T> for T {
    #[inline]
    fn as_interface(&self) -> &T {
        self
    }
}

#[inline]
pub fn static_cast<I: ?Sized, T: ?Sized + Implements<I>>(object: &T) -> &I {
    <T as Implements<I>>::as_interface(object)
}

#[macro_export]
/// Declares an interface trait and its identifier.
///
/// Also emits an `IID_<Name>` constant and the interface-to-parent
/// [`Implements`](crate::Implements) impls used by `CntPtr::upcast`.
macro_rules! declare_interface {
    (
        #[guid($text:literal)]
        $(#[$attr:meta])*
        $vis:vis trait $name:ident : $parent:ident $(+ $bound:ident)* {
            $($body:tt)*
        }
    ) => {
        $(#[$attr])*
        $vis trait $name: $parent $(+ $bound)* {
            $($body)*
        }

        $crate::paste::paste! {
            #[allow(non_upper_case_globals, dead_code)]
            $vis const [<IID_ $name>]: $crate::GUID = $crate::guid!($text);

            impl $crate::HasGuid for dyn $name {
                const GUID: $crate::GUID = [<IID_ $name>];
            }
        }

        impl $crate::Implements<dyn $parent> for dyn $name {
            #[inline]
            fn as_interface(&self) -> &(dyn $parent + 'static) {
                self
            }
        }

        $(
            impl $crate::Implements<dyn $bound> for dyn $name {
                #[inline]
                fn as_interface(&self) -> &(dyn $bound + 'static) {
                    self
                }
            }
        )*
    };
}

#[macro_export]
/// Implements [`Implements`](crate::Implements) for each listed interface.
macro_rules! implements {
    ($ty:ty : $($iface:ident),+ $(,)?) => {
        $(
            impl $crate::Implements<dyn $iface> for $ty {
                #[inline]
                fn as_interface(&self) -> &(dyn $iface + 'static) {
                    self
                }
            }
        )+
    };
}

#[macro_export]
/// Composes a concrete type with its ref-count header and query-cast list.
///
/// The header field must be the first field; this is checked at compile time.
macro_rules! unknown_object {
    (
        impl $ty:ty {
            base: $base:ident,
            policy: $policy:ty,
            query_cast: $query:ty $(,)?
        }
    ) => {
        unsafe impl $crate::UnknownObjectType for $ty {
            type Policy = $policy;
            type QueryCast = $query;

            const BASE_OFFSET: usize = ::core::mem::offset_of!($ty, $base);

            #[inline]
            fn base(&self) -> &$crate::UnknownObject<$policy> {
                &self.$base
            }
        }
    };
}
