// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::any::Any;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::guid::{HasGuid, GUID};
use crate::unknown::{IUnknown, Implements, RawUnknown};
use crate::weak::ObjectWeakRef;

/// Out-parameter of a query: the caller's pointer slot, typed by the
/// interface the requested identifier names.
///
/// `'o` is the lifetime of the object being queried, `'s` the lifetime of the
/// slot borrow.
pub struct Facet<'o, 's> {
    slot: &'s mut (dyn Any + 'static),
    owner: Option<NonNull<RawUnknown>>,
    _object: PhantomData<&'o ()>,
}

impl<'o, 's> Facet<'o, 's> {
    #[inline]
    pub fn new<I: ?Sized + 'static>(slot: &'s mut Option<NonNull<I>>) -> Self {
        Self {
            slot,
            owner: None,
            _object: PhantomData,
        }
    }

    /// Stores `facet` if the slot was created for `I`.
    ///
    /// A mismatch leaves the slot untouched and returns `false`, so a strategy
    /// answering an identifier with the wrong type never produces a pointer.
    #[inline]
    pub fn fill<I: ?Sized + IUnknown>(&mut self, facet: &'o I) -> bool {
        self.put(facet, facet.unknown())
    }

    /// Stores the weak-reference control block of `owner`.
    #[inline]
    pub(crate) fn fill_weak_ref(
        &mut self,
        weak_ref: &'o ObjectWeakRef,
        owner: NonNull<RawUnknown>,
    ) -> bool {
        self.put(weak_ref, owner)
    }

    fn put<I: ?Sized + 'static>(&mut self, facet: &'o I, owner: NonNull<RawUnknown>) -> bool {
        match self.slot.downcast_mut::<Option<NonNull<I>>>() {
            Some(slot) => {
                *slot = Some(NonNull::from(facet));
                self.owner = Some(owner);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn accepts<I: ?Sized + 'static>(&self) -> bool {
        self.slot.is::<Option<NonNull<I>>>()
    }

    /// Identity of the object the filled facet belongs to.
    #[inline]
    pub fn owner(&self) -> Option<NonNull<RawUnknown>> {
        self.owner
    }
}

/// One way of answering "do you expose the facet named by `riid`".
///
/// Strategies are never instantiated; they compose at the type level.
pub trait QueryCastStrategy<T: ?Sized> {
    fn query_cast<'o>(object: &'o T, riid: &GUID, out: &mut Facet<'o, '_>) -> bool;
}

/// Exposes `I` under its own identifier.
pub struct Interface<I: ?Sized>(PhantomData<fn() -> *const I>);

/// Exposes `I` and, through it, the base interfaces answered by `B`.
///
/// `B` is usually an `Interface<dyn Base>` or a `QueryCastList` of them.
pub struct QueryCastChain<I: ?Sized, B>(PhantomData<fn() -> (*const I, B)>);

/// Answers the concrete type's own identifier with the object itself.
pub struct QueryCastDerived<T>(PhantomData<fn() -> T>);

/// Exposes `I` under the identifier of `G` instead of its own.
pub struct QueryCastGuid<I: ?Sized, G: ?Sized>(PhantomData<fn() -> (*const I, *const G)>);

/// Statically implements `I` but refuses to expose it dynamically.
pub struct QueryCastHidden<I: ?Sized>(PhantomData<fn() -> *const I>);

/// Tries each strategy of the tuple `L` in order; the first answer wins.
pub struct QueryCastList<L>(PhantomData<fn() -> L>);

impl<T, I> QueryCastStrategy<T> for Interface<I>
where
    T: ?Sized + Implements<I>,
    I: ?Sized + IUnknown + HasGuid,
{
    #[inline]
    fn query_cast<'o>(object: &'o T, riid: &GUID, out: &mut Facet<'o, '_>) -> bool {
        *riid == I::GUID && out.fill::<I>(<T as Implements<I>>::as_interface(object))
    }
}

impl<T, I, B> QueryCastStrategy<T> for QueryCastChain<I, B>
where
    T: ?Sized + Implements<I>,
    I: ?Sized + IUnknown + HasGuid,
    B: QueryCastStrategy<T>,
{
    #[inline]
    fn query_cast<'o>(object: &'o T, riid: &GUID, out: &mut Facet<'o, '_>) -> bool {
        Interface::<I>::query_cast(object, riid, out) || B::query_cast(object, riid, out)
    }
}

impl<T> QueryCastStrategy<T> for QueryCastDerived<T>
where
    T: IUnknown + HasGuid,
{
    #[inline]
    fn query_cast<'o>(object: &'o T, riid: &GUID, out: &mut Facet<'o, '_>) -> bool {
        *riid == T::GUID && out.fill::<T>(object)
    }
}

impl<T, I, G> QueryCastStrategy<T> for QueryCastGuid<I, G>
where
    T: ?Sized + Implements<I>,
    I: ?Sized + IUnknown,
    G: ?Sized + HasGuid,
{
    #[inline]
    fn query_cast<'o>(object: &'o T, riid: &GUID, out: &mut Facet<'o, '_>) -> bool {
        *riid == G::GUID && out.fill::<I>(<T as Implements<I>>::as_interface(object))
    }
}

impl<T, I> QueryCastStrategy<T> for QueryCastHidden<I>
where
    T: ?Sized + Implements<I>,
    I: ?Sized,
{
    #[inline]
    fn query_cast<'o>(_object: &'o T, _riid: &GUID, _out: &mut Facet<'o, '_>) -> bool {
        false
    }
}

impl<T: ?Sized> QueryCastStrategy<T> for QueryCastList<()> {
    #[inline]
    fn query_cast<'o>(_object: &'o T, _riid: &GUID, _out: &mut Facet<'o, '_>) -> bool {
        false
    }
}

macro_rules! impl_query_cast_list {
    ($($name:ident),+) => {
        impl<T: ?Sized, $($name: QueryCastStrategy<T>),+> QueryCastStrategy<T>
            for QueryCastList<($($name,)+)>
        {
            #[inline]
            fn query_cast<'o>(object: &'o T, riid: &GUID, out: &mut Facet<'o, '_>) -> bool {
                $(
                    if $name::query_cast(object, riid, out) {
                        return true;
                    }
                )+
                false
            }
        }
    };
}

impl_query_cast_list!(S0);
impl_query_cast_list!(S0, S1);
impl_query_cast_list!(S0, S1, S2);
impl_query_cast_list!(S0, S1, S2, S3);
impl_query_cast_list!(S0, S1, S2, S3, S4);
impl_query_cast_list!(S0, S1, S2, S3, S4, S5);
impl_query_cast_list!(S0, S1, S2, S3, S4, S5, S6);
impl_query_cast_list!(S0, S1, S2, S3, S4, S5, S6, S7);
impl_query_cast_list!(S0, S1, S2, S3, S4, S5, S6, S7, S8);
impl_query_cast_list!(S0, S1, S2, S3, S4, S5, S6, S7, S8, S9);
impl_query_cast_list!(S0, S1, S2, S3, S4, S5, S6, S7, S8, S9, S10);
impl_query_cast_list!(S0, S1, S2, S3, S4, S5, S6, S7, S8, S9, S10, S11);

/// Finds the `I` facet of `object` without touching its ref count.
///
/// The result borrows `object`; the caller keeps its own reference alive for
/// as long as the facet is used.
#[inline]
pub fn query_cast<I, S>(object: &S) -> Option<&I>
where
    I: ?Sized + HasGuid + 'static,
    S: ?Sized + IUnknown,
{
    query_cast_iid(object, &I::GUID)
}

/// Like [`query_cast`] with an explicit identifier, for facets exposed under a
/// local id.
pub fn query_cast_iid<'o, I, S>(object: &'o S, riid: &GUID) -> Option<&'o I>
where
    I: ?Sized + 'static,
    S: ?Sized + IUnknown,
{
    let mut slot: Option<NonNull<I>> = None;
    object.query_cast(riid, &mut Facet::new(&mut slot));
    // SAFETY: a filled facet is borrowed for 'o.
    slot.map(|facet| unsafe { &*facet.as_ptr() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::IID_IUNKNOWN;
    use crate::policy::NoRefCount;
    use crate::unknown::UnknownObject;
    use core::sync::atomic::{AtomicU32, Ordering};

    crate::declare_interface! {
        #[guid("0C7A1B2E-5B8C-4C13-A0D5-1F4D2B8C0E01")]
        trait IBase: IUnknown {
            fn base_value(&self) -> u32;
        }
    }

    crate::declare_interface! {
        #[guid("0C7A1B2E-5B8C-4C13-A0D5-1F4D2B8C0E02")]
        trait IDerived: IBase {
            fn derived_value(&self) -> u32;
        }
    }

    crate::declare_interface! {
        #[guid("0C7A1B2E-5B8C-4C13-A0D5-1F4D2B8C0E03")]
        trait IOther: IUnknown {
            fn other_value(&self) -> u32;
        }
    }

    crate::declare_interface! {
        #[guid("0C7A1B2E-5B8C-4C13-A0D5-1F4D2B8C0E04")]
        trait ISecret: IUnknown {
            fn secret(&self) -> u32;
        }
    }

    crate::declare_interface! {
        #[guid("0C7A1B2E-5B8C-4C13-A0D5-1F4D2B8C0E05")]
        trait IUnrelated: IUnknown {}
    }

    struct LocalOtherId;
    crate::declare_guid!(LocalOtherId, "0C7A1B2E-5B8C-4C13-A0D5-1F4D2B8C0E10");

    #[repr(C)]
    struct Sample {
        base: UnknownObject<NoRefCount>,
    }

    crate::declare_guid!(Sample, "0C7A1B2E-5B8C-4C13-A0D5-1F4D2B8C0E20");

    impl IBase for Sample {
        fn base_value(&self) -> u32 {
            1
        }
    }

    impl IDerived for Sample {
        fn derived_value(&self) -> u32 {
            2
        }
    }

    impl IOther for Sample {
        fn other_value(&self) -> u32 {
            3
        }
    }

    impl ISecret for Sample {
        fn secret(&self) -> u32 {
            4
        }
    }

    crate::implements!(Sample: IBase, IDerived, IOther, ISecret);

    crate::unknown_object! {
        impl Sample {
            base: base,
            policy: NoRefCount,
            query_cast: QueryCastList<(
                QueryCastChain<dyn IDerived, Interface<dyn IBase>>,
                QueryCastGuid<dyn IOther, LocalOtherId>,
                QueryCastHidden<dyn ISecret>,
                QueryCastDerived<Sample>,
            )>,
        }
    }

    fn sample() -> Sample {
        Sample {
            base: UnknownObject::new(),
        }
    }

    #[test]
    fn chain_answers_interface_and_its_base() {
        let object = sample();
        assert_eq!(query_cast::<dyn IDerived, _>(&object).unwrap().derived_value(), 2);
        assert_eq!(query_cast::<dyn IBase, _>(&object).unwrap().base_value(), 1);
    }

    #[test]
    fn local_guid_replaces_declared_one() {
        let object = sample();
        assert!(query_cast::<dyn IOther, _>(&object).is_none());
        let other = query_cast_iid::<dyn IOther, _>(&object, &LocalOtherId::GUID).unwrap();
        assert_eq!(other.other_value(), 3);
    }

    #[test]
    fn hidden_interface_is_only_static() {
        let object = sample();
        assert!(query_cast::<dyn ISecret, _>(&object).is_none());
        assert_eq!(crate::static_cast::<dyn ISecret, _>(&object).secret(), 4);
    }

    #[test]
    fn derived_downcasts_from_an_interface() {
        let object = sample();
        let iface: &dyn IOther = &object;
        let concrete = query_cast::<Sample, _>(iface).unwrap();
        assert!(core::ptr::eq(concrete, &object));
    }

    #[test]
    fn down_then_up_returns_the_same_facet() {
        let object = sample();
        let derived = query_cast::<dyn IDerived, _>(&object).unwrap();
        let concrete = query_cast::<Sample, _>(derived).unwrap();
        let base = query_cast::<dyn IBase, _>(concrete).unwrap();
        let direct = query_cast::<dyn IBase, _>(&object).unwrap();
        assert!(core::ptr::addr_eq(base, direct));
    }

    #[test]
    fn unsupported_query_is_idempotent() {
        let object = sample();
        for _ in 0..4 {
            assert!(query_cast::<dyn IUnrelated, _>(&object).is_none());
        }
        assert_eq!(object.base.ref_count(), 1);
    }

    #[test]
    fn mismatched_slot_type_is_never_filled() {
        let object = sample();
        // Right identifier, wrong slot type.
        assert!(query_cast_iid::<dyn IOther, _>(&object, &IID_IBase).is_none());
        let mut slot: Option<NonNull<dyn IBase>> = None;
        let facet = Facet::new(&mut slot);
        assert!(facet.accepts::<dyn IBase>());
        assert!(!facet.accepts::<dyn IOther>());
    }

    #[test]
    fn iunknown_is_answered_before_the_list() {
        let object = sample();
        let root = query_cast_iid::<dyn IUnknown, _>(&object, &IID_IUNKNOWN).unwrap();
        assert_eq!(root.unknown(), object.unknown());
    }

    static FIRST_HITS: AtomicU32 = AtomicU32::new(0);
    static SECOND_HITS: AtomicU32 = AtomicU32::new(0);

    struct CountingBase<const N: u32>;

    impl<const N: u32> QueryCastStrategy<Tied> for CountingBase<N> {
        fn query_cast<'o>(object: &'o Tied, riid: &GUID, out: &mut Facet<'o, '_>) -> bool {
            if *riid != IID_IBase {
                return false;
            }
            if N == 0 {
                FIRST_HITS.fetch_add(1, Ordering::Relaxed);
            } else {
                SECOND_HITS.fetch_add(1, Ordering::Relaxed);
            }
            out.fill::<dyn IBase>(object)
        }
    }

    #[repr(C)]
    struct Tied {
        base: UnknownObject<NoRefCount>,
    }

    impl IBase for Tied {
        fn base_value(&self) -> u32 {
            9
        }
    }

    crate::unknown_object! {
        impl Tied {
            base: base,
            policy: NoRefCount,
            query_cast: QueryCastList<(CountingBase<0>, CountingBase<1>)>,
        }
    }

    #[test]
    fn ambiguous_ancestor_resolves_through_first_entry() {
        let object = Tied {
            base: UnknownObject::new(),
        };
        FIRST_HITS.store(0, Ordering::Relaxed);
        SECOND_HITS.store(0, Ordering::Relaxed);
        assert_eq!(query_cast::<dyn IBase, _>(&object).unwrap().base_value(), 9);
        assert_eq!(FIRST_HITS.load(Ordering::Relaxed), 1);
        assert_eq!(SECOND_HITS.load(Ordering::Relaxed), 0);
    }
}
