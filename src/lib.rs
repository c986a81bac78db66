// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_std]

#[doc(hidden)]
pub extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod allocator;
pub mod cnt_ptr;
pub mod fatal;
pub mod guid;
pub mod make;
pub mod policy;
pub mod query_cast;
mod refcount;
pub mod status;
pub mod trace;
pub mod unknown;
pub mod weak;

pub use allocator::{Allocator, GlobalAllocator};
pub use cnt_ptr::CntPtr;
pub use fatal::{fatal, FailureTag};
pub use guid::{
    assert_unique_guids, find_duplicate_guid, guid_of, GuidParseError, HasGuid, GUID,
    IID_IUNKNOWN, IID_OBJECT_WEAK_REF,
};
pub use make::{
    make, make_in, make_init, make_init_in, try_make, try_make_in, try_make_init,
    try_make_init_in, InitializeThis, MakeError,
};
pub use paste;
pub use policy::{
    DefaultDeleter, Deleter, MakeRefCount, NoRefCount, NoRefCountNoQuery, PendingDestroy,
    RefCountPolicy, SimpleNoQueryRefCount, SimpleRefCount, WeakRefCount,
};
pub use query_cast::{
    query_cast, query_cast_iid, Facet, Interface, QueryCastChain, QueryCastDerived,
    QueryCastGuid, QueryCastHidden, QueryCastList, QueryCastStrategy,
};
pub use status::{Status, StatusResult, NTSTATUS};
pub use trace::{clear_trace_hook, set_trace_hook, trace, TraceHook};
pub use unknown::{
    static_cast, IUnknown, Implements, RawUnknown, UnknownObject, UnknownObjectType,
    UnknownVtbl,
};
pub use weak::{ObjectWeakRef, WeakPtr};
