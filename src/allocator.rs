// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::alloc::Layout;
use core::ptr::NonNull;

/// Memory source for objects placed by [`make_in`](crate::make::make_in).
///
/// The allocator value is stored next to the object and handed back for the
/// matching `dealloc`, so both stateless and stateful allocators work.
pub trait Allocator: Send + Sync + 'static {
    /// # Safety
    /// `layout` must have a non-zero size.
    unsafe fn alloc(&self, layout: Layout) -> *mut u8;

    /// # Safety
    /// `ptr` must have been allocated by this allocator with the same `layout`.
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout);
}

/// Fallible allocation helper that returns `None` on OOM.
#[inline]
pub(crate) fn try_alloc_layout<A: Allocator>(alloc: &A, layout: Layout) -> Option<NonNull<u8>> {
    // SAFETY: every layout allocated by this crate holds at least the object header.
    let ptr = unsafe { alloc.alloc(layout) };
    NonNull::new(ptr)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalAllocator;

impl Allocator for GlobalAllocator {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        alloc::alloc::alloc(layout)
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        alloc::alloc::dealloc(ptr, layout)
    }
}
