// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crash-and-terminate path for violated object model invariants.
//!
//! A fatal condition is reported through the trace hook and then panics. The
//! release profile aborts on panic, so the process stops with the tag in the
//! last trace line.

use core::fmt;

/// Identifies which invariant was violated.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FailureTag(pub u32);

impl FailureTag {
    pub const REFCOUNT_BOUNCE: FailureTag = FailureTag(0x0130_f540);
    pub const REFCOUNT_NEGATIVE: FailureTag = FailureTag(0x0130_f541);
    pub const REFCOUNT_OVERFLOW: FailureTag = FailureTag(0x0130_f542);
    pub const WEAK_REFCOUNT_NEGATIVE: FailureTag = FailureTag(0x0130_f543);
    pub const INITIALIZE_FAILED: FailureTag = FailureTag(0x0130_f544);
    pub const OUT_OF_MEMORY: FailureTag = FailureTag(0x0130_f545);
    pub const NOT_MADE: FailureTag = FailureTag(0x0130_f546);
    pub const EMPTY_DEREF: FailureTag = FailureTag(0x0130_f547);
    pub const FOREIGN_UPCAST: FailureTag = FailureTag(0x0130_f548);
    pub const DUPLICATE_GUID: FailureTag = FailureTag(0x0130_f549);
}

impl fmt::Display for FailureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cold]
#[inline(never)]
#[track_caller]
pub fn fatal(tag: FailureTag, msg: fmt::Arguments<'_>) -> ! {
    crate::trace::trace(format_args!("refcom fatal {}: {}", tag, msg));
    panic!("refcom fatal {}: {}", tag, msg)
}
