// trace.rs
//
// Lightweight tracing hooks for no_std builds.

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Trace hook invoked with formatted arguments.
pub type TraceHook = for<'a> fn(fmt::Arguments<'a>);

static TRACE_HOOK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Registers a trace hook.
#[inline]
pub fn set_trace_hook(hook: TraceHook) {
    TRACE_HOOK.store(hook as *const () as *mut (), Ordering::Release);
}

/// Clears the trace hook.
#[inline]
pub fn clear_trace_hook() {
    TRACE_HOOK.store(core::ptr::null_mut(), Ordering::Release);
}

/// Emits a trace event if a hook is installed.
#[inline]
pub fn trace(args: fmt::Arguments<'_>) {
    let ptr = TRACE_HOOK.load(Ordering::Acquire);
    if ptr.is_null() {
        return;
    }
    let hook: TraceHook = unsafe { core::mem::transmute(ptr) };
    hook(args);
}

/// Error report helper for recoverable failures.
#[inline]
pub fn report_error(file: &str, line: u32, status: crate::Status) {
    trace(format_args!("refcom error {:#x} at {}:{}", status.0, file, line));
}

/// Counter transition report, compiled in with `trace-refcount`.
#[cfg(feature = "trace-refcount")]
#[inline]
pub(crate) fn refcount_event(event: &str, object: *const (), count: u32) {
    trace(format_args!("refcom {} {:p} -> {}", event, object, count));
}

#[cfg(not(feature = "trace-refcount"))]
#[inline(always)]
pub(crate) fn refcount_event(_event: &str, _object: *const (), _count: u32) {}
