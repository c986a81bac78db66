// refcount.rs
//
// Shared refcount helpers. Invariant violations crash instead of wrapping.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::fatal::{fatal, FailureTag};

#[cfg(feature = "refcount-hardening")]
const MAX_REFCOUNT: u32 = i32::MAX as u32;
#[cfg(not(feature = "refcount-hardening"))]
const MAX_REFCOUNT: u32 = u32::MAX;

/// Increments a strong count. A previous value of zero means the object was
/// already handed to its deleter.
#[cfg(not(feature = "refcount-hardening"))]
#[inline]
pub(crate) fn add_ref(ref_count: &AtomicU32) -> u32 {
    let prev = ref_count.fetch_add(1, Ordering::Relaxed);
    if prev == 0 {
        bounce();
    }
    if prev == MAX_REFCOUNT {
        overflow();
    }
    prev + 1
}

#[cfg(feature = "refcount-hardening")]
#[inline]
pub(crate) fn add_ref(ref_count: &AtomicU32) -> u32 {
    match ref_count.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |curr| {
        if curr == 0 || curr >= MAX_REFCOUNT {
            None
        } else {
            Some(curr + 1)
        }
    }) {
        Ok(prev) => prev + 1,
        Err(0) => bounce(),
        Err(_) => overflow(),
    }
}

/// Decrements a strong count and returns the remaining value.
///
/// The caller destroys the object when this returns zero, after an `Acquire`
/// fence.
#[cfg(not(feature = "refcount-hardening"))]
#[inline]
pub(crate) fn release(ref_count: &AtomicU32) -> u32 {
    let prev = ref_count.fetch_sub(1, Ordering::Release);
    if prev == 0 {
        negative(FailureTag::REFCOUNT_NEGATIVE);
    }
    prev - 1
}

#[cfg(feature = "refcount-hardening")]
#[inline]
pub(crate) fn release(ref_count: &AtomicU32) -> u32 {
    release_checked(ref_count, FailureTag::REFCOUNT_NEGATIVE)
}

/// Weak counts may legitimately rise from any non-zero value, so only the
/// overflow check applies.
#[inline]
pub(crate) fn add_weak(weak_count: &AtomicU32) -> u32 {
    #[cfg(feature = "refcount-hardening")]
    {
        match weak_count.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |curr| {
            if curr >= MAX_REFCOUNT {
                None
            } else {
                Some(curr + 1)
            }
        }) {
            Ok(prev) => prev + 1,
            Err(_) => overflow(),
        }
    }
    #[cfg(not(feature = "refcount-hardening"))]
    {
        let prev = weak_count.fetch_add(1, Ordering::Relaxed);
        if prev == MAX_REFCOUNT {
            overflow();
        }
        prev + 1
    }
}

#[inline]
pub(crate) fn release_weak(weak_count: &AtomicU32) -> u32 {
    release_checked(weak_count, FailureTag::WEAK_REFCOUNT_NEGATIVE)
}

#[inline]
fn release_checked(count: &AtomicU32, tag: FailureTag) -> u32 {
    match count.fetch_update(Ordering::Release, Ordering::Relaxed, |curr| {
        if curr == 0 {
            None
        } else {
            Some(curr - 1)
        }
    }) {
        Ok(prev) => prev - 1,
        Err(_) => negative(tag),
    }
}

/// Adds a strong reference only while the count is non-zero.
///
/// This is the weak-to-strong upgrade; a count that reached zero stays there.
#[inline]
pub(crate) fn increment_if_not_zero(ref_count: &AtomicU32) -> bool {
    let mut curr = ref_count.load(Ordering::Relaxed);
    loop {
        if curr == 0 {
            return false;
        }
        if curr >= MAX_REFCOUNT {
            overflow();
        }
        match ref_count.compare_exchange_weak(curr, curr + 1, Ordering::Acquire, Ordering::Relaxed) {
            Ok(_) => return true,
            Err(actual) => curr = actual,
        }
    }
}

#[cold]
#[inline(never)]
fn bounce() -> ! {
    fatal(
        FailureTag::REFCOUNT_BOUNCE,
        format_args!("ref count must not bounce from zero"),
    )
}

#[cold]
#[inline(never)]
fn negative(tag: FailureTag) -> ! {
    fatal(tag, format_args!("ref count must not be negative"))
}

#[cold]
#[inline(never)]
fn overflow() -> ! {
    fatal(
        FailureTag::REFCOUNT_OVERFLOW,
        format_args!("ref count exceeded {}", MAX_REFCOUNT),
    )
}
