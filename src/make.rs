// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;
use core::ptr::NonNull;

use crate::allocator::{Allocator, GlobalAllocator};
use crate::cnt_ptr::CntPtr;
use crate::fatal::{fatal, FailureTag};
use crate::policy::MakeRefCount;
use crate::status::Status;
use crate::trace::report_error;
use crate::unknown::UnknownObjectType;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MakeError {
    OutOfMemory,
    InitializeFailed,
}

impl From<MakeError> for Status {
    fn from(value: MakeError) -> Self {
        match value {
            MakeError::OutOfMemory => Status::INSUFFICIENT_RESOURCES,
            MakeError::InitializeFailed => Status::UNSUCCESSFUL,
        }
    }
}

impl fmt::Display for MakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MakeError::OutOfMemory => f.write_str("out of memory"),
            MakeError::InitializeFailed => f.write_str("object initialization failed"),
        }
    }
}

/// Second construction phase, run on the placed object before it is shared.
///
/// Returning `false` destroys the object.
pub trait InitializeThis<Args> {
    fn initialize_this(&mut self, args: Args) -> bool;
}

/// Places `value` with the global allocator and returns the creator's
/// reference. Out of memory is fatal.
#[inline]
pub fn make<T>(value: T) -> CntPtr<T>
where
    T: UnknownObjectType,
    T::Policy: MakeRefCount,
{
    make_in(value, GlobalAllocator)
}

pub fn make_in<T, A>(value: T, alloc: A) -> CntPtr<T>
where
    T: UnknownObjectType,
    T::Policy: MakeRefCount,
    A: Allocator,
{
    match try_make_in(value, alloc) {
        Ok(object) => object,
        Err(_) => out_of_memory::<T>(),
    }
}

#[inline]
pub fn try_make<T>(value: T) -> Result<CntPtr<T>, MakeError>
where
    T: UnknownObjectType,
    T::Policy: MakeRefCount,
{
    try_make_in(value, GlobalAllocator)
}

/// Places `value` in memory from `alloc`. The allocator is stored with the
/// object and frees it.
pub fn try_make_in<T, A>(value: T, alloc: A) -> Result<CntPtr<T>, MakeError>
where
    T: UnknownObjectType,
    T::Policy: MakeRefCount,
    A: Allocator,
{
    let object = place(value, alloc)?;
    // SAFETY: placement hands over a strong count of 1.
    Ok(unsafe { CntPtr::from_raw(object.as_ptr()) })
}

fn place<T, A>(value: T, alloc: A) -> Result<NonNull<T>, MakeError>
where
    T: UnknownObjectType,
    T::Policy: MakeRefCount,
    A: Allocator,
{
    <T::Policy as MakeRefCount>::place(value, alloc).ok_or_else(|| {
        report_error(file!(), line!(), Status::INSUFFICIENT_RESOURCES);
        MakeError::OutOfMemory
    })
}

#[inline]
pub fn make_init<T, Args>(value: T, args: Args) -> CntPtr<T>
where
    T: UnknownObjectType + InitializeThis<Args>,
    T::Policy: MakeRefCount,
{
    make_init_in(value, GlobalAllocator, args)
}

pub fn make_init_in<T, A, Args>(value: T, alloc: A, args: Args) -> CntPtr<T>
where
    T: UnknownObjectType + InitializeThis<Args>,
    T::Policy: MakeRefCount,
    A: Allocator,
{
    match try_make_init_in(value, alloc, args) {
        Ok(object) => object,
        Err(MakeError::OutOfMemory) => out_of_memory::<T>(),
        Err(MakeError::InitializeFailed) => fatal(
            FailureTag::INITIALIZE_FAILED,
            format_args!("{} refused initialization", core::any::type_name::<T>()),
        ),
    }
}

#[inline]
pub fn try_make_init<T, Args>(value: T, args: Args) -> Result<CntPtr<T>, MakeError>
where
    T: UnknownObjectType + InitializeThis<Args>,
    T::Policy: MakeRefCount,
{
    try_make_init_in(value, GlobalAllocator, args)
}

/// Like [`try_make_in`], then runs [`InitializeThis`]. A refused object is
/// released through its normal path, deleter included.
pub fn try_make_init_in<T, A, Args>(value: T, alloc: A, args: Args) -> Result<CntPtr<T>, MakeError>
where
    T: UnknownObjectType + InitializeThis<Args>,
    T::Policy: MakeRefCount,
    A: Allocator,
{
    let object = place(value, alloc)?;
    // SAFETY: nothing else can see the object yet.
    let initialized = unsafe { (*object.as_ptr()).initialize_this(args) };
    let object = unsafe { CntPtr::from_raw(object.as_ptr()) };
    if initialized {
        Ok(object)
    } else {
        report_error(file!(), line!(), Status::UNSUCCESSFUL);
        drop(object);
        Err(MakeError::InitializeFailed)
    }
}

#[cold]
#[inline(never)]
fn out_of_memory<T>() -> ! {
    fatal(
        FailureTag::OUT_OF_MEMORY,
        format_args!(
            "allocation of {} bytes for {} failed",
            core::mem::size_of::<T>(),
            core::any::type_name::<T>()
        ),
    )
}
