// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

pub type NTSTATUS = i32;

pub const STATUS_SUCCESS: NTSTATUS = 0;
pub const STATUS_UNSUCCESSFUL: NTSTATUS = 0xC000_0001u32 as i32;
pub const STATUS_INVALID_PARAMETER: NTSTATUS = 0xC000_000Du32 as i32;
pub const STATUS_NOINTERFACE: NTSTATUS = 0xC000_02B9u32 as i32;
pub const STATUS_INSUFFICIENT_RESOURCES: NTSTATUS = 0xC000_009Au32 as i32;

#[repr(transparent)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Status(pub NTSTATUS);

impl Status {
    pub const SUCCESS: Status = Status(STATUS_SUCCESS);
    /// Generic failure; what a no-query object answers to every query.
    pub const UNSUCCESSFUL: Status = Status(STATUS_UNSUCCESSFUL);
    pub const INVALID_PARAMETER: Status = Status(STATUS_INVALID_PARAMETER);
    pub const NOINTERFACE: Status = Status(STATUS_NOINTERFACE);
    pub const INSUFFICIENT_RESOURCES: Status = Status(STATUS_INSUFFICIENT_RESOURCES);

    #[inline]
    pub const fn from_raw(raw: NTSTATUS) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> NTSTATUS {
        self.0
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub const fn is_error(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn to_result(self) -> StatusResult {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<NTSTATUS> for Status {
    #[inline]
    fn from(value: NTSTATUS) -> Self {
        Status(value)
    }
}

impl From<Status> for NTSTATUS {
    #[inline]
    fn from(value: Status) -> Self {
        value.0
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "status {:#010x}", self.0)
    }
}

pub type StatusResult<T = ()> = Result<T, Status>;
