// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;
use core::str::FromStr;

#[repr(C)]
#[derive(Clone, Copy, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct GUID {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

pub const IID_IUNKNOWN: GUID = GUID {
    data1: 0x0000_0000,
    data2: 0x0000,
    data3: 0x0000,
    data4: [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
};

/// Identifier of the weak-reference control block facet.
pub const IID_OBJECT_WEAK_REF: GUID = GUID::parse("3063C26C-DB10-4BCC-AF5C-340E4D7AA0F6");

const GUID_TEXT_LEN: usize = 36;
const DASH_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// Why a GUID string was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GuidParseError {
    Length(usize),
    MissingDash(usize),
    InvalidHex(usize),
}

impl fmt::Display for GuidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length(len) => write!(f, "guid text has length {len}, expected {GUID_TEXT_LEN}"),
            Self::MissingDash(pos) => write!(f, "expected '-' at offset {pos}"),
            Self::InvalidHex(pos) => write!(f, "invalid hex digit at offset {pos}"),
        }
    }
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

const fn is_dash_position(pos: usize) -> bool {
    let mut i = 0;
    while i < DASH_POSITIONS.len() {
        if DASH_POSITIONS[i] == pos {
            return true;
        }
        i += 1;
    }
    false
}

/// Strips one pair of surrounding braces, if present.
const fn unbraced(bytes: &[u8]) -> (&[u8], usize) {
    let len = bytes.len();
    if len == GUID_TEXT_LEN + 2 && bytes[0] == b'{' && bytes[len - 1] == b'}' {
        let (_, rest) = bytes.split_at(1);
        let (inner, _) = rest.split_at(GUID_TEXT_LEN);
        (inner, 1)
    } else {
        (bytes, 0)
    }
}

const fn parse_bytes(text: &[u8]) -> Result<GUID, GuidParseError> {
    let (bytes, skew) = unbraced(text);
    if bytes.len() != GUID_TEXT_LEN {
        return Err(GuidParseError::Length(text.len()));
    }

    // 32 nibbles, dashes skipped.
    let mut nibbles = [0u8; 32];
    let mut n = 0;
    let mut pos = 0;
    while pos < GUID_TEXT_LEN {
        let byte = bytes[pos];
        if is_dash_position(pos) {
            if byte != b'-' {
                return Err(GuidParseError::MissingDash(pos + skew));
            }
        } else {
            match hex_value(byte) {
                Some(value) => {
                    nibbles[n] = value;
                    n += 1;
                }
                None => return Err(GuidParseError::InvalidHex(pos + skew)),
            }
        }
        pos += 1;
    }

    let mut data1 = 0u32;
    let mut i = 0;
    while i < 8 {
        data1 = (data1 << 4) | nibbles[i] as u32;
        i += 1;
    }
    let mut data2 = 0u16;
    while i < 12 {
        data2 = (data2 << 4) | nibbles[i] as u16;
        i += 1;
    }
    let mut data3 = 0u16;
    while i < 16 {
        data3 = (data3 << 4) | nibbles[i] as u16;
        i += 1;
    }
    let mut data4 = [0u8; 8];
    let mut j = 0;
    while j < 8 {
        data4[j] = (nibbles[16 + j * 2] << 4) | nibbles[16 + j * 2 + 1];
        j += 1;
    }

    Ok(GUID {
        data1,
        data2,
        data3,
        data4,
    })
}

impl GUID {
    pub const fn from_values(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Parses `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`, optionally wrapped in braces.
    ///
    /// Panics on malformed input. Evaluated in a const context (see [`guid!`]) the
    /// panic is a compile error.
    pub const fn parse(text: &str) -> Self {
        match parse_bytes(text.as_bytes()) {
            Ok(guid) => guid,
            Err(GuidParseError::Length(_)) => panic!("guid literal must be 36 characters"),
            Err(GuidParseError::MissingDash(_)) => panic!("guid literal is missing a '-' separator"),
            Err(GuidParseError::InvalidHex(_)) => panic!("guid literal contains a non-hex digit"),
        }
    }

    #[inline]
    pub const fn try_parse(text: &str) -> Option<Self> {
        match parse_bytes(text.as_bytes()) {
            Ok(guid) => Some(guid),
            Err(_) => None,
        }
    }

    pub const fn const_eq(&self, other: &GUID) -> bool {
        if self.data1 != other.data1 || self.data2 != other.data2 || self.data3 != other.data3 {
            return false;
        }
        let mut i = 0;
        while i < 8 {
            if self.data4[i] != other.data4[i] {
                return false;
            }
            i += 1;
        }
        true
    }
}

impl FromStr for GUID {
    type Err = GuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bytes(s.as_bytes())
    }
}

impl fmt::Display for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-",
            self.data1, self.data2, self.data3, self.data4[0], self.data4[1]
        )?;
        for byte in &self.data4[2..] {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{self}}}")
    }
}

/// Compile-time association of a type with its identifier.
///
/// Implemented for concrete types (downcast targets) and for `dyn Interface`
/// trait objects. A type either has exactly one identifier or none.
pub trait HasGuid {
    const GUID: GUID;
}

#[inline]
pub const fn guid_of<T: HasGuid + ?Sized>() -> GUID {
    T::GUID
}

/// Checks that no identifier appears twice. Returns the first duplicate.
pub fn find_duplicate_guid(guids: &[GUID]) -> Option<GUID> {
    guids
        .iter()
        .enumerate()
        .find(|&(i, guid)| guids[..i].contains(guid))
        .map(|(_, guid)| *guid)
}

/// Crashes if two registered identifiers collide.
pub fn assert_unique_guids(guids: &[GUID]) {
    if let Some(dup) = find_duplicate_guid(guids) {
        crate::fatal::fatal(
            crate::fatal::FailureTag::DUPLICATE_GUID,
            format_args!("identifier {dup} is registered twice"),
        );
    }
}

#[macro_export]
/// Builds a [`GUID`](crate::GUID) from a string literal at compile time.
macro_rules! guid {
    ($text:literal) => {{
        const VALUE: $crate::GUID = $crate::GUID::parse($text);
        VALUE
    }};
}

#[macro_export]
/// Implements [`HasGuid`](crate::HasGuid) for a type or `dyn Trait`.
macro_rules! declare_guid {
    ($ty:ty, $text:literal) => {
        impl $crate::HasGuid for $ty {
            const GUID: $crate::GUID = $crate::guid!($text);
        }
    };
}
