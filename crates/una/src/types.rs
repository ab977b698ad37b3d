//! Scalar type descriptors
//!
//! A `UnaType` describes one machine value as the C side sees it: its width,
//! whether it lives in the floating-point register file, and how a raw
//! 64-bit container holding it is brought back to canonical form.
//!
//! Every value crossing the call boundary travels in a `u64` "slot". Callers
//! may leave garbage above the declared width; `sign_extend` is the single
//! place where that is cleaned up, both for arguments and return values.

use std::fmt;

/// Descriptor for a primitive C type.
///
/// The set is closed: one variant per primitive width/signedness. Pointer
/// types are not listed here; they resolve to `I32`/`U32` or `I64`/`U64`
/// depending on process bitness (see [`crate::sig::SysTypeInfo`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaType {
    /// `int8_t`
    I8,
    /// `uint8_t`
    U8,
    /// `int16_t`
    I16,
    /// `uint16_t`
    U16,
    /// `int32_t`
    I32,
    /// `uint32_t`
    U32,
    /// `int64_t`
    I64,
    /// `uint64_t`
    U64,
    /// `float`
    F32,
    /// `double`
    F64,
}

impl UnaType {
    /// All descriptors, in signature-letter order.
    pub const ALL: [UnaType; 10] = [
        UnaType::I8,
        UnaType::U8,
        UnaType::I16,
        UnaType::U16,
        UnaType::I32,
        UnaType::U32,
        UnaType::I64,
        UnaType::U64,
        UnaType::F32,
        UnaType::F64,
    ];

    /// Width of the value in bytes (1, 2, 4 or 8).
    #[inline]
    pub const fn width_bytes(self) -> u32 {
        match self {
            UnaType::I8 | UnaType::U8 => 1,
            UnaType::I16 | UnaType::U16 => 2,
            UnaType::I32 | UnaType::U32 | UnaType::F32 => 4,
            UnaType::I64 | UnaType::U64 | UnaType::F64 => 8,
        }
    }

    /// Whether the value is classified into the floating-point register file.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, UnaType::F32 | UnaType::F64)
    }

    /// Whether the value sign-extends. Floating-point types never do.
    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            UnaType::I8 | UnaType::I16 | UnaType::I32 | UnaType::I64
        )
    }

    /// Mask covering exactly `width_bytes * 8` bits.
    #[inline]
    pub const fn mask(self) -> u64 {
        match self.width_bytes() {
            8 => u64::MAX,
            b => !(u64::MAX << (b * 8)),
        }
    }

    /// The most significant bit of the declared width.
    #[inline]
    pub const fn sign_bit(self) -> u64 {
        1u64 << (self.width_bytes() * 8 - 1)
    }

    /// Signature letter used by the signature mini-language.
    #[inline]
    pub const fn proto_char(self) -> char {
        match self {
            UnaType::I8 => 'b',
            UnaType::U8 => 'B',
            UnaType::I16 => 's',
            UnaType::U16 => 'S',
            UnaType::I32 => 'i',
            UnaType::U32 => 'I',
            UnaType::I64 => 'l',
            UnaType::U64 => 'L',
            UnaType::F32 => 'f',
            UnaType::F64 => 'd',
        }
    }

    /// Brings a raw 64-bit container back to canonical form.
    ///
    /// Narrow types are masked to their width; signed integers with the sign
    /// bit set get every higher bit filled in. 8-byte types are untouched.
    #[inline]
    pub const fn sign_extend(self, raw: u64) -> u64 {
        if self.width_bytes() == 8 {
            return raw;
        }
        let v = raw & self.mask();
        if self.is_signed() && (v & self.sign_bit()) != 0 {
            v | !self.mask()
        } else {
            v
        }
    }
}

impl fmt::Display for UnaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnaType::I8 => "i8",
            UnaType::U8 => "u8",
            UnaType::I16 => "i16",
            UnaType::U16 => "u16",
            UnaType::I32 => "i32",
            UnaType::U32 => "u32",
            UnaType::I64 => "i64",
            UnaType::U64 => "u64",
            UnaType::F32 => "f32",
            UnaType::F64 => "f64",
        };
        f.pad(name)
    }
}
