use std::fmt;

/// An interpreter version as a `(major, minor)` pair.
///
/// Every encoding difference in the decoder and recognizer is gated on one
/// of the comparators below; micro versions never change the bytecode
/// format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const V2_7: Self = Self::new(2, 7);
    pub const V3_6: Self = Self::new(3, 6);
    pub const V3_8: Self = Self::new(3, 8);
    pub const V3_9: Self = Self::new(3, 9);
    pub const V3_10: Self = Self::new(3, 10);
    pub const V3_11: Self = Self::new(3, 11);
    pub const V3_12: Self = Self::new(3, 12);
    pub const V3_13: Self = Self::new(3, 13);
    pub const V3_14: Self = Self::new(3, 14);

    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    #[must_use]
    pub const fn gte(self, major: u8, minor: u8) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }

    #[must_use]
    pub const fn lt(self, major: u8, minor: u8) -> bool {
        !self.gte(major, minor)
    }

    #[must_use]
    pub const fn is_py2(self) -> bool {
        self.major == 2
    }

    /// 3.6 switched from variable-length to word-coded instructions.
    #[must_use]
    pub const fn word_coded(self) -> bool {
        self.gte(3, 6)
    }

    /// 3.10 changed jump arguments from byte offsets to word offsets.
    #[must_use]
    pub const fn word_scaled_jumps(self) -> bool {
        self.gte(3, 10)
    }

    /// 3.11 replaced block-stack opcodes with the exception table.
    #[must_use]
    pub const fn has_exception_table(self) -> bool {
        self.gte(3, 11)
    }

    /// 3.11 started interleaving inline cache entries with instructions.
    #[must_use]
    pub const fn has_inline_caches(self) -> bool {
        self.gte(3, 11)
    }

    /// Number of bits one `EXTENDED_ARG` contributes.
    #[must_use]
    pub const fn extended_arg_shift(self) -> u32 {
        if self.word_coded() { 8 } else { 16 }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
