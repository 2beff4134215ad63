//! Accessors over raw register words.
//!
//! Each wrapper holds the 32-bit value exactly as read from hardware; the packed
//! form never leaves this module's callers, which consume named fields.

/// `INT_INFO` word of an error-report sub-bank.
///
/// * `[15:0]`: transaction id (AxID)
/// * `[26]`: error valid
/// * `[27]`: error occurred (overflow, more than one error latched)
/// * `[31:28]`: error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntInfo(pub u32);

impl IntInfo {
    /// Transaction id.
    #[inline]
    pub const fn axid(self) -> u32 {
        self.0 & 0xFFFF
    }

    /// Error-valid bit.
    #[inline]
    pub const fn err_valid(self) -> bool {
        self.0 & (1 << 26) != 0
    }

    /// Error-occurred bit; set when further errors arrived while one was latched.
    #[inline]
    pub const fn err_occurred(self) -> bool {
        self.0 & (1 << 27) != 0
    }

    /// Raw error-code nibble.
    #[inline]
    pub const fn code(self) -> u32 {
        self.0 >> 28
    }
}

/// `EXT_INFO_1` word.
///
/// * `[15:0]`: target address bits `[47:32]`
/// * `[19:16]`: burst length (AxLEN)
/// * `[30:28]`: beat size (AxSIZE)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtInfo1(pub u32);

impl ExtInfo1 {
    /// Upper address bits, already in position `[47:32]`.
    #[inline]
    pub const fn addr_hi(self) -> u64 {
        ((self.0 & 0xFFFF) as u64) << 32
    }

    /// AxLEN.
    #[inline]
    pub const fn len(self) -> u8 {
        ((self.0 >> 16) & 0xF) as u8
    }

    /// AxSIZE.
    #[inline]
    pub const fn size(self) -> u8 {
        ((self.0 >> 28) & 0x7) as u8
    }
}

/// `EXT_INFO_2` word.
///
/// * `[1:0]`: burst type (AxBURST)
/// * `[4:2]`: protection (AxPROT)
/// * `[31:16]`: user bits on info2-tagged groups; `[18:16]` on peripheral groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtInfo2(pub u32);

impl ExtInfo2 {
    /// AxBURST.
    #[inline]
    pub const fn burst(self) -> u8 {
        (self.0 & 0x3) as u8
    }

    /// AxPROT.
    #[inline]
    pub const fn prot(self) -> u8 {
        ((self.0 >> 2) & 0x7) as u8
    }

    /// Full 16-bit user field.
    #[inline]
    pub const fn user(self) -> u32 {
        self.0 >> 16
    }

    /// Narrow user field carried on peripheral paths.
    #[inline]
    pub const fn user_peri(self) -> u32 {
        (self.0 >> 16) & 0x7
    }
}

/// Protocol-checker interrupt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrtChkInt(pub u32);

impl PrtChkInt {
    /// A violation was latched.
    #[inline]
    pub const fn occurred(self) -> bool {
        self.0 & 0x1 != 0
    }

    /// Further violations were dropped while one was latched.
    #[inline]
    pub const fn dropped(self) -> bool {
        self.0 & 0x2 != 0
    }
}

/// Timeout ring-buffer payload 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TmoutPayload0(pub u32);

impl TmoutPayload0 {
    /// Entry holds an outstanding transaction.
    #[inline]
    pub const fn valid(self) -> bool {
        self.0 & 0x1 != 0
    }

    /// Timeout counter at freeze time.
    #[inline]
    pub const fn timeout(self) -> u32 {
        (self.0 >> 16) & 0xF
    }
}
