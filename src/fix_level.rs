use std::fmt;

use crate::uri::Uri;

/// QR code error correction level.
///
/// The numeric values follow the usual L/M/Q/H ordering of barcode renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixLevel(pub u8);

impl FixLevel {
    /// Recovers 7% of the data.
    pub const LOW: FixLevel = FixLevel(0);
    /// Recovers 15% of the data.
    pub const MEDIUM: FixLevel = FixLevel(1);
    /// Recovers 25% of the data.
    pub const QUARTILE: FixLevel = FixLevel(2);
    /// Recovers 30% of the data.
    pub const HIGH: FixLevel = FixLevel(3);
    pub const DEFAULT: FixLevel = FixLevel::MEDIUM;

    pub fn is_valid(self) -> bool {
        self.percent().is_some()
    }

    /// Share of the symbol that can be restored, in percent.
    pub fn percent(self) -> Option<u8> {
        match self {
            Self::LOW => Some(7),
            Self::MEDIUM => Some(15),
            Self::QUARTILE => Some(25),
            Self::HIGH => Some(30),
            _ => None,
        }
    }
}

impl Default for FixLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for FixLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a QR renderer needs to draw a key: its URI and the error correction level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCode {
    pub uri: Uri,
    pub level: FixLevel,
}
