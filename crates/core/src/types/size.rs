//! Garment sizes.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a size label is not one of the known sizes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown size: {0:?}")]
pub struct SizeError(pub String);

/// Garment size as stored in the `talle` column.
///
/// `Unico` is the one-size-fits-all label used by the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Size {
    #[serde(rename = "XS")]
    ExtraSmall,
    #[serde(rename = "S")]
    Small,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "L")]
    Large,
    #[serde(rename = "XL")]
    ExtraLarge,
    #[serde(rename = "XXL")]
    DoubleExtraLarge,
    #[serde(rename = "Unico")]
    OneSize,
}

impl Size {
    /// Every size, in the order the add form offers them.
    pub const ALL: [Self; 7] = [
        Self::ExtraSmall,
        Self::Small,
        Self::Medium,
        Self::Large,
        Self::ExtraLarge,
        Self::DoubleExtraLarge,
        Self::OneSize,
    ];

    /// The label stored in the row store and shown in the grid.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ExtraSmall => "XS",
            Self::Small => "S",
            Self::Medium => "M",
            Self::Large => "L",
            Self::ExtraLarge => "XL",
            Self::DoubleExtraLarge => "XXL",
            Self::OneSize => "Unico",
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Size {
    type Err = SizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|size| size.label() == s)
            .ok_or_else(|| SizeError(s.to_owned()))
    }
}
