//! Stock rows and the shapes they take on their way to and from the row store.
//!
//! Wire names follow the backing table: `prenda` (garment), `talle` (size)
//! and `cantidad` (quantity).

use serde::{Deserialize, Serialize};

use super::id::StockRowId;
use super::size::{Size, SizeError};

/// Why a row (stored or proposed) cannot be used.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    /// One or more of garment, size, quantity was empty or unparseable.
    #[error("missing fields")]
    MissingFields,
    /// Quantity is not a non-negative integer.
    #[error("quantity must be a non-negative integer, got {0}")]
    Quantity(String),
    /// Size label is not one of the known sizes.
    #[error(transparent)]
    Size(#[from] SizeError),
    /// The stored row does not have the expected shape.
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// A confirmed stock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRow {
    /// Server-assigned, immutable.
    pub id: StockRowId,
    #[serde(rename = "prenda")]
    pub garment: String,
    #[serde(rename = "talle")]
    pub size: Size,
    #[serde(rename = "cantidad")]
    pub quantity: u32,
}

impl StockRow {
    /// Validate a raw row as returned by the row store.
    ///
    /// # Errors
    ///
    /// Returns [`RowRejection`] when the quantity is not a non-negative
    /// integer, the size is unknown, or the row is otherwise malformed.
    pub fn from_value(value: serde_json::Value) -> Result<Self, RowRejection> {
        if let Some(raw) = value.get("cantidad")
            && !raw.as_u64().is_some_and(|n| u32::try_from(n).is_ok())
        {
            return Err(RowRejection::Quantity(raw.to_string()));
        }
        if let Some(raw) = value.get("talle").and_then(serde_json::Value::as_str) {
            raw.parse::<Size>()?;
        }
        serde_json::from_value(value).map_err(|e| RowRejection::Malformed(e.to_string()))
    }
}

/// Payload for a new row. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewStockRow {
    #[serde(rename = "prenda")]
    pub garment: String,
    #[serde(rename = "talle")]
    pub size: Size,
    #[serde(rename = "cantidad")]
    pub quantity: u32,
}

impl NewStockRow {
    /// Build a row from the three add-form inputs.
    ///
    /// Quantity is parsed as an integer here, before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`RowRejection::MissingFields`] when any input is empty or
    /// the size/quantity cannot be parsed.
    pub fn from_inputs(garment: &str, size: &str, quantity: &str) -> Result<Self, RowRejection> {
        let garment = garment.trim();
        if garment.is_empty() || size.is_empty() || quantity.trim().is_empty() {
            return Err(RowRejection::MissingFields);
        }
        let size = size.parse::<Size>().map_err(|_| RowRejection::MissingFields)?;
        let quantity = quantity
            .trim()
            .parse::<u32>()
            .map_err(|_| RowRejection::MissingFields)?;

        Ok(Self {
            garment: garment.to_owned(),
            size,
            quantity,
        })
    }
}

/// Quantity as typed into the grid.
///
/// Numeric input is sent as a number; anything else is sent verbatim and left
/// for the store to reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuantityInput {
    Count(i64),
    Text(String),
}

impl QuantityInput {
    /// Interpret a grid cell.
    #[must_use]
    pub fn from_cell(cell: &str) -> Self {
        cell.trim()
            .parse::<i64>()
            .map_or_else(|_| Self::Text(cell.to_owned()), Self::Count)
    }
}

impl From<u32> for QuantityInput {
    fn from(quantity: u32) -> Self {
        Self::Count(i64::from(quantity))
    }
}

impl core::fmt::Display for QuantityInput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A row as edited in the grid, not yet confirmed by the store.
///
/// Serializes to the update body; the id travels in the filter, never in the
/// body, so it cannot be changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposedRow {
    #[serde(skip_serializing)]
    pub id: StockRowId,
    #[serde(rename = "prenda")]
    pub garment: String,
    #[serde(rename = "talle")]
    pub size: Size,
    #[serde(rename = "cantidad")]
    pub quantity: QuantityInput,
}

impl ProposedRow {
    /// Whether this proposal is structurally identical to `row`.
    #[must_use]
    pub fn same_as(&self, row: &StockRow) -> bool {
        self.id == row.id
            && self.garment == row.garment
            && self.size == row.size
            && self.quantity == QuantityInput::from(row.quantity)
    }

    /// Refuse a numeric quantity the column cannot hold.
    ///
    /// Text is left for the store to judge.
    ///
    /// # Errors
    ///
    /// Returns [`RowRejection::Quantity`] for a negative or oversized count.
    pub fn check_count(&self) -> Result<(), RowRejection> {
        match self.quantity {
            QuantityInput::Count(n) if u32::try_from(n).is_err() => {
                Err(RowRejection::Quantity(n.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Convert into a confirmed row.
    ///
    /// # Errors
    ///
    /// Returns [`RowRejection::Quantity`] when the quantity is not a
    /// non-negative integer that fits the column.
    pub fn into_confirmed(self) -> Result<StockRow, RowRejection> {
        let quantity = match &self.quantity {
            QuantityInput::Count(n) => {
                u32::try_from(*n).map_err(|_| RowRejection::Quantity(n.to_string()))?
            }
            QuantityInput::Text(s) => return Err(RowRejection::Quantity(s.clone())),
        };
        Ok(StockRow {
            id: self.id,
            garment: self.garment,
            size: self.size,
            quantity,
        })
    }
}

impl From<&StockRow> for ProposedRow {
    fn from(row: &StockRow) -> Self {
        Self {
            id: row.id,
            garment: row.garment.clone(),
            size: row.size,
            quantity: row.quantity.into(),
        }
    }
}
