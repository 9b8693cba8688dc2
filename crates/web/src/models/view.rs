//! View models for templates.

use serde::{Deserialize, Serialize};
use stockroom_core::{Size, StockRow, StockRowId};

/// Kind of one-shot message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    Notice,
    Error,
}

/// A message carried across a redirect and shown once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    #[must_use]
    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Notice,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    /// Whether this is an error message.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == FlashKind::Error
    }
}

/// A stock row as rendered in the grid.
#[derive(Debug, Clone)]
pub struct StockRowView {
    pub id: StockRowId,
    pub garment: String,
    pub size: &'static str,
    pub quantity: u32,
    /// Marked for deletion.
    pub selected: bool,
    /// Why the last edit of this row was reverted.
    pub error: Option<String>,
}

impl StockRowView {
    #[must_use]
    pub fn new(row: &StockRow, selected: bool) -> Self {
        Self {
            id: row.id,
            garment: row.garment.clone(),
            size: row.size.label(),
            quantity: row.quantity,
            selected,
            error: None,
        }
    }

    /// Whether the row has the given size label.
    #[must_use]
    pub fn size_is(&self, label: &str) -> bool {
        self.size == label
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Size labels in the order the forms offer them.
#[must_use]
pub fn size_labels() -> Vec<&'static str> {
    Size::ALL.into_iter().map(Size::label).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_view_copies_row() {
        let row = StockRow {
            id: StockRowId::new(7),
            garment: "Hoodie".to_string(),
            size: Size::ExtraLarge,
            quantity: 3,
        };
        let view = StockRowView::new(&row, true).with_error("refused");
        assert_eq!(view.size, "XL");
        assert!(view.size_is("XL"));
        assert!(!view.size_is("xl"));
        assert!(view.selected);
        assert_eq!(view.error.as_deref(), Some("refused"));
    }

    #[test]
    fn test_size_labels_in_form_order() {
        assert_eq!(
            size_labels(),
            vec!["XS", "S", "M", "L", "XL", "XXL", "Unico"]
        );
    }

    #[test]
    fn test_flash_kinds() {
        assert!(Flash::error("x").is_error());
        assert!(!Flash::notice("x").is_error());
    }
}
