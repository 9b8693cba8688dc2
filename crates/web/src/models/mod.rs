//! Session-stored types and view models.

pub mod session;
pub mod view;

pub use session::keys as session_keys;
pub use view::{Flash, FlashKind, StockRowView, size_labels};
