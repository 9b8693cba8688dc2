//! Types stored in the server-side session.

use std::collections::BTreeSet;

use stockroom_core::StockRowId;

/// Rows marked for deletion, as kept between requests.
pub type StoredSelection = BTreeSet<StockRowId>;

/// Session keys for authentication and grid state.
pub mod keys {
    /// Key for the signed-in [`crate::services::AuthSession`].
    pub const AUTH_SESSION: &str = "auth_session";

    /// Key for the delete selection.
    pub const SELECTION: &str = "stock_selection";

    /// Key for the one-shot message shown on the next page.
    pub const FLASH: &str = "flash";
}
