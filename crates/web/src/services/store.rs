//! Row store seam.
//!
//! [`RowStore`] is the CRUD surface the reconciler drives. Every call carries
//! the signed-in user's access token; the store decides what that user may
//! touch. The production implementation is
//! [`crate::supabase::SupabaseClient`].

use async_trait::async_trait;
use secrecy::SecretString;
use stockroom_core::{NewStockRow, ProposedRow, StockRowId};
use thiserror::Error;

/// Errors reported by a row store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store refused the request. Carries the store's message.
    #[error("{0}")]
    Rejected(String),

    /// The store could not be reached.
    #[error("row store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something we could not interpret.
    #[error("unexpected row store response: {0}")]
    InvalidResponse(String),
}

/// CRUD operations over stock rows.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// All rows, ordered by id descending, as raw JSON objects.
    ///
    /// Rows are returned unvalidated so a single malformed row does not hide
    /// the rest of the table.
    async fn select(&self, access_token: &SecretString)
    -> Result<Vec<serde_json::Value>, StoreError>;

    /// Insert one row. The store assigns the id.
    async fn insert(&self, access_token: &SecretString, row: &NewStockRow)
    -> Result<(), StoreError>;

    /// Update the row identified by `proposed.id`.
    async fn update(
        &self,
        access_token: &SecretString,
        proposed: &ProposedRow,
    ) -> Result<(), StoreError>;

    /// Delete every row in `ids` in a single request.
    async fn delete(&self, access_token: &SecretString, ids: &[StockRowId])
    -> Result<(), StoreError>;
}
