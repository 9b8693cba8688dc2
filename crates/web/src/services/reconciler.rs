//! Stock grid reconciler.
//!
//! Owns the displayed rows and the delete selection, issues row store
//! requests, and reconciles optimistic edits with the store's answer.
//!
//! # Row lifecycle
//!
//! ```text
//! Displayed(confirmed) --edit--> Pending(proposed)
//! Pending --store accepts--> Displayed(proposed)
//! Pending --store rejects--> Displayed(previous)
//! ```
//!
//! Every write re-checks the capability it is handed; a read-only session
//! never reaches the store.

use std::collections::BTreeSet;
use std::sync::Arc;

use secrecy::SecretString;
use serde::Deserialize;
use stockroom_core::{Capability, NewStockRow, ProposedRow, RowRejection, StockRow, StockRowId};
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::store::{RowStore, StoreError};

/// Input problems caught before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Garment, size or quantity is empty or unparseable.
    #[error("Missing fields: garment, size and quantity are all required")]
    MissingFields,
}

/// Errors from reconciler operations.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// The session may not change rows.
    #[error("read-only session")]
    ReadOnly,

    /// Input was rejected locally.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The row store refused or failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The add-row form.
///
/// Fields hold raw input until [`StockReconciler::insert`] parses them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewRowForm {
    #[serde(default)]
    pub garment: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub quantity: String,
}

impl NewRowForm {
    /// Clear every field.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether the size field holds `label`.
    #[must_use]
    pub fn has_size(&self, label: &str) -> bool {
        self.size == label
    }

    fn parse(&self) -> Result<NewStockRow, ValidationError> {
        NewStockRow::from_inputs(&self.garment, &self.size, &self.quantity)
            .map_err(|_| ValidationError::MissingFields)
    }
}

/// An optimistic edit awaiting the store's answer.
#[derive(Debug, Clone)]
pub struct PendingEdit {
    previous: StockRow,
    proposed: ProposedRow,
}

impl PendingEdit {
    /// Start an edit of `previous`.
    #[must_use]
    pub const fn new(previous: StockRow, proposed: ProposedRow) -> Self {
        Self { previous, proposed }
    }

    /// The proposal being sent.
    #[must_use]
    pub const fn proposed(&self) -> &ProposedRow {
        &self.proposed
    }

    /// Whether the proposal changes nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.proposed.same_as(&self.previous)
    }

    /// The store accepted: the proposal becomes the displayed row.
    ///
    /// # Errors
    ///
    /// Returns the previous row with the reason when the accepted proposal
    /// is not a displayable row (text the store coerced, say).
    pub fn confirm(self) -> Result<StockRow, (StockRow, RowRejection)> {
        let previous = self.previous;
        self.proposed
            .into_confirmed()
            .map_err(|rejection| (previous, rejection))
    }

    /// The store refused: the previous row is restored unchanged.
    #[must_use]
    pub fn reject(self) -> StockRow {
        self.previous
    }
}

/// Result of [`StockReconciler::update`].
///
/// Every variant carries the row the grid must display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Read-only session; nothing was sent.
    Blocked(StockRow),
    /// The proposal equals the current row; nothing was sent.
    Unchanged(StockRow),
    /// The store accepted the proposal.
    Confirmed(StockRow),
    /// The store refused; the previous row is restored.
    Reverted {
        /// The row as it was before the edit.
        row: StockRow,
        /// Why the edit did not stick.
        reason: String,
    },
}

impl UpdateOutcome {
    /// The row to display.
    #[must_use]
    pub const fn row(&self) -> &StockRow {
        match self {
            Self::Blocked(row) | Self::Unchanged(row) | Self::Confirmed(row) => row,
            Self::Reverted { row, .. } => row,
        }
    }

    /// Consume the outcome, keeping the row to display.
    #[must_use]
    pub fn into_row(self) -> StockRow {
        match self {
            Self::Blocked(row) | Self::Unchanged(row) | Self::Confirmed(row) => row,
            Self::Reverted { row, .. } => row,
        }
    }
}

/// Result of [`StockReconciler::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Nothing is selected; nothing was sent.
    NothingSelected,
    /// The confirmation prompt was declined; nothing was sent.
    Declined,
    /// The selected rows were deleted.
    Deleted(usize),
}

/// Local row set and selection, kept in step with a [`RowStore`].
pub struct StockReconciler {
    store: Arc<dyn RowStore>,
    access_token: SecretString,
    rows: Vec<StockRow>,
    selection: BTreeSet<StockRowId>,
    last_diagnostic: Option<String>,
}

impl std::fmt::Debug for StockReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockReconciler")
            .field("rows", &self.rows.len())
            .field("selection", &self.selection)
            .field("last_diagnostic", &self.last_diagnostic)
            .finish_non_exhaustive()
    }
}

impl StockReconciler {
    /// Create an empty reconciler acting with `access_token`.
    #[must_use]
    pub fn new(store: Arc<dyn RowStore>, access_token: SecretString) -> Self {
        Self {
            store,
            access_token,
            rows: Vec::new(),
            selection: BTreeSet::new(),
            last_diagnostic: None,
        }
    }

    /// Rows as displayed, newest first.
    #[must_use]
    pub fn rows(&self) -> &[StockRow] {
        &self.rows
    }

    /// Look up a displayed row.
    #[must_use]
    pub fn row(&self, id: StockRowId) -> Option<&StockRow> {
        self.rows.iter().find(|row| row.id == id)
    }

    /// Ids marked for deletion.
    #[must_use]
    pub const fn selection(&self) -> &BTreeSet<StockRowId> {
        &self.selection
    }

    /// The most recent non-fatal problem, if any.
    #[must_use]
    pub fn last_diagnostic(&self) -> Option<&str> {
        self.last_diagnostic.as_deref()
    }

    fn record(&mut self, diagnostic: String) {
        warn!(diagnostic = %diagnostic, "Stock reconciler diagnostic");
        self.last_diagnostic = Some(diagnostic);
    }

    /// Replace the local rows with the store's current contents.
    ///
    /// Malformed rows are dropped one by one. On failure the local rows are
    /// left as they were.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`] when the store cannot be read.
    #[instrument(skip(self))]
    pub async fn load(&mut self) -> Result<(), ReconcileError> {
        let raw = match self.store.select(&self.access_token).await {
            Ok(raw) => raw,
            Err(error) => {
                self.record(format!("Could not load stock: {error}"));
                return Err(error.into());
            }
        };

        let mut rows = Vec::with_capacity(raw.len());
        for value in raw {
            let id = value.get("id").cloned();
            match StockRow::from_value(value) {
                Ok(row) => rows.push(row),
                Err(rejection) => {
                    warn!(id = ?id, error = %rejection, "Dropping malformed stock row");
                }
            }
        }

        self.rows = rows;
        let rows = &self.rows;
        self.selection
            .retain(|id| rows.iter().any(|row| row.id == *id));
        Ok(())
    }

    /// Add a row from the add form.
    ///
    /// On success the rows are reloaded and the form is cleared. A failed
    /// reload is only recorded as a diagnostic. On failure the form keeps its
    /// contents.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::ReadOnly`] for read-only sessions,
    /// [`ValidationError::MissingFields`] before any request when an input
    /// is empty or unparseable, or the store's error.
    #[instrument(skip(self))]
    pub async fn insert(
        &mut self,
        capability: Capability,
        form: &mut NewRowForm,
    ) -> Result<(), ReconcileError> {
        if !capability.is_privileged() {
            return Err(ReconcileError::ReadOnly);
        }

        let row = form.parse()?;
        self.store.insert(&self.access_token, &row).await?;
        info!(garment = %row.garment, size = %row.size, quantity = row.quantity, "Stock row added");

        if let Err(error) = self.load().await {
            self.record(format!("Row added but the list could not be refreshed: {error}"));
        }
        form.reset();
        Ok(())
    }

    /// Apply an edit optimistically and reconcile with the store.
    ///
    /// The returned outcome always carries the row the grid must show: the
    /// proposal when the store accepted it, `previous` otherwise. The local
    /// row set is patched to that row.
    #[instrument(skip(self, previous, proposed), fields(id = %previous.id))]
    pub async fn update(
        &mut self,
        capability: Capability,
        previous: StockRow,
        proposed: ProposedRow,
    ) -> UpdateOutcome {
        if !capability.is_privileged() {
            return UpdateOutcome::Blocked(previous);
        }

        let edit = PendingEdit::new(previous, proposed);
        if edit.is_noop() {
            return UpdateOutcome::Unchanged(edit.reject());
        }

        let outcome = if let Err(rejection) = edit.proposed().check_count() {
            UpdateOutcome::Reverted {
                row: edit.reject(),
                reason: rejection.to_string(),
            }
        } else {
            self.commit(edit).await
        };

        if let UpdateOutcome::Reverted { row, reason } = &outcome {
            self.record(format!("Edit of row {} reverted: {reason}", row.id));
        }

        let shown = outcome.row();
        if let Some(slot) = self.rows.iter_mut().find(|row| row.id == shown.id) {
            slot.clone_from(shown);
        }

        outcome
    }

    /// Send an edit and settle it on the store's answer.
    async fn commit(&self, edit: PendingEdit) -> UpdateOutcome {
        match self.store.update(&self.access_token, edit.proposed()).await {
            Ok(()) => match edit.confirm() {
                Ok(row) => {
                    info!(id = %row.id, "Stock row updated");
                    UpdateOutcome::Confirmed(row)
                }
                Err((row, rejection)) => UpdateOutcome::Reverted {
                    row,
                    reason: rejection.to_string(),
                },
            },
            Err(error) => UpdateOutcome::Reverted {
                row: edit.reject(),
                reason: error.to_string(),
            },
        }
    }

    /// Replace the selection.
    ///
    /// Ids that are not displayed are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::ReadOnly`] for read-only sessions.
    pub fn select(
        &mut self,
        capability: Capability,
        ids: impl IntoIterator<Item = StockRowId>,
    ) -> Result<(), ReconcileError> {
        if !capability.is_privileged() {
            return Err(ReconcileError::ReadOnly);
        }
        self.selection = ids
            .into_iter()
            .filter(|id| self.rows.iter().any(|row| row.id == *id))
            .collect();
        Ok(())
    }

    /// Drop the selection when the session can no longer delete.
    pub fn sync_capability(&mut self, capability: Capability) {
        if !capability.is_privileged() {
            self.selection.clear();
        }
    }

    /// Delete the selected rows after asking `confirm`.
    ///
    /// `confirm` receives the number of selected rows and answers yes or no.
    /// All selected rows go in one request, so either all are deleted or none.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::ReadOnly`] for read-only sessions, or the
    /// store's error (selection and rows unchanged).
    #[instrument(skip(self, confirm))]
    pub async fn delete(
        &mut self,
        capability: Capability,
        confirm: impl FnOnce(usize) -> bool + Send,
    ) -> Result<DeleteOutcome, ReconcileError> {
        if !capability.is_privileged() {
            return Err(ReconcileError::ReadOnly);
        }
        if self.selection.is_empty() {
            return Ok(DeleteOutcome::NothingSelected);
        }
        if !confirm(self.selection.len()) {
            return Ok(DeleteOutcome::Declined);
        }

        let ids: Vec<StockRowId> = self.selection.iter().copied().collect();
        self.store.delete(&self.access_token, &ids).await?;
        info!(count = ids.len(), "Stock rows deleted");

        self.selection.clear();
        if let Err(error) = self.load().await {
            self.record(format!("Rows deleted but the list could not be refreshed: {error}"));
        }
        Ok(DeleteOutcome::Deleted(ids.len()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use stockroom_core::{QuantityInput, Size};

    use super::*;

    /// Records every call; optionally fails a given operation.
    #[derive(Default)]
    struct RecordingStore {
        rows: Mutex<Vec<serde_json::Value>>,
        calls: Mutex<Vec<String>>,
        fail_select: bool,
        fail_update: Option<String>,
        fail_delete: bool,
    }

    impl RecordingStore {
        fn with_rows(rows: Vec<serde_json::Value>) -> Self {
            Self {
                rows: Mutex::new(rows),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RowStore for RecordingStore {
        async fn select(
            &self,
            _access_token: &SecretString,
        ) -> Result<Vec<serde_json::Value>, StoreError> {
            self.calls.lock().unwrap().push("select".to_string());
            if self.fail_select {
                return Err(StoreError::Unavailable("timeout".to_string()));
            }
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn insert(
            &self,
            _access_token: &SecretString,
            row: &NewStockRow,
        ) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push("insert".to_string());
            let mut rows = self.rows.lock().unwrap();
            let next_id = rows
                .iter()
                .filter_map(|r| r["id"].as_i64())
                .max()
                .unwrap_or(0)
                + 1;
            let mut value = serde_json::to_value(row).unwrap();
            value["id"] = json!(next_id);
            rows.insert(0, value);
            Ok(())
        }

        async fn update(
            &self,
            _access_token: &SecretString,
            proposed: &ProposedRow,
        ) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push(format!("update {}", proposed.id));
            match &self.fail_update {
                Some(message) => Err(StoreError::Rejected(message.clone())),
                None => Ok(()),
            }
        }

        async fn delete(
            &self,
            _access_token: &SecretString,
            ids: &[StockRowId],
        ) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push(format!("delete {ids:?}"));
            if self.fail_delete {
                return Err(StoreError::Rejected("permission denied".to_string()));
            }
            self.rows
                .lock()
                .unwrap()
                .retain(|r| !ids.iter().any(|id| r["id"].as_i64() == Some(id.as_i64())));
            Ok(())
        }
    }

    fn two_rows() -> Vec<serde_json::Value> {
        vec![
            json!({"id": 3, "prenda": "Shirt", "talle": "M", "cantidad": 5}),
            json!({"id": 1, "prenda": "Hat", "talle": "Unico", "cantidad": 2}),
        ]
    }

    fn reconciler(store: &Arc<RecordingStore>) -> StockReconciler {
        StockReconciler::new(store.clone(), SecretString::from("token"))
    }

    async fn loaded(store: &Arc<RecordingStore>) -> StockReconciler {
        let mut reconciler = reconciler(store);
        reconciler.load().await.unwrap();
        reconciler
    }

    fn row_three() -> StockRow {
        StockRow {
            id: StockRowId::new(3),
            garment: "Shirt".to_string(),
            size: Size::Medium,
            quantity: 5,
        }
    }

    fn form(garment: &str, size: &str, quantity: &str) -> NewRowForm {
        NewRowForm {
            garment: garment.to_string(),
            size: size.to_string(),
            quantity: quantity.to_string(),
        }
    }

    #[tokio::test]
    async fn test_load_replaces_rows_in_store_order() {
        let store = Arc::new(RecordingStore::with_rows(two_rows()));
        let reconciler = loaded(&store).await;

        let ids: Vec<i64> = reconciler.rows().iter().map(|r| r.id.as_i64()).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_load_drops_malformed_rows() {
        let mut rows = two_rows();
        rows.push(json!({"id": 7, "prenda": "Sock", "talle": "S", "cantidad": -2}));
        rows.push(json!({"id": 8, "prenda": "Coat", "talle": "XXXL", "cantidad": 1}));
        let store = Arc::new(RecordingStore::with_rows(rows));

        let reconciler = loaded(&store).await;

        assert_eq!(reconciler.rows().len(), 2);
        assert!(reconciler.row(StockRowId::new(7)).is_none());
        assert!(reconciler.row(StockRowId::new(8)).is_none());
    }

    #[tokio::test]
    async fn test_failed_load_keeps_prior_rows() {
        let good = Arc::new(RecordingStore::with_rows(two_rows()));
        let mut reconciler = loaded(&good).await;

        reconciler.store = Arc::new(RecordingStore {
            fail_select: true,
            ..RecordingStore::default()
        });
        assert!(reconciler.load().await.is_err());

        assert_eq!(reconciler.rows().len(), 2);
        assert!(reconciler.last_diagnostic().is_some());
    }

    #[tokio::test]
    async fn test_insert_then_reload_and_reset() {
        let store = Arc::new(RecordingStore::with_rows(two_rows()));
        let mut reconciler = loaded(&store).await;
        let mut form = form("Shirt", "M", "5");

        reconciler
            .insert(Capability::Privileged, &mut form)
            .await
            .unwrap();

        assert_eq!(form, NewRowForm::default());
        let newest = &reconciler.rows()[0];
        assert_eq!(newest.id, StockRowId::new(4));
        assert_eq!(newest.garment, "Shirt");
        assert_eq!(newest.size, Size::Medium);
        assert_eq!(newest.quantity, 5);
        assert_eq!(store.calls(), vec!["select", "insert", "select"]);
    }

    #[tokio::test]
    async fn test_insert_with_empty_field_sends_nothing() {
        let store = Arc::new(RecordingStore::default());
        let mut reconciler = reconciler(&store);

        for mut form in [form("", "M", "5"), form("Shirt", "", "5"), form("Shirt", "M", "")] {
            let before = form.clone();
            let err = reconciler
                .insert(Capability::Privileged, &mut form)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ReconcileError::Validation(ValidationError::MissingFields)
            ));
            assert_eq!(form, before);
        }
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_insert_read_only_is_blocked() {
        let store = Arc::new(RecordingStore::default());
        let mut reconciler = reconciler(&store);
        let mut form = form("Shirt", "M", "5");

        let err = reconciler
            .insert(Capability::ReadOnly, &mut form)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::ReadOnly));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_insert_reload_failure_is_only_a_diagnostic() {
        let store = Arc::new(RecordingStore {
            fail_select: true,
            ..RecordingStore::default()
        });
        let mut reconciler = reconciler(&store);
        let mut form = form("Shirt", "M", "5");

        reconciler
            .insert(Capability::Privileged, &mut form)
            .await
            .unwrap();

        assert_eq!(form, NewRowForm::default());
        assert!(
            reconciler
                .last_diagnostic()
                .unwrap()
                .contains("could not be refreshed")
        );
    }

    #[tokio::test]
    async fn test_update_unchanged_sends_nothing() {
        let store = Arc::new(RecordingStore::with_rows(two_rows()));
        let mut reconciler = loaded(&store).await;

        let outcome = reconciler
            .update(
                Capability::Privileged,
                row_three(),
                ProposedRow::from(&row_three()),
            )
            .await;

        assert_eq!(outcome, UpdateOutcome::Unchanged(row_three()));
        assert_eq!(store.calls(), vec!["select"]);
    }

    #[tokio::test]
    async fn test_update_read_only_returns_previous() {
        let store = Arc::new(RecordingStore::with_rows(two_rows()));
        let mut reconciler = loaded(&store).await;
        let mut proposed = ProposedRow::from(&row_three());
        proposed.quantity = QuantityInput::Count(50);

        let outcome = reconciler
            .update(Capability::ReadOnly, row_three(), proposed)
            .await;

        assert_eq!(outcome, UpdateOutcome::Blocked(row_three()));
        assert_eq!(store.calls(), vec!["select"]);
    }

    #[tokio::test]
    async fn test_update_confirmed_shows_proposal() {
        let store = Arc::new(RecordingStore::with_rows(two_rows()));
        let mut reconciler = loaded(&store).await;
        let mut proposed = ProposedRow::from(&row_three());
        proposed.quantity = QuantityInput::Count(9);

        let outcome = reconciler
            .update(Capability::Privileged, row_three(), proposed)
            .await;

        assert!(matches!(outcome, UpdateOutcome::Confirmed(_)));
        assert_eq!(outcome.row().quantity, 9);
        assert_eq!(reconciler.row(StockRowId::new(3)).unwrap().quantity, 9);
        assert_eq!(store.calls(), vec!["select", "update 3"]);
    }

    #[tokio::test]
    async fn test_update_rejected_reverts_to_previous() {
        let store = Arc::new(RecordingStore {
            rows: Mutex::new(two_rows()),
            fail_update: Some("invalid input syntax for type integer: \"abc\"".to_string()),
            ..RecordingStore::default()
        });
        let mut reconciler = loaded(&store).await;
        let mut proposed = ProposedRow::from(&row_three());
        proposed.quantity = QuantityInput::from_cell("abc");

        let outcome = reconciler
            .update(Capability::Privileged, row_three(), proposed)
            .await;

        let UpdateOutcome::Reverted { row, reason } = outcome else {
            panic!("expected a revert");
        };
        assert_eq!(row, row_three());
        assert!(reason.contains("abc"));
        assert_eq!(reconciler.row(StockRowId::new(3)), Some(&row_three()));
    }

    #[tokio::test]
    async fn test_update_negative_count_reverts_without_sending() {
        let store = Arc::new(RecordingStore::with_rows(two_rows()));
        let mut reconciler = loaded(&store).await;
        let mut proposed = ProposedRow::from(&row_three());
        proposed.quantity = QuantityInput::from_cell("-1");

        let outcome = reconciler
            .update(Capability::Privileged, row_three(), proposed)
            .await;

        let UpdateOutcome::Reverted { row, reason } = outcome else {
            panic!("expected a revert");
        };
        assert_eq!(row, row_three());
        assert!(reason.contains("-1"));
        assert_eq!(store.calls(), vec!["select"]);
        assert_eq!(reconciler.row(StockRowId::new(3)), Some(&row_three()));
    }

    #[test]
    fn test_pending_edit_transitions() {
        let mut proposed = ProposedRow::from(&row_three());
        proposed.garment = "Tee".to_string();

        let edit = PendingEdit::new(row_three(), proposed);
        assert!(!edit.is_noop());
        assert_eq!(edit.clone().confirm().unwrap().garment, "Tee");
        assert_eq!(edit.reject(), row_three());
    }

    #[tokio::test]
    async fn test_delete_empty_selection_sends_nothing() {
        let store = Arc::new(RecordingStore::with_rows(two_rows()));
        let mut reconciler = loaded(&store).await;

        let outcome = reconciler
            .delete(Capability::Privileged, |_| true)
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::NothingSelected);
        assert_eq!(store.calls(), vec!["select"]);
    }

    #[tokio::test]
    async fn test_delete_declined_keeps_selection() {
        let store = Arc::new(RecordingStore::with_rows(two_rows()));
        let mut reconciler = loaded(&store).await;
        reconciler
            .select(Capability::Privileged, [StockRowId::new(3), StockRowId::new(1)])
            .unwrap();

        let outcome = reconciler
            .delete(Capability::Privileged, |count| {
                assert_eq!(count, 2);
                false
            })
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Declined);
        assert_eq!(reconciler.selection().len(), 2);
        assert_eq!(store.calls(), vec!["select"]);
    }

    #[tokio::test]
    async fn test_delete_confirmed_reloads_and_clears_selection() {
        let store = Arc::new(RecordingStore::with_rows(two_rows()));
        let mut reconciler = loaded(&store).await;
        reconciler
            .select(Capability::Privileged, [StockRowId::new(3)])
            .unwrap();

        let outcome = reconciler
            .delete(Capability::Privileged, |_| true)
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted(1));
        assert!(reconciler.selection().is_empty());
        assert_eq!(reconciler.rows().len(), 1);
        assert_eq!(
            store.calls(),
            vec!["select", "delete [StockRowId(3)]", "select"]
        );
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_everything() {
        let store = Arc::new(RecordingStore {
            rows: Mutex::new(two_rows()),
            fail_delete: true,
            ..RecordingStore::default()
        });
        let mut reconciler = loaded(&store).await;
        reconciler
            .select(Capability::Privileged, [StockRowId::new(3), StockRowId::new(1)])
            .unwrap();

        let err = reconciler
            .delete(Capability::Privileged, |_| true)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "permission denied");
        assert_eq!(reconciler.selection().len(), 2);
        assert_eq!(reconciler.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_read_only_is_blocked() {
        let store = Arc::new(RecordingStore::with_rows(two_rows()));
        let mut reconciler = loaded(&store).await;

        let err = reconciler
            .delete(Capability::ReadOnly, |_| true)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::ReadOnly));
    }

    #[tokio::test]
    async fn test_select_ignores_unknown_ids_and_read_only() {
        let store = Arc::new(RecordingStore::with_rows(two_rows()));
        let mut reconciler = loaded(&store).await;

        reconciler
            .select(Capability::Privileged, [StockRowId::new(3), StockRowId::new(99)])
            .unwrap();
        assert_eq!(
            reconciler.selection().iter().copied().collect::<Vec<_>>(),
            vec![StockRowId::new(3)]
        );

        assert!(
            reconciler
                .select(Capability::ReadOnly, [StockRowId::new(1)])
                .is_err()
        );
        reconciler.sync_capability(Capability::ReadOnly);
        assert!(reconciler.selection().is_empty());
    }
}
