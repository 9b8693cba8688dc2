//! Stock grid route handlers.
//!
//! Every request mounts its own [`StockReconciler`], loads the rows and
//! restores the delete selection from the tower session. Writes are gated on
//! the capability of the signed-in identity.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use stockroom_core::{ProposedRow, QuantityInput, Size, StockRow, StockRowId};
use tower_sessions::Session;
use tracing::{instrument, warn};

use super::{set_flash, take_flash};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireSession;
use crate::models::session::StoredSelection;
use crate::models::{Flash, StockRowView, session_keys, size_labels};
use crate::services::{
    DeleteOutcome, NewRowForm, ReconcileError, SessionError, StockReconciler, UpdateOutcome,
};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Inline edit of one row. Fields hold the raw cell contents.
#[derive(Debug, Deserialize)]
pub struct EditRowForm {
    #[serde(default)]
    pub garment: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub quantity: String,
}

/// Delete form: no answer yet, or the answer to the confirmation prompt.
#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    pub confirm: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Stock grid page template.
#[derive(Template, WebTemplate)]
#[template(path = "stock/index.html")]
pub struct StockTemplate {
    pub email: String,
    pub mode_label: &'static str,
    pub privileged: bool,
    pub rows: Vec<StockRowView>,
    pub sizes: Vec<&'static str>,
    pub form: NewRowForm,
    pub flash: Option<Flash>,
}

/// A single grid row (HTMX fragment).
#[derive(Template, WebTemplate)]
#[template(path = "stock/_row.html")]
pub struct RowTemplate {
    pub row: StockRowView,
    pub privileged: bool,
    pub sizes: Vec<&'static str>,
}

/// Delete confirmation prompt.
#[derive(Template, WebTemplate)]
#[template(path = "stock/confirm_delete.html")]
pub struct ConfirmDeleteTemplate {
    pub email: String,
    pub mode_label: &'static str,
    pub privileged: bool,
    pub rows: Vec<StockRowView>,
}

// =============================================================================
// Helpers
// =============================================================================

fn reconciler_for(state: &AppState, current: &RequireSession) -> Result<StockReconciler, AppError> {
    let session = current.manager.session().ok_or(SessionError::NotSignedIn)?;
    Ok(StockReconciler::new(state.store(), session.access_token))
}

/// Restore the stored selection. Call after `load` so stale ids drop out.
async fn restore_selection(
    reconciler: &mut StockReconciler,
    current: &RequireSession,
) -> Result<(), AppError> {
    if current.capability.is_privileged() {
        let stored: StoredSelection = current
            .session
            .get(session_keys::SELECTION)
            .await?
            .unwrap_or_default();
        reconciler.select(current.capability, stored)?;
    } else {
        reconciler.sync_capability(current.capability);
        current
            .session
            .remove::<StoredSelection>(session_keys::SELECTION)
            .await?;
    }
    Ok(())
}

async fn save_selection(session: &Session, reconciler: &StockReconciler) -> Result<(), AppError> {
    session
        .insert(session_keys::SELECTION, reconciler.selection())
        .await?;
    Ok(())
}

fn grid(
    current: &RequireSession,
    reconciler: &StockReconciler,
    form: NewRowForm,
    flash: Option<Flash>,
) -> StockTemplate {
    let selection = reconciler.selection();
    StockTemplate {
        email: current.identity.email.to_string(),
        mode_label: current.capability.label(),
        privileged: current.capability.is_privileged(),
        rows: reconciler
            .rows()
            .iter()
            .map(|row| StockRowView::new(row, selection.contains(&row.id)))
            .collect(),
        sizes: size_labels(),
        form,
        flash,
    }
}

fn row_fragment(current: &RequireSession, row: StockRowView) -> RowTemplate {
    RowTemplate {
        row,
        privileged: current.capability.is_privileged(),
        sizes: size_labels(),
    }
}

fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key("HX-Request")
}

// =============================================================================
// Grid
// =============================================================================

/// Display the stock grid.
///
/// A failed load still renders the page, with the error shown.
#[instrument(skip_all, fields(account_id = %current.identity.account_id))]
pub async fn index(
    State(state): State<AppState>,
    current: RequireSession,
) -> Result<Response, AppError> {
    let mut reconciler = reconciler_for(&state, &current)?;
    let mut flash = take_flash(&current.session).await;

    if let Err(error) = reconciler.load().await {
        flash = Some(Flash::error(format!("Could not load stock: {error}")));
    }
    restore_selection(&mut reconciler, &current).await?;

    Ok(grid(&current, &reconciler, NewRowForm::default(), flash).into_response())
}

/// Add a row from the add form.
///
/// Success redirects back to the grid with an empty form. A rejected row
/// re-renders the grid with the form contents kept.
#[instrument(skip_all, fields(account_id = %current.identity.account_id))]
pub async fn create(
    State(state): State<AppState>,
    current: RequireSession,
    Form(mut form): Form<NewRowForm>,
) -> Result<Response, AppError> {
    let mut reconciler = reconciler_for(&state, &current)?;

    match reconciler.insert(current.capability, &mut form).await {
        Ok(()) => {
            let flash = reconciler
                .last_diagnostic()
                .map_or_else(|| Flash::notice("Row added"), Flash::error);
            set_flash(&current.session, flash).await;
            Ok(Redirect::to("/stock").into_response())
        }
        Err(ReconcileError::ReadOnly) => Err(ReconcileError::ReadOnly.into()),
        Err(error) => {
            let message = match &error {
                ReconcileError::Store(e) => format!("Error: {e}"),
                other => other.to_string(),
            };
            if reconciler.load().await.is_ok() {
                restore_selection(&mut reconciler, &current).await?;
            }
            Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                grid(&current, &reconciler, form, Some(Flash::error(message))),
            )
                .into_response())
        }
    }
}

/// Commit an inline edit.
///
/// Responds with the row to display: the edited row when the store accepted
/// it, the previous row with the reason when it did not. HTMX swaps it in
/// place; other clients are redirected to the grid.
#[instrument(skip_all, fields(account_id = %current.identity.account_id, id = %id))]
pub async fn edit(
    State(state): State<AppState>,
    current: RequireSession,
    Path(id): Path<StockRowId>,
    headers: HeaderMap,
    Form(form): Form<EditRowForm>,
) -> Result<Response, AppError> {
    let mut reconciler = reconciler_for(&state, &current)?;
    reconciler.load().await?;
    restore_selection(&mut reconciler, &current).await?;

    let previous = reconciler
        .row(id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("stock row {id}")))?;
    let selected = reconciler.selection().contains(&id);
    if !current.capability.is_privileged() {
        return Ok(blocked(&current, &previous, selected));
    }

    let size = match form.size.parse::<Size>() {
        Ok(size) => size,
        Err(error) => {
            let view = StockRowView::new(&previous, selected).with_error(error.to_string());
            return Ok(respond_edit(&current, &headers, view, Some("stock-error")).await);
        }
    };

    let proposed = ProposedRow {
        id,
        garment: form.garment,
        size,
        quantity: QuantityInput::from_cell(&form.quantity),
    };

    let response = match reconciler.update(current.capability, previous, proposed).await {
        UpdateOutcome::Blocked(row) => blocked(&current, &row, selected),
        UpdateOutcome::Unchanged(row) => {
            respond_edit(&current, &headers, StockRowView::new(&row, selected), None).await
        }
        UpdateOutcome::Confirmed(row) => {
            let view = StockRowView::new(&row, selected);
            respond_edit(&current, &headers, view, Some("stock-updated")).await
        }
        UpdateOutcome::Reverted { row, reason } => {
            let view = StockRowView::new(&row, selected).with_error(reason);
            respond_edit(&current, &headers, view, Some("stock-error")).await
        }
    };
    Ok(response)
}

/// Refuse an edit from a read-only session, showing the row unchanged.
fn blocked(current: &RequireSession, row: &StockRow, selected: bool) -> Response {
    (
        StatusCode::FORBIDDEN,
        row_fragment(current, StockRowView::new(row, selected)),
    )
        .into_response()
}

/// Answer an edit: the row fragment for HTMX, a redirect otherwise.
async fn respond_edit(
    current: &RequireSession,
    headers: &HeaderMap,
    view: StockRowView,
    trigger: Option<&'static str>,
) -> Response {
    if !is_htmx(headers) {
        if let Some(error) = &view.error {
            set_flash(&current.session, Flash::error(error.clone())).await;
        }
        return Redirect::to("/stock").into_response();
    }

    let fragment = row_fragment(current, view);
    match trigger {
        Some(event) => ([("HX-Trigger", event)], fragment).into_response(),
        None => fragment.into_response(),
    }
}

// =============================================================================
// Selection and delete
// =============================================================================

/// Replace the delete selection with the checked `id` fields.
#[instrument(skip_all, fields(account_id = %current.identity.account_id))]
pub async fn select(
    State(state): State<AppState>,
    current: RequireSession,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let ids = fields
        .into_iter()
        .filter(|(name, _)| name == "id")
        .filter_map(|(_, value)| value.parse::<StockRowId>().ok());

    let mut reconciler = reconciler_for(&state, &current)?;
    reconciler.load().await?;
    reconciler.select(current.capability, ids)?;
    save_selection(&current.session, &reconciler).await?;

    if is_htmx(&headers) {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(Redirect::to("/stock").into_response())
    }
}

/// Delete the selected rows.
///
/// Without an answer this shows the confirmation prompt. With `confirm=yes`
/// the selected rows are deleted in one request; any other answer declines.
#[instrument(skip_all, fields(account_id = %current.identity.account_id))]
pub async fn delete(
    State(state): State<AppState>,
    current: RequireSession,
    Form(form): Form<DeleteForm>,
) -> Result<Response, AppError> {
    let mut reconciler = reconciler_for(&state, &current)?;
    reconciler.load().await?;
    restore_selection(&mut reconciler, &current).await?;

    let Some(answer) = form.confirm else {
        return prompt_delete(&current, &reconciler).await;
    };
    let confirmed = answer == "yes";

    let flash = match reconciler.delete(current.capability, |_| confirmed).await {
        Ok(DeleteOutcome::NothingSelected) => Flash::notice("Select the rows to delete first"),
        Ok(DeleteOutcome::Declined) => Flash::notice("Nothing was deleted"),
        Ok(DeleteOutcome::Deleted(count)) => reconciler.last_diagnostic().map_or_else(
            || Flash::notice(deleted_message(count)),
            Flash::error,
        ),
        Err(ReconcileError::ReadOnly) => return Err(ReconcileError::ReadOnly.into()),
        Err(error) => {
            warn!(error = %error, "Delete failed");
            Flash::error(format!("Could not delete the selected rows: {error}"))
        }
    };

    save_selection(&current.session, &reconciler).await?;
    set_flash(&current.session, flash).await;
    Ok(Redirect::to("/stock").into_response())
}

async fn prompt_delete(
    current: &RequireSession,
    reconciler: &StockReconciler,
) -> Result<Response, AppError> {
    if !current.capability.is_privileged() {
        return Err(ReconcileError::ReadOnly.into());
    }

    let selection = reconciler.selection();
    if selection.is_empty() {
        set_flash(
            &current.session,
            Flash::notice("Select the rows to delete first"),
        )
        .await;
        return Ok(Redirect::to("/stock").into_response());
    }

    Ok(ConfirmDeleteTemplate {
        email: current.identity.email.to_string(),
        mode_label: current.capability.label(),
        privileged: true,
        rows: reconciler
            .rows()
            .iter()
            .filter(|row| selection.contains(&row.id))
            .map(|row| StockRowView::new(row, true))
            .collect(),
    }
    .into_response())
}

fn deleted_message(count: usize) -> String {
    if count == 1 {
        "Deleted 1 row".to_string()
    } else {
        format!("Deleted {count} rows")
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_deleted_message() {
        assert_eq!(deleted_message(1), "Deleted 1 row");
        assert_eq!(deleted_message(3), "Deleted 3 rows");
    }

    #[test]
    fn test_is_htmx() {
        let mut headers = HeaderMap::new();
        assert!(!is_htmx(&headers));
        headers.insert("HX-Request", HeaderValue::from_static("true"));
        assert!(is_htmx(&headers));
    }
}
