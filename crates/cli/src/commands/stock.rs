//! Stock commands.
//!
//! # Usage
//!
//! ```bash
//! stockroom stock list
//! stockroom stock add --garment "Hoodie" --size XL --quantity 4
//! stockroom stock edit 12 --quantity 3
//! stockroom stock delete 12 13 --yes
//! ```

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use stockroom_core::{Capability, ProposedRow, QuantityInput, Size, StockRow, StockRowId};
use stockroom_web::services::{
    DeleteOutcome, NewRowForm, ReconcileError, StockReconciler, UpdateOutcome,
};
use tracing::{info, warn};

use super::{CliError, Context};

/// Fields to change in `stock edit`. `None` keeps the current value.
#[derive(Debug, Default)]
pub struct RowChanges {
    pub garment: Option<String>,
    pub size: Option<String>,
    pub quantity: Option<String>,
}

fn reconciler(context: &Context) -> Result<(StockReconciler, Capability), CliError> {
    let (session, capability) = context.signed_in()?;
    let reconciler = StockReconciler::new(Arc::clone(&context.store), session.access_token);
    Ok((reconciler, capability))
}

#[allow(clippy::print_stdout)]
fn print_rows(rows: &[StockRow]) {
    if rows.is_empty() {
        println!("No stock rows");
        return;
    }

    println!("{:>6}  {:<24}  {:<5}  {:>8}", "ID", "GARMENT", "SIZE", "QUANTITY");
    for row in rows {
        println!(
            "{:>6}  {:<24}  {:<5}  {:>8}",
            row.id, row.garment, row.size, row.quantity
        );
    }
}

/// Print every row, newest first.
///
/// # Errors
///
/// Returns an error without a session or when the store cannot be read.
pub async fn list(context: &Context) -> Result<(), CliError> {
    let (mut reconciler, _) = reconciler(context)?;
    reconciler.load().await?;
    print_rows(reconciler.rows());
    Ok(())
}

/// Add a row.
///
/// # Errors
///
/// Returns an error for read-only sessions, missing fields, or when the
/// store refuses the row.
pub async fn add(
    context: &Context,
    garment: String,
    size: String,
    quantity: String,
) -> Result<(), CliError> {
    let (mut reconciler, capability) = reconciler(context)?;
    let mut form = NewRowForm {
        garment,
        size,
        quantity,
    };

    reconciler.insert(capability, &mut form).await?;
    info!("Row added");
    if reconciler.last_diagnostic().is_none() {
        print_rows(reconciler.rows());
    }
    Ok(())
}

/// Edit a row.
///
/// # Errors
///
/// Returns an error for read-only sessions, unknown ids or sizes, or when
/// the store refuses the edit (the row keeps its previous values).
pub async fn edit(context: &Context, id: StockRowId, changes: RowChanges) -> Result<(), CliError> {
    let (mut reconciler, capability) = reconciler(context)?;
    reconciler.load().await?;

    let previous = reconciler
        .row(id)
        .cloned()
        .ok_or(CliError::RowNotFound(id))?;

    let size = match changes.size {
        Some(size) => size.parse::<Size>()?,
        None => previous.size,
    };
    let proposed = ProposedRow {
        id,
        garment: changes
            .garment
            .unwrap_or_else(|| previous.garment.clone()),
        size,
        quantity: changes.quantity.map_or_else(
            || QuantityInput::from(previous.quantity),
            |cell| QuantityInput::from_cell(&cell),
        ),
    };

    match reconciler.update(capability, previous, proposed).await {
        UpdateOutcome::Blocked(_) => Err(ReconcileError::ReadOnly.into()),
        UpdateOutcome::Unchanged(row) => {
            info!(id = %id, "Nothing to change");
            print_rows(&[row]);
            Ok(())
        }
        UpdateOutcome::Confirmed(row) => {
            info!(id = %id, "Row updated");
            print_rows(&[row]);
            Ok(())
        }
        UpdateOutcome::Reverted { row, reason } => {
            print_rows(&[row]);
            Err(CliError::Reverted { id, reason })
        }
    }
}

/// Delete rows after confirmation.
///
/// `ask` is the yes/no prompt; `yes` answers it up front. Ids that are not
/// in the table are ignored.
///
/// # Errors
///
/// Returns an error for read-only sessions or when the store refuses the
/// delete (nothing is deleted).
pub async fn delete(
    context: &Context,
    ids: &[StockRowId],
    yes: bool,
    ask: impl FnOnce(usize) -> bool + Send,
) -> Result<(), CliError> {
    let (mut reconciler, capability) = reconciler(context)?;
    reconciler.load().await?;

    for id in ids.iter().filter(|id| reconciler.row(**id).is_none()) {
        warn!(id = %id, "Ignoring unknown stock row");
    }
    reconciler.select(capability, ids.iter().copied())?;

    match reconciler
        .delete(capability, |count| yes || ask(count))
        .await?
    {
        DeleteOutcome::NothingSelected => info!("No matching rows to delete"),
        DeleteOutcome::Declined => info!("Nothing deleted"),
        DeleteOutcome::Deleted(1) => info!("Deleted 1 row"),
        DeleteOutcome::Deleted(count) => info!("Deleted {count} rows"),
    }
    Ok(())
}

/// Ask on the terminal whether to delete `count` rows.
#[allow(clippy::print_stdout)]
#[must_use]
pub fn ask_on_stdin(count: usize) -> bool {
    print!("Delete {count} selected row(s)? [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
