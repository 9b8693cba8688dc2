//! Business services: the auth and row store seams, the session manager and
//! the stock reconciler.

pub mod auth;
pub mod reconciler;
pub mod session;
pub mod store;

pub use auth::{AuthError, AuthProvider, AuthSession, SignUpOutcome};
pub use reconciler::{
    DeleteOutcome, NewRowForm, PendingEdit, ReconcileError, StockReconciler, UpdateOutcome,
    ValidationError,
};
pub use session::{Registration, SessionError, SessionManager, SessionSubscription};
pub use store::{RowStore, StoreError};
