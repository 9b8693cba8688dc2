//! Core types for Stockroom.
//!
//! This module provides type-safe wrappers for the stock domain.

pub mod capability;
pub mod email;
pub mod id;
pub mod identity;
pub mod size;
pub mod stock;

pub use capability::{AccessPolicy, Capability};
pub use email::{Email, EmailError};
pub use id::*;
pub use identity::{AccountId, Identity};
pub use size::{Size, SizeError};
pub use stock::{NewStockRow, ProposedRow, QuantityInput, RowRejection, StockRow};
