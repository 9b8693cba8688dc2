//! Stockroom Core - Shared types library.
//!
//! This crate provides the types used across all Stockroom components:
//! - `web` - Browser front-end (login, registration, stock grid)
//! - `cli` - Terminal front-end over the same session and reconciler
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients. The authorization gate lives here because it is a pure function
//! of the identity.
//!
//! # Modules
//!
//! - [`types`] - Row ids, sizes, stock rows, emails, identities and capabilities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
