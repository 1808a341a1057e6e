//! Core use-case services.
//!
//! # Responsibility
//! - Pair each board mutation with its journal line and audit record inside
//!   one retried write transaction.
//! - Serve the audit ledger read views.

pub mod audit_service;
pub mod board_service;
