//! Data models representing database entities and wire payloads.
//!
//! This module contains all data structures that map to database tables,
//! plus the normalized form of the inbound payment webhook payload.

/// Pending checkout (buyer reservation) model
pub mod checkout;
/// Purchase ledger model
pub mod purchase;
/// Tenant configuration, product catalog, and fundraising goal
pub mod tenant;
/// Inbound webhook payload and its normalization
pub mod webhook;
