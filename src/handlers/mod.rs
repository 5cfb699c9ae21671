//! HTTP request handlers.

pub mod admin;
pub mod checkout;
pub mod events;
pub mod health;
pub mod overlay;
pub mod purchases;
pub mod webhooks;
