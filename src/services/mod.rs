//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers:
//! the pending checkout registry, the RCON command dispatcher, speech
//! synthesis, the realtime broadcaster, the purchase ledger, and the
//! webhook pipeline that orchestrates them.

pub mod broadcast;
pub mod checkout;
pub mod dispatcher;
pub mod ledger;
pub mod pipeline;
pub mod rcon;
pub mod tenant;
pub mod tts;
