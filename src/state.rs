//! Shared application state.

use std::sync::Arc;

use crate::config::Config;
use crate::db::DbPool;
use crate::services::broadcast::Broadcaster;
use crate::services::tts::SpeechSynthesizer;

/// Everything handlers and background tasks need, cloned per request.
///
/// The broadcaster and synthesizer are explicitly owned here (injected at
/// startup) rather than living in module-level globals, which keeps them
/// swappable in tests.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub broadcaster: Broadcaster,
    pub tts: SpeechSynthesizer,
    pub http: reqwest::Client,
    pub settings: Arc<Config>,
}
