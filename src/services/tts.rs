//! Speech synthesis with content-addressed caching.
//!
//! Wraps the Azure Cognitive Speech REST API. Every synthesized clip is
//! written under `<data_dir>/<tenant>/tts/<hash>.mp3` where the hash is
//! derived from `(voice, truncated text)`, so repeated identical requests
//! reuse the prior artifact instead of re-synthesizing.
//!
//! # Error Handling
//!
//! Synthesis failures never escape as errors: every failure path logs and
//! returns `None`, which the pipeline treats as "purchase without audio".

use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// Voices the service accepts; anything else falls back to the default.
pub const ALLOWED_VOICES: [&str; 5] = [
    "pt-BR-ThalitaMultilingualNeural",
    "pt-BR-AntonioNeural",
    "pt-BR-FranciscaNeural",
    "pt-PT-DuarteNeural",
    "pt-PT-RaquelNeural",
];

pub const DEFAULT_VOICE: &str = "pt-BR-AntonioNeural";

/// Longer texts are truncated before hashing and synthesis.
const MAX_TEXT_CHARS: usize = 240;

const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Speech service client plus cache location.
#[derive(Clone)]
pub struct SpeechSynthesizer {
    client: reqwest::Client,
    subscription_key: Option<String>,
    region: String,
    data_dir: PathBuf,
}

impl SpeechSynthesizer {
    pub fn new(
        client: reqwest::Client,
        subscription_key: Option<String>,
        region: String,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            subscription_key,
            region,
            data_dir: data_dir.into(),
        }
    }

    /// Turn text into a cached audio asset and return its public URL.
    ///
    /// Returns `None` (never an error) when the text is empty, credentials
    /// are missing, or the upstream call fails.
    pub async fn synthesize(&self, tenant: &str, text: &str, voice: Option<&str>) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }

        let voice = resolve_voice(voice);

        let Some(key) = self.subscription_key.as_deref() else {
            tracing::error!(tenant, "tts skipped: speech credentials not configured");
            return None;
        };

        let safe_text = truncate_chars(text, MAX_TEXT_CHARS);
        let hash = cache_key(voice, safe_text);

        let dir = self.data_dir.join(tenant).join("tts");
        let path = dir.join(format!("{hash}.mp3"));
        let url = format!("/{tenant}/tts/{hash}.mp3");

        // Cache hit: reuse the prior artifact
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.len() > 0 {
                tracing::info!(tenant, voice, file = %format!("{hash}.mp3"), "tts cache hit");
                return Some(url);
            }
        }

        tracing::info!(tenant, voice, chars = safe_text.chars().count(), "tts synthesis start");

        let audio = match self.fetch_audio(key, voice, safe_text).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(tenant, voice, "tts request failed: {err}");
                return None;
            }
        };

        if audio.is_empty() {
            tracing::error!(tenant, voice, "tts produced an empty clip");
            return None;
        }

        if let Err(err) = write_clip(&dir, &path, &audio).await {
            tracing::error!(tenant, voice, "tts cache write failed: {err}");
            return None;
        }

        tracing::info!(tenant, voice, file = %format!("{hash}.mp3"), "tts synthesis done");
        Some(url)
    }

    async fn fetch_audio(
        &self,
        key: &str,
        voice: &str,
        text: &str,
    ) -> Result<Vec<u8>, reqwest::Error> {
        let endpoint = format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            self.region
        );

        let response = self
            .client
            .post(&endpoint)
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .body(build_ssml(voice, text))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }
}

/// Pick the requested voice when allowed, the default otherwise.
pub fn resolve_voice(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|v| ALLOWED_VOICES.iter().find(|allowed| **allowed == v))
        .copied()
        .unwrap_or(DEFAULT_VOICE)
}

/// Stable content address for `(voice, truncated text)`.
fn cache_key(voice: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(voice.as_bytes());
    hasher.update(b":");
    hasher.update(text.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

fn build_ssml(voice: &str, text: &str) -> String {
    let lang = voice_lang(voice);
    format!(
        "<speak version='1.0' xml:lang='{lang}'><voice name='{voice}'>{}</voice></speak>",
        escape_xml(text)
    )
}

/// Language tag is the first two segments of the voice name.
fn voice_lang(voice: &str) -> &str {
    let mut dashes = voice.char_indices().filter(|(_, c)| *c == '-');
    match dashes.nth(1) {
        Some((idx, _)) => &voice[..idx],
        None => "pt-BR",
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Truncate on a character boundary, never mid-codepoint.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

async fn write_clip(
    dir: &std::path::Path,
    path: &std::path::Path,
    audio: &[u8],
) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, audio).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_voice_falls_back_to_default() {
        assert_eq!(resolve_voice(Some("en-US-Whoever")), DEFAULT_VOICE);
        assert_eq!(resolve_voice(None), DEFAULT_VOICE);
    }

    #[test]
    fn allowed_voice_is_kept() {
        assert_eq!(resolve_voice(Some("pt-BR-FranciscaNeural")), "pt-BR-FranciscaNeural");
    }

    #[test]
    fn cache_key_is_stable_and_discriminates() {
        let a = cache_key(DEFAULT_VOICE, "hello");
        let b = cache_key(DEFAULT_VOICE, "hello");
        let c = cache_key(DEFAULT_VOICE, "other");
        let d = cache_key("pt-PT-RaquelNeural", "hello");

        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn ssml_escapes_reserved_characters() {
        let ssml = build_ssml(DEFAULT_VOICE, "a < b & c > d");
        assert!(ssml.contains("a &lt; b &amp; c &gt; d"));
        assert!(ssml.contains("xml:lang='pt-BR'"));
        assert!(ssml.contains("pt-BR-AntonioNeural"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "áéíóú".repeat(100);
        let truncated = truncate_chars(&text, MAX_TEXT_CHARS);
        assert_eq!(truncated.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn language_tag_derives_from_voice_name() {
        assert_eq!(voice_lang("pt-PT-DuarteNeural"), "pt-PT");
        assert_eq!(voice_lang("pt-BR-ThalitaMultilingualNeural"), "pt-BR");
        assert_eq!(voice_lang("weird"), "pt-BR");
    }
}
