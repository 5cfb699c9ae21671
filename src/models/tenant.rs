//! Tenant configuration, product catalog, and fundraising goal.
//!
//! A tenant is one independent streamer account; every piece of core state
//! is scoped to a tenant id. The configuration bundle assembled here is what
//! the webhook pipeline and the interactive test paths consume.

use std::collections::HashMap;

use sqlx::types::Json;

/// Default overlay message template when the tenant left it blank.
pub const DEFAULT_OVERLAY_MESSAGE: &str = "Nova compra";

/// Raw tenant row as stored in the `tenants` table.
///
/// Handlers never see this directly; `services::tenant::read_config`
/// assembles it (plus the product catalog) into a [`TenantConfig`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TenantRow {
    pub id: String,
    pub api_key_hash: String,
    pub webhook_secret: String,
    pub provider_handle: String,
    pub overlay_message: String,
    pub sound: Option<String>,
    pub tts_voice: String,
    pub rcon_host: String,
    pub rcon_port: Option<i32>,
    pub rcon_password: String,
    pub goal_target_cents: i64,
    pub goal_current_cents: i64,
    pub goal_text_template: String,
    pub goal_text_position: String,
    pub goal_bar_bg_color: String,
    pub goal_bar_fill_color: String,
    pub goal_text_color: String,
    pub goal_show_currency: bool,
}

/// Assembled per-tenant configuration bundle.
#[derive(Debug, Clone)]
pub struct TenantConfig {
    pub id: String,
    pub webhook_secret: String,
    pub provider_handle: String,
    pub overlay_message: String,
    pub sound: Option<String>,
    pub tts_voice: String,
    pub rcon: RconSettings,
    pub goal: Goal,
    pub products: HashMap<String, Product>,
}

impl TenantConfig {
    pub fn from_row(row: TenantRow, products: HashMap<String, Product>) -> Self {
        let goal = Goal::normalized(
            row.goal_target_cents,
            row.goal_current_cents,
            &row.goal_text_template,
            &row.goal_text_position,
            &row.goal_bar_bg_color,
            &row.goal_bar_fill_color,
            &row.goal_text_color,
            row.goal_show_currency,
        );

        Self {
            id: row.id,
            webhook_secret: row.webhook_secret,
            provider_handle: row.provider_handle,
            overlay_message: row.overlay_message,
            sound: row.sound,
            tts_voice: row.tts_voice,
            rcon: RconSettings {
                host: row.rcon_host,
                port: row.rcon_port.and_then(|p| u16::try_from(p).ok()),
                password: row.rcon_password,
            },
            goal,
            products,
        }
    }

    /// Overlay message template, falling back to the default when blank.
    pub fn overlay_template(&self) -> &str {
        if self.overlay_message.trim().is_empty() {
            DEFAULT_OVERLAY_MESSAGE
        } else {
            &self.overlay_message
        }
    }

    /// Public URL of the tenant's alert sound, if one is configured.
    pub fn sound_url(&self) -> Option<String> {
        self.sound
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| format!("/{}/sounds/{}", self.id, s))
    }

    /// Tenant-default TTS voice, if one is configured.
    pub fn default_voice(&self) -> Option<&str> {
        let v = self.tts_voice.trim();
        if v.is_empty() { None } else { Some(v) }
    }
}

/// Game server remote console endpoint.
#[derive(Debug, Clone)]
pub struct RconSettings {
    pub host: String,
    pub port: Option<u16>,
    pub password: String,
}

impl RconSettings {
    /// Whether all three connection parameters are present.
    ///
    /// The webhook pipeline skips dispatch (rather than failing) when this
    /// is false; the interactive test paths reject the request instead.
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && self.port.is_some() && !self.password.is_empty()
    }
}

/// One catalog product, keyed per tenant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Product {
    pub key: String,
    pub title: String,
    /// Unit price in cents
    pub price_cents: i64,
    /// Either a single command string or an array of command strings
    pub commands: Json<serde_json::Value>,
    /// How many times the command list runs per purchased unit
    pub commands_per_unit: i32,
    pub image: Option<String>,
}

impl Product {
    /// Normalize the stored command configuration into a list.
    ///
    /// A single string becomes a one-element list; anything that is not a
    /// string or an array of strings yields an empty list (the dispatcher
    /// skips the product with a warning in that case).
    pub fn command_list(&self) -> Vec<String> {
        match &*self.commands {
            serde_json::Value::String(s) if !s.trim().is_empty() => vec![s.clone()],
            serde_json::Value::Array(values) => values
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Total price in cents for `quantity` purchased units.
    pub fn value_cents(&self, quantity: i64) -> i64 {
        self.price_cents * quantity.max(1)
    }
}

/// Fundraising goal shown on the overlay.
///
/// `current_cents` is only ever increased by the webhook pipeline (by the
/// positive purchase value, clamped at zero at the storage layer); it is
/// never reset by the webhook path.
#[derive(Debug, Clone)]
pub struct Goal {
    pub target_cents: i64,
    pub current_cents: i64,
    pub text_template: String,
    pub text_position: String,
    pub bar_bg_color: String,
    pub bar_fill_color: String,
    pub text_color: String,
    pub show_currency_symbol: bool,
}

const DEFAULT_GOAL_TARGET_CENTS: i64 = 10_000;
const DEFAULT_GOAL_TEMPLATE: &str = "Meta: {current} / {target}";
const DEFAULT_BAR_BG_COLOR: &str = "#0f172a";
const DEFAULT_BAR_FILL_COLOR: &str = "#22d3ee";
const DEFAULT_TEXT_COLOR: &str = "#e5e7eb";

impl Goal {
    /// Build a goal from stored fields, replacing out-of-range or blank
    /// values with the defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn normalized(
        target_cents: i64,
        current_cents: i64,
        text_template: &str,
        text_position: &str,
        bar_bg_color: &str,
        bar_fill_color: &str,
        text_color: &str,
        show_currency_symbol: bool,
    ) -> Self {
        Self {
            target_cents: if target_cents >= 0 {
                target_cents
            } else {
                DEFAULT_GOAL_TARGET_CENTS
            },
            current_cents: current_cents.max(0),
            text_template: non_blank_or(text_template, DEFAULT_GOAL_TEMPLATE),
            text_position: if text_position == "above" {
                "above".to_string()
            } else {
                "inside".to_string()
            },
            bar_bg_color: non_blank_or(bar_bg_color, DEFAULT_BAR_BG_COLOR),
            bar_fill_color: non_blank_or(bar_fill_color, DEFAULT_BAR_FILL_COLOR),
            text_color: non_blank_or(text_color, DEFAULT_TEXT_COLOR),
            show_currency_symbol,
        }
    }
}

fn non_blank_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_with_commands(commands: serde_json::Value) -> Product {
        Product {
            key: "P1".to_string(),
            title: "Item".to_string(),
            price_cents: 500,
            commands: Json(commands),
            commands_per_unit: 1,
            image: None,
        }
    }

    #[test]
    fn single_command_string_becomes_one_element_list() {
        let product = product_with_commands(serde_json::json!("give {username} item"));
        assert_eq!(product.command_list(), vec!["give {username} item"]);
    }

    #[test]
    fn command_array_is_preserved_in_order() {
        let product = product_with_commands(serde_json::json!(["first", "second"]));
        assert_eq!(product.command_list(), vec!["first", "second"]);
    }

    #[test]
    fn missing_or_malformed_commands_yield_empty_list() {
        assert!(product_with_commands(serde_json::json!(null)).command_list().is_empty());
        assert!(product_with_commands(serde_json::json!(42)).command_list().is_empty());
        assert!(product_with_commands(serde_json::json!("  ")).command_list().is_empty());
    }

    #[test]
    fn product_value_uses_at_least_one_unit() {
        let product = product_with_commands(serde_json::json!([]));
        assert_eq!(product.value_cents(2), 1000);
        assert_eq!(product.value_cents(0), 500);
        assert_eq!(product.value_cents(-3), 500);
    }

    #[test]
    fn goal_normalization_clamps_and_defaults() {
        let goal = Goal::normalized(-5, -10, "  ", "sideways", "", "#fff", "", true);
        assert_eq!(goal.target_cents, 10_000);
        assert_eq!(goal.current_cents, 0);
        assert_eq!(goal.text_template, "Meta: {current} / {target}");
        assert_eq!(goal.text_position, "inside");
        assert_eq!(goal.bar_bg_color, "#0f172a");
        assert_eq!(goal.bar_fill_color, "#fff");
        assert_eq!(goal.text_color, "#e5e7eb");
    }

    #[test]
    fn goal_position_above_is_kept() {
        let goal = Goal::normalized(100, 50, "t", "above", "a", "b", "c", false);
        assert_eq!(goal.text_position, "above");
        assert!(!goal.show_currency_symbol);
    }

    #[test]
    fn incomplete_rcon_settings_are_detected() {
        let complete = RconSettings {
            host: "mc.example.com".to_string(),
            port: Some(25575),
            password: "secret".to_string(),
        };
        assert!(complete.is_complete());

        let no_host = RconSettings { host: String::new(), ..complete.clone() };
        assert!(!no_host.is_complete());

        let no_port = RconSettings { port: None, ..complete.clone() };
        assert!(!no_port.is_complete());

        let no_password = RconSettings { password: String::new(), ..complete };
        assert!(!no_password.is_complete());
    }
}
