//! Command dispatcher - translates purchased line items into game commands.
//!
//! For each line item the dispatcher looks up the product in the tenant's
//! catalog, resolves its command template list, and executes the full list
//! `quantity x commands_per_unit` times over a short-lived RCON connection.
//! Commands run **sequentially and in order** - game-side effects depend on
//! ordering, so nothing here is fanned out.
//!
//! # Error Handling
//!
//! - Unknown product or empty command list: the item is skipped with a
//!   warning, never an error for the batch
//! - A failed send aborts the remaining sends and surfaces the error to the
//!   caller (the webhook pipeline logs and continues; the interactive test
//!   paths abort the whole operation)

use std::collections::HashMap;

use crate::models::purchase::PurchasedItem;
use crate::models::tenant::{Product, RconSettings};
use crate::services::rcon::{RconClient, RconError};

/// Open a connection, run the whole batch, and close the connection on both
/// success and failure paths.
pub async fn dispatch(
    settings: &RconSettings,
    catalog: &HashMap<String, Product>,
    items: &[PurchasedItem],
    username: &str,
) -> Result<(), RconError> {
    let (Some(port), host, password) = (settings.port, &settings.host, &settings.password) else {
        return Err(RconError::NotConfigured);
    };
    if host.is_empty() || password.is_empty() {
        return Err(RconError::NotConfigured);
    }

    tracing::info!(host = %host, port, items = items.len(), "rcon connect");
    let mut client = RconClient::connect(host, port, password).await?;

    // The connection is released no matter how the batch ends
    let result = run_batch(&mut client, catalog, items, username).await;
    client.close().await;

    result
}

async fn run_batch(
    client: &mut RconClient,
    catalog: &HashMap<String, Product>,
    items: &[PurchasedItem],
    username: &str,
) -> Result<(), RconError> {
    for item in items {
        let Some(product) = catalog.get(&item.description) else {
            tracing::warn!(product = %item.description, "unknown product, skipping item");
            continue;
        };

        let commands = product.command_list();
        if commands.is_empty() {
            tracing::warn!(product = %item.description, "product has no commands configured, skipping item");
            continue;
        }

        let executions = total_executions(item.quantity, product.commands_per_unit);

        for _ in 0..executions {
            for template in &commands {
                let command = substitute_buyer(template, username);
                match client.send(&command).await {
                    Ok(response) => {
                        tracing::info!(
                            product = %item.description,
                            executions,
                            command = %command,
                            response = %response,
                            "rcon sent"
                        );
                    }
                    Err(err) => {
                        tracing::error!(
                            product = %item.description,
                            command = %command,
                            "rcon send failed: {err}"
                        );
                        return Err(err);
                    }
                }
            }
        }
    }

    Ok(())
}

/// How many times the command list runs for one line item.
///
/// Both factors are clamped to at least one so a zero or missing multiplier
/// still delivers the purchase.
pub fn total_executions(quantity: i64, commands_per_unit: i32) -> i64 {
    quantity.max(1) * i64::from(commands_per_unit.max(1))
}

/// Substitute the buyer name into a command template.
///
/// Both placeholder spellings are accepted.
pub fn substitute_buyer(template: &str, username: &str) -> String {
    template
        .replace("{username}", username)
        .replace("{nickname}", username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_count_multiplies_quantity_by_commands_per_unit() {
        assert_eq!(total_executions(2, 1), 2);
        assert_eq!(total_executions(2, 3), 6);
        assert_eq!(total_executions(1, 1), 1);
    }

    #[test]
    fn execution_count_clamps_non_positive_factors_to_one() {
        assert_eq!(total_executions(0, 0), 1);
        assert_eq!(total_executions(-4, 2), 2);
        assert_eq!(total_executions(3, -1), 3);
    }

    #[test]
    fn both_placeholder_spellings_are_substituted() {
        assert_eq!(
            substitute_buyer("give {username} item", "Maria"),
            "give Maria item"
        );
        assert_eq!(
            substitute_buyer("say hi {nickname}!", "Maria"),
            "say hi Maria!"
        );
        assert_eq!(
            substitute_buyer("tp {username} {nickname}", "Maria"),
            "tp Maria Maria"
        );
    }

    #[test]
    fn templates_without_placeholders_pass_through() {
        assert_eq!(substitute_buyer("weather clear", "Maria"), "weather clear");
    }
}
