use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

use crate::types::{ChannelId, WebhookId};

pub const KNOWN_PLUGINS: &[&str] = &["cache", "checklist", "echo", "plopkoek", "poll", "quote"];

fn default_restart_delay() -> u64 {
    60
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/plopkoek.db")
}

/// Webhook used to impersonate quotees in the general channel.
#[derive(Deserialize, Clone)]
pub struct WebhookConfig {
    pub id: String,
    pub token: String,
}

impl WebhookConfig {
    pub fn webhook_id(&self) -> anyhow::Result<WebhookId> {
        WebhookId::from_str(self.id.as_str())
            .with_context(|| format!("invalid webhook id: {}", self.id))
    }
}

#[derive(Deserialize, Clone)]
pub struct System {
    pub discord_token: String,
    pub general_channel_id: String,
    #[serde(default = "default_plopkoek_emote")]
    pub plopkoek_emote: String,
    #[serde(default = "default_display_name")]
    pub bot_display_name: String,
    pub quote_webhook: Option<WebhookConfig>,
    pub plugins: Vec<String>,
}

fn default_plopkoek_emote() -> String {
    "<:plop:236155120067411968>".to_string()
}

fn default_display_name() -> String {
    "plopkoek-bot".to_string()
}

impl System {
    pub fn general_channel(&self) -> anyhow::Result<ChannelId> {
        ChannelId::from_str(self.general_channel_id.as_str())
            .with_context(|| format!("invalid channel id: {}", self.general_channel_id))
    }
}

#[derive(Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_restart_delay")]
    pub restart_delay_seconds: u64,
    pub systems: HashMap<String, System>,
}

impl Config {
    pub fn load(config_contents: &str) -> anyhow::Result<Config> {
        let config: Config = toml::from_str(config_contents).context("could not parse config")?;

        for (system_name, system) in config.systems.iter() {
            for plugin in system.plugins.iter() {
                if !KNOWN_PLUGINS.contains(&plugin.as_str()) {
                    anyhow::bail!("system {} lists unknown plugin {}", system_name, plugin);
                }
            }
            system.general_channel()?;
            if let Some(webhook) = &system.quote_webhook {
                webhook.webhook_id()?;
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        data_dir = "data"
        db_path = "data/plopkoek.db"

        [systems.plopkoek]
        discord_token = "token"
        general_channel_id = "236154927528064001"
        plugins = ["cache", "quote", "plopkoek"]

        [systems.plopkoek.quote_webhook]
        id = "236155120067411968"
        token = "hook-token"
    "#;

    #[test]
    fn loads_example_config() {
        let config = Config::load(EXAMPLE).unwrap();
        assert_eq!(config.restart_delay_seconds, 60);
        let system = config.systems.get("plopkoek").unwrap();
        assert_eq!(system.plugins.len(), 3);
        assert_eq!(system.bot_display_name, "plopkoek-bot");
        system.general_channel().unwrap();
        system.quote_webhook.as_ref().unwrap().webhook_id().unwrap();
    }

    #[test]
    fn rejects_unknown_plugin() {
        let bad = EXAMPLE.replace("\"quote\"", "\"quotes\"");
        assert!(Config::load(&bad).is_err());
    }

    #[test]
    fn rejects_bad_channel_id() {
        let bad = EXAMPLE.replace("236154927528064001", "general");
        assert!(Config::load(&bad).is_err());
    }
}
