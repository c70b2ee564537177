//! One configured bot system: a gateway connection plus its plugin set.
//!
//! The dispatch loop owns the plugins. Gateway, timers and (through the
//! context) plugin-scheduled work all funnel into one mpsc channel, so
//! plugins never need their own locking.

use std::path::Path;

use tokio::sync::mpsc;

use crate::cache::Cache;
use crate::client::ChatClient;
use crate::command::CommandInvocation;
use crate::config;
use crate::gateway::Gateway;
use crate::plugins::{
    CacheSyncPlugin, ChecklistPlugin, EchoPlugin, Ledger, Plugin, PluginContext, PlopkoekPlugin,
    PollPlugin, QuotePlugin,
};
use crate::store::Store;
use crate::types::{ChatEvent, SystemEvent, TwiMessage};

const EVENT_CHANNEL_CAPACITY: usize = 100;

pub struct System {
    name: String,
    config: config::System,
    context: PluginContext,
    plugins: Vec<Box<dyn Plugin>>,
    events: mpsc::Receiver<SystemEvent>,
    events_tx: mpsc::Sender<SystemEvent>,
}

impl System {
    pub fn new(
        name: String,
        system_config: config::System,
        data_dir: &Path,
        db_path: &Path,
    ) -> anyhow::Result<Self> {
        let store = Store::open(data_dir)?;
        let cache = Cache::open(db_path)?;
        let ledger = Ledger::new(cache.pool())?;
        let client = ChatClient::new(&system_config.discord_token, cache.clone());
        let general_channel_id = system_config.general_channel()?;

        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let context = PluginContext::new(
            client,
            store,
            cache,
            ledger,
            system_config.clone(),
            general_channel_id,
            events_tx.clone(),
        );

        let plugins = system_config
            .plugins
            .iter()
            .filter_map(|plugin| build_plugin(plugin, &system_config))
            .collect();

        Ok(Self {
            name,
            config: system_config,
            context,
            plugins,
            events,
            events_tx,
        })
    }

    /// Connect and dispatch until the gateway closes for good.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let gateway = Gateway::new(&self.config.discord_token, self.events_tx.clone());
        gateway.start_listening();

        while let Some(event) = self.events.recv().await {
            match event {
                SystemEvent::GatewayConnected(user) => {
                    tracing::info!(system = %self.name, user = %user.name, "gateway connected");
                    self.context.set_bot_user(user);
                }
                SystemEvent::GatewayError(error) => {
                    tracing::warn!(system = %self.name, "gateway error: {}", error);
                }
                SystemEvent::GatewayClosed => {
                    anyhow::bail!("gateway connection closed");
                }
                SystemEvent::Chat(event) => self.dispatch(event).await,
                SystemEvent::Timer { plugin, key } => self.dispatch_timer(plugin, &key).await,
            }
        }

        anyhow::bail!("event channel drained")
    }

    async fn dispatch(&mut self, event: ChatEvent) {
        if let ChatEvent::MessageCreate(message) = &event {
            if self.is_own_message(message) {
                return;
            }
        }

        for plugin in self.plugins.iter_mut() {
            if let Err(err) = plugin.on_event(&self.context, &event).await {
                tracing::error!(
                    system = %self.name,
                    plugin = plugin.name(),
                    "event handler failed: {:#}",
                    err
                );
            }
        }

        if let ChatEvent::MessageCreate(message) = &event {
            if let Some(invocation) = CommandInvocation::parse(&message.content) {
                self.dispatch_command(message, &invocation).await;
            }
        }
    }

    /// Messages written by the bot itself, or any other bot or webhook, never
    /// count as input. Without this the quote counter feeds on its own posts.
    fn is_own_message(&self, message: &TwiMessage) -> bool {
        if message.author.bot || message.webhook_id.is_some() {
            return true;
        }
        self.context.bot_user_id() == Some(message.author.id)
    }

    async fn dispatch_command(&mut self, message: &TwiMessage, invocation: &CommandInvocation) {
        for plugin in self.plugins.iter_mut() {
            if !plugin.command_names().contains(&invocation.bot.as_str()) {
                continue;
            }

            let result = match invocation.command() {
                None | Some("help") => {
                    send_help(&self.context, message, invocation, plugin.name()).await
                }
                _ => plugin.on_command(&self.context, message, invocation).await,
            };
            if let Err(err) = result {
                tracing::error!(
                    system = %self.name,
                    plugin = plugin.name(),
                    "command handler failed: {:#}",
                    err
                );
            }
        }
    }

    async fn dispatch_timer(&mut self, plugin_name: &'static str, key: &str) {
        for plugin in self.plugins.iter_mut() {
            if plugin.name() != plugin_name {
                continue;
            }
            if let Err(err) = plugin.on_timer(&self.context, key).await {
                tracing::error!(
                    system = %self.name,
                    plugin = plugin_name,
                    "timer handler failed: {:#}",
                    err
                );
            }
        }
    }
}

/// Help texts live in the `help` namespace of the store: one object per
/// plugin, keyed by command name, with `__self__` for the bare bot name.
async fn send_help(
    ctx: &PluginContext,
    message: &TwiMessage,
    invocation: &CommandInvocation,
    plugin_name: &str,
) -> anyhow::Result<()> {
    let help = ctx.store.get("help")?;
    let topic = match invocation.command() {
        Some("help") => invocation.arg(0).unwrap_or("__self__"),
        _ => "__self__",
    };
    let reply = help_reply(&help, plugin_name, topic);
    ctx.client.create_message(message.channel_id, &reply).await?;
    Ok(())
}

/// Every successful lookup also lists the other commands with a help text.
fn help_reply(
    help: &serde_json::Map<String, serde_json::Value>,
    plugin_name: &str,
    topic: &str,
) -> String {
    let topics = match help.get(plugin_name).and_then(|value| value.as_object()) {
        Some(topics) => topics,
        None => return "I don't provide help. :kappa:".to_string(),
    };

    match topics.get(topic).and_then(|value| value.as_str()) {
        Some(text) => {
            let mut reply = text.to_string();
            let others: Vec<&str> = topics
                .keys()
                .map(|key| key.as_str())
                .filter(|key| *key != "__self__" && *key != topic)
                .collect();
            if !others.is_empty() {
                reply.push_str(&format!("\nHelp is available for: {}", others.join(", ")));
            }
            reply
        }
        None => format!("help for {} is not available.", topic),
    }
}

fn build_plugin(name: &str, system: &config::System) -> Option<Box<dyn Plugin>> {
    match name {
        "cache" => Some(Box::new(CacheSyncPlugin)),
        "checklist" => Some(Box::new(ChecklistPlugin)),
        "echo" => Some(Box::new(EchoPlugin)),
        "plopkoek" => Some(Box::new(PlopkoekPlugin::new(&system.plopkoek_emote))),
        "poll" => Some(Box::new(PollPlugin)),
        "quote" => Some(Box::new(QuotePlugin::new())),
        _ => {
            tracing::warn!(plugin = name, "unknown plugin name in config");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn help_data() -> serde_json::Map<String, serde_json::Value> {
        json!({
            "quotebot": {
                "__self__": "I keep the quote book.",
                "add": "Adds a quote to the book.",
                "random": "Posts a random quote."
            }
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }

    #[test]
    fn plugin_without_help_entries_gets_the_fixed_line() {
        assert_eq!(
            help_reply(&help_data(), "echo", "__self__"),
            "I don't provide help. :kappa:"
        );
    }

    #[test]
    fn unknown_topic_is_reported() {
        assert_eq!(
            help_reply(&help_data(), "quotebot", "stats"),
            "help for stats is not available."
        );
    }

    #[test]
    fn successful_lookups_list_the_other_topics() {
        assert_eq!(
            help_reply(&help_data(), "quotebot", "__self__"),
            "I keep the quote book.\nHelp is available for: add, random"
        );
        assert_eq!(
            help_reply(&help_data(), "quotebot", "add"),
            "Adds a quote to the book.\nHelp is available for: random"
        );
    }
}
