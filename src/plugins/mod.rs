use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;
use twilight_model::user::CurrentUser;

use crate::cache::Cache;
use crate::client::ChatClient;
use crate::command::CommandInvocation;
use crate::config;
use crate::store::Store;
use crate::types::{ChannelId, ChatEvent, SystemEvent, TwiMessage, UserId};

mod cache_sync;
mod checklist;
mod echo;
mod plopkoek;
mod poll;
mod quote;

pub use cache_sync::CacheSyncPlugin;
pub use checklist::ChecklistPlugin;
pub use echo::EchoPlugin;
pub use plopkoek::{Ledger, PlopkoekPlugin};
pub use poll::PollPlugin;
pub use quote::{QuoteEntry, QuotePlugin};

/// Everything a plugin may reach for while handling an event.
pub struct PluginContext {
    pub client: ChatClient,
    pub store: Store,
    pub cache: Cache,
    pub ledger: Ledger,
    pub system_config: config::System,
    pub general_channel_id: ChannelId,
    bot_user: OnceLock<CurrentUser>,
    timer_tx: Sender<SystemEvent>,
}

impl PluginContext {
    pub fn new(
        client: ChatClient,
        store: Store,
        cache: Cache,
        ledger: Ledger,
        system_config: config::System,
        general_channel_id: ChannelId,
        timer_tx: Sender<SystemEvent>,
    ) -> Self {
        Self {
            client,
            store,
            cache,
            ledger,
            system_config,
            general_channel_id,
            bot_user: OnceLock::new(),
            timer_tx,
        }
    }

    /// The account this connection identified as. Known once the gateway has
    /// seen Ready.
    pub fn bot_user(&self) -> Option<&CurrentUser> {
        self.bot_user.get()
    }

    pub fn bot_user_id(&self) -> Option<UserId> {
        self.bot_user.get().map(|user| user.id)
    }

    pub fn set_bot_user(&self, user: CurrentUser) {
        let _ = self.bot_user.set(user);
    }

    /// Deliver a `Timer` system event to `plugin` after `delay`.
    pub fn schedule_timer(&self, plugin: &'static str, key: String, delay: Duration) {
        let timer_tx = self.timer_tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = timer_tx.send(SystemEvent::Timer { plugin, key }).await;
        });
    }
}

/// A bot plugin. Gets offered every dispatch event, plus any invocation of
/// one of its command names.
#[async_trait]
pub trait Plugin: Send {
    /// Primary bot name; used for help lookups and timer routing.
    fn name(&self) -> &'static str;

    /// The `!name` prefixes this plugin answers to.
    fn command_names(&self) -> &[&'static str];

    async fn on_event(&mut self, ctx: &PluginContext, event: &ChatEvent) -> anyhow::Result<()> {
        let _ = (ctx, event);
        Ok(())
    }

    async fn on_command(
        &mut self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        let _ = (ctx, message, invocation);
        Ok(())
    }

    async fn on_timer(&mut self, ctx: &PluginContext, key: &str) -> anyhow::Result<()> {
        let _ = (ctx, key);
        Ok(())
    }
}
