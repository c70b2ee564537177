//! Quote book: add, query and occasionally volunteer quotes.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::command::{mention_to_key, CommandInvocation};
use crate::types::{ChannelId, ChatEvent, TwiMessage};

use super::{Plugin, PluginContext};

pub const QUOTE_ICON_URL: &str = "https://cdn1.iconfinder.com/data/icons/anchor/128/quote.png";

/// A random quote is volunteered every time a channel hits this many
/// messages.
const QUOTE_TRIGGER_COUNT: u32 = 31;

const MAX_FIND_RESULTS: usize = 25;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuoteEntry {
    pub quote: String,
    pub added_by: String,
    pub added_on: String,
}

type QuoteBook = BTreeMap<String, Vec<QuoteEntry>>;

pub struct QuotePlugin {
    message_count: HashMap<ChannelId, u32>,
}

impl QuotePlugin {
    pub fn new() -> Self {
        Self {
            message_count: HashMap::new(),
        }
    }

    fn load_quotes(ctx: &PluginContext) -> anyhow::Result<QuoteBook> {
        Ok(ctx.store.get_or_default("quotebot", "quotes")?)
    }

    fn save_quotes(ctx: &PluginContext, quotes: &QuoteBook) -> anyhow::Result<()> {
        ctx.store.set_value("quotebot", "quotes", quotes)?;
        Ok(())
    }

    /// Clone one quote out of `entries`. The rng handle must not outlive
    /// this call; it cannot be held across an await in the command hooks.
    fn pick_random(entries: &[QuoteEntry]) -> Option<String> {
        entries
            .choose(&mut rand::thread_rng())
            .map(|entry| entry.quote.clone())
    }

    fn random_quote(quotes: &QuoteBook) -> Option<(&str, &str)> {
        let all: Vec<(&str, &str)> = quotes
            .iter()
            .flat_map(|(quotee, entries)| {
                entries
                    .iter()
                    .map(move |entry| (quotee.as_str(), entry.quote.as_str()))
            })
            .collect();
        all.choose(&mut rand::thread_rng()).copied()
    }

    /// Plain reply, except in the general channel where the webhook speaks
    /// as "quotebot".
    async fn post_message(
        &self,
        ctx: &PluginContext,
        channel_id: ChannelId,
        content: &str,
    ) -> anyhow::Result<()> {
        match (&ctx.system_config.quote_webhook, channel_id == ctx.general_channel_id) {
            (Some(webhook), true) => {
                ctx.client
                    .execute_webhook(
                        webhook.webhook_id()?,
                        &webhook.token,
                        content,
                        "quotebot",
                        Some(QUOTE_ICON_URL),
                    )
                    .await?;
            }
            _ => {
                ctx.client.create_message(channel_id, content).await?;
            }
        }
        Ok(())
    }

    /// Post a quote. In the general channel the webhook impersonates the
    /// quotee, name and avatar included; elsewhere it is plain text.
    async fn post_quote(
        &self,
        ctx: &PluginContext,
        channel_id: ChannelId,
        quote: &str,
        quotee: &str,
    ) -> anyhow::Result<()> {
        match (&ctx.system_config.quote_webhook, channel_id == ctx.general_channel_id) {
            (Some(webhook), true) => {
                let mut username = quotee.to_string();
                let mut avatar_url = QUOTE_ICON_URL.to_string();
                if let Ok(user_id) = quotee.parse::<u64>() {
                    if let Ok(user) = ctx
                        .client
                        .fetch_user(crate::types::UserId::new(user_id))
                        .await
                    {
                        username = user.name.clone();
                        if let Some(url) = crate::client::ChatClient::avatar_url(&user) {
                            avatar_url = url;
                        }
                    }
                }
                ctx.client
                    .execute_webhook(
                        webhook.webhook_id()?,
                        &webhook.token,
                        quote,
                        &username,
                        Some(&avatar_url),
                    )
                    .await?;
            }
            _ => {
                let name = ctx.client.user_name(quotee).await;
                ctx.client
                    .create_message(channel_id, &format!("{} - {}", quote, name))
                    .await?;
            }
        }
        Ok(())
    }

    async fn add_quote(
        &self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        let (quotee, quote) = match (invocation.arg(0), invocation.rest(1)) {
            (Some(quotee), Some(quote)) => (mention_to_key(quotee), quote),
            _ => {
                return self
                    .post_message(
                        ctx,
                        message.channel_id,
                        "Incorrect command usage.\nUse `!quotebot help add` for more information.",
                    )
                    .await;
            }
        };

        let mut quotes = Self::load_quotes(ctx)?;
        quotes.entry(quotee).or_default().push(QuoteEntry {
            quote,
            added_by: message.author.name.clone(),
            added_on: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        });
        Self::save_quotes(ctx, &quotes)?;

        self.post_message(ctx, message.channel_id, "Quote added!").await
    }

    async fn send_random_quote(
        &self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        let quotes = Self::load_quotes(ctx)?;

        if let Some(target) = invocation.arg(0) {
            let key = mention_to_key(target);
            match quotes.get(&key) {
                Some(entries) => {
                    let picked = Self::pick_random(entries);
                    if let Some(quote) = picked {
                        self.post_quote(ctx, message.channel_id, &quote, &key).await?;
                    }
                }
                None => {
                    let name = ctx.client.user_name(&key).await;
                    self.post_message(
                        ctx,
                        message.channel_id,
                        &format!("BEEP BOOP, 404 {} not found!", name),
                    )
                    .await?;
                }
            }
            return Ok(());
        }

        match Self::random_quote(&quotes) {
            Some((quotee, quote)) => {
                let (quotee, quote) = (quotee.to_string(), quote.to_string());
                self.post_quote(ctx, message.channel_id, &quote, &quotee).await
            }
            None => self.post_message(ctx, message.channel_id, "No quotes..").await,
        }
    }

    async fn list_quotes(
        &self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        let quotes = Self::load_quotes(ctx)?;
        let msg = match invocation.arg(0) {
            None => "Incorrect command usage.\nUse `!quotebot help list` for more information."
                .to_string(),
            Some(target) => {
                let key = mention_to_key(target);
                let name = ctx.client.user_name(&key).await;
                match quotes.get(&key) {
                    Some(entries) => {
                        let all: Vec<&str> =
                            entries.iter().map(|entry| entry.quote.as_str()).collect();
                        format!("{}'s quotes are: {}", name, all.join(" | "))
                    }
                    None => format!(
                        "Could not find {} in the pokedex :(\nUse `!quotebot quotees` to list all users with a quote.",
                        name
                    ),
                }
            }
        };
        self.post_message(ctx, message.channel_id, &msg).await
    }

    async fn list_quotees(&self, ctx: &PluginContext, message: &TwiMessage) -> anyhow::Result<()> {
        let quotes = Self::load_quotes(ctx)?;
        let mut names = Vec::new();
        for quotee in quotes.keys() {
            names.push(ctx.client.user_name(quotee).await);
        }
        names.sort();
        self.post_message(ctx, message.channel_id, &names.join(" | ")).await
    }

    async fn find_quote(
        &self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        let (target, sentence) = match (invocation.arg(0), invocation.rest(1)) {
            (Some(target), Some(sentence)) => (target, sentence),
            _ => {
                return self
                    .post_message(
                        ctx,
                        message.channel_id,
                        "Incorrect command usage.\nUse `!quotebot help find` for more information.",
                    )
                    .await;
            }
        };

        let search_all = target == "*";
        let key = mention_to_key(target);
        let quotes = Self::load_quotes(ctx)?;

        if !search_all && !quotes.contains_key(&key) {
            let name = ctx.client.user_name(&key).await;
            return self
                .post_message(ctx, message.channel_id, &format!("Could not find {} :c", name))
                .await;
        }

        let needle = sentence.to_lowercase();
        let mut found: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (quotee, entries) in quotes.iter() {
            if !search_all && *quotee != key {
                continue;
            }
            for entry in entries {
                if entry.quote.to_lowercase().contains(&needle) {
                    found.entry(quotee.as_str()).or_default().push(entry.quote.as_str());
                }
            }
        }

        let found_length: usize = found.values().map(|quotes| quotes.len()).sum();
        match found_length {
            0 => {
                let msg = if search_all {
                    format!("Could not find any occurence of '{}'", sentence)
                } else {
                    let name = ctx.client.user_name(&key).await;
                    format!("Could not find {} saying '{}'", name, sentence)
                };
                self.post_message(ctx, message.channel_id, &msg).await
            }
            1 => {
                if let Some((quotee, quotes)) = found.iter().next() {
                    let (quotee, quote) = (quotee.to_string(), quotes[0].to_string());
                    self.post_quote(ctx, message.channel_id, &quote, &quotee).await?;
                }
                Ok(())
            }
            n if n > MAX_FIND_RESULTS => {
                self.post_message(
                    ctx,
                    message.channel_id,
                    &format!(
                        "Found more than {} quotes matching '{}'. Skipping output.",
                        MAX_FIND_RESULTS, sentence
                    ),
                )
                .await
            }
            _ => {
                self.post_message(
                    ctx,
                    message.channel_id,
                    &format!("Found these quotes containing '{}':", sentence),
                )
                .await?;
                for (quotee, quotes) in found.iter() {
                    let name = ctx.client.user_name(quotee).await;
                    self.post_message(
                        ctx,
                        message.channel_id,
                        &format!("{}: {}", name, quotes.join(" | ")),
                    )
                    .await?;
                }
                Ok(())
            }
        }
    }

    async fn show_stats(&self, ctx: &PluginContext, message: &TwiMessage) -> anyhow::Result<()> {
        let quotes = Self::load_quotes(ctx)?;
        let total: usize = quotes.values().map(|entries| entries.len()).sum();
        self.post_message(
            ctx,
            message.channel_id,
            &format!("Total quote count: {}", total),
        )
        .await?;

        let mut counts: Vec<(&String, usize)> = quotes
            .iter()
            .map(|(quotee, entries)| (quotee, entries.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        let mut msg = "Quote top 5:\n".to_string();
        for (quotee, count) in counts.iter().take(5) {
            msg.push_str(&format!("    {}: {}\n", count, ctx.client.user_name(quotee).await));
        }
        self.post_message(ctx, message.channel_id, &msg).await
    }
}

#[async_trait]
impl Plugin for QuotePlugin {
    fn name(&self) -> &'static str {
        "quotebot"
    }

    fn command_names(&self) -> &[&'static str] {
        &["quotebot", "qb"]
    }

    async fn on_event(&mut self, ctx: &PluginContext, event: &ChatEvent) -> anyhow::Result<()> {
        if let ChatEvent::MessageCreate(message) = event {
            let count = self.message_count.entry(message.channel_id).or_insert(0);
            *count += 1;
            if *count == QUOTE_TRIGGER_COUNT {
                *count = 0;
                let quotes = Self::load_quotes(ctx)?;
                if let Some((quotee, quote)) = Self::random_quote(&quotes) {
                    let (quotee, quote) = (quotee.to_string(), quote.to_string());
                    self.post_quote(ctx, message.channel_id, &quote, &quotee).await?;
                }
            }
        }
        Ok(())
    }

    async fn on_command(
        &mut self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        match invocation.command() {
            Some("add") | Some("append") => self.add_quote(ctx, message, invocation).await,
            Some("random") => self.send_random_quote(ctx, message, invocation).await,
            Some("list") => self.list_quotes(ctx, message, invocation).await,
            Some("quotees") => self.list_quotees(ctx, message).await,
            Some("find") => self.find_quote(ctx, message, invocation).await,
            Some("stats") => self.show_stats(ctx, message).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(quote: &str) -> QuoteEntry {
        QuoteEntry {
            quote: quote.to_string(),
            added_by: "hendrik".to_string(),
            added_on: "2026-08-25 12:00:00".to_string(),
        }
    }

    #[test]
    fn pick_random_clones_one_of_the_quotes() {
        let entries = vec![entry("dat is straf"), entry("goe bezig")];
        let picked = QuotePlugin::pick_random(&entries).unwrap();
        assert!(entries.iter().any(|entry| entry.quote == picked));

        assert!(QuotePlugin::pick_random(&[]).is_none());
    }

    #[test]
    fn random_quote_spans_all_quotees() {
        let mut quotes = QuoteBook::new();
        quotes.insert("1".to_string(), vec![entry("dat is straf")]);
        quotes.insert("2".to_string(), vec![entry("goe bezig")]);

        let (quotee, quote) = QuotePlugin::random_quote(&quotes).unwrap();
        assert!(quotes[quotee].iter().any(|entry| entry.quote == quote));

        assert!(QuotePlugin::random_quote(&QuoteBook::new()).is_none());
    }
}
