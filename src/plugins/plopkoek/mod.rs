//! The plopkoek economy: donate kudos tokens by message or reaction.

mod ledger;

use std::sync::LazyLock;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use twilight_model::channel::message::embed::{Embed, EmbedAuthor};
use twilight_model::channel::message::ReactionType;

use crate::cache::CacheError;
use crate::client::ChatClient;
use crate::command::{mention_to_key, parse_mention, CommandInvocation};
use crate::table;
use crate::types::{ChatEvent, ReactionEvent, TwiMessage, UserId};

pub use ledger::{Ledger, Period, RankingRow, DONATIONS_PER_DAY};

use super::{Plugin, PluginContext, QuoteEntry};

const RANKING_CHUNK: usize = 10;

static EMOTE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<a?:\w+:(?<id>\d+)>$").expect("emote regex compiles"));

/// The custom emoji id inside an `<:name:id>` emote string.
fn emote_id(emote: &str) -> Option<String> {
    EMOTE_ID_REGEX
        .captures(emote)
        .map(|captures| captures["id"].to_string())
}

/// A two-token message pairing the plopkoek emote with a user mention is a
/// donation; returns the mentioned user.
fn parse_donation(content: &str, emote: &str) -> Option<Result<UserId, &'static str>> {
    if !content.contains(emote) {
        return None;
    }
    let tokens: Vec<&str> = content.split_whitespace().collect();
    if tokens.len() != 2 {
        return None;
    }
    let target = tokens.into_iter().find(|token| *token != emote)?;
    Some(parse_mention(target).ok_or("not a mention"))
}

/// Quotes posted through the webhook carry a ` -name` suffix outside the
/// general channel; strip it before matching against the quote book.
fn strip_quote_suffix(content: &str) -> String {
    match content.rfind(" -") {
        Some(index) => content[..index].to_string(),
        None => content.to_string(),
    }
}

/// Donation guard: donating to yourself never works, and the donator's
/// daily allowance must not be exhausted.
fn donation_allowed(
    ledger: &Ledger,
    donator_id: &str,
    receiver_id: &str,
) -> Result<bool, CacheError> {
    if donator_id == receiver_id {
        return Ok(false);
    }
    Ok(ledger.donations_left(donator_id)? > 0)
}

fn quote_embed(author_name: &str, icon_url: Option<String>, description: &str) -> Embed {
    Embed {
        author: Some(EmbedAuthor {
            icon_url,
            name: author_name.to_string(),
            proxy_icon_url: None,
            url: None,
        }),
        color: None,
        description: Some(description.to_string()),
        fields: Vec::new(),
        footer: None,
        image: None,
        kind: "rich".to_string(),
        provider: None,
        thumbnail: None,
        timestamp: None,
        title: None,
        url: None,
        video: None,
    }
}

pub struct PlopkoekPlugin {
    emote_id: Option<String>,
}

impl PlopkoekPlugin {
    pub fn new(emote: &str) -> Self {
        let emote_id = emote_id(emote);
        if emote_id.is_none() {
            tracing::warn!(emote, "plopkoek emote has no custom emoji id, reactions disabled");
        }
        Self { emote_id }
    }

    fn emoji_matches(&self, emoji: &ReactionType) -> bool {
        match (emoji, &self.emote_id) {
            (ReactionType::Custom { id, .. }, Some(emote_id)) => id.to_string() == *emote_id,
            _ => false,
        }
    }

    async fn handle_message(&self, ctx: &PluginContext, message: &TwiMessage) -> anyhow::Result<()> {
        let target = match parse_donation(&message.content, &ctx.system_config.plopkoek_emote) {
            Some(Ok(target)) => target,
            Some(Err(_)) => {
                let _ = ctx
                    .client
                    .dm_user(
                        message.author.id,
                        "Kon geen plopkoek geven aan onbekende gebruiker. Geen zorgen, de plopkoek is veilig terug in je kluis gestoken.",
                        None,
                    )
                    .await;
                return Ok(());
            }
            None => return Ok(()),
        };

        self.add_plopkoek(
            ctx,
            target,
            message.author.id,
            &message.channel_id.to_string(),
            &message.id.to_string(),
            &message.content,
        )
        .await
    }

    /// Who a reaction actually credits. Reactions on the bot's own messages
    /// or on webhook quotes go to the quotee when the text matches the quote
    /// book, and to the bot account otherwise.
    async fn resolve_receiver(
        &self,
        ctx: &PluginContext,
        message: &TwiMessage,
    ) -> anyhow::Result<UserId> {
        let bot_id = ctx.bot_user_id();
        let is_bot_message = Some(message.author.id) == bot_id;
        let is_quote_webhook = match (&ctx.system_config.quote_webhook, message.webhook_id) {
            (Some(webhook), Some(webhook_id)) => webhook.webhook_id()? == webhook_id,
            _ => false,
        };

        if !is_bot_message && !is_quote_webhook {
            return Ok(message.author.id);
        }

        let mut content = message.content.clone();
        if message.author.name == ctx.system_config.bot_display_name && content.contains(" -") {
            content = strip_quote_suffix(&content);
        }

        let quotes: std::collections::BTreeMap<String, Vec<QuoteEntry>> =
            ctx.store.get_or_default("quotebot", "quotes")?;
        for (quotee, entries) in quotes.iter() {
            if entries.iter().any(|entry| entry.quote == content) {
                if let Ok(user_id) = quotee.parse::<u64>() {
                    return Ok(UserId::new(user_id));
                }
            }
        }

        bot_id.ok_or_else(|| anyhow::anyhow!("bot user not known yet"))
    }

    async fn handle_reaction_add(
        &self,
        ctx: &PluginContext,
        reaction: &ReactionEvent,
    ) -> anyhow::Result<()> {
        if !self.emoji_matches(&reaction.emoji) {
            return Ok(());
        }
        let message = ctx
            .client
            .fetch_message(reaction.channel_id, reaction.message_id)
            .await?;
        let receiver = self.resolve_receiver(ctx, &message).await?;

        self.add_plopkoek(
            ctx,
            receiver,
            reaction.user_id,
            &reaction.channel_id.to_string(),
            &reaction.message_id.to_string(),
            &message.content,
        )
        .await
    }

    async fn handle_reaction_remove(
        &self,
        ctx: &PluginContext,
        reaction: &ReactionEvent,
    ) -> anyhow::Result<()> {
        if !self.emoji_matches(&reaction.emoji) {
            return Ok(());
        }
        let message = ctx
            .client
            .fetch_message(reaction.channel_id, reaction.message_id)
            .await?;
        let receiver = self.resolve_receiver(ctx, &message).await?;

        self.remove_plopkoek(
            ctx,
            receiver,
            reaction.user_id,
            &reaction.channel_id.to_string(),
            &reaction.message_id.to_string(),
            &message.content,
        )
        .await
    }

    async fn add_plopkoek(
        &self,
        ctx: &PluginContext,
        receiver: UserId,
        donator: UserId,
        channel_id: &str,
        message_id: &str,
        message_content: &str,
    ) -> anyhow::Result<()> {
        let donator_key = donator.to_string();
        let receiver_key = receiver.to_string();
        if !donation_allowed(&ctx.ledger, &donator_key, &receiver_key)? {
            return Ok(());
        }

        ctx.ledger.insert(&donator_key, &receiver_key, channel_id, message_id)?;

        let receiver_name = ctx.client.user_name(&receiver_key).await;
        let donator_name = ctx.client.user_name(&donator_key).await;
        let icon_url = ctx
            .client
            .fetch_user(receiver)
            .await
            .ok()
            .and_then(|user| ChatClient::avatar_url(&user));
        let embed = quote_embed(&receiver_name, icon_url, message_content);

        // Webhook identities cannot receive DMs; failures here are expected.
        let income = ctx.ledger.income(&receiver_key, Period::Month)?;
        let _ = ctx
            .client
            .dm_user(
                receiver,
                &format!(
                    "Je hebt een plopkoek van {} gekregen!  Je hebt er nu {} deze maand verzameld. Goe bezig!",
                    donator_name, income
                ),
                Some(embed.clone()),
            )
            .await;

        let donations_left = ctx.ledger.donations_left(&donator_key)?;
        let content = if donations_left == 0 {
            format!(
                "Je hebt een plopkoek aan {} gegeven.  Da was uwe laatste plopkoek van vandaag, geefde gij ook zo gemakkelijk geld uit?",
                receiver_name
            )
        } else {
            format!(
                "Je hebt een plopkoek aan {} gegeven.  Je kan er vandaag nog {} uitgeven. Spenden die handel!",
                receiver_name, donations_left
            )
        };
        let _ = ctx.client.dm_user(donator, &content, Some(embed)).await;

        Ok(())
    }

    async fn remove_plopkoek(
        &self,
        ctx: &PluginContext,
        receiver: UserId,
        donator: UserId,
        channel_id: &str,
        message_id: &str,
        _message_content: &str,
    ) -> anyhow::Result<()> {
        let donator_key = donator.to_string();
        let receiver_key = receiver.to_string();
        if !ctx
            .ledger
            .has_donated(&donator_key, &receiver_key, channel_id, message_id)?
        {
            return Ok(());
        }
        ctx.ledger.delete(&donator_key, &receiver_key, channel_id, message_id)?;

        let receiver_name = ctx.client.user_name(&receiver_key).await;
        let donator_name = ctx.client.user_name(&donator_key).await;

        let income = ctx.ledger.income(&receiver_key, Period::Month)?;
        let _ = ctx
            .client
            .dm_user(
                receiver,
                &format!(
                    "{} heeft een plopkoek afgepakt :O  Je hebt er nu nog {} deze maand over.",
                    donator_name, income
                ),
                None,
            )
            .await;

        let donations_left = ctx.ledger.donations_left(&donator_key)?;
        let _ = ctx
            .client
            .dm_user(
                donator,
                &format!(
                    "Je hebt een plopkoek die je aan {} hebt gegeven teruggenomen. (Gij se evil bastard!) Je kan er vandaag nog {} uitgeven.",
                    receiver_name, donations_left
                ),
                None,
            )
            .await;

        Ok(())
    }

    /// `!pk total [user]` / `!pk grandtotal [user]`.
    async fn show_total(
        &self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
        alltime: bool,
    ) -> anyhow::Result<()> {
        let key = match invocation.arg(0) {
            Some(target) => mention_to_key(target),
            None => message.author.id.to_string(),
        };
        let name = ctx.client.user_name(&key).await;

        let content = if alltime {
            format!(
                "{} has so far earned {} plopkoeks in total!",
                name,
                ctx.ledger.total_income(&key)?
            )
        } else {
            format!(
                "{} has so far earned {} plopkoeks this month.",
                name,
                ctx.ledger.income(&key, Period::Month)?
            )
        };
        ctx.client.create_message(message.channel_id, &content).await?;
        Ok(())
    }

    async fn show_leaders(
        &self,
        ctx: &PluginContext,
        message: &TwiMessage,
        rows: Vec<RankingRow>,
    ) -> anyhow::Result<()> {
        if rows.is_empty() {
            ctx.client
                .create_message(message.channel_id, "No data for the given period :(")
                .await?;
            return Ok(());
        }

        let names = join_all(rows.iter().map(|row| ctx.client.user_name(&row.user_id))).await;
        let table_rows: Vec<Vec<String>> = rows
            .iter()
            .zip(names)
            .map(|(row, name)| {
                vec![row.received.to_string(), row.donated.to_string(), name]
            })
            .collect();

        for chunk in table_rows.chunks(RANKING_CHUNK) {
            let rendered = table::render(&["received", "donated", "user"], chunk);
            ctx.client.create_message(message.channel_id, &rendered).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for PlopkoekPlugin {
    fn name(&self) -> &'static str {
        "plopkoekbot"
    }

    fn command_names(&self) -> &[&'static str] {
        &["plopkoekbot", "pk"]
    }

    async fn on_event(&mut self, ctx: &PluginContext, event: &ChatEvent) -> anyhow::Result<()> {
        match event {
            ChatEvent::MessageCreate(message) => self.handle_message(ctx, message).await,
            ChatEvent::ReactionAdd(reaction) => self.handle_reaction_add(ctx, reaction).await,
            ChatEvent::ReactionRemove(reaction) => {
                self.handle_reaction_remove(ctx, reaction).await
            }
            _ => Ok(()),
        }
    }

    async fn on_command(
        &mut self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        match invocation.command() {
            Some("total") => self.show_total(ctx, message, invocation, false).await,
            Some("grandtotal") => self.show_total(ctx, message, invocation, true).await,
            Some("leaders") => {
                let rows = ctx
                    .ledger
                    .month_ranking(invocation.arg(0), invocation.arg(1))?;
                self.show_leaders(ctx, message, rows).await
            }
            Some("grandleaders") => {
                let rows = ctx.ledger.alltime_ranking()?;
                self.show_leaders(ctx, message, rows).await
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emote_id_extraction() {
        assert_eq!(
            emote_id("<:plop:236155120067411968>").as_deref(),
            Some("236155120067411968")
        );
        assert_eq!(
            emote_id("<a:plop:236155120067411968>").as_deref(),
            Some("236155120067411968")
        );
        assert_eq!(emote_id(":plop:"), None);
        assert_eq!(emote_id("🎉"), None);
    }

    #[test]
    fn donation_requires_emote_plus_mention() {
        let emote = "<:plop:236155120067411968>";
        let target = parse_donation("<@236154927528064002> <:plop:236155120067411968>", emote);
        assert_eq!(target, Some(Ok(UserId::new(236154927528064002))));

        // order does not matter
        let target = parse_donation("<:plop:236155120067411968> <@236154927528064002>", emote);
        assert_eq!(target, Some(Ok(UserId::new(236154927528064002))));

        // not a mention: donation shape, unknown target
        assert_eq!(
            parse_donation("<:plop:236155120067411968> hendrik", emote),
            Some(Err("not a mention"))
        );

        // too many tokens or missing emote: not a donation at all
        assert_eq!(
            parse_donation("goed bezig <@236154927528064002> <:plop:236155120067411968>", emote),
            None
        );
        assert_eq!(parse_donation("<@236154927528064002> hallo", emote), None);
    }

    #[test]
    fn self_donation_is_blocked() {
        let cache = crate::cache::Cache::open_in_memory().unwrap();
        let ledger = Ledger::new(cache.pool()).unwrap();
        assert!(!donation_allowed(&ledger, "1", "1").unwrap());
        assert!(donation_allowed(&ledger, "1", "2").unwrap());
    }

    #[test]
    fn exhausted_allowance_blocks_donations() {
        let cache = crate::cache::Cache::open_in_memory().unwrap();
        let ledger = Ledger::new(cache.pool()).unwrap();
        for message_id in 0..DONATIONS_PER_DAY {
            ledger
                .insert("1", "2", "30", &message_id.to_string())
                .unwrap();
        }
        assert!(!donation_allowed(&ledger, "1", "3").unwrap());
        // Receiving does not spend the receiver's allowance.
        assert!(donation_allowed(&ledger, "2", "1").unwrap());
    }

    #[test]
    fn quote_suffix_stripping() {
        assert_eq!(strip_quote_suffix("dat is straf -hendrik"), "dat is straf");
        assert_eq!(
            strip_quote_suffix("eerst -dit en dan -dat"),
            "eerst -dit en dan"
        );
        assert_eq!(strip_quote_suffix("geen naam"), "geen naam");
    }
}
