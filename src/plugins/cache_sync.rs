//! Keeps the SQLite entity cache in step with gateway dispatch events.
//!
//! This plugin has no commands; it only watches the event stream and writes
//! rows for every user, guild, channel and member it sees.

use async_trait::async_trait;
use twilight_model::channel::Channel;

use crate::cache::CachedChannel;
use crate::types::ChatEvent;

use super::{Plugin, PluginContext};

pub struct CacheSyncPlugin;

impl CacheSyncPlugin {
    fn channel_row(channel: &Channel) -> CachedChannel {
        // DM channels carry no name; fall back to the recipient's.
        let recipient = channel
            .recipients
            .as_ref()
            .and_then(|recipients| recipients.first());
        let name = channel
            .name
            .clone()
            .or_else(|| recipient.map(|user| user.name.clone()))
            .unwrap_or_default();
        CachedChannel {
            channel_id: channel.id.to_string(),
            name,
            kind: channel.kind.name().to_string(),
            guild_id: channel.guild_id.map(|id| id.to_string()),
            user_id: recipient.map(|user| user.id.to_string()),
        }
    }
}

#[async_trait]
impl Plugin for CacheSyncPlugin {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn command_names(&self) -> &[&'static str] {
        &[]
    }

    async fn on_event(&mut self, ctx: &PluginContext, event: &ChatEvent) -> anyhow::Result<()> {
        match event {
            ChatEvent::MessageCreate(message) => {
                ctx.cache
                    .update_user(&message.author.id.to_string(), &message.author.name)?;
            }
            ChatEvent::GuildCreate(guild) => {
                ctx.cache
                    .update_guild(&guild.id.to_string(), &guild.name)?;
                for channel in guild.channels.iter() {
                    ctx.cache.update_channel(&Self::channel_row(channel))?;
                }
                for member in guild.members.iter() {
                    ctx.cache
                        .update_user(&member.user.id.to_string(), &member.user.name)?;
                    ctx.cache.update_member(
                        &guild.id.to_string(),
                        &member.user.id.to_string(),
                        member.nick.as_deref(),
                    )?;
                }
            }
            ChatEvent::GuildUpdate { id, name } => {
                ctx.cache.update_guild(&id.to_string(), name)?;
            }
            ChatEvent::GuildDelete(id) => {
                ctx.cache.remove_guild(&id.to_string());
            }
            ChatEvent::ChannelChange(channel) => {
                ctx.cache.update_channel(&Self::channel_row(channel))?;
            }
            ChatEvent::ChannelDelete(id) => {
                ctx.cache.remove_channel(&id.to_string());
            }
            ChatEvent::MemberChange {
                guild_id,
                user,
                nick,
            } => {
                ctx.cache.update_user(&user.id.to_string(), &user.name)?;
                ctx.cache.update_member(
                    &guild_id.to_string(),
                    &user.id.to_string(),
                    nick.as_deref(),
                )?;
            }
            ChatEvent::UserChange(user) => {
                ctx.cache.update_user(&user.id.to_string(), &user.name)?;
            }
            _ => {}
        }
        Ok(())
    }
}
