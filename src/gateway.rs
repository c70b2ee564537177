//! Gateway connection handler.
//!
//! The shard owns the socket; session management, identify and heartbeats
//! are its problem. This module runs the read loop, classifies the wire
//! events into [`ChatEvent`]s and forwards them to the system dispatcher.
//! A fatal receive error closes the loop; the supervisor in `main` tears the
//! system down and respawns it.

use tokio::sync::mpsc::Sender;
use twilight_gateway::{Event, Intents, Shard, ShardId};

use crate::types::{ChatEvent, ReactionEvent, SystemEvent};

pub struct Gateway {
    shard: Shard,
    emitter: Sender<SystemEvent>,
}

impl Gateway {
    pub fn new(discord_token: &str, emitter: Sender<SystemEvent>) -> Self {
        let intents = Intents::GUILDS
            | Intents::GUILD_MEMBERS
            | Intents::GUILD_MESSAGES
            | Intents::GUILD_MESSAGE_REACTIONS
            | Intents::DIRECT_MESSAGES
            | Intents::MESSAGE_CONTENT;

        Self {
            shard: Shard::new(ShardId::ONE, discord_token.to_string(), intents),
            emitter,
        }
    }

    /// Run the read loop until the connection fails fatally or the system
    /// side hangs up.
    pub fn start_listening(mut self) {
        tokio::spawn(async move {
            loop {
                match self.shard.next_event().await {
                    Err(source) => {
                        if self
                            .emitter
                            .send(SystemEvent::GatewayError(source.to_string()))
                            .await
                            .is_err()
                        {
                            return;
                        }

                        if source.is_fatal() {
                            let _ = self.emitter.send(SystemEvent::GatewayClosed).await;
                            return;
                        }
                        // Non-fatal errors are retried by the shard itself.
                    }
                    Ok(event) => {
                        if let Some(system_event) = classify(event) {
                            if self.emitter.send(system_event).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Map a wire event onto the system event the dispatcher understands.
/// Everything the plugins have no use for is dropped here.
fn classify(event: Event) -> Option<SystemEvent> {
    match event {
        Event::Ready(ready) => Some(SystemEvent::GatewayConnected(ready.user.clone())),

        Event::MessageCreate(message_create) => Some(SystemEvent::Chat(ChatEvent::MessageCreate(
            Box::new(message_create.0),
        ))),
        Event::MessageUpdate(message_update) => {
            Some(SystemEvent::Chat(ChatEvent::MessageUpdate(message_update)))
        }

        Event::ReactionAdd(reaction_add) => {
            let reaction = reaction_add.0;
            Some(SystemEvent::Chat(ChatEvent::ReactionAdd(ReactionEvent {
                channel_id: reaction.channel_id,
                message_id: reaction.message_id,
                user_id: reaction.user_id,
                emoji: reaction.emoji,
            })))
        }
        Event::ReactionRemove(reaction_remove) => {
            let reaction = reaction_remove.0;
            Some(SystemEvent::Chat(ChatEvent::ReactionRemove(ReactionEvent {
                channel_id: reaction.channel_id,
                message_id: reaction.message_id,
                user_id: reaction.user_id,
                emoji: reaction.emoji,
            })))
        }

        Event::GuildCreate(guild_create) => Some(SystemEvent::Chat(ChatEvent::GuildCreate(
            Box::new(guild_create.0),
        ))),
        Event::GuildUpdate(guild_update) => Some(SystemEvent::Chat(ChatEvent::GuildUpdate {
            id: guild_update.id,
            name: guild_update.name.clone(),
        })),
        Event::GuildDelete(guild_delete) => {
            Some(SystemEvent::Chat(ChatEvent::GuildDelete(guild_delete.id)))
        }

        Event::ChannelCreate(channel_create) => Some(SystemEvent::Chat(ChatEvent::ChannelChange(
            Box::new(channel_create.0),
        ))),
        Event::ChannelUpdate(channel_update) => Some(SystemEvent::Chat(ChatEvent::ChannelChange(
            Box::new(channel_update.0),
        ))),
        Event::ChannelDelete(channel_delete) => {
            Some(SystemEvent::Chat(ChatEvent::ChannelDelete(channel_delete.id)))
        }

        Event::MemberAdd(member_add) => Some(SystemEvent::Chat(ChatEvent::MemberChange {
            guild_id: member_add.guild_id,
            user: member_add.user.clone(),
            nick: member_add.nick.clone(),
        })),
        Event::MemberUpdate(member_update) => Some(SystemEvent::Chat(ChatEvent::MemberChange {
            guild_id: member_update.guild_id,
            user: member_update.user,
            nick: member_update.nick,
        })),

        Event::UserUpdate(user_update) => {
            Some(SystemEvent::Chat(ChatEvent::UserChange(user_update.0)))
        }

        _ => None,
    }
}
