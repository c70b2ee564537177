pub use twilight_model::channel::Message as TwiMessage;
use twilight_model::channel::message::ReactionType;
use twilight_model::channel::Channel;
use twilight_model::gateway::payload::incoming::MessageUpdate as PartialMessage;
use twilight_model::guild::Guild;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker, WebhookMarker};
use twilight_model::id::Id;
use twilight_model::user::{CurrentUser, User};

pub type MessageId = Id<MessageMarker>;
pub type ChannelId = Id<ChannelMarker>;
pub type GuildId = Id<GuildMarker>;
pub type UserId = Id<UserMarker>;
pub type WebhookId = Id<WebhookMarker>;

/// A reaction being added to or removed from a message.
#[derive(Clone, Debug)]
pub struct ReactionEvent {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: ReactionType,
}

/// A dispatch event, classified down from the gateway wire events to the
/// handful of shapes the plugins act on.
#[derive(Clone, Debug)]
pub enum ChatEvent {
    MessageCreate(Box<TwiMessage>),
    MessageUpdate(Box<PartialMessage>),
    ReactionAdd(ReactionEvent),
    ReactionRemove(ReactionEvent),
    GuildCreate(Box<Guild>),
    GuildUpdate { id: GuildId, name: String },
    GuildDelete(GuildId),
    ChannelChange(Box<Channel>),
    ChannelDelete(ChannelId),
    MemberChange {
        guild_id: GuildId,
        user: User,
        nick: Option<String>,
    },
    UserChange(CurrentUser),
}

/// Everything the system dispatch loop receives: connection lifecycle,
/// dispatch events, and expired plugin timers.
pub enum SystemEvent {
    GatewayConnected(CurrentUser),
    GatewayError(String),
    GatewayClosed,
    Chat(ChatEvent),
    Timer { plugin: &'static str, key: String },
}
