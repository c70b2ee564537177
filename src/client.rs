//! Outbound HTTP surface: message creation, DMs, webhooks and user lookup.
//!
//! User lookups go through an LRU layer and the SQLite cache before touching
//! the platform API; fetched users are written back to both.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use twilight_http::client::Client as TwiClient;
use twilight_http::error::Error as TwiError;
use twilight_http::response::DeserializeBodyError;
use twilight_model::channel::message::Embed;
use twilight_model::user::User;
use twilight_validate::message::MessageValidationError;

use crate::cache::{Cache, CacheError};
use crate::types::{ChannelId, MessageId, TwiMessage, UserId, WebhookId};

const USER_LOOKUP_CAPACITY: usize = 100;

#[derive(Debug)]
pub enum ClientError {
    MessageValidation(MessageValidationError),
    Http(TwiError),
    ResponseDeserialization(DeserializeBodyError),
    Cache(CacheError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::MessageValidation(err) => write!(f, "message validation: {}", err),
            ClientError::Http(err) => write!(f, "http request: {}", err),
            ClientError::ResponseDeserialization(err) => write!(f, "response body: {}", err),
            ClientError::Cache(err) => write!(f, "cache: {}", err),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<MessageValidationError> for ClientError {
    fn from(value: MessageValidationError) -> Self {
        ClientError::MessageValidation(value)
    }
}

impl From<TwiError> for ClientError {
    fn from(value: TwiError) -> Self {
        ClientError::Http(value)
    }
}

impl From<DeserializeBodyError> for ClientError {
    fn from(value: DeserializeBodyError) -> Self {
        ClientError::ResponseDeserialization(value)
    }
}

impl From<CacheError> for ClientError {
    fn from(value: CacheError) -> Self {
        ClientError::Cache(value)
    }
}

#[derive(Clone)]
pub struct ChatClient {
    http: Arc<TwiClient>,
    cache: Cache,
    users: Arc<Mutex<LruCache<UserId, User>>>,
}

impl ChatClient {
    pub fn new(discord_token: &str, cache: Cache) -> Self {
        Self {
            http: Arc::new(TwiClient::new(discord_token.to_string())),
            cache,
            users: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(USER_LOOKUP_CAPACITY).expect("capacity is non-zero"),
            ))),
        }
    }

    pub async fn create_message(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> Result<TwiMessage, ClientError> {
        let message = self
            .http
            .create_message(channel_id)
            .content(content)?
            .await?
            .model()
            .await?;
        Ok(message)
    }

    pub async fn create_embed_message(
        &self,
        channel_id: ChannelId,
        content: &str,
        embed: Embed,
    ) -> Result<TwiMessage, ClientError> {
        let message = self
            .http
            .create_message(channel_id)
            .content(content)?
            .embeds(&[embed])?
            .await?
            .model()
            .await?;
        Ok(message)
    }

    /// Open (or reuse) the DM channel for a user and send a message there.
    pub async fn dm_user(
        &self,
        user_id: UserId,
        content: &str,
        embed: Option<Embed>,
    ) -> Result<TwiMessage, ClientError> {
        let channel = self
            .http
            .create_private_channel(user_id)
            .await?
            .model()
            .await?;

        match embed {
            Some(embed) => self.create_embed_message(channel.id, content, embed).await,
            None => self.create_message(channel.id, content).await,
        }
    }

    pub async fn execute_webhook(
        &self,
        webhook_id: WebhookId,
        token: &str,
        content: &str,
        username: &str,
        avatar_url: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut request = self
            .http
            .execute_webhook(webhook_id, token)
            .content(content)?
            .username(username)?;
        if let Some(avatar_url) = avatar_url {
            request = request.avatar_url(avatar_url);
        }
        request.await?;
        Ok(())
    }

    pub async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<TwiMessage, ClientError> {
        let message = self
            .http
            .message(channel_id, message_id)
            .await?
            .model()
            .await?;
        Ok(message)
    }

    /// Fetch a user, preferring the in-process LRU. API hits are written back
    /// to both the LRU and the SQLite cache.
    pub async fn fetch_user(&self, user_id: UserId) -> Result<User, ClientError> {
        if let Some(user) = self.users.lock().expect("user lru poisoned").get(&user_id) {
            return Ok(user.clone());
        }

        let user = self.http.user(user_id).await?.model().await?;
        self.cache
            .update_user(&user.id.to_string(), user.name.as_str())?;
        self.users
            .lock()
            .expect("user lru poisoned")
            .put(user_id, user.clone());
        Ok(user)
    }

    /// Resolve a user id string to a display name. Falls back to the SQLite
    /// cache before the API, and to the input itself when nothing resolves,
    /// so plain-text quotee names pass through unchanged.
    pub async fn user_name(&self, target: &str) -> String {
        if target.len() < 17 {
            return target.to_string();
        }
        let user_id = match UserId::from_str(target) {
            Ok(user_id) => user_id,
            Err(_) => return target.to_string(),
        };

        if let Ok(cached) = self.cache.get_user(target) {
            return cached.name;
        }

        match self.fetch_user(user_id).await {
            Ok(user) => user.name,
            Err(err) => {
                tracing::debug!(target, "could not resolve user name: {}", err);
                target.to_string()
            }
        }
    }

    pub fn avatar_url(user: &User) -> Option<String> {
        user.avatar.map(|avatar| {
            format!("https://cdn.discordapp.com/avatars/{}/{}.jpg", user.id, avatar)
        })
    }
}
