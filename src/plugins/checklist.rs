//! Shared checklist: items, responsible users, and a free-form status.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::{mention_to_key, CommandInvocation};
use crate::table;
use crate::types::TwiMessage;

use super::{Plugin, PluginContext};

const SHOW_CHUNK: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub item: String,
    pub users: Vec<String>,
    pub status: String,
}

pub struct ChecklistPlugin;

impl ChecklistPlugin {
    fn load(ctx: &PluginContext) -> anyhow::Result<Vec<ChecklistItem>> {
        Ok(ctx.store.get_or_default("checklist", "items")?)
    }

    fn save(ctx: &PluginContext, items: &[ChecklistItem]) -> anyhow::Result<()> {
        ctx.store.set_value("checklist", "items", items)?;
        Ok(())
    }

    /// Parse a `#3`-style index argument against the current item count.
    fn parse_index(raw: &str, len: usize) -> Result<usize, String> {
        let index: usize = raw
            .trim_start_matches('#')
            .parse()
            .map_err(|_| format!("{} is not a number!", raw))?;
        if index >= len {
            return Err("That's not a valid item index".to_string());
        }
        Ok(index)
    }

    async fn add_item(
        &self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        let item = match invocation.rest(0) {
            Some(item) => item,
            None => {
                ctx.client
                    .create_message(message.channel_id, "Usage: `!checklist additem <text>`")
                    .await?;
                return Ok(());
            }
        };

        let index = Self::load(ctx)?.len();
        ctx.store.append_value(
            "checklist",
            "items",
            ChecklistItem {
                item: item.clone(),
                users: Vec::new(),
                status: "NOT DONE".to_string(),
            },
        )?;

        ctx.client
            .create_message(
                message.channel_id,
                &format!("Item #{}: {} added to the list!", index, item),
            )
            .await?;
        Ok(())
    }

    async fn add_user(
        &self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        let (raw_index, user) = match (invocation.arg(0), invocation.arg(1)) {
            (Some(raw_index), Some(user)) => (raw_index, user.to_string()),
            _ => {
                ctx.client
                    .create_message(message.channel_id, "Usage: `!checklist adduser <#item> <user>`")
                    .await?;
                return Ok(());
            }
        };

        let mut items = Self::load(ctx)?;
        match Self::parse_index(raw_index, items.len()) {
            Ok(index) => {
                items[index].users.push(user.clone());
                Self::save(ctx, &items)?;
                ctx.client
                    .create_message(
                        message.channel_id,
                        &format!("Added {} to item #{}", user, index),
                    )
                    .await?;
            }
            Err(error) => {
                ctx.client.create_message(message.channel_id, &error).await?;
            }
        }
        Ok(())
    }

    async fn update_status(
        &self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        let (raw_index, status) = match (invocation.arg(0), invocation.rest(1)) {
            (Some(raw_index), Some(status)) => (raw_index, status),
            _ => {
                ctx.client
                    .create_message(
                        message.channel_id,
                        "Usage: `!checklist update <#item> <status>`",
                    )
                    .await?;
                return Ok(());
            }
        };

        let mut items = Self::load(ctx)?;
        match Self::parse_index(raw_index, items.len()) {
            Ok(index) => {
                items[index].status = status;
                Self::save(ctx, &items)?;
                ctx.client
                    .create_message(
                        message.channel_id,
                        &format!("Updated status of item #{}", index),
                    )
                    .await?;
            }
            Err(error) => {
                ctx.client.create_message(message.channel_id, &error).await?;
            }
        }
        Ok(())
    }

    async fn show(&self, ctx: &PluginContext, message: &TwiMessage) -> anyhow::Result<()> {
        let items = Self::load(ctx)?;
        let mut rows = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let mut names = Vec::new();
            for user in item.users.iter() {
                let key = mention_to_key(user);
                names.push(ctx.client.user_name(&key).await);
            }
            rows.push(vec![
                index.to_string(),
                item.item.clone(),
                item.status.clone(),
                names.join(","),
            ]);
        }

        for chunk in rows.chunks(SHOW_CHUNK) {
            let rendered = table::render(&["#", "item", "status", "relevant users"], chunk);
            ctx.client.create_message(message.channel_id, &rendered).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for ChecklistPlugin {
    fn name(&self) -> &'static str {
        "checklist"
    }

    fn command_names(&self) -> &[&'static str] {
        &["checklist"]
    }

    async fn on_command(
        &mut self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        match invocation.command() {
            Some("additem") => self.add_item(ctx, message, invocation).await,
            Some("adduser") => self.add_user(ctx, message, invocation).await,
            Some("update") => self.update_status(ctx, message, invocation).await,
            Some("show") => self.show(ctx, message).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_parsing() {
        assert_eq!(ChecklistPlugin::parse_index("#2", 3), Ok(2));
        assert_eq!(ChecklistPlugin::parse_index("2", 3), Ok(2));
        assert_eq!(
            ChecklistPlugin::parse_index("#3", 3),
            Err("That's not a valid item index".to_string())
        );
        assert_eq!(
            ChecklistPlugin::parse_index("twee", 3),
            Err("twee is not a number!".to_string())
        );
    }
}
