//! Timed votes: announce a subject, wait, announce the end.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::command::CommandInvocation;
use crate::types::{ChannelId, TwiMessage};

use super::{Plugin, PluginContext};

const DEFAULT_TIMER_SECONDS: u64 = 60;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollRecord {
    pub subject: String,
    pub added_by: String,
    pub added_on: String,
    pub timer: u64,
    pub channel_id: String,
}

pub struct PollPlugin;

#[async_trait]
impl Plugin for PollPlugin {
    fn name(&self) -> &'static str {
        "vote"
    }

    fn command_names(&self) -> &[&'static str] {
        &["vote"]
    }

    async fn on_command(
        &mut self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        if invocation.command() != Some("start") {
            return Ok(());
        }
        let subject = match invocation.arg(0) {
            Some(subject) => subject.to_string(),
            None => {
                ctx.client
                    .create_message(message.channel_id, "Usage: `!vote start <subject> [seconds]`")
                    .await?;
                return Ok(());
            }
        };

        // Non-numeric timers silently fall back to the default.
        let timer = invocation
            .arg(1)
            .and_then(|timer| timer.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMER_SECONDS);

        let record = PollRecord {
            subject: subject.clone(),
            added_by: message.author.name.clone(),
            added_on: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            timer,
            channel_id: message.channel_id.to_string(),
        };
        ctx.store.set_value("votebot", &subject, &record)?;

        ctx.schedule_timer(self.name(), subject.clone(), Duration::from_secs(timer));

        ctx.client
            .create_message(
                message.channel_id,
                &format!("Vote {} started, ends in {} seconds", subject, timer),
            )
            .await?;
        Ok(())
    }

    async fn on_timer(&mut self, ctx: &PluginContext, key: &str) -> anyhow::Result<()> {
        let record: PollRecord = serde_json::from_value(ctx.store.get_value("votebot", key)?)?;
        let channel_id = ChannelId::from_str(&record.channel_id)?;
        ctx.client
            .create_message(channel_id, &format!("Vote {} ended", record.subject))
            .await?;
        Ok(())
    }
}
