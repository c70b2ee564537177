//! Dummy bot that echoes. Good test subject.

use async_trait::async_trait;

use crate::command::CommandInvocation;
use crate::types::TwiMessage;

use super::{Plugin, PluginContext};

pub struct EchoPlugin;

#[async_trait]
impl Plugin for EchoPlugin {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn command_names(&self) -> &[&'static str] {
        &["echo"]
    }

    async fn on_command(
        &mut self,
        ctx: &PluginContext,
        message: &TwiMessage,
        invocation: &CommandInvocation,
    ) -> anyhow::Result<()> {
        // A bare `!echo` is answered by the help path before it gets here.
        let content = match invocation.full_text() {
            Some(content) => content,
            None => return Ok(()),
        };

        ctx.client
            .create_message(
                message.channel_id,
                &format!("{} {}", content, ctx.system_config.plopkoek_emote),
            )
            .await?;
        Ok(())
    }
}
