//! Bot command recognition.
//!
//! A bot command looks like `!botname` or `!botname command args...`. The
//! old format-string argument parser is gone; invocations are plain
//! whitespace tokens and every plugin matches on the command name itself.

use twilight_mention::ParseMention;

use crate::types::UserId;

#[derive(Clone, Debug, PartialEq)]
pub struct CommandInvocation {
    pub bot: String,
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl CommandInvocation {
    /// Parse a message into an invocation. Returns `None` for anything that
    /// is not shaped like a bot command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('!')?;
        let mut tokens = rest.split_whitespace();

        let bot = tokens.next()?.to_lowercase();
        if bot.is_empty() {
            return None;
        }

        let command = tokens.next().map(|token| token.to_string());
        let args = tokens.map(|token| token.to_string()).collect();

        Some(Self { bot, command, args })
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|arg| arg.as_str())
    }

    /// Join the arguments from `index` onward back into free text.
    pub fn rest(&self, index: usize) -> Option<String> {
        if index >= self.args.len() {
            return None;
        }
        Some(self.args[index..].join(" "))
    }

    /// Everything after the bot name, for catch-all commands like echo.
    pub fn full_text(&self) -> Option<String> {
        let command = self.command.as_ref()?;
        let mut text = command.clone();
        if !self.args.is_empty() {
            text.push(' ');
            text.push_str(&self.args.join(" "));
        }
        Some(text)
    }

    /// Resolve argument `index` as a `<@id>` or `<@!id>` user mention.
    pub fn user_arg(&self, index: usize) -> Option<UserId> {
        parse_mention(self.arg(index)?)
    }
}

pub fn parse_mention(token: &str) -> Option<UserId> {
    UserId::parse(token).ok()
}

/// Turn a quotee argument into a cache key: mentions become the bare user id,
/// anything else stays the literal string.
pub fn mention_to_key(token: &str) -> String {
    match parse_mention(token) {
        Some(user_id) => user_id.to_string(),
        None => token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_is_not_a_command() {
        assert_eq!(CommandInvocation::parse("hello there"), None);
        assert_eq!(CommandInvocation::parse(""), None);
        assert_eq!(CommandInvocation::parse("!"), None);
    }

    #[test]
    fn bare_bot_name() {
        let inv = CommandInvocation::parse("!quotebot").unwrap();
        assert_eq!(inv.bot, "quotebot");
        assert_eq!(inv.command, None);
        assert!(inv.args.is_empty());
    }

    #[test]
    fn bot_name_is_case_insensitive() {
        let inv = CommandInvocation::parse("!QuoteBot random").unwrap();
        assert_eq!(inv.bot, "quotebot");
        assert_eq!(inv.command(), Some("random"));
    }

    #[test]
    fn args_tokenize_on_whitespace() {
        let inv = CommandInvocation::parse("!quotebot add <@123> dat is straf").unwrap();
        assert_eq!(inv.command(), Some("add"));
        assert_eq!(inv.arg(0), Some("<@123>"));
        assert_eq!(inv.rest(1).unwrap(), "dat is straf");
        assert_eq!(inv.rest(4), None);
    }

    #[test]
    fn full_text_rejoins_everything_after_the_bot_name() {
        let inv = CommandInvocation::parse("!echo dit is een test").unwrap();
        assert_eq!(inv.full_text().unwrap(), "dit is een test");
        let inv = CommandInvocation::parse("!echo").unwrap();
        assert_eq!(inv.full_text(), None);
    }

    #[test]
    fn mention_args_resolve_to_user_ids() {
        let inv = CommandInvocation::parse("!pk total <@!236154927528064002>").unwrap();
        assert_eq!(inv.user_arg(0).map(|id| id.get()), Some(236154927528064002));
        assert_eq!(inv.user_arg(1), None);

        let inv = CommandInvocation::parse("!pk total plopmeester").unwrap();
        assert_eq!(inv.user_arg(0), None);
    }

    #[test]
    fn mention_to_key_strips_mention_syntax() {
        assert_eq!(mention_to_key("<@236154927528064002>"), "236154927528064002");
        assert_eq!(mention_to_key("plopmeester"), "plopmeester");
    }
}
