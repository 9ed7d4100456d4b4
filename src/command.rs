//! Text command handling.
//!
//! Maps one line of user text to a registry operation and a reply.  Adding
//! a command is one [`Command`] variant, one arm in [`Command::parse`] and
//! one arm in [`dispatch`].

use reqwest::Url;

use crate::error::CommandError;
use crate::notify::DestinationId;
use crate::poll::SessionId;
use crate::registry::SessionRegistry;
use crate::source::{Price, PriceBand};

pub const HELP: &str = "\
track <min> <max> <url> - watch a search page for new listings priced from min to max (e.g. track 35 55 https://ay.by/sch/?kwd=...)
track <max> <url> - same, without a lower bound
ls - list tracked links with their ids
rm <id> - stop tracking the link with that id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Track { band: PriceBand, url: String },
    Remove(SessionId),
    List,
    Help,
}

impl Command {
    /// Unknown keywords are `Help`; malformed arguments are an error whose
    /// message is meant for the user.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let Some((keyword, args)) = words.split_first() else {
            return Ok(Command::Help);
        };

        match keyword.to_ascii_lowercase().as_str() {
            "track" => parse_track(args),
            "rm" => match args {
                [id] => id
                    .parse()
                    .map(Command::Remove)
                    .map_err(|_| CommandError::RemoveUsage),
                _ => Err(CommandError::RemoveUsage),
            },
            "ls" => Ok(Command::List),
            _ => Ok(Command::Help),
        }
    }
}

fn parse_track(args: &[&str]) -> Result<Command, CommandError> {
    let (min, max, url) = match args {
        [min, max, url] => (Some(parse_bound(min)?), parse_bound(max)?, *url),
        [max, url] => (None, parse_bound(max)?, *url),
        _ => return Err(CommandError::TrackUsage),
    };

    let band = PriceBand::new(min, max).ok_or_else(|| CommandError::InvertedBand {
        min: min.map(|m| m.to_string()).unwrap_or_default(),
        max: max.to_string(),
    })?;

    let parsed = Url::parse(url).map_err(|_| CommandError::BadUrl(url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CommandError::BadUrl(url.to_string()));
    }

    Ok(Command::Track {
        band,
        url: url.to_string(),
    })
}

fn parse_bound(word: &str) -> Result<Price, CommandError> {
    let bad = || CommandError::BadPrice(word.to_string());
    if !word.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
        return Err(bad());
    }
    word.parse().map_err(|_| bad())
}

/// Run `command` for `destination` and produce the reply text.
pub async fn dispatch(
    registry: &SessionRegistry,
    destination: DestinationId,
    command: Command,
) -> String {
    let group = registry.group_for(destination);

    match command {
        Command::Track { band, url } => {
            let id = group.add_session(url.clone(), band, || registry.allocate_session_id());
            format!("Tracking #{id} ({band}): {url}")
        }
        Command::Remove(id) => {
            if group.remove_session(id).await {
                format!("Stopped tracking #{id}")
            } else {
                format!("No tracked link with id {id}")
            }
        }
        Command::List => {
            let sessions = group.list_sessions();
            if sessions.is_empty() {
                return "Nothing is being tracked.".to_string();
            }
            sessions
                .iter()
                .map(|s| format!("{} {}", s.id, s.url))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::Help => HELP.to_string(),
    }
}

/// Parse and run one line of user text.
pub async fn handle(registry: &SessionRegistry, destination: DestinationId, text: &str) -> String {
    match Command::parse(text) {
        Ok(command) => dispatch(registry, destination, command).await,
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::poll::testing::ScriptedSource;
    use crate::poll::SessionSettings;
    use std::sync::Arc;

    fn p(s: &str) -> Price {
        s.parse().unwrap()
    }

    // -- parse ---------------------------------------------------------------

    #[test]
    fn parses_track_with_both_bounds() {
        let cmd = Command::parse("track 35 55 https://ay.by/sch/?kwd=x").unwrap();
        assert_eq!(
            cmd,
            Command::Track {
                band: PriceBand::new(Some(p("35")), p("55")).unwrap(),
                url: "https://ay.by/sch/?kwd=x".into(),
            }
        );
    }

    #[test]
    fn parses_track_without_floor() {
        let cmd = Command::parse("  TRACK 12,5   https://ay.by/x ").unwrap();
        assert_eq!(
            cmd,
            Command::Track {
                band: PriceBand::new(None, p("12.5")).unwrap(),
                url: "https://ay.by/x".into(),
            }
        );
    }

    #[test]
    fn track_errors_are_reported() {
        assert_eq!(Command::parse("track"), Err(CommandError::TrackUsage));
        assert_eq!(
            Command::parse("track 1 2 3 https://ay.by"),
            Err(CommandError::TrackUsage)
        );
        assert_eq!(
            Command::parse("track cheap 55 https://ay.by"),
            Err(CommandError::BadPrice("cheap".into()))
        );
        assert_eq!(
            Command::parse("track 10abc https://ay.by"),
            Err(CommandError::BadPrice("10abc".into()))
        );
        assert!(matches!(
            Command::parse("track 60 55 https://ay.by"),
            Err(CommandError::InvertedBand { .. })
        ));
        assert_eq!(
            Command::parse("track 1 2 ftp://ay.by"),
            Err(CommandError::BadUrl("ftp://ay.by".into()))
        );
        assert_eq!(
            Command::parse("track 1 2 not-a-url"),
            Err(CommandError::BadUrl("not-a-url".into()))
        );
    }

    #[test]
    fn parses_rm_and_ls() {
        assert_eq!(Command::parse("rm 4"), Ok(Command::Remove(4)));
        assert_eq!(Command::parse("rm"), Err(CommandError::RemoveUsage));
        assert_eq!(Command::parse("rm four"), Err(CommandError::RemoveUsage));
        assert_eq!(Command::parse("ls"), Ok(Command::List));
    }

    #[test]
    fn anything_else_is_help() {
        assert_eq!(Command::parse("hello"), Ok(Command::Help));
        assert_eq!(Command::parse(""), Ok(Command::Help));
        assert_eq!(Command::parse("/start"), Ok(Command::Help));
    }

    // -- dispatch ------------------------------------------------------------

    fn registry() -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(ScriptedSource::new(vec![])),
            Arc::new(RecordingNotifier::default()),
            SessionSettings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn track_ls_rm_round_trip() {
        let reg = registry();
        let me = DestinationId(10);

        assert_eq!(handle(&reg, me, "ls").await, "Nothing is being tracked.");

        let reply = handle(&reg, me, "track 35 55 https://ay.by/a").await;
        assert_eq!(reply, "Tracking #1 (35.00..=55.00): https://ay.by/a");
        handle(&reg, me, "track 70 https://ay.by/b").await;

        assert_eq!(handle(&reg, me, "ls").await, "1 https://ay.by/a\n2 https://ay.by/b");

        assert_eq!(handle(&reg, me, "rm 1").await, "Stopped tracking #1");
        assert_eq!(handle(&reg, me, "rm 1").await, "No tracked link with id 1");
        assert_eq!(handle(&reg, me, "ls").await, "2 https://ay.by/b");

        reg.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn destinations_are_isolated() {
        let reg = registry();
        handle(&reg, DestinationId(1), "track 5 https://ay.by/a").await;

        assert_eq!(
            handle(&reg, DestinationId(2), "ls").await,
            "Nothing is being tracked."
        );
        assert_eq!(
            handle(&reg, DestinationId(2), "rm 1").await,
            "No tracked link with id 1"
        );
        assert_eq!(handle(&reg, DestinationId(1), "ls").await, "1 https://ay.by/a");

        reg.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_command_replies_with_usage() {
        let reg = registry();
        let reply = handle(&reg, DestinationId(1), "rm x").await;
        assert!(reply.starts_with("usage: rm"));
        assert!(reg.destinations().is_empty());
    }

    #[tokio::test]
    async fn help_lists_commands() {
        let reg = registry();
        let reply = handle(&reg, DestinationId(1), "?").await;
        assert!(reply.contains("track <min> <max> <url>"));
        assert!(reply.contains("rm <id>"));
    }
}
