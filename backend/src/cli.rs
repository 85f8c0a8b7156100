//! Command line: the polling service plus one-shot admin commands that
//! work on the same database.

use clap::{Parser, Subcommand};

use crate::admin::{self, DEFAULT_RECENT_LIMIT};
use crate::settings::{self, SettingKey};
use crate::store::SqlxRepository;

#[derive(Debug, Parser)]
#[command(name = "optwatch", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Polling is what runs when no subcommand is given.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Run)
    }
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Poll tracked symbols until interrupted
    Run,

    #[command(flatten)]
    Admin(AdminCommand),
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum AdminCommand {
    /// Add a symbol to the watchlist
    Track { symbol: String },

    /// Remove a symbol from the watchlist
    Untrack { symbol: String },

    /// Start (or resume) alerts for a chat id
    Subscribe {
        #[arg(allow_negative_numbers = true)]
        recipient_id: i64,
        #[arg(long)]
        name: Option<String>,
    },

    /// Stop alerts for a chat id
    Unsubscribe {
        #[arg(allow_negative_numbers = true)]
        recipient_id: i64,
    },

    /// Print the latest signals, newest first
    Signals {
        #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },

    /// Print every runtime setting
    Settings,

    /// Change one runtime setting
    Set { key: String, value: f64 },
}

/// Runs one admin command and returns the text to print.
pub async fn execute(command: AdminCommand, repo: &SqlxRepository) -> anyhow::Result<String> {
    let out = match command {
        AdminCommand::Track { symbol } => admin::track(repo, &symbol).await?.to_string(),
        AdminCommand::Untrack { symbol } => admin::untrack(repo, &symbol).await?.to_string(),
        AdminCommand::Subscribe { recipient_id, name } => {
            admin::subscribe(repo, recipient_id, name.as_deref()).await?;
            format!("✅ {recipient_id} subscribed.")
        }
        AdminCommand::Unsubscribe { recipient_id } => {
            admin::unsubscribe(repo, recipient_id).await?;
            format!("{recipient_id} unsubscribed.")
        }
        AdminCommand::Signals { limit } => admin::recent_signals(repo, limit).await?,
        AdminCommand::Settings => render_settings(&admin::settings_overview(repo).await?),
        AdminCommand::Set { key, value } => {
            let key = settings::update(repo, &key, value).await?;
            format!("✅ {key} set to {value}.")
        }
    };
    Ok(out)
}

fn render_settings(rows: &[(SettingKey, Option<f64>)]) -> String {
    rows.iter()
        .map(|(key, stored)| match stored {
            Some(v) => format!("{key} = {v}"),
            None => format!("{key} = {} (default)", key.default_value()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().into_command()
    }

    #[test]
    fn no_subcommand_means_run() {
        assert_eq!(parse(&["optwatch"]), Command::Run);
        assert_eq!(parse(&["optwatch", "run"]), Command::Run);
    }

    #[test]
    fn admin_commands_parse() {
        assert_eq!(
            parse(&["optwatch", "track", "spy"]),
            Command::Admin(AdminCommand::Track { symbol: "spy".into() })
        );
        assert_eq!(
            parse(&["optwatch", "subscribe", "42", "--name", "ops"]),
            Command::Admin(AdminCommand::Subscribe {
                recipient_id: 42,
                name: Some("ops".into()),
            })
        );
        assert_eq!(
            parse(&["optwatch", "signals"]),
            Command::Admin(AdminCommand::Signals { limit: 10 })
        );
        assert_eq!(
            parse(&["optwatch", "set", "volume_spike_k", "2.5"]),
            Command::Admin(AdminCommand::Set {
                key: "volume_spike_k".into(),
                value: 2.5,
            })
        );
        assert_eq!(
            parse(&["optwatch", "unsubscribe", "-1001234"]),
            Command::Admin(AdminCommand::Unsubscribe { recipient_id: -1001234 })
        );
        assert!(Cli::try_parse_from(["optwatch", "subscribe", "not-a-number"]).is_err());
    }

    #[test]
    fn settings_listing_marks_defaults() {
        let text = render_settings(&[
            (SettingKey::VolumeSpikeK, Some(2.5)),
            (SettingKey::ExpirationDays, None),
        ]);

        assert_eq!(text, "volume_spike_k = 2.5\nexpiration_days = 7 (default)");
    }
}
