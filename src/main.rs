//! wavechat - terminal host for a chat session
//!
//! Lines typed on stdin are sent as messages; lines starting with `/` are
//! commands. Session updates are printed to stdout as JSON lines, logs go to
//! stderr.

use anyhow::{Context, Result};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wavechat::{Command, SessionConfig, SessionUpdate};

const HELP: &str = "commands: /play <id>, /audio on|off, /reconnect, /token <value>, /logout, /quit";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wavechat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = SessionConfig::from_env().context("invalid configuration")?;
    info!("Starting wavechat against {}", config.url);

    let token = std::env::var("WAVECHAT_TOKEN").ok().filter(|t| !t.is_empty());
    let (token_tx, token_rx) = watch::channel(token);

    let mut session = wavechat::spawn(config, token_rx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("{}", HELP);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_line(&line) {
                    Input::Command(command) => {
                        if !session.send(command) {
                            break;
                        }
                    }
                    Input::Token(token) => {
                        let _ = token_tx.send(token);
                    }
                    Input::Quit => break,
                    Input::Invalid(reason) => eprintln!("{} ({})", reason, HELP),
                    Input::Nothing => {}
                }
            }

            update = session.recv() => match update {
                Some(update) => println!("{}", update_json(&update)),
                None => {
                    warn!("Session ended");
                    break;
                }
            },

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown().await;
    Ok(())
}

#[derive(Debug)]
enum Input {
    Command(Command),
    Token(Option<String>),
    Quit,
    Invalid(String),
    Nothing,
}

fn parse_line(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Nothing;
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Input::Command(Command::SendText(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match (name, arg) {
        ("play", id) => match id.parse() {
            Ok(id) => Input::Command(Command::Play(id)),
            Err(_) => Input::Invalid(format!("bad entry id {:?}", id)),
        },
        ("audio", "on") => Input::Command(Command::SetAudioEnabled(true)),
        ("audio", "off") => Input::Command(Command::SetAudioEnabled(false)),
        ("reconnect", _) => Input::Command(Command::Reconnect),
        ("token", token) if !token.is_empty() => Input::Token(Some(token.to_string())),
        ("logout", _) => Input::Token(None),
        ("quit", _) | ("exit", _) => Input::Quit,
        _ => Input::Invalid(format!("unknown command {:?}", trimmed)),
    }
}

fn update_json(update: &SessionUpdate) -> serde_json::Value {
    match update {
        SessionUpdate::Status(state) => json!({ "status": state }),
        SessionUpdate::EntryAppended(entry) => json!({ "entry": entry.summary() }),
        SessionUpdate::AwaitingReply(awaiting) => json!({ "awaitingReply": awaiting }),
        SessionUpdate::AudioEnabled(enabled) => json!({ "audioEnabled": enabled }),
        SessionUpdate::SignInRequired => json!({ "signInRequired": true }),
        SessionUpdate::Notice(error) => json!({ "notice": error.to_string() }),
    }
}
