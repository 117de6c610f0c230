use std::collections::HashMap;
use std::path::Path;

use runegate::prelude::*;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// `dev-server.json`: the server settings plus a fixed account list.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DevConfig {
    server: ServerConfig,
    /// Username → password. Empty means anyone may log in.
    accounts: HashMap<String, String>,
}

impl DevConfig {
    fn load(path: &Path) -> Result<Self, RunegateError> {
        let text = std::fs::read_to_string(path).map_err(RunegateError::ConfigIo)?;
        Ok(serde_json::from_str(&text)?)
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

struct AccountList {
    accounts: HashMap<String, String>,
}

impl AccountList {
    fn new(accounts: HashMap<String, String>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|(name, password)| (account_key(&name), password))
            .collect();
        Self { accounts }
    }

    fn check(&self, username: &str, password: &str) -> ResponseCode {
        if username.trim().is_empty() || password.is_empty() {
            return ResponseCode::InvalidCredentials;
        }
        if self.accounts.is_empty() {
            return ResponseCode::Ok;
        }
        match self.accounts.get(&account_key(username)) {
            Some(expected) if expected == password => ResponseCode::Ok,
            _ => ResponseCode::InvalidCredentials,
        }
    }
}

impl Authenticator for AccountList {
    async fn authenticate(&self, request: AuthenticationRequest) -> ResponseCode {
        let creds = &request.credentials;
        let code = self.check(&creds.username, &creds.password);
        tracing::debug!(
            session = %request.session,
            username = %creds.username,
            %code,
            "checked credentials"
        );
        code
    }
}

fn account_key(username: &str) -> String {
    username.trim().to_ascii_lowercase().replace('_', " ")
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Answers a `::command` typed in the client.
fn run_command(player: Option<&Player>, line: &str) -> String {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("help") => "Commands: help, whoami, echo <text>".into(),
        Some("whoami") => match player {
            Some(player) => format!("You are {player} (id {})", player.user_id),
            None => "You are nobody".into(),
        },
        Some("echo") => words.collect::<Vec<_>>().join(" "),
        Some(other) => format!("Unknown command: {other}"),
        None => "Type ::help for commands".into(),
    }
}

fn builder(config: ServerConfig) -> RunegateServerBuilder {
    RunegateServerBuilder::new()
        .config(config)
        .handler_fn(MessageKind::Ping, |ctx, _msg| {
            tracing::trace!(session = %ctx.session, "ping");
        })
        .handler_fn(MessageKind::Chat, |ctx, msg| {
            if let Message::Chat(chat) = msg {
                tracing::info!(
                    session = %ctx.session,
                    color = chat.color,
                    effects = chat.effects,
                    bytes = chat.text.len(),
                    "public chat"
                );
            }
        })
        .handler_fn(MessageKind::Walk, |ctx, msg| {
            if let Message::Walk(walk) = msg {
                let destination = walk.positions().last();
                tracing::debug!(
                    session = %ctx.session,
                    steps = walk.steps.len(),
                    run = walk.run,
                    ?destination,
                    "walk"
                );
            }
        })
        .handler_fn(MessageKind::Command, |ctx, msg| {
            if let Message::Command(command) = msg {
                let text = run_command(ctx.player, &command.line);
                ctx.reply(Message::ServerChat(ServerChatMessage { text }));
            }
        })
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DevConfig::load(Path::new(&path))?,
        None => DevConfig::default(),
    };
    if config.accounts.is_empty() {
        tracing::warn!("no accounts configured, any non-empty password is accepted");
    }

    let server = builder(config.server)
        .build(AccountList::new(config.accounts))
        .await?;
    tracing::info!(addr = %server.local_addr()?, "dev server ready");

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        Player {
            user_id: 7,
            username: "zezima".into(),
            privilege: 0,
            reconnecting: false,
            connection: ConnectionId::new(1),
        }
    }

    #[test]
    fn test_check_known_account() {
        let auth = AccountList::new(HashMap::from([("Mod_Ash".into(), "hunter2".into())]));
        assert_eq!(auth.check("mod ash", "hunter2"), ResponseCode::Ok);
        assert_eq!(auth.check("mod ash", "hunter3"), ResponseCode::InvalidCredentials);
        assert_eq!(auth.check("zezima", "hunter2"), ResponseCode::InvalidCredentials);
    }

    #[test]
    fn test_check_open_server_still_needs_password() {
        let auth = AccountList::new(HashMap::new());
        assert_eq!(auth.check("anyone", "x"), ResponseCode::Ok);
        assert_eq!(auth.check("anyone", ""), ResponseCode::InvalidCredentials);
        assert_eq!(auth.check("  ", "x"), ResponseCode::InvalidCredentials);
    }

    #[test]
    fn test_run_command_whoami_and_echo() {
        let player = player();
        assert_eq!(run_command(Some(&player), "whoami"), "You are zezima (id 7)");
        assert_eq!(run_command(None, "echo  hello   world"), "hello world");
        assert_eq!(run_command(None, "tele 3200 3200"), "Unknown command: tele");
        assert_eq!(run_command(None, ""), "Type ::help for commands");
    }

    #[test]
    fn test_dev_config_parses_sample_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("dev-server.json");
        let config = DevConfig::load(&path).expect("sample config");
        assert_eq!(config.server.bind_addr, "127.0.0.1:43594");
        assert_eq!(config.server.max_players, 50);
        assert_eq!(config.server.client_version, 317);
        assert_eq!(config.accounts.len(), 2);
    }

    #[test]
    fn test_builder_registers_every_game_handler() {
        let context = builder(ServerConfig::default())
            .build_context(AccountList::new(HashMap::new()))
            .expect("context");
        for kind in [
            MessageKind::Ping,
            MessageKind::Chat,
            MessageKind::Walk,
            MessageKind::Command,
        ] {
            assert!(context.dispatch().contains(kind), "{kind}");
        }
    }
}
