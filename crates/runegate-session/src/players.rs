//! The online-player registry.
//!
//! Keeps track of who is logged in so an account can't be in the game
//! twice and the world can't be overfilled. One registry is shared by all
//! connection tasks behind a mutex; entries are added when a login is
//! accepted and removed when that connection ends.

use std::collections::HashMap;
use std::fmt;

use runegate_protocol::ResponseCode;
use runegate_transport::ConnectionId;

/// An authenticated player, as seen by message handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub user_id: u32,
    pub username: String,
    /// Rights level sent in the login response.
    pub privilege: u8,
    /// Logged in with the reconnect opcode.
    pub reconnecting: bool,
    /// The connection this player is logged in on.
    pub connection: ConnectionId,
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// Everyone currently in the game, keyed by normalised username.
#[derive(Debug)]
pub struct PlayerRegistry {
    online: HashMap<String, Player>,
    capacity: usize,
}

impl PlayerRegistry {
    /// Creates a registry that admits at most `capacity` players.
    pub fn new(capacity: usize) -> Self {
        Self {
            online: HashMap::new(),
            capacity,
        }
    }

    /// Admits a player.
    ///
    /// # Errors
    /// [`ResponseCode::AccountOnline`] if the username is already in the
    /// game, [`ResponseCode::ServerFull`] at capacity.
    pub fn admit(&mut self, player: Player) -> Result<(), ResponseCode> {
        let key = normalize(&player.username);
        if self.online.contains_key(&key) {
            tracing::debug!(player = %player, "login refused: already online");
            return Err(ResponseCode::AccountOnline);
        }
        if self.online.len() >= self.capacity {
            tracing::debug!(
                player = %player,
                capacity = self.capacity,
                "login refused: world full"
            );
            return Err(ResponseCode::ServerFull);
        }
        tracing::info!(player = %player, conn_id = %player.connection, "player online");
        self.online.insert(key, player);
        Ok(())
    }

    /// Removes a player, but only if they are logged in on `connection`.
    pub fn remove(&mut self, username: &str, connection: ConnectionId) -> Option<Player> {
        let key = normalize(username);
        let owned = self
            .online
            .get(&key)
            .is_some_and(|player| player.connection == connection);
        if !owned {
            return None;
        }
        let player = self.online.remove(&key)?;
        tracing::info!(player = %player, "player offline");
        Some(player)
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.online.contains_key(&normalize(username))
    }

    pub fn get(&self, username: &str) -> Option<&Player> {
        self.online.get(&normalize(username))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}

/// Usernames are case-insensitive and treat `_` as a space.
fn normalize(username: &str) -> String {
    username.trim().to_ascii_lowercase().replace('_', " ")
}
