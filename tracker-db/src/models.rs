use arrayvec::ArrayString;
use uuid::Uuid;

/// Minecraft player name - max 16 characters, stored inline (no heap allocation).
pub type PlayerName = ArrayString<16>;

/// Where a player currently is.
///
/// Either id may be absent: a player who just connected has no game server yet,
/// and a switch processed before its connect leaves the proxy unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLocation {
  pub player_id: Uuid,
  /// Last display name seen on a connect, if any
  pub username: Option<PlayerName>,
  /// Backend game server, e.g. "lobby-7f9c2-x8k1p"
  pub game_server_id: Option<String>,
  /// Proxy the player is connected through, e.g. "proxy-5d8f1-2kq9z"
  pub proxy_id: Option<String>,
}

impl PlayerLocation {
  /// A record with neither id set carries no location at all.
  pub fn is_offline(&self) -> bool {
    self.game_server_id.is_none() && self.proxy_id.is_none()
  }
}

/// A player listed on a game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlinePlayer {
  pub player_id: Uuid,
  pub username: Option<PlayerName>,
}

impl From<PlayerLocation> for OnlinePlayer {
  fn from(location: PlayerLocation) -> Self {
    Self {
      player_id: location.player_id,
      username: location.username,
    }
  }
}
