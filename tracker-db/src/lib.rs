mod error;
mod models;

pub use error::{DbError, Result};
pub use models::{OnlinePlayer, PlayerLocation, PlayerName};

use std::path::Path;
use std::time::Duration;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Row, params, params_from_iter, types::Type};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Deadline applied to every store operation unless overridden.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

const LOCATION_COLUMNS: &str = "player_id, username, game_server_id, proxy_id";

/// Location store for every player currently known to the tracker.
///
/// The handle is cheap to clone; all clones share one background SQLite
/// connection, which serializes statements internally.
#[derive(Clone)]
pub struct Database {
  conn: Connection,
  op_timeout: Duration,
}

impl Database {
  /// Open or create a database at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(DbError::Sqlite)?;
    Self::from_connection(conn).await
  }

  /// Create an in-memory database (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(DbError::Sqlite)?;
    Self::from_connection(conn).await
  }

  /// Use an already open connection, creating the schema if needed.
  ///
  /// The connection stays shared with any other clones of it.
  pub async fn from_connection(conn: Connection) -> Result<Self> {
    let db = Self {
      conn,
      op_timeout: DEFAULT_OPERATION_TIMEOUT,
    };
    db.initialize().await?;
    Ok(db)
  }

  /// Use a different deadline for operations issued through this handle.
  pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
    self.op_timeout = timeout;
    self
  }

  pub fn operation_timeout(&self) -> Duration {
    self.op_timeout
  }

  /// Initialize the database schema.
  async fn initialize(&self) -> Result<()> {
    self
      .call("initialize", |conn| {
        // Readers should not block behind the ingestion writer
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute_batch(
          r#"
          -- One row per tracked player
          CREATE TABLE IF NOT EXISTS player_locations (
              player_id TEXT PRIMARY KEY,
              username TEXT,
              game_server_id TEXT,
              proxy_id TEXT
          );

          CREATE INDEX IF NOT EXISTS idx_player_locations_server ON player_locations(game_server_id);
          CREATE INDEX IF NOT EXISTS idx_player_locations_proxy ON player_locations(proxy_id);
          "#,
        )?;
        Ok(())
      })
      .await?;

    info!("database initialized");
    Ok(())
  }

  /// Run a statement on the connection thread, bounded by the operation deadline.
  ///
  /// On expiry the caller gets [`DbError::Timeout`]; the statement itself may
  /// still complete on the connection thread.
  async fn call<F, R>(&self, op: &'static str, function: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    match tokio::time::timeout(self.op_timeout, self.conn.call(function)).await {
      // Statement failures keep their SQLite code for classification
      Ok(result) => result.map_err(|e| match e {
        tokio_rusqlite::Error::Error(e) => DbError::Sqlite(e),
        other => DbError::Connection(other),
      }),
      Err(_) => {
        warn!(op, timeout = ?self.op_timeout, "database operation timed out");
        Err(DbError::Timeout(self.op_timeout))
      }
    }
  }

  // ========================================================================
  // Mutations
  // ========================================================================

  /// Set the game server a player is on, creating the record if needed.
  /// The proxy id and username are left untouched.
  pub async fn set_player_game_server(&self, player_id: Uuid, server_id: String) -> Result<()> {
    let server_id_log = server_id.clone();

    self
      .call("set_player_game_server", move |conn| {
        conn
          .prepare_cached(
            r#"
            INSERT INTO player_locations (player_id, game_server_id) VALUES (?1, ?2)
            ON CONFLICT(player_id) DO UPDATE SET game_server_id = excluded.game_server_id
            "#,
          )?
          .execute(params![player_id.to_string(), &server_id])?;
        Ok(())
      })
      .await?;

    debug!(%player_id, server_id = %server_id_log, "set player game server");
    Ok(())
  }

  /// Set the proxy a player is connected through, creating the record if needed.
  ///
  /// A present username replaces the stored one; `None` keeps it. The game
  /// server id is left untouched.
  pub async fn set_player_proxy(
    &self,
    player_id: Uuid,
    proxy_id: String,
    username: Option<PlayerName>,
  ) -> Result<()> {
    let proxy_id_log = proxy_id.clone();

    self
      .call("set_player_proxy", move |conn| {
        conn
          .prepare_cached(
            r#"
            INSERT INTO player_locations (player_id, username, proxy_id) VALUES (?1, ?2, ?3)
            ON CONFLICT(player_id) DO UPDATE SET
                proxy_id = excluded.proxy_id,
                username = COALESCE(excluded.username, player_locations.username)
            "#,
          )?
          .execute(params![
            player_id.to_string(),
            username.as_ref().map(|name| name.as_str()),
            &proxy_id
          ])?;
        Ok(())
      })
      .await?;

    debug!(%player_id, proxy_id = %proxy_id_log, "set player proxy");
    Ok(())
  }

  /// Remove a player's record entirely.
  /// Returns [`DbError::PlayerNotFound`] if there was nothing to remove.
  pub async fn delete_player(&self, player_id: Uuid) -> Result<()> {
    let deleted = self
      .call("delete_player", move |conn| {
        conn
          .prepare_cached("DELETE FROM player_locations WHERE player_id = ?1")?
          .execute(params![player_id.to_string()])
      })
      .await?;

    if deleted == 0 {
      return Err(DbError::PlayerNotFound);
    }

    debug!(%player_id, "deleted player");
    Ok(())
  }

  // ========================================================================
  // Lookups
  // ========================================================================

  /// Get a player's location.
  /// Returns None if the player is not tracked.
  pub async fn get_player(&self, player_id: Uuid) -> Result<Option<PlayerLocation>> {
    self
      .call("get_player", move |conn| {
        conn
          .prepare_cached(&format!(
            "SELECT {LOCATION_COLUMNS} FROM player_locations WHERE player_id = ?1"
          ))?
          .query_row(params![player_id.to_string()], location_from_row)
          .optional()
      })
      .await
  }

  /// Get the locations of several players at once.
  /// Players that are not tracked are left out of the result.
  pub async fn get_players(&self, player_ids: &[Uuid]) -> Result<Vec<PlayerLocation>> {
    if player_ids.is_empty() {
      return Ok(Vec::new());
    }

    let ids: Vec<String> = player_ids.iter().map(Uuid::to_string).collect();

    self
      .call("get_players", move |conn| {
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
          "SELECT {LOCATION_COLUMNS} FROM player_locations WHERE player_id IN ({placeholders})"
        ))?;

        let players = stmt
          .query_map(params_from_iter(ids.iter()), location_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(players)
      })
      .await
  }

  /// Get every player whose game server is exactly `server_id`.
  pub async fn get_server_players(&self, server_id: String) -> Result<Vec<PlayerLocation>> {
    self
      .call("get_server_players", move |conn| {
        let mut stmt = conn.prepare_cached(&format!(
          "SELECT {LOCATION_COLUMNS} FROM player_locations WHERE game_server_id = ?1 ORDER BY player_id"
        ))?;

        let players = stmt
          .query_map(params![&server_id], location_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(players)
      })
      .await
  }

  // ========================================================================
  // Counts
  // ========================================================================

  /// Count players on a proxy (`proxy = true`) or on a game server.
  pub async fn count_players_on(&self, target_id: String, proxy: bool) -> Result<u64> {
    let sql = if proxy {
      "SELECT COUNT(*) FROM player_locations WHERE proxy_id = ?1"
    } else {
      "SELECT COUNT(*) FROM player_locations WHERE game_server_id = ?1"
    };

    let count: i64 = self
      .call("count_players_on", move |conn| {
        conn
          .prepare_cached(sql)?
          .query_row(params![&target_id], |row| row.get(0))
      })
      .await?;

    Ok(count as u64)
  }

  /// Count players on any server of a fleet, i.e. whose game server id
  /// starts with `{fleet_name}-`.
  pub async fn count_fleet_players(&self, fleet_name: &str) -> Result<u64> {
    let prefix = format!("{fleet_name}-");

    // substr keeps the match literal; LIKE would treat '_' in fleet names as a wildcard
    let count: i64 = self
      .call("count_fleet_players", move |conn| {
        conn
          .prepare_cached(
            "SELECT COUNT(*) FROM player_locations WHERE substr(game_server_id, 1, length(?1)) = ?1",
          )?
          .query_row(params![&prefix], |row| row.get(0))
      })
      .await?;

    Ok(count as u64)
  }

  /// Count every tracked player.
  pub async fn player_count(&self) -> Result<u64> {
    let count: i64 = self
      .call("player_count", |conn| {
        conn
          .prepare_cached("SELECT COUNT(*) FROM player_locations")?
          .query_row([], |row| row.get(0))
      })
      .await?;

    Ok(count as u64)
  }
}

fn location_from_row(row: &Row<'_>) -> rusqlite::Result<PlayerLocation> {
  let player_id: String = row.get(0)?;
  let player_id = Uuid::parse_str(&player_id)
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

  let username: Option<String> = row.get(1)?;
  let username = username
    .map(|name| {
      PlayerName::from(name.as_str())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e.simplify())))
    })
    .transpose()?;

  Ok(PlayerLocation {
    player_id,
    username,
    game_server_id: row.get(2)?,
    proxy_id: row.get(3)?,
  })
}
