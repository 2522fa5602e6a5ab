//! Read-only location queries.
//!
//! Everything here translates a caller question into one or more store reads.
//! Nothing in this module writes to the store.

use crate::fleet::{FleetTable, ServerType};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracker_db::{Database, DbError, OnlinePlayer, PlayerLocation};
use uuid::Uuid;

/// Proxy ids start with this; anything else is treated as a game server.
pub const PROXY_ID_PREFIX: &str = "proxy-";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no fleet is configured for server type {0}")]
    UnmappedServerType(ServerType),

    #[error(transparent)]
    Store(#[from] DbError),
}

/// Whether `target_id` names a proxy rather than a game server.
pub fn is_proxy_id(target_id: &str) -> bool {
    target_id.starts_with(PROXY_ID_PREFIX)
}

#[derive(Clone)]
pub struct Locator {
    db: Database,
    fleets: Arc<FleetTable>,
}

impl Locator {
    pub fn new(db: Database, fleets: Arc<FleetTable>) -> Self {
        Self { db, fleets }
    }

    /// Where a player is, or None if nothing is known about them.
    pub async fn player_location(
        &self,
        player_id: Uuid,
    ) -> Result<Option<PlayerLocation>, QueryError> {
        let location = self.db.get_player(player_id).await?;
        Ok(location.filter(|l| !l.is_offline()))
    }

    /// Locations of every known player among `player_ids`.
    pub async fn player_locations(
        &self,
        player_ids: &[Uuid],
    ) -> Result<Vec<PlayerLocation>, QueryError> {
        let locations = self.db.get_players(player_ids).await?;
        Ok(locations.into_iter().filter(|l| !l.is_offline()).collect())
    }

    /// Players on one game server.
    pub async fn server_players(&self, server_id: &str) -> Result<Vec<OnlinePlayer>, QueryError> {
        let players = self.db.get_server_players(server_id.to_string()).await?;
        Ok(players.into_iter().map(OnlinePlayer::from).collect())
    }

    /// Players on one proxy or game server; the tier comes from the id prefix.
    pub async fn target_player_count(&self, target_id: &str) -> Result<u64, QueryError> {
        let proxy = is_proxy_id(target_id);
        Ok(self
            .db
            .count_players_on(target_id.to_string(), proxy)
            .await?)
    }

    /// Players on servers of one type. The proxy tier counts every tracked player.
    pub async fn server_type_player_count(
        &self,
        server_type: ServerType,
    ) -> Result<u64, QueryError> {
        let fleet = self.resolve(server_type)?;
        self.count(fleet).await
    }

    /// Per-type counts for a batch of types.
    ///
    /// Every type is resolved before the store is touched, so one unmapped type
    /// fails the whole batch without any reads. Each count is taken
    /// independently; the batch is not a consistent snapshot.
    pub async fn server_types_player_count(
        &self,
        server_types: &[ServerType],
    ) -> Result<BTreeMap<ServerType, u64>, QueryError> {
        let resolved = server_types
            .iter()
            .map(|&t| self.resolve(t).map(|fleet| (t, fleet)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let mut counts = BTreeMap::new();
        for (server_type, fleet) in resolved {
            counts.insert(server_type, self.count(fleet).await?);
        }
        Ok(counts)
    }

    /// Every tracked player.
    pub async fn player_count(&self) -> Result<u64, QueryError> {
        Ok(self.db.player_count().await?)
    }

    /// `None` stands for the proxy tier.
    fn resolve(&self, server_type: ServerType) -> Result<Option<&'static str>, QueryError> {
        if server_type == ServerType::Proxy {
            return Ok(None);
        }
        self.fleets
            .fleet_name(server_type)
            .map(Some)
            .ok_or(QueryError::UnmappedServerType(server_type))
    }

    async fn count(&self, fleet: Option<&'static str>) -> Result<u64, QueryError> {
        let count = match fleet {
            Some(fleet) => self.db.count_fleet_players(fleet).await?,
            None => self.db.player_count().await?,
        };
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Database, Locator) {
        let db = Database::open_in_memory().await.unwrap();
        let locator = Locator::new(db.clone(), Arc::new(FleetTable::standard()));
        (db, locator)
    }

    async fn place(db: &Database, proxy_id: &str, server_id: &str) -> Uuid {
        let player_id = Uuid::new_v4();
        db.set_player_proxy(player_id, proxy_id.to_string(), None)
            .await
            .unwrap();
        db.set_player_game_server(player_id, server_id.to_string())
            .await
            .unwrap();
        player_id
    }

    #[test]
    fn test_proxy_id_prefix() {
        assert!(is_proxy_id("proxy-sdgwsd-235eax"));
        assert!(!is_proxy_id("lobby-1"));
        assert!(!is_proxy_id("proxyless-1"));
        assert!(!is_proxy_id("my-proxy-1"));
    }

    #[tokio::test]
    async fn test_unknown_player_has_no_location() {
        let (_db, locator) = setup().await;

        assert!(locator.player_location(Uuid::new_v4()).await.unwrap().is_none());
        assert!(
            locator
                .player_locations(&[Uuid::new_v4()])
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_switch_without_connect_has_no_proxy() {
        let (db, locator) = setup().await;
        let player_id = Uuid::new_v4();

        db.set_player_game_server(player_id, "lobby-1".to_string())
            .await
            .unwrap();

        let location = locator.player_location(player_id).await.unwrap().unwrap();
        assert_eq!(location.game_server_id.as_deref(), Some("lobby-1"));
        assert_eq!(location.proxy_id, None);
    }

    #[tokio::test]
    async fn test_target_count_infers_tier() {
        let (db, locator) = setup().await;
        place(&db, "proxy-a", "lobby-1").await;
        place(&db, "proxy-a", "lobby-2").await;
        place(&db, "proxy-b", "lobby-1").await;

        assert_eq!(locator.target_player_count("proxy-a").await.unwrap(), 2);
        assert_eq!(locator.target_player_count("proxy-b").await.unwrap(), 1);
        assert_eq!(locator.target_player_count("lobby-1").await.unwrap(), 2);
        assert_eq!(locator.target_player_count("lobby-3").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_server_type_counts() {
        let (db, locator) = setup().await;
        place(&db, "proxy-a", "lobby-1").await;
        place(&db, "proxy-a", "lobby-2").await;
        place(&db, "proxy-b", "block-sumo-1").await;

        assert_eq!(
            locator
                .server_type_player_count(ServerType::Lobby)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            locator
                .server_type_player_count(ServerType::BlockSumo)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            locator
                .server_type_player_count(ServerType::Proxy)
                .await
                .unwrap(),
            3
        );
        assert_eq!(
            locator
                .server_type_player_count(ServerType::Battle)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_batch_server_type_counts() {
        let (db, locator) = setup().await;
        place(&db, "proxy-a", "lobby-1").await;
        place(&db, "proxy-a", "lobby-1").await;
        place(&db, "proxy-b", "parkourtag-1").await;

        let counts = locator
            .server_types_player_count(&[
                ServerType::Lobby,
                ServerType::Parkourtag,
                ServerType::Proxy,
            ])
            .await
            .unwrap();

        assert_eq!(counts.len(), 3);
        assert_eq!(counts[&ServerType::Lobby], 2);
        assert_eq!(counts[&ServerType::Parkourtag], 1);
        assert_eq!(counts[&ServerType::Proxy], 3);
    }

    #[tokio::test]
    async fn test_unmapped_type_fails_batch() {
        let db = Database::open_in_memory().await.unwrap();
        let fleets = FleetTable::new([(ServerType::Lobby, "lobby"), (ServerType::Battle, "battle")]);
        let locator = Locator::new(db.clone(), Arc::new(fleets));
        place(&db, "proxy-a", "lobby-1").await;

        let result = locator
            .server_types_player_count(&[
                ServerType::Lobby,
                ServerType::Battle,
                ServerType::Minesweeper,
            ])
            .await;
        assert!(matches!(
            result,
            Err(QueryError::UnmappedServerType(ServerType::Minesweeper))
        ));

        assert!(matches!(
            locator
                .server_type_player_count(ServerType::Minesweeper)
                .await,
            Err(QueryError::UnmappedServerType(ServerType::Minesweeper))
        ));
    }

    #[tokio::test]
    async fn test_server_players() {
        let (db, locator) = setup().await;
        let on_lobby = place(&db, "proxy-a", "lobby-1").await;
        place(&db, "proxy-a", "lobby-2").await;

        let players = locator.server_players("lobby-1").await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].player_id, on_lobby);
    }
}
