//! Server types and the fleet names their game servers are prefixed with.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SERVER_TYPE_COUNT: usize = 10;

/// Kind of server a player can be on.
///
/// `Proxy` is the edge tier every connected player passes through; the rest
/// are game-server fleets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerType {
    Proxy,
    Lobby,
    Marathon,
    BlockSumo,
    Parkourtag,
    Lazertag,
    HoleyMoley,
    MarathonRacing,
    Battle,
    Minesweeper,
}

impl ServerType {
    pub const ALL: [ServerType; SERVER_TYPE_COUNT] = [
        ServerType::Proxy,
        ServerType::Lobby,
        ServerType::Marathon,
        ServerType::BlockSumo,
        ServerType::Parkourtag,
        ServerType::Lazertag,
        ServerType::HoleyMoley,
        ServerType::MarathonRacing,
        ServerType::Battle,
        ServerType::Minesweeper,
    ];

    /// Wire name, e.g. `BLOCK_SUMO`.
    pub fn as_str(self) -> &'static str {
        match self {
            ServerType::Proxy => "PROXY",
            ServerType::Lobby => "LOBBY",
            ServerType::Marathon => "MARATHON",
            ServerType::BlockSumo => "BLOCK_SUMO",
            ServerType::Parkourtag => "PARKOURTAG",
            ServerType::Lazertag => "LAZERTAG",
            ServerType::HoleyMoley => "HOLEY_MOLEY",
            ServerType::MarathonRacing => "MARATHON_RACING",
            ServerType::Battle => "BATTLE",
            ServerType::Minesweeper => "MINESWEEPER",
        }
    }

    fn ordinal(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown server type '{0}'")]
pub struct UnknownServerType(pub String);

impl FromStr for ServerType {
    type Err = UnknownServerType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServerType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownServerType(s.to_string()))
    }
}

/// Immutable mapping from game-server type to fleet name.
///
/// Built once at startup and shared by reference. The proxy tier never has an
/// entry: it is counted as every tracked player.
#[derive(Debug, Clone)]
pub struct FleetTable {
    fleets: [Option<&'static str>; SERVER_TYPE_COUNT],
}

impl FleetTable {
    /// Table with the given `(type, fleet name)` entries. Entries for
    /// [`ServerType::Proxy`] are ignored.
    pub fn new(entries: impl IntoIterator<Item = (ServerType, &'static str)>) -> Self {
        let mut fleets = [None; SERVER_TYPE_COUNT];
        for (server_type, fleet) in entries {
            if server_type != ServerType::Proxy {
                fleets[server_type.ordinal()] = Some(fleet);
            }
        }
        Self { fleets }
    }

    /// The fleets deployed on the network.
    pub fn standard() -> Self {
        Self::new([
            (ServerType::Lobby, "lobby"),
            (ServerType::Marathon, "marathon"),
            (ServerType::BlockSumo, "block-sumo"),
            (ServerType::Parkourtag, "parkourtag"),
            (ServerType::Lazertag, "lazertag"),
            (ServerType::HoleyMoley, "holey-moley"),
            (ServerType::MarathonRacing, "marathon-racing"),
            (ServerType::Battle, "battle"),
            (ServerType::Minesweeper, "minesweeper"),
        ])
    }

    /// Fleet name for a game-server type, if it has one.
    pub fn fleet_name(&self, server_type: ServerType) -> Option<&'static str> {
        self.fleets[server_type.ordinal()]
    }
}

impl Default for FleetTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_types() {
        assert_eq!("LOBBY".parse(), Ok(ServerType::Lobby));
        assert_eq!("BLOCK_SUMO".parse(), Ok(ServerType::BlockSumo));
        assert_eq!("PROXY".parse(), Ok(ServerType::Proxy));
        assert_eq!(
            "lobby".parse::<ServerType>(),
            Err(UnknownServerType("lobby".to_string()))
        );
        assert!("TOWER_DEFENCE".parse::<ServerType>().is_err());
    }

    #[test]
    fn test_wire_names_round_trip_through_serde() {
        for server_type in ServerType::ALL {
            let json = serde_json::to_string(&server_type).unwrap();
            assert_eq!(json, format!("\"{}\"", server_type.as_str()));
        }
    }

    #[test]
    fn test_standard_table() {
        let table = FleetTable::standard();
        assert_eq!(table.fleet_name(ServerType::Lobby), Some("lobby"));
        assert_eq!(table.fleet_name(ServerType::BlockSumo), Some("block-sumo"));
        assert_eq!(
            table.fleet_name(ServerType::MarathonRacing),
            Some("marathon-racing")
        );
        assert_eq!(table.fleet_name(ServerType::Proxy), None);

        // Every game-server type is mapped
        for server_type in ServerType::ALL.into_iter().skip(1) {
            assert!(table.fleet_name(server_type).is_some(), "{server_type}");
        }
    }

    #[test]
    fn test_partial_table() {
        let table = FleetTable::new([
            (ServerType::Lobby, "hub"),
            (ServerType::Proxy, "ignored"),
        ]);
        assert_eq!(table.fleet_name(ServerType::Lobby), Some("hub"));
        assert_eq!(table.fleet_name(ServerType::Proxy), None);
        assert_eq!(table.fleet_name(ServerType::Battle), None);
    }
}
