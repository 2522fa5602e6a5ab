//! The ingestion worker.
//!
//! One worker pulls deliveries from an [`EventSource`] strictly one at a time,
//! applies each event to the store and only then acknowledges it. Per delivery:
//!
//! - decoded and applied: ack
//! - not decodable: reject, never retried
//! - store failure: left unsettled so the broker redelivers it
//!
//! A disconnect for a player with no record counts as applied.

use super::event::{self, PlayerEvent};
use super::queue::{Delivery, EventSource};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracker_db::{Database, DbError, PlayerName};
use uuid::Uuid;

/// Store mutations the pipeline performs.
#[async_trait]
pub trait LocationWriter: Send + Sync {
    async fn set_proxy(
        &self,
        player_id: Uuid,
        proxy_id: String,
        username: Option<PlayerName>,
    ) -> tracker_db::Result<()>;

    async fn set_game_server(&self, player_id: Uuid, server_id: String) -> tracker_db::Result<()>;

    async fn remove(&self, player_id: Uuid) -> tracker_db::Result<()>;
}

#[async_trait]
impl LocationWriter for Database {
    async fn set_proxy(
        &self,
        player_id: Uuid,
        proxy_id: String,
        username: Option<PlayerName>,
    ) -> tracker_db::Result<()> {
        self.set_player_proxy(player_id, proxy_id, username).await
    }

    async fn set_game_server(&self, player_id: Uuid, server_id: String) -> tracker_db::Result<()> {
        self.set_player_game_server(player_id, server_id).await
    }

    async fn remove(&self, player_id: Uuid) -> tracker_db::Result<()> {
        self.delete_player(player_id).await
    }
}

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Applied to the store and acknowledged
    Applied,
    /// Disconnect for a player already gone; acknowledged
    AlreadyGone,
    /// Undecodable; rejected without requeue
    Rejected,
    /// Store failure; left for redelivery
    Deferred,
}

pub struct Pipeline<S, W> {
    source: S,
    writer: W,
    retry_delay: Duration,
}

impl<S: EventSource, W: LocationWriter> Pipeline<S, W> {
    pub fn new(source: S, writer: W) -> Self {
        Self {
            source,
            writer,
            retry_delay: Duration::ZERO,
        }
    }

    /// Pause this long after a store failure before taking the next delivery.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Consume until the source closes. A failing delivery never stops the loop.
    pub async fn run(mut self) {
        info!("listening for messages");

        while let Some(delivery) = self.source.next_delivery().await {
            let span = info_span!(
                "delivery",
                tag = delivery.tag,
                type_tag = %delivery.envelope.type_tag,
                redelivered = delivery.redelivered
            );
            let outcome = handle_delivery(&self.writer, delivery)
                .instrument(span)
                .await;

            if outcome == Outcome::Deferred && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        info!("event source closed, stopping");
    }

    /// Decode, apply and settle one delivery.
    pub async fn handle(&self, delivery: Delivery) -> Outcome {
        handle_delivery(&self.writer, delivery).await
    }
}

// Must not borrow the source: the worker future has to stay Send
async fn handle_delivery<W: LocationWriter>(writer: &W, delivery: Delivery) -> Outcome {
    let event = match event::decode(&delivery.envelope) {
        Ok(event) => event,
        Err(err) => {
            error!(error = %err, "discarding message that cannot be decoded");
            if let Err(err) = delivery.reject().await {
                error!(error = %err, "error rejecting message");
            }
            return Outcome::Rejected;
        }
    };

    let player_id = event.player_id();
    match apply(writer, event).await {
        Ok(outcome) => {
            if let Err(err) = delivery.ack().await {
                error!(%player_id, error = %err, "error acknowledging message");
            }
            outcome
        }
        Err(err) => {
            // Dropping the delivery unsettled hands it back to the broker
            warn!(%player_id, error = %err, "failed to apply event, leaving for redelivery");
            Outcome::Deferred
        }
    }
}

async fn apply<W: LocationWriter>(writer: &W, event: PlayerEvent) -> tracker_db::Result<Outcome> {
    match event {
        PlayerEvent::Connect {
            player_id,
            proxy_id,
            username,
        } => {
            writer.set_proxy(player_id, proxy_id, username).await?;
            Ok(Outcome::Applied)
        }
        PlayerEvent::Switch {
            player_id,
            server_id,
        } => {
            writer.set_game_server(player_id, server_id).await?;
            Ok(Outcome::Applied)
        }
        PlayerEvent::Disconnect { player_id } => match writer.remove(player_id).await {
            Ok(()) => Ok(Outcome::Applied),
            Err(DbError::PlayerNotFound) => {
                debug!(%player_id, "disconnect for untracked player");
                Ok(Outcome::AlreadyGone)
            }
            Err(err) => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::event::{CONNECT_TYPE, Envelope, SWITCH_TYPE};
    use crate::ingest::queue::{QueueStats, memory_queue};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` mutations with a timeout, then delegates.
    struct FlakyWriter {
        db: Database,
        failures: AtomicUsize,
    }

    impl FlakyWriter {
        fn new(db: Database, failures: usize) -> Self {
            Self {
                db,
                failures: AtomicUsize::new(failures),
            }
        }

        fn fail(&self) -> tracker_db::Result<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(DbError::Timeout(Duration::from_secs(5)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LocationWriter for FlakyWriter {
        async fn set_proxy(
            &self,
            player_id: Uuid,
            proxy_id: String,
            username: Option<PlayerName>,
        ) -> tracker_db::Result<()> {
            self.fail()?;
            self.db.set_player_proxy(player_id, proxy_id, username).await
        }

        async fn set_game_server(&self, player_id: Uuid, server_id: String) -> tracker_db::Result<()> {
            self.fail()?;
            self.db.set_player_game_server(player_id, server_id).await
        }

        async fn remove(&self, player_id: Uuid) -> tracker_db::Result<()> {
            self.fail()?;
            self.db.delete_player(player_id).await
        }
    }

    fn connect(player_id: Uuid, proxy_id: &str) -> Envelope {
        PlayerEvent::Connect {
            player_id,
            proxy_id: proxy_id.to_string(),
            username: None,
        }
        .to_envelope()
    }

    fn switch(player_id: Uuid, server_id: &str) -> Envelope {
        PlayerEvent::Switch {
            player_id,
            server_id: server_id.to_string(),
        }
        .to_envelope()
    }

    fn disconnect(player_id: Uuid) -> Envelope {
        PlayerEvent::Disconnect { player_id }.to_envelope()
    }

    /// Publish everything, close the queue and run the worker until it drains.
    async fn run_all<W: LocationWriter>(writer: W, envelopes: Vec<Envelope>) -> Arc<QueueStats> {
        let (publisher, consumer) = memory_queue("player-tracker:test", 64);
        for envelope in envelopes {
            publisher.try_publish(envelope).unwrap();
        }
        drop(publisher);

        let stats = consumer.stats();
        Pipeline::new(consumer, writer).run().await;
        stats
    }

    #[tokio::test]
    async fn test_full_session_leaves_no_record() {
        let db = Database::open_in_memory().await.unwrap();
        let p1 = Uuid::new_v4();

        let stats = run_all(
            db.clone(),
            vec![
                connect(p1, "proxy-A"),
                switch(p1, "lobby-1"),
                switch(p1, "lobby-2"),
                disconnect(p1),
            ],
        )
        .await;

        assert!(db.get_player(p1).await.unwrap().is_none());
        assert_eq!(db.count_fleet_players("lobby").await.unwrap(), 0);
        assert_eq!(stats.acked(), 4);
        assert_eq!(stats.rejected(), 0);
    }

    #[tokio::test]
    async fn test_connect_with_oversized_username_records_proxy() {
        let db = Database::open_in_memory().await.unwrap();
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let connect_named = |player_id: Uuid, name: &str| {
            Envelope::new(
                CONNECT_TYPE,
                serde_json::json!({
                    "playerId": player_id.to_string(),
                    "serverId": "proxy-a",
                    "playerUsername": name,
                })
                .to_string(),
            )
        };

        let stats = run_all(
            db.clone(),
            vec![
                connect_named(p1, ".BedrockPlayer123"),
                connect_named(p2, "Дмитрий_Ив"),
                switch(p2, "lobby:eu-1"),
            ],
        )
        .await;

        assert_eq!(stats.acked(), 3);
        assert_eq!(stats.rejected(), 0);
        for player_id in [p1, p2] {
            let location = db.get_player(player_id).await.unwrap().unwrap();
            assert_eq!(location.proxy_id.as_deref(), Some("proxy-a"));
            assert_eq!(location.username, None);
        }
        let location = db.get_player(p2).await.unwrap().unwrap();
        assert_eq!(location.game_server_id.as_deref(), Some("lobby:eu-1"));
    }

    #[tokio::test]
    async fn test_switch_before_connect() {
        let db = Database::open_in_memory().await.unwrap();
        let p2 = Uuid::new_v4();

        run_all(db.clone(), vec![switch(p2, "lobby-1")]).await;

        let location = db.get_player(p2).await.unwrap().unwrap();
        assert_eq!(location.game_server_id.as_deref(), Some("lobby-1"));
        assert_eq!(location.proxy_id, None);

        // The late connect fills in the proxy without touching the server
        run_all(db.clone(), vec![connect(p2, "proxy-A")]).await;
        let location = db.get_player(p2).await.unwrap().unwrap();
        assert_eq!(location.game_server_id.as_deref(), Some("lobby-1"));
        assert_eq!(location.proxy_id.as_deref(), Some("proxy-A"));
    }

    #[tokio::test]
    async fn test_redelivered_events_are_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let player_id = Uuid::new_v4();

        run_all(
            db.clone(),
            vec![
                connect(player_id, "proxy-A"),
                connect(player_id, "proxy-A"),
                switch(player_id, "lobby-1"),
                switch(player_id, "lobby-1"),
            ],
        )
        .await;

        assert_eq!(db.player_count().await.unwrap(), 1);
        let location = db.get_player(player_id).await.unwrap().unwrap();
        assert_eq!(location.proxy_id.as_deref(), Some("proxy-A"));
        assert_eq!(location.game_server_id.as_deref(), Some("lobby-1"));
    }

    #[tokio::test]
    async fn test_repeated_disconnect_is_acknowledged() {
        let db = Database::open_in_memory().await.unwrap();
        let player_id = Uuid::new_v4();

        let stats = run_all(
            db.clone(),
            vec![
                connect(player_id, "proxy-A"),
                disconnect(player_id),
                disconnect(player_id),
            ],
        )
        .await;

        assert_eq!(stats.acked(), 3);
        assert_eq!(stats.redelivered(), 0);
        assert_eq!(db.player_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_messages_are_rejected_and_skipped() {
        let db = Database::open_in_memory().await.unwrap();
        let player_id = Uuid::new_v4();

        let stats = run_all(
            db.clone(),
            vec![
                Envelope::new("tracker.message.PartyCreatedMessage", "{}"),
                Envelope::new(CONNECT_TYPE, "garbage"),
                Envelope::new(SWITCH_TYPE, r#"{"playerId":"Steve","serverId":"lobby-1"}"#),
                switch(player_id, "lobby-1"),
            ],
        )
        .await;

        assert_eq!(stats.rejected(), 3);
        assert_eq!(stats.acked(), 1);
        assert_eq!(stats.redelivered(), 0);
        assert_eq!(db.player_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_event_for_redelivery() {
        let db = Database::open_in_memory().await.unwrap();
        let player_id = Uuid::new_v4();

        let stats = run_all(
            FlakyWriter::new(db.clone(), 2),
            vec![connect(player_id, "proxy-A"), switch(player_id, "lobby-1")],
        )
        .await;

        // Connect failed twice, was redelivered twice, then applied
        assert_eq!(stats.redelivered(), 2);
        assert_eq!(stats.acked(), 2);
        let location = db.get_player(player_id).await.unwrap().unwrap();
        assert_eq!(location.proxy_id.as_deref(), Some("proxy-A"));
        assert_eq!(location.game_server_id.as_deref(), Some("lobby-1"));
    }

    #[tokio::test]
    async fn test_handle_outcomes() {
        let db = Database::open_in_memory().await.unwrap();
        let player_id = Uuid::new_v4();
        let (publisher, mut consumer) = memory_queue("player-tracker:test", 8);
        for envelope in [
            disconnect(player_id),
            connect(player_id, "proxy-A"),
            Envelope::new("unknown", "{}"),
        ] {
            publisher.try_publish(envelope).unwrap();
        }
        drop(publisher);

        let stats = consumer.stats();
        let mut deliveries = Vec::new();
        while let Some(delivery) = consumer.next_delivery().await {
            deliveries.push(delivery);
            if deliveries.len() == 3 {
                break;
            }
        }

        let pipeline = Pipeline::new(consumer, FlakyWriter::new(db.clone(), 1));
        let mut outcomes = Vec::new();
        for delivery in deliveries {
            outcomes.push(pipeline.handle(delivery).await);
        }

        // The disconnect hit the injected failure
        assert_eq!(
            outcomes,
            vec![Outcome::Deferred, Outcome::Applied, Outcome::Rejected]
        );
        assert_eq!(stats.redelivered(), 1);
        assert_eq!(stats.acked(), 1);
        assert_eq!(stats.rejected(), 1);
    }
}
