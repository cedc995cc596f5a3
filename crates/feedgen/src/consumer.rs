//! Consumer: wires feeds, cursor recovery, the checkpoint scheduler and the stream driver.

use crate::config::ConsumerConfig;
use crate::cursor::{resume, ResumeSource, RunState};
use crate::dispatcher::Dispatcher;
use crate::driver::StreamDriver;
use crate::error::ConsumerError;
use crate::feeds::{build_feeds, Feed};
use crate::scheduler::CheckpointScheduler;
use crate::store::CheckpointStore;
use crate::transport::{JetstreamClient, JetstreamConfig, Transport};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

pub struct Consumer {
    config: ConsumerConfig,
    store: Arc<dyn CheckpointStore>,
    span: tracing::Span,
}

impl Consumer {
    pub fn new(config: ConsumerConfig, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            config,
            store,
            span: tracing::info_span!("consumer"),
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Consume from Jetstream until `shutdown` flips to true or a fatal error.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        let client = JetstreamClient::new(JetstreamConfig {
            url: self.config.jetstream_url.clone(),
            ..Default::default()
        });
        self.run_with_transport(Arc::new(client), shutdown).await
    }

    /// Same as [`Consumer::run`] over any transport.
    pub async fn run_with_transport(
        &self,
        transport: Arc<dyn Transport>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConsumerError> {
        self.run_inner(transport, shutdown)
            .instrument(self.span.clone())
            .await
    }

    async fn run_inner(
        &self,
        transport: Arc<dyn Transport>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConsumerError> {
        let feeds: Arc<[Feed]> = build_feeds(&self.config.feed_names, &self.store).into();
        for feed in feeds.iter() {
            feed.store()
                .register()
                .map_err(|source| ConsumerError::InitFeed {
                    feed: feed.name().to_string(),
                    source,
                })?;
        }
        tracing::info!(
            feeds = ?feeds.iter().map(Feed::name).collect::<Vec<_>>(),
            "feeds enabled"
        );

        let start = resume(self.config.start_cursor, &feeds)?;
        let lag_s = start.cursor.lag().as_secs_f64();
        match start.source {
            ResumeSource::Explicit => {
                tracing::info!(cursor = %start.cursor, lag_s, "starting at requested cursor")
            }
            ResumeSource::Checkpoint => {
                tracing::info!(saved_cursor = %start.cursor, lag_s, "resuming from saved cursor")
            }
            ResumeSource::FreshStart => tracing::info!(
                cursor = %start.cursor,
                "no saved cursor in database, starting at current time"
            ),
        }

        let state = Arc::new(RunState::new(start.cursor));

        let mut scheduler = CheckpointScheduler::new(
            Arc::clone(&feeds),
            Arc::clone(&state),
            transport.counters(),
            self.config.checkpoint_interval,
        );
        if self.config.stats {
            scheduler = scheduler.with_stats(self.config.stats_every);
        }
        let scheduler = tokio::spawn(scheduler.run(shutdown.clone()).in_current_span());

        let dispatcher = Arc::new(Dispatcher::new(feeds, Arc::clone(&state)));
        let driver = StreamDriver::new(
            transport,
            dispatcher,
            Arc::clone(&state),
            self.config.reconnection.clone(),
        );

        tracing::info!(cursor = %start.cursor, source = %start.source, "starting consumer");
        let result = driver.run(shutdown).await;
        match &result {
            Ok(()) => {
                if let Err(e) = scheduler.await {
                    tracing::warn!(reason = %e, "checkpoint scheduler did not stop cleanly");
                }
            }
            Err(_) => scheduler.abort(),
        }
        tracing::info!(latest_cursor = %state.latest_cursor(), "consumer stopped");
        result.map_err(ConsumerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::dispatcher::EventHandler;
    use crate::error::StoreError;
    use crate::event::Event;
    use crate::feeds::testing::post_event;
    use crate::feeds::Year;
    use crate::store::{FeedMatch, SqliteStore};
    use crate::transport::{ReadCounters, TransportError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Delivers its events on the first connect, then either hangs or fails fatally.
    struct Replay {
        events: Mutex<Vec<Event>>,
        hang: bool,
        connects: Mutex<Vec<Cursor>>,
        counters: Arc<ReadCounters>,
    }

    impl Replay {
        fn new(events: Vec<Event>, hang: bool) -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(events),
                hang,
                connects: Mutex::new(Vec::new()),
                counters: Arc::default(),
            })
        }
    }

    #[async_trait]
    impl Transport for Replay {
        async fn connect_and_read(
            &self,
            cursor: Cursor,
            handler: &dyn EventHandler,
        ) -> Result<(), TransportError> {
            self.connects.lock().push(cursor);
            let events = std::mem::take(&mut *self.events.lock());
            for ev in &events {
                self.counters.record(100);
                handler.handle(ev)?;
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            Err(TransportError::Connect("no more events".into()))
        }

        fn counters(&self) -> Arc<ReadCounters> {
            Arc::clone(&self.counters)
        }
    }

    struct NoFeeds(SqliteStore);

    impl CheckpointStore for NoFeeds {
        fn upsert_feed(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only".into()))
        }
        fn feed_checkpoint(&self, feed_name: &str) -> Result<Option<Cursor>, StoreError> {
            self.0.feed_checkpoint(feed_name)
        }
        fn update_feed_checkpoint(&self, feed_name: &str, cursor: Cursor) -> Result<(), StoreError> {
            self.0.update_feed_checkpoint(feed_name, cursor)
        }
        fn upsert_feed_match(&self, f: &str, c: Cursor, d: &str, r: &str) -> Result<(), StoreError> {
            self.0.upsert_feed_match(f, c, d, r)
        }
        fn feed_matches(&self, feed_name: &str, limit: usize) -> Result<Vec<FeedMatch>, StoreError> {
            self.0.feed_matches(feed_name, limit)
        }
    }

    fn config(feeds: &[&str], start: i64) -> ConsumerConfig {
        ConsumerConfig {
            start_cursor: Cursor::new(start),
            feed_names: feeds.iter().map(|s| s.to_string()).collect(),
            checkpoint_interval: Duration::from_millis(100),
            reconnection: crate::config::ReconnectionConfig::immediate(),
            ..Default::default()
        }
    }

    fn kubecon_event(time_us: i64, rkey: &str) -> Event {
        let tag = format!("KubeCon{}", Year::current().short());
        let text = format!("Excited for #{tag} next week!");
        let record = serde_json::json!({
            "text": text,
            "facets": [{
                "index": {"byteStart": 12, "byteEnd": 12 + tag.len() + 1},
                "features": [{"$type": "app.bsky.richtext.facet#tag", "tag": tag}]
            }],
            "langs": ["en"],
            "createdAt": "2025-03-01T12:00:00Z"
        });
        post_event(time_us, rkey, &record.to_string())
    }

    #[tokio::test]
    async fn kubecon_post_is_recorded() {
        let store: Arc<dyn CheckpointStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let consumer = Consumer::new(config(&["kubecon"], 100), Arc::clone(&store));
        let transport = Replay::new(vec![kubecon_event(150, "3kxyz")], false);
        let (_tx, rx) = watch::channel(false);

        let err = consumer.run_with_transport(transport, rx).await.unwrap_err();
        assert!(matches!(err, ConsumerError::Transport(TransportError::Connect(_))));

        let rows = store.feed_matches("kubecon", 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].did, "did:plc:author");
        assert_eq!(rows[0].rkey, "3kxyz");
        assert_eq!(rows[0].cursor, Cursor::new(150));
    }

    #[tokio::test]
    async fn resumes_from_earliest_checkpoint() {
        let store: Arc<dyn CheckpointStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.update_feed_checkpoint("kubecon", Cursor::new(50)).unwrap();
        store.update_feed_checkpoint("composer-errors", Cursor::new(30)).unwrap();
        let consumer = Consumer::new(config(&["kubecon", "composer-errors"], 0), Arc::clone(&store));
        let transport = Replay::new(vec![], false);
        let (_tx, rx) = watch::channel(false);

        consumer
            .run_with_transport(Arc::clone(&transport) as Arc<dyn Transport>, rx)
            .await
            .unwrap_err();
        assert_eq!(*transport.connects.lock(), vec![Cursor::new(30)]);
    }

    #[tokio::test]
    async fn feed_registration_failure_is_fatal() {
        let store: Arc<dyn CheckpointStore> =
            Arc::new(NoFeeds(SqliteStore::open_in_memory().unwrap()));
        let consumer = Consumer::new(config(&["kubecon"], 1), store);
        let transport = Replay::new(vec![], true);
        let (_tx, rx) = watch::channel(false);

        let err = consumer
            .run_with_transport(Arc::clone(&transport) as Arc<dyn Transport>, rx)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsumerError::InitFeed { ref feed, .. } if feed == "kubecon"));
        assert!(transport.connects.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_cleanly_after_checkpointing() {
        let store: Arc<dyn CheckpointStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let consumer = Consumer::new(config(&["kubecon"], 100), Arc::clone(&store));
        let transport = Replay::new(vec![kubecon_event(200, "a"), kubecon_event(210, "b")], true);
        let (tx, rx) = watch::channel(false);

        let run = tokio::spawn(async move { consumer.run_with_transport(transport, rx).await });
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(store.feed_checkpoint("kubecon").unwrap(), Some(Cursor::new(210)));

        tx.send(true).unwrap();
        run.await.unwrap().unwrap();
        assert_eq!(store.feed_matches("kubecon", 10).unwrap().len(), 2);
    }
}
