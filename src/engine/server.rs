// Scoreboard server: owns the live tournament session, runs the clock ticker
// and broadcasts every core event to WebSocket clients.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::archive::{LogArchive, MatchLogEntry};
use crate::db::Database;
use crate::error::{CoreError, StorageError};
use crate::metrics;

use super::config::TICK_INTERVAL_MS;
use super::events::CoreEvent;
use super::session::{BracketRequest, Command, SessionSettings, SessionSnapshot, TournamentSession};

/// Messages sent to WebSocket clients besides the core events themselves.
#[derive(Clone, Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full state, sent when a client connects.
    Snapshot { state: SessionSnapshot },
    /// A command from this client was refused.
    CommandRejected { kind: String, error: String },
}

struct LiveSession {
    session: TournamentSession,
    /// Bumped whenever a ticker is started or cancelled; a tick carrying an
    /// older generation is stale and does nothing.
    generation: u64,
    ticker: Option<JoinHandle<()>>,
}

/// Shares one tournament session between the HTTP handlers, the WebSocket
/// clients and the clock ticker task.
#[derive(Clone)]
pub struct ScoreboardServer {
    broadcast_tx: broadcast::Sender<String>,
    live: Arc<Mutex<LiveSession>>,
    db: Option<Arc<Database>>,
    persist_seq: Arc<AtomicU64>,
    /// Sequence number of the last archive snapshot written to the store.
    written_seq: Arc<tokio::sync::Mutex<u64>>,
}

impl ScoreboardServer {
    pub fn new(settings: SessionSettings, archive: LogArchive, db: Option<Arc<Database>>) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            broadcast_tx: tx,
            live: Arc::new(Mutex::new(LiveSession {
                session: TournamentSession::new(settings, archive),
                generation: 0,
                ticker: None,
            })),
            db,
            persist_seq: Arc::new(AtomicU64::new(0)),
            written_seq: Arc::new(tokio::sync::Mutex::new(0)),
        }
    }

    /// Subscribe to events. Returns a receiver that yields JSON strings.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.broadcast_tx.subscribe()
    }

    /// Connected displays and control panels.
    pub fn subscriber_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }

    pub fn has_storage(&self) -> bool {
        self.db.is_some()
    }

    /// Apply one command, start or stop the ticker to match the clock, and
    /// broadcast the resulting events.
    pub fn execute(&self, command: Command) -> Result<Vec<CoreEvent>, CoreError> {
        let mut live = self.lock();
        let events = live.session.apply(command)?;
        self.sync_ticker(&mut live);
        let to_persist = Self::archive_if_appended(&live, &events);
        drop(live);

        self.publish(&events);
        if let Some(entries) = to_persist {
            self.persist_in_background(entries);
        }
        Ok(events)
    }

    pub fn build_bracket(&self, request: BracketRequest) -> Result<Vec<CoreEvent>, CoreError> {
        let mut live = self.lock();
        let events = live.session.build_bracket(request)?;
        self.sync_ticker(&mut live);
        drop(live);
        self.publish(&events);
        Ok(events)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().session.snapshot()
    }

    pub fn snapshot_message(&self) -> ServerMessage {
        ServerMessage::Snapshot {
            state: self.snapshot(),
        }
    }

    pub fn logs(&self) -> Vec<MatchLogEntry> {
        self.lock().session.archive().read_all().to_vec()
    }

    pub fn log(&self, id: &str) -> Option<MatchLogEntry> {
        self.lock().session.archive().get(id).cloned()
    }

    /// Empty the archive and write the empty list through to the store.
    pub async fn clear_logs(&self) -> Result<(), StorageError> {
        self.lock().session.archive_mut().write_all(Vec::new());
        self.persist_now().await
    }

    /// Write the current archive to the store and wait for the result.
    pub async fn persist_now(&self) -> Result<(), StorageError> {
        let Some(db) = self.db.clone() else {
            return Ok(());
        };
        let entries = self.logs();
        let seq = self.persist_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut written = self.written_seq.lock().await;
        db.write_logs(&entries).await?;
        *written = (*written).max(seq);
        Ok(())
    }

    /// Whether a ticker task is currently outstanding.
    pub fn is_ticking(&self) -> bool {
        self.lock().ticker.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, LiveSession> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn archive_if_appended(live: &LiveSession, events: &[CoreEvent]) -> Option<Vec<MatchLogEntry>> {
        events
            .iter()
            .any(|e| matches!(e, CoreEvent::LogAppended { .. }))
            .then(|| live.session.archive().read_all().to_vec())
    }

    /// Keep exactly one ticker alive while the clock runs, none otherwise.
    fn sync_ticker(&self, live: &mut LiveSession) {
        let running = live.session.clock_running();
        match (running, live.ticker.is_some()) {
            (true, false) => {
                live.generation += 1;
                let generation = live.generation;
                let server = self.clone();
                live.ticker = Some(tokio::spawn(async move {
                    server.run_ticker(generation).await;
                }));
                metrics::ACTIVE_TICKERS.set(1);
                tracing::debug!(generation, "Clock ticker started");
            }
            (false, true) => {
                live.generation += 1;
                if let Some(handle) = live.ticker.take() {
                    handle.abort();
                }
                metrics::ACTIVE_TICKERS.set(0);
                tracing::debug!(generation = live.generation, "Clock ticker cancelled");
            }
            _ => {}
        }
    }

    async fn run_ticker(&self, generation: u64) {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
        // The first tick of an interval completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            if !self.tick_once(generation) {
                break;
            }
        }
    }

    /// One clock step. Returns false once this ticker should stop.
    fn tick_once(&self, generation: u64) -> bool {
        let mut live = self.lock();
        if live.generation != generation {
            return false;
        }
        let events = live.session.tick();
        let still_running = live.session.clock_running();
        if !still_running {
            // Expired or completed: this task is the ticker, so just release it.
            live.ticker = None;
            live.generation += 1;
            metrics::ACTIVE_TICKERS.set(0);
        }
        let to_persist = Self::archive_if_appended(&live, &events);
        drop(live);

        self.publish(&events);
        if let Some(entries) = to_persist {
            self.persist_in_background(entries);
        }
        still_running
    }

    fn publish(&self, events: &[CoreEvent]) {
        for event in events {
            if let Ok(json) = serde_json::to_string(event) {
                let _ = self.broadcast_tx.send(json);
            }
        }
    }

    /// Write an archive snapshot without blocking match flow. Failures are
    /// logged, counted and broadcast as `storage_failed`.
    fn persist_in_background(&self, entries: Vec<MatchLogEntry>) {
        let Some(db) = self.db.clone() else {
            return;
        };
        let seq = self.persist_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let written_seq = self.written_seq.clone();
        let tx = self.broadcast_tx.clone();
        tokio::spawn(async move {
            let mut written = written_seq.lock().await;
            if *written > seq {
                // A newer snapshot is already stored.
                return;
            }
            match db.write_logs(&entries).await {
                Ok(()) => {
                    *written = seq;
                    tracing::debug!(entries = entries.len(), "Match logs persisted");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to persist match logs");
                    metrics::STORAGE_FAILURES_TOTAL.inc();
                    let event = CoreEvent::StorageFailed {
                        message: e.to_string(),
                    };
                    if let Ok(json) = serde_json::to_string(&event) {
                        let _ = tx.send(json);
                    }
                }
            }
        });
    }
}
