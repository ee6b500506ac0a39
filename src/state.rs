use crate::config::AppConfig;
use crate::db::{DbPool, RunRecord};
use crate::models::SamplingMethod;
use crate::runner::RunSummary;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

// ── Messages OUT to the presentation layer ──

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "run_started")]
    RunStarted {
        run_id: String,
        scenario: String,
        method: SamplingMethod,
        samples: usize,
        stages: usize,
        reference_price: f64,
    },

    #[serde(rename = "stage_point")]
    StagePoint {
        run_id: String,
        stage: usize,
        stages: usize,
        sample_count: usize,
        estimate: f64,
        std_error: f64,
        band_lower: f64,
        band_upper: f64,
        reference_price: f64,
        abs_error: f64,
    },

    #[serde(rename = "run_completed")]
    RunCompleted {
        run_id: String,
        final_estimate: f64,
        reference_price: f64,
        error: f64,
        elapsed_secs: f64,
    },

    #[serde(rename = "run_failed")]
    RunFailed { run_id: String, reason: String },

    #[serde(rename = "run_abandoned")]
    RunAbandoned { run_id: String, stages_completed: usize },

    /// Snapshot sent once to a newly connected client.
    #[serde(rename = "last_run")]
    LastRun { summary: Box<RunSummary> },
}

// ── DB Commands (sent to writer task via bounded channel) ──

#[derive(Debug)]
pub enum DbCommand {
    InsertRun(RunRecord),
}

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub runs_started: AtomicU64,
    pub runs_completed: AtomicU64,
    pub runs_failed: AtomicU64,
    pub runs_abandoned: AtomicU64,
    pub stages_emitted: AtomicU64,
    pub ws_messages_sent: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            runs_abandoned: AtomicU64::new(0),
            stages_emitted: AtomicU64::new(0),
            ws_messages_sent: AtomicU64::new(0),
        }
    }
}

impl Default for PerfCounters {
    fn default() -> Self {
        Self::new()
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,

    // Runner -> Dashboard: latest completed run (watch = single value, many readers)
    pub last_run_tx: watch::Sender<Option<RunSummary>>,
    pub last_run_rx: watch::Receiver<Option<RunSummary>>,

    // Runner -> Dashboard: stage stream (broadcast for WS clients)
    pub ws_tx: broadcast::Sender<WsMessage>,

    // Runner -> DB Writer: bounded command channel
    pub db_tx: mpsc::Sender<DbCommand>,

    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool, db_tx: mpsc::Sender<DbCommand>) -> Arc<Self> {
        let (ws_tx, _) = broadcast::channel(2048);
        let (last_run_tx, last_run_rx) = watch::channel(None);

        Arc::new(Self {
            config,
            db,
            last_run_tx,
            last_run_rx,
            ws_tx,
            db_tx,
            counters: PerfCounters::new(),
        })
    }

    /// Push to every connected client. No subscribers is not an error.
    #[inline]
    pub fn broadcast(&self, msg: WsMessage) {
        self.counters.ws_messages_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.ws_tx.send(msg);
    }
}
