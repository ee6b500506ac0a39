use crate::config::AppConfig;
use crate::db::RunRecord;
use crate::engine::trajectory::{ConvergenceTrajectory, StagePlan, TrajectoryPoint};
use crate::engine::{EstimationEngine, EstimationResult};
use crate::errors::{EngineError, EngineResult};
use crate::models::{ContractParams, SamplingMethod};
use crate::state::{AppState, DbCommand, WsMessage};
use portable_atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_SCENARIO: &str = "European Call Option";

/// Operator input for one run, as received from the presentation layer.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SimulationRequest {
    pub scenario: Option<String>,
    pub s0: f64,
    pub k: f64,
    pub t: f64,
    pub r: f64,
    pub sigma: f64,
    pub samples: Option<usize>,
    pub stages: Option<usize>,
    pub method: Option<SamplingMethod>,
    pub seed: Option<u64>,
}

/// Validated run: contract, method, stage plan and seed.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub run_id: String,
    pub scenario: String,
    pub params: ContractParams,
    pub method: SamplingMethod,
    pub plan: StagePlan,
    pub seed: Option<u64>,
}

impl SimulationRequest {
    /// Fill defaults from config and validate everything up front, so a bad
    /// request fails before any stage runs.
    pub fn resolve(&self, cfg: &AppConfig) -> EngineResult<RunSpec> {
        let samples = self.samples.unwrap_or(cfg.default_sample_budget);
        if samples > cfg.max_sample_budget {
            return Err(EngineError::InvalidParams(format!(
                "sample budget {samples} exceeds maximum {}",
                cfg.max_sample_budget
            )));
        }

        let params = ContractParams::new(self.s0, self.k, self.t, self.r, self.sigma, samples)?;
        let method = self.method.unwrap_or(SamplingMethod::Plain);
        let stages = self.stages.unwrap_or(cfg.default_stage_count);
        if stages > cfg.max_stage_count {
            return Err(EngineError::InvalidParams(format!(
                "stage count {stages} exceeds maximum {}",
                cfg.max_stage_count
            )));
        }
        let plan = StagePlan::new(samples, stages, method)?;

        Ok(RunSpec {
            run_id: uuid::Uuid::new_v4().to_string(),
            scenario: self
                .scenario
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SCENARIO.to_string()),
            params,
            method,
            plan,
            seed: self.seed.or(cfg.simulation_seed),
        })
    }
}

/// Receives trajectory points as they are produced.
pub trait StageSink {
    /// Called once, before the first stage.
    fn on_start(&mut self, _run_id: &str, _spec: &RunSpec, _reference_price: f64) {}

    /// Return `false` to abandon the run after this stage.
    fn on_stage(&mut self, run_id: &str, point: &TrajectoryPoint, stages: usize) -> bool;
}

/// Finished run, with everything persistence and the dashboard need.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub scenario: String,
    pub method: SamplingMethod,
    pub params: ContractParams,
    pub seed: Option<u64>,
    pub reference_price: f64,
    pub final_result: EstimationResult,
    pub error: f64,
    pub elapsed_secs: f64,
    pub trajectory: ConvergenceTrajectory,
}

impl RunSummary {
    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            id: self.run_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            scenario_label: self.scenario.clone(),
            sample_count: self.params.samples,
            reference_price: self.reference_price,
            final_estimate: self.final_result.estimate,
            error: self.error,
            method: self.method.to_string(),
            elapsed_secs: self.elapsed_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Box<RunSummary>),
    /// The sink stopped the run. Nothing is persisted.
    Abandoned { run_id: String, stages_completed: usize },
}

/// Run every stage of `spec`, pushing each point to `sink` and pausing
/// `stage_delay` between stages. CPU bound and blocking; call it from a
/// blocking thread in async contexts.
pub fn run_simulation(
    spec: &RunSpec,
    sink: &mut dyn StageSink,
    stage_delay: Duration,
) -> EngineResult<RunOutcome> {
    let run_id = spec.run_id.clone();
    let started = Instant::now();
    let stages = spec.plan.len();

    let mut engine = EstimationEngine::new(spec.seed);
    let trajectory = engine.run_plan(&spec.params, spec.plan.clone())?;
    let reference_price = trajectory.reference_price();

    tracing::info!(
        run_id = %run_id,
        scenario = %spec.scenario,
        method = %spec.method,
        samples = spec.params.samples,
        stages,
        reference_price,
        "simulation run started"
    );
    sink.on_start(&run_id, spec, reference_price);

    let mut points = Vec::with_capacity(stages);
    for point in trajectory {
        let point = point?;
        points.push(point);

        if !sink.on_stage(&run_id, &point, stages) {
            tracing::info!(run_id = %run_id, stage = point.stage, "run abandoned by caller");
            return Ok(RunOutcome::Abandoned {
                run_id,
                stages_completed: points.len(),
            });
        }

        if point.stage < stages && !stage_delay.is_zero() {
            std::thread::sleep(stage_delay);
        }
    }

    let final_result = match points.last() {
        Some(p) => p.result,
        None => {
            return Err(EngineError::InsufficientSamples {
                method: spec.method,
                requested: spec.params.samples,
            })
        }
    };
    let elapsed_secs = started.elapsed().as_secs_f64();
    let error = final_result.absolute_error(reference_price);

    tracing::info!(
        run_id = %run_id,
        estimate = final_result.estimate,
        reference_price,
        error,
        elapsed_secs,
        "simulation run complete"
    );

    Ok(RunOutcome::Completed(Box::new(RunSummary {
        run_id,
        scenario: spec.scenario.clone(),
        method: spec.method,
        params: spec.params,
        seed: spec.seed,
        reference_price,
        final_result,
        error,
        elapsed_secs,
        trajectory: ConvergenceTrajectory::new(spec.method, reference_price, points)?,
    })))
}

/// Cancel switch for one run, shared between the request and the
/// blocking run thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cancels its flag when dropped. The HTTP handler holds one, so a client
/// that goes away takes its run with it.
pub struct CancelOnDrop(CancelFlag);

impl CancelOnDrop {
    pub fn new(flag: CancelFlag) -> Self {
        Self(flag)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Sink that pushes every stage to connected WebSocket clients and stops
/// the run once its cancel flag is set.
pub struct BroadcastSink {
    state: Arc<AppState>,
    cancel: CancelFlag,
}

impl BroadcastSink {
    pub fn new(state: Arc<AppState>, cancel: CancelFlag) -> Self {
        Self { state, cancel }
    }
}

impl StageSink for BroadcastSink {
    fn on_start(&mut self, run_id: &str, spec: &RunSpec, reference_price: f64) {
        self.state.broadcast(WsMessage::RunStarted {
            run_id: run_id.to_string(),
            scenario: spec.scenario.clone(),
            method: spec.method,
            samples: spec.params.samples,
            stages: spec.plan.len(),
            reference_price,
        });
    }

    fn on_stage(&mut self, run_id: &str, point: &TrajectoryPoint, stages: usize) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let (band_lower, band_upper) = point.band();
        self.state.counters.stages_emitted.fetch_add(1, Ordering::Relaxed);
        self.state.broadcast(WsMessage::StagePoint {
            run_id: run_id.to_string(),
            stage: point.stage,
            stages,
            sample_count: point.sample_count,
            estimate: point.result.estimate,
            std_error: point.result.standard_error,
            band_lower,
            band_upper,
            reference_price: point.reference_price,
            abs_error: point.absolute_error(),
        });
        true
    }
}

fn record_failure(state: &AppState, run_id: &str, e: &EngineError) {
    state.counters.runs_failed.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(run_id = %run_id, error = %e, "simulation run failed");
    state.broadcast(WsMessage::RunFailed {
        run_id: run_id.to_string(),
        reason: e.to_string(),
    });
}

/// Full service-side run: stream stages, then persist and publish the
/// summary. Blocking; the server calls it through `spawn_blocking`.
///
/// Every started run ends in exactly one of completed, failed or
/// abandoned, and the counters reflect that.
pub fn execute_run(
    state: &Arc<AppState>,
    spec: &RunSpec,
    cancel: &CancelFlag,
) -> EngineResult<RunOutcome> {
    state.counters.runs_started.fetch_add(1, Ordering::Relaxed);
    let mut sink = BroadcastSink::new(state.clone(), cancel.clone());
    let delay = Duration::from_millis(state.config.stage_delay_ms);

    let outcome = match run_simulation(spec, &mut sink, delay) {
        Ok(outcome) => outcome,
        Err(e) => {
            record_failure(state, &spec.run_id, &e);
            return Err(e);
        }
    };

    match &outcome {
        RunOutcome::Completed(summary) => {
            if let Err(e) = state
                .db_tx
                .blocking_send(DbCommand::InsertRun(summary.to_record()))
            {
                let e = EngineError::ChannelClosed(format!("db writer: {e}"));
                record_failure(state, &spec.run_id, &e);
                return Err(e);
            }

            state.broadcast(WsMessage::RunCompleted {
                run_id: summary.run_id.clone(),
                final_estimate: summary.final_result.estimate,
                reference_price: summary.reference_price,
                error: summary.error,
                elapsed_secs: summary.elapsed_secs,
            });
            state.last_run_tx.send_replace(Some((**summary).clone()));
            state.counters.runs_completed.fetch_add(1, Ordering::Relaxed);
        }
        RunOutcome::Abandoned { run_id, stages_completed } => {
            state.counters.runs_abandoned.fetch_add(1, Ordering::Relaxed);
            state.broadcast(WsMessage::RunAbandoned {
                run_id: run_id.clone(),
                stages_completed: *stages_completed,
            });
        }
    }

    Ok(outcome)
}
