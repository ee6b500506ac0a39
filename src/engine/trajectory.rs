use crate::engine::{EstimationEngine, EstimationResult};
use crate::errors::{EngineError, EngineResult};
use crate::models::{ContractParams, SamplingMethod};
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;

/// Checkpoints for a progressive run: budget * i / k for i = 1..=k.
///
/// Requires 1 <= k <= budget, which keeps checkpoints strictly increasing,
/// and the last checkpoint is always the full budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    method: SamplingMethod,
    checkpoints: Vec<usize>,
}

impl StagePlan {
    pub fn new(budget: usize, stages: usize, method: SamplingMethod) -> EngineResult<Self> {
        if stages == 0 {
            return Err(EngineError::InvalidParams("stage count must be >= 1".into()));
        }
        if stages > budget {
            return Err(EngineError::InvalidParams(format!(
                "stage count {stages} exceeds sample budget {budget}"
            )));
        }

        let checkpoints: Vec<usize> = (1..=stages)
            .map(|i| (budget as u128 * i as u128 / stages as u128) as usize)
            .collect();

        let first = checkpoints[0];
        if first < method.min_samples() {
            return Err(EngineError::InsufficientSamples {
                method,
                requested: first,
            });
        }

        Ok(Self { method, checkpoints })
    }

    #[inline]
    pub fn method(&self) -> SamplingMethod {
        self.method
    }

    #[inline]
    pub fn checkpoints(&self) -> &[usize] {
        &self.checkpoints
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

/// One stage of a convergence trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// 1-based stage index
    pub stage: usize,
    /// Requested checkpoint budget for this stage
    pub sample_count: usize,
    pub result: EstimationResult,
    pub reference_price: f64,
}

impl TrajectoryPoint {
    #[inline]
    pub fn band(&self) -> (f64, f64) {
        self.result.ci95()
    }

    #[inline]
    pub fn absolute_error(&self) -> f64 {
        self.result.absolute_error(self.reference_price)
    }
}

/// Lazily evaluated trajectory. Each `next()` runs one fully independent
/// simulation at that stage's checkpoint; stages share nothing but the
/// engine's generator, which keeps advancing. Dropping the iterator between
/// stages abandons the run with nothing to undo.
///
/// Not guaranteed to tighten monotonically stage by stage, only in
/// expectation.
pub struct Trajectory<'a> {
    engine: &'a mut EstimationEngine,
    params: ContractParams,
    plan: StagePlan,
    reference: f64,
    next: usize,
}

impl<'a> Trajectory<'a> {
    pub(crate) fn new(
        engine: &'a mut EstimationEngine,
        params: ContractParams,
        plan: StagePlan,
        reference: f64,
    ) -> Self {
        Self {
            engine,
            params,
            plan,
            reference,
            next: 0,
        }
    }

    #[inline]
    pub fn reference_price(&self) -> f64 {
        self.reference
    }

    #[inline]
    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    #[inline]
    pub fn stages_remaining(&self) -> usize {
        self.plan.len() - self.next
    }
}

impl Iterator for Trajectory<'_> {
    type Item = EngineResult<TrajectoryPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        let sample_count = *self.plan.checkpoints.get(self.next)?;
        let stage = self.next + 1;
        let params = self.params.with_samples(sample_count);

        match self.engine.estimate(&params, self.plan.method) {
            Ok(result) => {
                self.next += 1;
                tracing::debug!(stage, sample_count, estimate = result.estimate, "stage complete");
                Some(Ok(TrajectoryPoint {
                    stage,
                    sample_count,
                    result,
                    reference_price: self.reference,
                }))
            }
            Err(e) => {
                // One failure ends the trajectory
                self.next = self.plan.len();
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.stages_remaining()))
    }
}

impl FusedIterator for Trajectory<'_> {}

/// Collected trajectory: sample counts strictly increase and every point
/// shares the same reference price. `new` enforces both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceTrajectory {
    method: SamplingMethod,
    reference_price: f64,
    points: Vec<TrajectoryPoint>,
}

impl ConvergenceTrajectory {
    pub fn new(
        method: SamplingMethod,
        reference_price: f64,
        points: Vec<TrajectoryPoint>,
    ) -> EngineResult<Self> {
        if let Some(w) = points.windows(2).find(|w| w[0].sample_count >= w[1].sample_count) {
            return Err(EngineError::InvalidParams(format!(
                "trajectory sample counts must increase: {} then {}",
                w[0].sample_count, w[1].sample_count
            )));
        }
        if let Some(p) = points
            .iter()
            .find(|p| p.reference_price.to_bits() != reference_price.to_bits())
        {
            return Err(EngineError::InvalidParams(format!(
                "stage {} reference {} differs from trajectory reference {reference_price}",
                p.stage, p.reference_price
            )));
        }

        Ok(Self {
            method,
            reference_price,
            points,
        })
    }

    pub fn method(&self) -> SamplingMethod {
        self.method
    }

    pub fn reference_price(&self) -> f64 {
        self.reference_price
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn final_point(&self) -> Option<&TrajectoryPoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> Vec<TrajectoryPoint> {
        self.points
    }
}
