pub mod stats;
pub mod trajectory;

use crate::errors::{EngineError, EngineResult};
use crate::models::{BlackScholesCall, ContractParams, PathSampler, RandomSource, SamplingMethod};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stats::PayoffStats;
use trajectory::{ConvergenceTrajectory, StagePlan, Trajectory};

/// Draws per block in the parallel estimator. Fixed so the block
/// partition, and therefore the result, does not depend on thread count.
pub const PARALLEL_BLOCK_DRAWS: usize = 4096;

/// z for a two-sided 95% interval
pub const Z_95: f64 = 1.96;

/// One Monte Carlo price estimate. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    /// Discounted mean payoff
    pub estimate: f64,
    /// Discounted standard error of the mean, >= 0
    pub standard_error: f64,
    /// Paths simulated: N for plain, 2 * floor(N/2) for antithetic
    pub sample_count: usize,
}

impl EstimationResult {
    /// estimate +/- z * standard_error
    #[inline]
    pub fn confidence_interval(&self, z: f64) -> (f64, f64) {
        let margin = z * self.standard_error;
        (self.estimate - margin, self.estimate + margin)
    }

    #[inline]
    pub fn ci95(&self) -> (f64, f64) {
        self.confidence_interval(Z_95)
    }

    #[inline]
    pub fn absolute_error(&self, reference: f64) -> f64 {
        (self.estimate - reference).abs()
    }
}

/// Monte Carlo estimator for European calls.
///
/// Owns its `RandomSource`; the generator is the only mutable state and it
/// advances monotonically across every call on this engine.
pub struct EstimationEngine {
    rng: RandomSource,
    pricer: BlackScholesCall,
}

impl EstimationEngine {
    /// Seeded engines are reproducible; `None` draws entropy from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_source(RandomSource::new(seed))
    }

    pub fn with_source(rng: RandomSource) -> Self {
        Self {
            rng,
            pricer: BlackScholesCall::new(),
        }
    }

    pub fn seed(&self) -> Option<u64> {
        self.rng.seed()
    }

    /// Closed-form reference price. Consumes no randomness.
    pub fn analytical_price(&self, params: &ContractParams) -> EngineResult<f64> {
        self.pricer.price(params)
    }

    /// Discounted mean payoff and standard error for a budget of
    /// `params.samples`, drawn sequentially from this engine's generator.
    pub fn estimate(
        &mut self,
        params: &ContractParams,
        method: SamplingMethod,
    ) -> EngineResult<EstimationResult> {
        let sampler = PathSampler::new(params, method)?;
        let payoffs = sampler.sample(params.samples, &mut self.rng)?;
        let stats = PayoffStats::from_slice(&payoffs);
        let result = finish(&stats, params, method)?;

        tracing::debug!(
            method = %method,
            samples = params.samples,
            estimate = result.estimate,
            std_error = result.standard_error,
            "estimate complete"
        );
        Ok(result)
    }

    /// Same estimator spread over the rayon pool.
    ///
    /// Draws are split into blocks of `PARALLEL_BLOCK_DRAWS`. A block master
    /// seed is taken from this engine's generator and block `i` draws from
    /// `RandomSource::derive_worker(master, i)`. Block statistics are merged in
    /// block order, so the result is bit-identical for any pool size. The
    /// draw stream differs from `estimate`, which is sequential.
    pub fn estimate_parallel(
        &mut self,
        params: &ContractParams,
        method: SamplingMethod,
    ) -> EngineResult<EstimationResult> {
        let sampler = PathSampler::new(params, method)?;
        let draws = sampler.payoff_count(params.samples)?;
        let master = self.rng.next_seed();
        let blocks = draws.div_ceil(PARALLEL_BLOCK_DRAWS);

        let partials = (0..blocks)
            .into_par_iter()
            .map(|block| -> EngineResult<PayoffStats> {
                let start = block * PARALLEL_BLOCK_DRAWS;
                let len = PARALLEL_BLOCK_DRAWS.min(draws - start);
                let mut rng = RandomSource::derive_worker(master, block as u64);
                let mut buf = vec![0.0; len];
                rng.fill_normal(&mut buf);

                let mut stats = PayoffStats::default();
                for z in buf {
                    stats.push(sampler.payoff_for_draw(z)?);
                }
                Ok(stats)
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let stats = partials
            .into_iter()
            .fold(PayoffStats::default(), PayoffStats::merge);
        let result = finish(&stats, params, method)?;

        tracing::debug!(
            method = %method,
            samples = params.samples,
            blocks,
            estimate = result.estimate,
            std_error = result.standard_error,
            "parallel estimate complete"
        );
        Ok(result)
    }

    /// Lazy trajectory over `stage_count` checkpoints of `params.samples`.
    /// Nothing is simulated until the iterator is pulled.
    pub fn stages(
        &mut self,
        params: &ContractParams,
        method: SamplingMethod,
        stage_count: usize,
    ) -> EngineResult<Trajectory<'_>> {
        let plan = StagePlan::new(params.samples, stage_count, method)?;
        self.run_plan(params, plan)
    }

    /// Trajectory over an existing plan. Re-running a plan replays the same
    /// checkpoints with fresh draws from this engine's generator.
    pub fn run_plan(
        &mut self,
        params: &ContractParams,
        plan: StagePlan,
    ) -> EngineResult<Trajectory<'_>> {
        let reference = self.analytical_price(params)?;
        Ok(Trajectory::new(self, *params, plan, reference))
    }

    /// Every stage of `stages`, collected. Stops at the first failing stage.
    pub fn convergence_trajectory(
        &mut self,
        params: &ContractParams,
        method: SamplingMethod,
        stage_count: usize,
    ) -> EngineResult<ConvergenceTrajectory> {
        let trajectory = self.stages(params, method, stage_count)?;
        let reference = trajectory.reference_price();
        let points = trajectory.collect::<EngineResult<Vec<_>>>()?;
        ConvergenceTrajectory::new(method, reference, points)
    }
}

fn finish(
    stats: &PayoffStats,
    params: &ContractParams,
    method: SamplingMethod,
) -> EngineResult<EstimationResult> {
    if stats.count == 0 {
        return Err(EngineError::InsufficientSamples {
            method,
            requested: params.samples,
        });
    }

    let df = params.discount_factor();
    let estimate = stats.mean() * df;
    let standard_error = stats.std_error() * df;

    if !estimate.is_finite() || !standard_error.is_finite() {
        return Err(EngineError::InvalidParams(format!(
            "non-finite estimate ({estimate}, {standard_error}) for {params:?}"
        )));
    }

    Ok(EstimationResult {
        estimate,
        standard_error,
        sample_count: method.effective_samples(params.samples),
    })
}
