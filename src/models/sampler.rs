use crate::errors::{EngineError, EngineResult};
use crate::models::params::{ContractParams, SamplingMethod};
use crate::models::rng::RandomSource;

/// GBM terms precomputed once per contract.
///
/// S_T = S0 * exp(drift + diffusion * Z)
/// drift = (r - sigma^2/2) * T, diffusion = sigma * sqrt(T)
#[derive(Debug, Clone, Copy)]
pub struct GbmTerms {
    pub s0: f64,
    pub strike: f64,
    pub drift: f64,
    pub diffusion: f64,
}

impl GbmTerms {
    pub fn new(params: &ContractParams) -> EngineResult<Self> {
        params.validate()?;
        Ok(Self {
            s0: params.s0,
            strike: params.k,
            drift: (params.r - 0.5 * params.sigma * params.sigma) * params.t,
            diffusion: params.sigma * params.t.sqrt(),
        })
    }

    /// Terminal price for one draw. A non-positive or non-finite price can
    /// only come from corrupt inputs and is reported, never propagated.
    #[inline]
    pub fn terminal_price(&self, z: f64) -> EngineResult<f64> {
        let st = self.s0 * (self.drift + self.diffusion * z).exp();
        if !st.is_finite() || st <= 0.0 {
            return Err(EngineError::InvalidParams(format!(
                "terminal price {st} from draw {z} is not a positive finite number"
            )));
        }
        Ok(st)
    }

    /// max(S_T - K, 0), undiscounted.
    #[inline]
    pub fn call_payoff(&self, z: f64) -> EngineResult<f64> {
        Ok((self.terminal_price(z)? - self.strike).max(0.0))
    }
}

/// Turns standard-normal draws into undiscounted call payoff samples.
///
/// - Plain: N draws, one payoff each.
/// - Antithetic: floor(N/2) draws, each emitting 0.5 * (payoff(Z) + payoff(-Z)).
///   The averaged pair is one sample, so the pair count is the sample size
///   seen by the standard error.
#[derive(Debug, Clone, Copy)]
pub struct PathSampler {
    terms: GbmTerms,
    method: SamplingMethod,
}

impl PathSampler {
    pub fn new(params: &ContractParams, method: SamplingMethod) -> EngineResult<Self> {
        Ok(Self {
            terms: GbmTerms::new(params)?,
            method,
        })
    }

    #[inline]
    pub fn method(&self) -> SamplingMethod {
        self.method
    }

    #[inline]
    pub fn terms(&self) -> &GbmTerms {
        &self.terms
    }

    /// Number of payoff samples (and normal draws) a budget of `n` yields.
    /// Zero usable draws is `InsufficientSamples`.
    pub fn payoff_count(&self, n: usize) -> EngineResult<usize> {
        let draws = self.method.draws(n);
        if draws == 0 {
            return Err(EngineError::InsufficientSamples {
                method: self.method,
                requested: n,
            });
        }
        Ok(draws)
    }

    /// Payoff sample for a single draw under this sampler's method.
    #[inline]
    pub fn payoff_for_draw(&self, z: f64) -> EngineResult<f64> {
        match self.method {
            SamplingMethod::Plain => self.terms.call_payoff(z),
            SamplingMethod::Antithetic => {
                let up = self.terms.call_payoff(z)?;
                let down = self.terms.call_payoff(-z)?;
                Ok(0.5 * (up + down))
            }
        }
    }

    /// Map a block of draws to payoffs, preserving order.
    pub fn payoffs_from_draws(&self, draws: &[f64]) -> EngineResult<Vec<f64>> {
        draws.iter().map(|&z| self.payoff_for_draw(z)).collect()
    }

    /// Draw from `rng` and emit the payoff sequence for a budget of `n`.
    pub fn sample(&self, n: usize, rng: &mut RandomSource) -> EngineResult<Vec<f64>> {
        let count = self.payoff_count(n)?;
        let draws = rng.next_normal_batch(count)?;
        self.payoffs_from_draws(&draws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn atm(samples: usize) -> ContractParams {
        ContractParams::new(100.0, 100.0, 1.0, 0.05, 0.2, samples).unwrap()
    }

    #[test]
    fn test_zero_draw_is_forward_drift() {
        let terms = GbmTerms::new(&atm(1)).unwrap();
        let st = terms.terminal_price(0.0).unwrap();
        assert_abs_diff_eq!(st, 100.0 * ((0.05 - 0.02) * 1.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_plain_emits_n_payoffs() {
        let sampler = PathSampler::new(&atm(11), SamplingMethod::Plain).unwrap();
        let mut rng = RandomSource::from_seed(3);
        let payoffs = sampler.sample(11, &mut rng).unwrap();
        assert_eq!(payoffs.len(), 11);
        assert!(payoffs.iter().all(|p| *p >= 0.0 && p.is_finite()));
    }

    #[test]
    fn test_antithetic_emits_pair_count() {
        let sampler = PathSampler::new(&atm(11), SamplingMethod::Antithetic).unwrap();
        let mut rng = RandomSource::from_seed(3);
        assert_eq!(sampler.sample(11, &mut rng).unwrap().len(), 5);
    }

    #[test]
    fn test_antithetic_pair_is_average_of_mirrored_paths() {
        let sampler = PathSampler::new(&atm(2), SamplingMethod::Antithetic).unwrap();
        let terms = sampler.terms();
        let z = 1.3;
        let expected = 0.5 * (terms.call_payoff(z).unwrap() + terms.call_payoff(-z).unwrap());
        assert_abs_diff_eq!(sampler.payoff_for_draw(z).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_antithetic_uses_same_draws_as_plain() {
        let plain = PathSampler::new(&atm(4), SamplingMethod::Plain).unwrap();
        let anti = PathSampler::new(&atm(4), SamplingMethod::Antithetic).unwrap();
        let mut r1 = RandomSource::from_seed(11);
        let mut r2 = RandomSource::from_seed(11);
        let z = r1.next_normal_batch(2).unwrap();
        let pairs = anti.sample(4, &mut r2).unwrap();
        for (zi, pair) in z.iter().zip(pairs) {
            let mirrored = plain.payoff_for_draw(-zi).unwrap();
            assert_abs_diff_eq!(pair, 0.5 * (plain.payoff_for_draw(*zi).unwrap() + mirrored));
        }
    }

    #[test]
    fn test_insufficient_samples() {
        let sampler = PathSampler::new(&atm(1), SamplingMethod::Antithetic).unwrap();
        let mut rng = RandomSource::from_seed(1);
        assert!(matches!(
            sampler.sample(1, &mut rng),
            Err(EngineError::InsufficientSamples { requested: 1, .. })
        ));
        // floor(3/2) = 1 pair is enough
        assert_eq!(sampler.sample(3, &mut rng).unwrap().len(), 1);
    }

    #[test]
    fn test_overflowing_path_is_rejected() {
        let params = ContractParams::new(1e300, 1.0, 1.0, 0.0, 1.0, 1).unwrap();
        let terms = GbmTerms::new(&params).unwrap();
        assert!(matches!(terms.terminal_price(40.0), Err(EngineError::InvalidParams(_))));
    }

    #[test]
    fn test_invalid_params_rejected_at_construction() {
        let bad = ContractParams { sigma: 0.0, ..atm(10) };
        assert!(PathSampler::new(&bad, SamplingMethod::Plain).is_err());
    }
}
