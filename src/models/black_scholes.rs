use crate::errors::{EngineError, EngineResult};
use crate::models::params::ContractParams;
use statrs::distribution::{ContinuousCDF, Normal};

/// Black-Scholes European call, the closed-form reference for the
/// Monte Carlo estimate.
///
/// C = S0 * Phi(d1) - K * e^(-rT) * Phi(d2)
///
/// where d1 = (ln(S0/K) + (r + sigma^2/2)*T) / (sigma * sqrt(T))
/// and d2 = d1 - sigma * sqrt(T).
///
/// Phi comes from statrs (erfc based), accurate to ~1e-15 well past |x| = 10.
pub struct BlackScholesCall {
    /// Standard normal distribution (created once, reused)
    normal: Normal,
}

impl BlackScholesCall {
    pub fn new() -> Self {
        Self {
            normal: Normal::standard(),
        }
    }

    /// (d1, d2) for validated params.
    #[inline]
    pub fn d1_d2(&self, params: &ContractParams) -> EngineResult<(f64, f64)> {
        params.validate()?;
        let sigma_sqrt_t = params.sigma * params.t.sqrt();
        let d1 = ((params.s0 / params.k).ln()
            + (params.r + 0.5 * params.sigma * params.sigma) * params.t)
            / sigma_sqrt_t;
        Ok((d1, d1 - sigma_sqrt_t))
    }

    /// Deterministic, side-effect free. Fails with `InvalidParams` rather
    /// than evaluating degenerate inputs (T or sigma at zero).
    pub fn price(&self, params: &ContractParams) -> EngineResult<f64> {
        let (d1, d2) = self.d1_d2(params)?;
        let price = params.s0 * self.normal.cdf(d1)
            - params.k * params.discount_factor() * self.normal.cdf(d2);

        if !price.is_finite() {
            return Err(EngineError::InvalidParams(format!(
                "analytical price is not finite for {params:?}"
            )));
        }

        // Deep OTM can round a hair below zero
        Ok(price.max(0.0))
    }
}

impl Default for BlackScholesCall {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn params(s0: f64, k: f64, t: f64, r: f64, sigma: f64) -> ContractParams {
        ContractParams { s0, k, t, r, sigma, samples: 1 }
    }

    #[test]
    fn test_atm_reference_value() {
        let bs = BlackScholesCall::new();
        let p = bs.price(&params(100.0, 100.0, 1.0, 0.05, 0.2)).unwrap();
        assert_abs_diff_eq!(p, 10.450583572185565, epsilon = 1e-10);
    }

    #[test]
    fn test_normal_cdf_accuracy_out_to_the_tails() {
        let bs = BlackScholesCall::new();
        for (x, expected) in [
            (-10.0, 7.619853024160593e-24),
            (-5.0, 2.866515718791946e-7),
            (-1.0, 0.15865525393145707),
            (0.0, 0.5),
            (1.0, 0.8413447460685429),
            (5.0, 0.9999997133484281),
            (10.0, 1.0),
        ] {
            assert_abs_diff_eq!(bs.normal.cdf(x), expected, epsilon = 1e-10);
        }
        // Relative accuracy in the lower tail, where d2 lands for deep OTM
        let far = bs.normal.cdf(-10.0);
        assert!((far / 7.619853024160593e-24 - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_otm_reference_value() {
        let bs = BlackScholesCall::new();
        let p = bs.price(&params(100.0, 110.0, 1.0, 0.05, 0.2)).unwrap();
        assert_abs_diff_eq!(p, 6.040088129724, epsilon = 1e-6);
    }

    #[test]
    fn test_deterministic() {
        let bs = BlackScholesCall::new();
        let p = params(95.0, 100.0, 0.5, 0.03, 0.35);
        let a = bs.price(&p).unwrap();
        let b = bs.price(&p).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_non_negative_far_otm() {
        let bs = BlackScholesCall::new();
        let p = bs.price(&params(1.0, 1000.0, 0.1, 0.0, 0.1)).unwrap();
        assert!(p >= 0.0);
        assert!(p < 1e-12);
    }

    #[test]
    fn test_deep_itm_near_intrinsic() {
        let bs = BlackScholesCall::new();
        let p = params(1000.0, 1.0, 1.0, 0.05, 0.2);
        let intrinsic = p.s0 - p.k * p.discount_factor();
        assert_abs_diff_eq!(bs.price(&p).unwrap(), intrinsic, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_inputs_rejected() {
        let bs = BlackScholesCall::new();
        for bad in [
            params(100.0, 100.0, 0.0, 0.05, 0.2),
            params(100.0, 100.0, 1.0, 0.05, 0.0),
            params(100.0, 100.0, -1.0, 0.05, 0.2),
            params(0.0, 100.0, 1.0, 0.05, 0.2),
        ] {
            assert!(matches!(bs.price(&bad), Err(EngineError::InvalidParams(_))));
        }
    }

    #[test]
    fn test_price_increases_with_vol() {
        let bs = BlackScholesCall::new();
        let low = bs.price(&params(100.0, 100.0, 1.0, 0.05, 0.1)).unwrap();
        let high = bs.price(&params(100.0, 100.0, 1.0, 0.05, 0.4)).unwrap();
        assert!(high > low, "vega must be positive: {low} vs {high}");
    }
}
