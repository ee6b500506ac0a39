use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Market and contract inputs for one European call simulation.
///
/// Fields are public so the value can cross the service boundary, which
/// means every consumer calls [`ContractParams::validate`] before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContractParams {
    /// Initial asset price S0
    pub s0: f64,
    /// Strike K
    pub k: f64,
    /// Time to maturity in years
    pub t: f64,
    /// Continuously compounded risk-free rate
    pub r: f64,
    /// Annualised volatility
    pub sigma: f64,
    /// Sample budget N
    pub samples: usize,
}

impl ContractParams {
    pub fn new(s0: f64, k: f64, t: f64, r: f64, sigma: f64, samples: usize) -> EngineResult<Self> {
        let params = Self { s0, k, t, r, sigma, samples };
        params.validate()?;
        Ok(params)
    }

    /// S0, K, T and sigma must be finite and strictly positive, r finite,
    /// and the budget at least one draw.
    pub fn validate(&self) -> EngineResult<()> {
        for (name, value) in [("s0", self.s0), ("k", self.k), ("t", self.t), ("sigma", self.sigma)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::InvalidParams(format!(
                    "{name} must be finite and > 0, got {value}"
                )));
            }
        }
        if !self.r.is_finite() {
            return Err(EngineError::InvalidParams(format!("r must be finite, got {}", self.r)));
        }
        if self.samples == 0 {
            return Err(EngineError::InvalidParams("sample budget must be >= 1".into()));
        }
        Ok(())
    }

    /// Same contract with a different sample budget. Used to replay a
    /// simulation at each trajectory checkpoint.
    #[inline]
    pub fn with_samples(&self, samples: usize) -> Self {
        Self { samples, ..*self }
    }

    /// e^(-rT)
    #[inline]
    pub fn discount_factor(&self) -> f64 {
        (-self.r * self.t).exp()
    }
}

/// How standard-normal draws become payoff samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMethod {
    Plain,
    Antithetic,
}

impl SamplingMethod {
    /// Number of normal draws consumed for a budget of `n`.
    #[inline]
    pub fn draws(&self, n: usize) -> usize {
        match self {
            Self::Plain => n,
            Self::Antithetic => n / 2,
        }
    }

    /// Paths actually simulated for a budget of `n`: N for plain,
    /// 2 * floor(N/2) for antithetic.
    #[inline]
    pub fn effective_samples(&self, n: usize) -> usize {
        match self {
            Self::Plain => n,
            Self::Antithetic => 2 * (n / 2),
        }
    }

    /// Smallest budget that yields at least one usable payoff sample.
    #[inline]
    pub fn min_samples(&self) -> usize {
        match self {
            Self::Plain => 1,
            Self::Antithetic => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Antithetic => "antithetic",
        }
    }
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "standard" => Ok(Self::Plain),
            "antithetic" => Ok(Self::Antithetic),
            other => Err(EngineError::InvalidParams(format!("unknown sampling method: {other}"))),
        }
    }
}
