//! Monte Carlo pricing of European calls under GBM, cross-checked against
//! Black-Scholes, with plain and antithetic sampling and progressive
//! convergence trajectories.
//!
//! The core is [`engine::EstimationEngine`]; `db`, `runner` and `server`
//! are the persistence and presentation collaborators around it.

pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod models;
pub mod runner;
pub mod server;
pub mod state;

pub use engine::trajectory::{ConvergenceTrajectory, StagePlan, Trajectory, TrajectoryPoint};
pub use engine::{EstimationEngine, EstimationResult};
pub use errors::{EngineError, EngineResult};
pub use models::{BlackScholesCall, ContractParams, RandomSource, SamplingMethod};
