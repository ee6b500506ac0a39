pub mod black_scholes;
pub mod params;
pub mod rng;
pub mod sampler;

pub use black_scholes::BlackScholesCall;
pub use params::{ContractParams, SamplingMethod};
pub use rng::RandomSource;
pub use sampler::{GbmTerms, PathSampler};
