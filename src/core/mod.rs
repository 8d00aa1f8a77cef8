mod calculator;
mod engine;
mod error;
mod types;

pub use calculator::{
    BondValuation, FuturesMarginResult, FuturesPosition, HIGH_CAPITAL_USAGE, MAX_BOND_YEARS,
    bond_present_value, capm_expected_return, futures_margin,
};
pub use engine::{
    DEFAULT_SENSITIVITY_TRIALS, DEFAULT_VOLATILITY_MULTIPLIERS, NormalSource, Rng, entropy_seed,
    run_sensitivity_sweep, run_simulation, summarize,
};
pub use error::ParameterError;
pub use types::{
    ConfidenceInterval, LOW_SAMPLE_THRESHOLD, PathEnsemble, SensitivityRow, SimulationParameters,
    SimulationStatistics,
};

pub(crate) use engine::percentile;
