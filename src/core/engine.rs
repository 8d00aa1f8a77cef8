use std::f64::consts::PI;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use super::error::ParameterError;
use super::types::{
    ConfidenceInterval, PathEnsemble, SensitivityRow, SimulationParameters, SimulationStatistics,
};

pub const DEFAULT_VOLATILITY_MULTIPLIERS: [f64; 3] = [0.5, 1.0, 1.5];
pub const DEFAULT_SENSITIVITY_TRIALS: u32 = 1_000;

pub trait NormalSource {
    fn standard_normal(&mut self) -> f64;
}

pub fn run_simulation<R: NormalSource + ?Sized>(
    params: &SimulationParameters,
    rng: &mut R,
) -> PathEnsemble {
    let simulations = params.num_simulations() as usize;
    let path_len = params.years() as usize + 1;

    let mut values = vec![0.0; simulations * path_len];
    let mut final_values = Vec::with_capacity(simulations);
    for path in values.chunks_exact_mut(path_len) {
        final_values.push(simulate_path(params, rng, path));
    }

    debug!(
        simulations,
        years = params.years(),
        volatility = params.volatility(),
        "simulated path ensemble"
    );

    PathEnsemble::from_parts(*params, values, final_values)
}

pub fn summarize(ensemble: &PathEnsemble) -> SimulationStatistics {
    let params = ensemble.parameters();
    let initial = params.initial_investment();
    let finals = ensemble.final_values();
    let n = finals.len() as f64;

    let mut sorted = finals.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let (mean_final, std_final) = mean_and_std(&sorted);
    let mean_return = sorted.iter().map(|v| (v - initial) / initial).sum::<f64>() / n;
    let annualized_return = (1.0 + mean_return).powf(1.0 / params.years() as f64) - 1.0;

    SimulationStatistics {
        num_simulations: params.num_simulations(),
        initial_investment: initial,
        mean_final,
        median_final: percentile(&sorted, 50.0),
        std_final,
        min_final: sorted[0],
        max_final: sorted[sorted.len() - 1],
        mean_return,
        annualized_return,
        prob_loss: loss_probability(&sorted, initial),
        var_95: percentile(&sorted, 5.0),
        var_99: percentile(&sorted, 1.0),
        ci_90: ConfidenceInterval {
            low: percentile(&sorted, 5.0),
            high: percentile(&sorted, 95.0),
        },
        ci_95: ConfidenceInterval {
            low: percentile(&sorted, 2.5),
            high: percentile(&sorted, 97.5),
        },
    }
}

pub fn run_sensitivity_sweep<R: NormalSource + ?Sized>(
    params: &SimulationParameters,
    multipliers: &[f64],
    trials_per_point: u32,
    rng: &mut R,
) -> Result<Vec<SensitivityRow>, ParameterError> {
    if trials_per_point == 0 {
        return Err(ParameterError::invalid("trials_per_point", ">= 1", 0.0));
    }

    let mut points = Vec::with_capacity(multipliers.len());
    for &multiplier in multipliers {
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(ParameterError::invalid(
                "volatility_multiplier",
                "finite and >= 0",
                multiplier,
            ));
        }
        let point = params
            .with_volatility(params.volatility() * multiplier)?
            .with_num_simulations(trials_per_point)?;
        points.push((multiplier, point));
    }

    let rows = points
        .into_iter()
        .map(|(multiplier, point)| {
            let finals = (0..point.num_simulations())
                .map(|_| simulate_final_value(&point, rng))
                .collect::<Vec<_>>();
            let (mean_value, std_value) = mean_and_std(&finals);
            SensitivityRow {
                volatility_multiplier: multiplier,
                volatility: point.volatility(),
                mean_value,
                std_value,
                prob_loss: loss_probability(&finals, point.initial_investment()),
            }
        })
        .collect::<Vec<_>>();

    debug!(
        points = rows.len(),
        trials_per_point, "completed volatility sensitivity sweep"
    );
    Ok(rows)
}

fn simulate_path<R: NormalSource + ?Sized>(
    params: &SimulationParameters,
    rng: &mut R,
    path: &mut [f64],
) -> f64 {
    let drift = params.log_drift();
    let vol = params.volatility();

    let mut value = params.initial_investment();
    path[0] = value;
    for slot in &mut path[1..] {
        value = grow(value, drift, vol, rng.standard_normal());
        *slot = value;
    }
    value
}

fn simulate_final_value<R: NormalSource + ?Sized>(
    params: &SimulationParameters,
    rng: &mut R,
) -> f64 {
    let drift = params.log_drift();
    let vol = params.volatility();

    let mut value = params.initial_investment();
    for _ in 0..params.years() {
        value = grow(value, drift, vol, rng.standard_normal());
    }
    value
}

fn grow(value: f64, drift: f64, vol: f64, z: f64) -> f64 {
    value * (drift + vol * z).exp()
}

// Mean and population standard deviation. Deviations are taken from the
// first sample so identical samples give exactly zero spread.
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let Some(&base) = values.first() else {
        return (0.0, 0.0);
    };

    let n = values.len() as f64;
    let mean = base + values.iter().map(|v| v - base).sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn loss_probability(values: &[f64], initial: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|&&v| v < initial).count() as f64 / values.len() as f64
}

pub(crate) fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let w = rank - lower as f64;
        (sorted[lower] + (sorted[upper] - sorted[lower]) * w).min(sorted[upper])
    }
}

pub fn entropy_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    splitmix64(nanos ^ ((std::process::id() as u64) << 32))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone)]
pub struct Rng {
    state: u64,
    cached_normal: Option<f64>,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        let mixed = splitmix64(seed);
        let state = if mixed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            mixed
        };
        Self {
            state,
            cached_normal: None,
        }
    }

    pub fn from_entropy() -> Self {
        Self::new(entropy_seed())
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }
}

impl NormalSource for Rng {
    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        let z0 = r * theta.cos();
        let z1 = r * theta.sin();
        self.cached_normal = Some(z1);
        z0
    }
}
