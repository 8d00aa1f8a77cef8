use serde::Serialize;

use super::error::ParameterError;

pub const LOW_SAMPLE_THRESHOLD: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    initial_investment: f64,
    annual_return: f64,
    volatility: f64,
    years: u32,
    num_simulations: u32,
}

impl SimulationParameters {
    pub fn new(
        initial_investment: f64,
        annual_return: f64,
        volatility: f64,
        years: u32,
        num_simulations: u32,
    ) -> Result<Self, ParameterError> {
        if !initial_investment.is_finite() || initial_investment <= 0.0 {
            return Err(ParameterError::invalid(
                "initial_investment",
                "> 0",
                initial_investment,
            ));
        }
        if !annual_return.is_finite() {
            return Err(ParameterError::invalid(
                "annual_return",
                "finite",
                annual_return,
            ));
        }
        if !volatility.is_finite() || volatility < 0.0 {
            return Err(ParameterError::invalid("volatility", ">= 0", volatility));
        }
        if years == 0 {
            return Err(ParameterError::invalid("years", ">= 1", 0.0));
        }
        if num_simulations == 0 {
            return Err(ParameterError::invalid("num_simulations", ">= 1", 0.0));
        }

        Ok(Self {
            initial_investment,
            annual_return,
            volatility,
            years,
            num_simulations,
        })
    }

    pub fn initial_investment(&self) -> f64 {
        self.initial_investment
    }

    pub fn annual_return(&self) -> f64 {
        self.annual_return
    }

    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    pub fn years(&self) -> u32 {
        self.years
    }

    pub fn num_simulations(&self) -> u32 {
        self.num_simulations
    }

    pub fn is_low_sample(&self) -> bool {
        self.num_simulations < LOW_SAMPLE_THRESHOLD
    }

    pub fn with_volatility(&self, volatility: f64) -> Result<Self, ParameterError> {
        Self::new(
            self.initial_investment,
            self.annual_return,
            volatility,
            self.years,
            self.num_simulations,
        )
    }

    pub fn with_num_simulations(&self, num_simulations: u32) -> Result<Self, ParameterError> {
        Self::new(
            self.initial_investment,
            self.annual_return,
            self.volatility,
            self.years,
            num_simulations,
        )
    }

    pub(crate) fn log_drift(&self) -> f64 {
        self.annual_return - 0.5 * self.volatility * self.volatility
    }
}

#[derive(Debug, Clone)]
pub struct PathEnsemble {
    params: SimulationParameters,
    values: Vec<f64>,
    final_values: Vec<f64>,
}

impl PathEnsemble {
    pub(crate) fn from_parts(
        params: SimulationParameters,
        values: Vec<f64>,
        final_values: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(
            values.len(),
            params.num_simulations as usize * (params.years as usize + 1)
        );
        debug_assert_eq!(final_values.len(), params.num_simulations as usize);
        Self {
            params,
            values,
            final_values,
        }
    }

    pub fn parameters(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn num_paths(&self) -> usize {
        self.final_values.len()
    }

    pub fn path_len(&self) -> usize {
        self.params.years as usize + 1
    }

    pub fn path(&self, index: usize) -> Option<&[f64]> {
        let len = self.path_len();
        let start = index.checked_mul(len)?;
        self.values.get(start..start + len)
    }

    pub fn paths(&self) -> impl ExactSizeIterator<Item = &[f64]> {
        self.values.chunks_exact(self.path_len())
    }

    pub fn final_values(&self) -> &[f64] {
        &self.final_values
    }

    pub fn mean_path(&self) -> Vec<f64> {
        let mut mean = vec![0.0; self.path_len()];
        for path in self.paths() {
            for (acc, value) in mean.iter_mut().zip(path) {
                *acc += value;
            }
        }
        let n = self.num_paths() as f64;
        for acc in &mut mean {
            *acc /= n;
        }
        mean
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatistics {
    pub num_simulations: u32,
    pub initial_investment: f64,
    pub mean_final: f64,
    pub median_final: f64,
    pub std_final: f64,
    pub min_final: f64,
    pub max_final: f64,
    pub mean_return: f64,
    pub annualized_return: f64,
    pub prob_loss: f64,
    pub var_95: f64,
    pub var_99: f64,
    pub ci_90: ConfidenceInterval,
    pub ci_95: ConfidenceInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityRow {
    pub volatility_multiplier: f64,
    pub volatility: f64,
    pub mean_value: f64,
    pub std_value: f64,
    pub prob_loss: f64,
}
