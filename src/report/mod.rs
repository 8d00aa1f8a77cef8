use serde::Serialize;

use crate::core::{
    LOW_SAMPLE_THRESHOLD, PathEnsemble, SensitivityRow, SimulationParameters,
    SimulationStatistics, percentile,
};

pub const DEFAULT_HISTOGRAM_BINS: usize = 50;
pub const DEFAULT_SAMPLE_PATHS: usize = 100;
pub const DEFAULT_MAX_CDF_POINTS: usize = 500;

pub fn format_currency(value: f64) -> String {
    group_thousands(value, 2)
}

pub fn format_currency_whole(value: f64) -> String {
    group_thousands(value, 0)
}

pub fn format_percent(decimal: f64) -> String {
    format!("{:.2}%", decimal * 100.0)
}

fn group_thousands(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(formatted.len() + int_part.len() / 3 + 1);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac_part) = frac_part {
        grouped.push('.');
        grouped.push_str(frac_part);
    }

    let is_zero = formatted.bytes().all(|b| b == b'0' || b == b'.');
    if value.is_sign_negative() && !is_zero {
        grouped.insert(0, '-');
    }
    grouped
}

pub fn render_summary(params: &SimulationParameters, stats: &SimulationStatistics) -> String {
    let mut lines = vec![
        "=".repeat(50),
        "Monte Carlo simulation summary".to_string(),
        "=".repeat(50),
        String::new(),
        "--- Parameters ---".to_string(),
        format!(
            "Initial investment: {}",
            format_currency(params.initial_investment())
        ),
        format!(
            "Expected annual return: {}",
            format_percent(params.annual_return())
        ),
        format!("Annual volatility: {}", format_percent(params.volatility())),
        format!("Horizon: {} years", params.years()),
        format!(
            "Simulations: {}",
            format_currency_whole(params.num_simulations() as f64)
        ),
        String::new(),
        "--- Final value ---".to_string(),
        format!("Mean: {}", format_currency(stats.mean_final)),
        format!("Median: {}", format_currency(stats.median_final)),
        format!("Standard deviation: {}", format_currency(stats.std_final)),
        format!("Minimum: {}", format_currency(stats.min_final)),
        format!("Maximum: {}", format_currency(stats.max_final)),
        String::new(),
        "--- Returns ---".to_string(),
        format!("Mean total return: {}", format_percent(stats.mean_return)),
        format!(
            "Annualized mean return: {}",
            format_percent(stats.annualized_return)
        ),
        String::new(),
        "--- Risk ---".to_string(),
        format!("Probability of loss: {}", format_percent(stats.prob_loss)),
        format!("95% VaR (bad case): {}", format_currency(stats.var_95)),
        format!("99% VaR (extreme case): {}", format_currency(stats.var_99)),
        String::new(),
        "--- Confidence intervals ---".to_string(),
        format!(
            "90% interval: [{}, {}]",
            format_currency(stats.ci_90.low),
            format_currency(stats.ci_90.high)
        ),
        format!(
            "95% interval: [{}, {}]",
            format_currency(stats.ci_95.low),
            format_currency(stats.ci_95.high)
        ),
    ];

    if params.is_low_sample() {
        lines.push(String::new());
        lines.push(format!(
            "Warning: fewer than {LOW_SAMPLE_THRESHOLD} simulations, results may be unreliable"
        ));
    }

    lines.join("\n")
}

pub fn render_sensitivity(rows: &[SensitivityRow]) -> String {
    let mut lines = vec!["--- Volatility sensitivity ---".to_string()];
    lines.extend(rows.iter().map(|row| {
        format!(
            "Volatility {:.1}%: mean value {}, loss probability {:.1}%",
            row.volatility * 100.0,
            format_currency_whole(row.mean_value),
            row.prob_loss * 100.0
        )
    }));
    lines.join("\n")
}

#[derive(Debug, Clone, Copy)]
pub struct ChartOptions {
    pub histogram_bins: usize,
    pub sample_paths: usize,
    pub max_cdf_points: usize,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            sample_paths: DEFAULT_SAMPLE_PATHS,
            max_cdf_points: DEFAULT_MAX_CDF_POINTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub bin_edges: Vec<f64>,
    pub counts: Vec<u32>,
    pub mean: f64,
}

impl Histogram {
    fn build(values: &[f64], bins: usize) -> Self {
        if values.is_empty() {
            return Self {
                bin_edges: Vec::new(),
                counts: Vec::new(),
                mean: 0.0,
            };
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let width = max - min;

        if width <= 0.0 {
            return Self {
                bin_edges: vec![min, max],
                counts: vec![values.len() as u32],
                mean,
            };
        }

        let bins = bins.max(1);
        let mut counts = vec![0_u32; bins];
        for &v in values {
            let idx = (((v - min) / width) * bins as f64) as usize;
            counts[idx.min(bins - 1)] += 1;
        }
        let bin_edges = (0..=bins)
            .map(|i| min + width * i as f64 / bins as f64)
            .collect();

        Self {
            bin_edges,
            counts,
            mean,
        }
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSample {
    pub paths: Vec<Vec<f64>>,
    pub mean_path: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CdfPoint {
    pub value: f64,
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxPlot {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub lower_whisker: f64,
    pub upper_whisker: f64,
    pub outliers: usize,
}

impl BoxPlot {
    fn build(sorted: &[f64]) -> Self {
        let q1 = percentile(sorted, 25.0);
        let median = percentile(sorted, 50.0);
        let q3 = percentile(sorted, 75.0);
        let iqr = q3 - q1;
        let lower_fence = q1 - 1.5 * iqr;
        let upper_fence = q3 + 1.5 * iqr;

        let inside = sorted
            .iter()
            .copied()
            .filter(|v| (lower_fence..=upper_fence).contains(v));
        let lower_whisker = inside.clone().next().unwrap_or(q1);
        let upper_whisker = inside.last().unwrap_or(q3);
        let outliers = sorted
            .iter()
            .filter(|v| !(lower_fence..=upper_fence).contains(*v))
            .count();

        Self {
            q1,
            median,
            q3,
            lower_whisker,
            upper_whisker,
            outliers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub final_value_histogram: Histogram,
    pub sample_paths: PathSample,
    pub cdf: Vec<CdfPoint>,
    pub var_95: f64,
    pub var_99: f64,
    pub box_plot: BoxPlot,
    pub return_histogram: Histogram,
}

impl ChartData {
    pub fn build(
        ensemble: &PathEnsemble,
        stats: &SimulationStatistics,
        options: ChartOptions,
    ) -> Self {
        let initial = ensemble.parameters().initial_investment();
        let mut sorted = ensemble.final_values().to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let returns_pct = ensemble
            .final_values()
            .iter()
            .map(|v| (v - initial) / initial * 100.0)
            .collect::<Vec<_>>();

        Self {
            final_value_histogram: Histogram::build(&sorted, options.histogram_bins),
            sample_paths: PathSample {
                paths: ensemble
                    .paths()
                    .take(options.sample_paths)
                    .map(<[f64]>::to_vec)
                    .collect(),
                mean_path: ensemble.mean_path(),
            },
            cdf: empirical_cdf(&sorted, options.max_cdf_points),
            var_95: stats.var_95,
            var_99: stats.var_99,
            box_plot: BoxPlot::build(&sorted),
            return_histogram: Histogram::build(&returns_pct, options.histogram_bins),
        }
    }
}

fn empirical_cdf(sorted: &[f64], max_points: usize) -> Vec<CdfPoint> {
    let n = sorted.len();
    let point = |i: usize| CdfPoint {
        value: sorted[i],
        probability: (i + 1) as f64 / n as f64,
    };

    if n <= max_points.max(2) {
        return (0..n).map(point).collect();
    }

    let max_points = max_points.max(2);
    let mut indices = (0..max_points)
        .map(|k| ((k as f64) * (n - 1) as f64 / (max_points - 1) as f64).round() as usize)
        .collect::<Vec<_>>();
    indices.dedup();
    indices.into_iter().map(point).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Rng, run_simulation, summarize};

    fn sample_run(simulations: u32) -> (PathEnsemble, SimulationStatistics) {
        let params =
            SimulationParameters::new(10_000.0, 0.08, 0.15, 10, simulations).expect("valid params");
        let ensemble = run_simulation(&params, &mut Rng::new(42));
        let stats = summarize(&ensemble);
        (ensemble, stats)
    }

    #[test]
    fn currency_groups_thousands_and_signs() {
        assert_eq!(format_currency(1_234_567.891), "1,234,567.89");
        assert_eq!(format_currency(999.5), "999.50");
        assert_eq!(format_currency(-1_234.5), "-1,234.50");
        assert_eq!(format_currency(0.0), "0.00");
        assert_eq!(format_currency(-0.001), "0.00");
        assert_eq!(format_currency_whole(22_255.4), "22,255");
        assert_eq!(format_currency_whole(100_000.0), "100,000");
    }

    #[test]
    fn percent_formats_decimal_fraction() {
        assert_eq!(format_percent(0.08), "8.00%");
        assert_eq!(format_percent(-0.0125), "-1.25%");
    }

    #[test]
    fn summary_includes_each_section_and_low_sample_warning() {
        let (ensemble, stats) = sample_run(20);
        let text = render_summary(ensemble.parameters(), &stats);
        for needle in [
            "Initial investment: 10,000.00",
            "Expected annual return: 8.00%",
            "Annual volatility: 15.00%",
            "Horizon: 10 years",
            "Probability of loss:",
            "95% VaR",
            "90% interval: [",
            "Warning: fewer than 100 simulations",
        ] {
            assert!(text.contains(needle), "missing {needle:?} in:\n{text}");
        }

        let (ensemble, stats) = sample_run(200);
        let text = render_summary(ensemble.parameters(), &stats);
        assert!(!text.contains("Warning"));
    }

    #[test]
    fn sensitivity_lines_follow_row_order() {
        let rows = [
            SensitivityRow {
                volatility_multiplier: 0.5,
                volatility: 0.075,
                mean_value: 22_000.4,
                std_value: 1_000.0,
                prob_loss: 0.001,
            },
            SensitivityRow {
                volatility_multiplier: 1.5,
                volatility: 0.225,
                mean_value: 21_999.6,
                std_value: 9_000.0,
                prob_loss: 0.213,
            },
        ];
        let text = render_sensitivity(&rows);
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "Volatility 7.5%: mean value 22,000, loss probability 0.1%"
        );
        assert_eq!(
            lines[2],
            "Volatility 22.5%: mean value 22,000, loss probability 21.3%"
        );
    }

    #[test]
    fn histogram_counts_cover_every_sample() {
        let (ensemble, stats) = sample_run(1_000);
        let charts = ChartData::build(&ensemble, &stats, ChartOptions::default());

        let hist = &charts.final_value_histogram;
        assert_eq!(hist.counts.len(), DEFAULT_HISTOGRAM_BINS);
        assert_eq!(hist.bin_edges.len(), DEFAULT_HISTOGRAM_BINS + 1);
        assert_eq!(hist.total(), 1_000);
        assert_eq!(hist.bin_edges[0], stats.min_final);
        assert!((hist.bin_edges[DEFAULT_HISTOGRAM_BINS] - stats.max_final).abs() < 1e-6);
        assert_eq!(charts.return_histogram.total(), 1_000);
    }

    #[test]
    fn path_sample_is_truncated_and_mean_path_is_full_length() {
        let (ensemble, stats) = sample_run(300);
        let charts = ChartData::build(&ensemble, &stats, ChartOptions::default());
        assert_eq!(charts.sample_paths.paths.len(), DEFAULT_SAMPLE_PATHS);
        assert_eq!(charts.sample_paths.mean_path.len(), 11);
        assert_eq!(charts.sample_paths.mean_path[0], 10_000.0);
        assert_eq!(charts.sample_paths.paths[0], ensemble.path(0).expect("path").to_vec());
    }

    #[test]
    fn cdf_is_thinned_and_ends_at_one() {
        let (ensemble, stats) = sample_run(2_000);
        let options = ChartOptions {
            max_cdf_points: 100,
            ..ChartOptions::default()
        };
        let charts = ChartData::build(&ensemble, &stats, options);
        assert!(charts.cdf.len() <= 100);
        assert_eq!(charts.cdf[0].value, stats.min_final);
        let last = charts.cdf[charts.cdf.len() - 1];
        assert_eq!(last.probability, 1.0);
        assert_eq!(last.value, stats.max_final);
        assert!(
            charts
                .cdf
                .windows(2)
                .all(|w| w[0].value <= w[1].value && w[0].probability < w[1].probability)
        );
    }

    #[test]
    fn box_plot_is_ordered() {
        let (ensemble, stats) = sample_run(1_000);
        let charts = ChartData::build(&ensemble, &stats, ChartOptions::default());
        let b = charts.box_plot;
        assert!(b.lower_whisker <= b.q1);
        assert!(b.q1 <= b.median);
        assert!(b.median <= b.q3);
        assert!(b.q3 <= b.upper_whisker);
        assert_eq!(b.median, stats.median_final);
        assert!(b.outliers < 1_000);
    }

    #[test]
    fn degenerate_ensemble_collapses_to_one_bin() {
        let params = SimulationParameters::new(1_000.0, 0.05, 0.0, 3, 40).expect("valid params");
        let ensemble = run_simulation(&params, &mut Rng::new(1));
        let stats = summarize(&ensemble);
        let charts = ChartData::build(&ensemble, &stats, ChartOptions::default());
        assert_eq!(charts.final_value_histogram.counts, vec![40]);
        assert_eq!(charts.box_plot.outliers, 0);
        assert_eq!(charts.box_plot.lower_whisker, charts.box_plot.upper_whisker);
    }
}
