use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use super::types::{
    MAX_HORIZON_MONTHS, MAX_SAMPLE_COUNT, ProjectionBands, ProjectionConfig, Trajectory,
};
use crate::error::ProjectionError;

/// Bootstrap projection of a monthly delta series, seeded from `config.seed`
/// or the system clock when no seed is given.
pub fn project(
    deltas: &[f64],
    config: &ProjectionConfig,
) -> Result<ProjectionBands, ProjectionError> {
    validate(deltas, config)?;
    let seed = config.seed.unwrap_or_else(clock_seed);
    Ok(run_seeded(deltas, config, seed))
}

/// Same as [`project`] but takes the run seed from a caller-owned generator,
/// one draw per call. `config.seed` is ignored. Passing the returned `seed`
/// back through [`project`] replays the run.
pub fn project_with_rng(
    deltas: &[f64],
    config: &ProjectionConfig,
    rng: &mut Rng,
) -> Result<ProjectionBands, ProjectionError> {
    validate(deltas, config)?;
    let seed = rng.next_u64();
    Ok(run_seeded(deltas, config, seed))
}

fn run_seeded(deltas: &[f64], config: &ProjectionConfig, seed: u64) -> ProjectionBands {
    debug!(?deltas, seed, "projecting monthly deltas");
    let mut rng = Rng::new(seed);

    let mut trajectories =
        resample_trajectories(deltas, config.sample_count, config.horizon_months, &mut rng);
    trajectories.sort_by(|a, b| a.final_value().total_cmp(&b.final_value()));

    let n = trajectories.len();
    let low_rank = band_rank(config.low_percentile, n);
    let high_rank = band_rank(config.high_percentile, n);
    let low_band = trajectories[low_rank].cumulative.clone();
    let high_band = trajectories[high_rank].cumulative.clone();

    debug!(
        low_rank,
        high_rank,
        low_final = low_band.last().copied().unwrap_or(0.0),
        high_final = high_band.last().copied().unwrap_or(0.0),
        "selected projection bands"
    );

    ProjectionBands {
        low_band,
        high_band,
        low_rank,
        high_rank,
        sample_count: config.sample_count,
        seed,
    }
}

/// Draws `sample_count` futures of `horizon_months` months, each month copied
/// from a uniformly chosen entry of `deltas`. `deltas` must be non-empty.
pub fn resample_trajectories(
    deltas: &[f64],
    sample_count: u32,
    horizon_months: u32,
    rng: &mut Rng,
) -> Vec<Trajectory> {
    let mut out = Vec::with_capacity(sample_count as usize);
    for _ in 0..sample_count {
        let drawn: Vec<f64> = (0..horizon_months)
            .map(|_| deltas[rng.next_index(deltas.len())])
            .collect();
        let cumulative = cumulative_sum(&drawn);
        out.push(Trajectory {
            deltas: drawn,
            cumulative,
        });
    }
    out
}

pub fn cumulative_sum(values: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    values
        .iter()
        .map(|v| {
            total += v;
            total
        })
        .collect()
}

/// Zero-based rank of percentile `p` within `n` sorted samples:
/// `round(p / 100 * n) - 1`, clamped to the sample range.
pub fn band_rank(p: f64, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let rank = (p / 100.0 * n as f64).round() as i64 - 1;
    rank.clamp(0, n as i64 - 1) as usize
}

fn validate(deltas: &[f64], config: &ProjectionConfig) -> Result<(), ProjectionError> {
    if deltas.is_empty() {
        return Err(ProjectionError::EmptyDeltas);
    }
    if deltas.iter().any(|v| !v.is_finite()) {
        return Err(ProjectionError::InvalidConfig(
            "monthly deltas must be finite".to_string(),
        ));
    }
    if !(1..=MAX_SAMPLE_COUNT).contains(&config.sample_count) {
        return Err(ProjectionError::InvalidConfig(format!(
            "sample count must be in 1..={MAX_SAMPLE_COUNT}, got {}",
            config.sample_count
        )));
    }
    if !(1..=MAX_HORIZON_MONTHS).contains(&config.horizon_months) {
        return Err(ProjectionError::InvalidConfig(format!(
            "horizon months must be in 1..={MAX_HORIZON_MONTHS}, got {}",
            config.horizon_months
        )));
    }
    for (label, p) in [
        ("low percentile", config.low_percentile),
        ("high percentile", config.high_percentile),
    ] {
        if !(p > 0.0 && p <= 100.0) {
            return Err(ProjectionError::InvalidConfig(format!(
                "{label} must be in (0, 100], got {p}"
            )));
        }
    }
    if config.low_percentile > config.high_percentile {
        return Err(ProjectionError::InvalidConfig(
            "low percentile must be <= high percentile".to_string(),
        ));
    }
    Ok(())
}

fn clock_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    splitmix64(nanos)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// xorshift64* generator. Small, seedable and good enough for resampling.
#[derive(Debug, Clone)]
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        let mixed = splitmix64(seed);
        let state = if mixed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            mixed
        };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform in the open interval (0, 1).
    pub fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    /// Uniform index in `[0, len - 1]`. `len` must be > 0.
    pub fn next_index(&mut self, len: usize) -> usize {
        ((self.next_f64() * len as f64) as usize).min(len - 1)
    }
}
