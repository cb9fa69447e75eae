mod aggregate;
mod engine;
mod networth;
mod types;

pub use aggregate::{delta_values, filter_transactions, monthly_deltas, project_transactions};
pub use engine::{
    Rng, band_rank, cumulative_sum, project, project_with_rng, resample_trajectories,
};
pub use networth::{
    build_networth_graph, cents_to_units, format_currency, format_tick, gradient_offset,
    tooltip_value,
};
pub use types::{
    Condition, ConditionsOp, DEFAULT_HIGH_PERCENTILE, DEFAULT_HORIZON_MONTHS,
    DEFAULT_LOW_PERCENTILE, DEFAULT_SAMPLE_COUNT, MAX_HORIZON_MONTHS, MAX_SAMPLE_COUNT,
    MonthlyBalance, MonthlyDelta, NetWorthGraph, NetWorthPoint, ProjectionBands, ProjectionConfig,
    Trajectory, Transaction,
};
