use super::types::{MonthlyBalance, NetWorthGraph, NetWorthPoint};
use crate::error::ProjectionError;

/// Builds the rows a net-worth chart binds to, one per month. Balances whose
/// net worth or month-on-month change leaves the `i64` range are rejected.
pub fn build_networth_graph(
    balances: &[MonthlyBalance],
) -> Result<NetWorthGraph, ProjectionError> {
    let mut data = Vec::with_capacity(balances.len());
    let mut previous: Option<i64> = None;

    for balance in balances {
        let networth = balance.assets.checked_sub(balance.debt).ok_or_else(|| {
            ProjectionError::InvalidConfig(format!(
                "net worth for {} is out of range",
                balance.month
            ))
        })?;
        let change = match previous {
            Some(p) => networth.checked_sub(p).ok_or_else(|| {
                ProjectionError::InvalidConfig(format!(
                    "net worth change for {} is out of range",
                    balance.month
                ))
            })?,
            None => 0,
        };
        previous = Some(networth);

        data.push(NetWorthPoint {
            x: balance.month.clone(),
            y: cents_to_units(networth),
            assets: format_currency(balance.assets),
            debt: format_currency(balance.debt),
            networth: format_currency(networth),
            change: format_currency(change),
        });
    }

    let ys: Vec<f64> = data.iter().map(|p| p.y).collect();
    Ok(NetWorthGraph {
        start: ys.first().copied().unwrap_or(0.0),
        end: ys.last().copied().unwrap_or(0.0),
        low: ys.iter().copied().reduce(f64::min).unwrap_or(0.0),
        high: ys.iter().copied().reduce(f64::max).unwrap_or(0.0),
        gradient_offset: gradient_offset(&ys),
        data,
    })
}

/// Where the line colour switches from positive to negative, as a fraction
/// of the chart height measured from the top. An empty series has no
/// positive part, so the offset is 0.
pub fn gradient_offset(values: &[f64]) -> f64 {
    let Some(max) = values.iter().copied().reduce(f64::max) else {
        return 0.0;
    };
    let min = values.iter().copied().fold(max, f64::min);

    if max <= 0.0 {
        0.0
    } else if min >= 0.0 {
        1.0
    } else {
        max / (max - min)
    }
}

/// Rounds half-way values toward positive infinity, so `-2.5` becomes `-2`.
fn round_half_up(v: f64) -> f64 {
    (v + 0.5).floor()
}

pub fn format_tick(tick: f64) -> String {
    let rounded = round_half_up(tick) as i64;
    let grouped = group_thousands(rounded.unsigned_abs());
    if rounded < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

pub fn tooltip_value(value: Option<f64>) -> Option<i64> {
    value
        .filter(|v| v.is_finite())
        .map(|v| round_half_up(v) as i64)
}

/// Minor units to a grouped decimal string, e.g. `-123456` to `-1,234.56`.
pub fn format_currency(cents: i64) -> String {
    let abs = cents.unsigned_abs();
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}{}.{:02}", group_thousands(abs / 100), abs % 100)
}

pub fn cents_to_units(cents: i64) -> f64 {
    cents as f64 / 100.0
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(month: &str, assets: i64, debt: i64) -> MonthlyBalance {
        MonthlyBalance {
            month: month.to_string(),
            assets,
            debt,
        }
    }

    #[test]
    fn graph_rows_carry_networth_and_change() {
        let graph = build_networth_graph(&[
            balance("2024-01", 1_000_000, 250_000),
            balance("2024-02", 1_100_000, 240_000),
            balance("2024-03", 900_000, 1_000_000),
        ])
        .expect("valid balances");

        assert_eq!(graph.data.len(), 3);
        let first = &graph.data[0];
        assert_eq!(first.x, "2024-01");
        assert_eq!(first.y, 7_500.0);
        assert_eq!(first.assets, "10,000.00");
        assert_eq!(first.debt, "2,500.00");
        assert_eq!(first.networth, "7,500.00");
        assert_eq!(first.change, "0.00");

        assert_eq!(graph.data[1].change, "1,100.00");
        assert_eq!(graph.data[2].networth, "-1,000.00");
        assert_eq!(graph.data[2].change, "-9,600.00");

        assert_eq!(graph.start, 7_500.0);
        assert_eq!(graph.end, -1_000.0);
        assert_eq!(graph.low, -1_000.0);
        assert_eq!(graph.high, 8_600.0);
        assert!((graph.gradient_offset - 8_600.0 / 9_600.0).abs() < 1e-12);
    }

    #[test]
    fn empty_graph_is_flat() {
        let graph = build_networth_graph(&[]).expect("empty history is valid");
        assert!(graph.data.is_empty());
        assert_eq!(graph.start, 0.0);
        assert_eq!(graph.gradient_offset, 0.0);
    }

    #[test]
    fn out_of_range_networth_is_rejected() {
        let err = build_networth_graph(&[balance("2024-01", i64::MAX, -1)])
            .expect_err("assets - debt overflows");
        assert!(err.to_string().contains("2024-01"), "{err}");

        let err = build_networth_graph(&[
            balance("2024-01", i64::MAX, 0),
            balance("2024-02", 0, i64::MAX),
        ])
        .expect_err("month-on-month change overflows");
        assert!(err.to_string().contains("change for 2024-02"), "{err}");
    }

    #[test]
    fn gradient_offset_edge_cases() {
        assert_eq!(gradient_offset(&[-5.0, -1.0]), 0.0);
        assert_eq!(gradient_offset(&[0.0, 0.0]), 0.0);
        assert_eq!(gradient_offset(&[0.0, 4.0]), 1.0);
        assert_eq!(gradient_offset(&[3.0, -1.0]), 0.75);
        assert_eq!(gradient_offset(&[]), 0.0);
    }

    #[test]
    fn ticks_are_rounded_and_grouped() {
        assert_eq!(format_tick(0.0), "0");
        assert_eq!(format_tick(999.4), "999");
        assert_eq!(format_tick(1_234_567.6), "1,234,568");
        assert_eq!(format_tick(-45_000.0), "-45,000");
    }

    #[test]
    fn negative_halves_round_toward_positive() {
        assert_eq!(format_tick(2.5), "3");
        assert_eq!(format_tick(-2.5), "-2");
        assert_eq!(format_tick(-0.5), "0");
        assert_eq!(format_tick(-1_234.5), "-1,234");
        assert_eq!(tooltip_value(Some(-2.5)), Some(-2));
        assert_eq!(tooltip_value(Some(-0.5)), Some(0));
    }

    #[test]
    fn currency_formats_minor_units() {
        assert_eq!(format_currency(0), "0.00");
        assert_eq!(format_currency(5), "0.05");
        assert_eq!(format_currency(123_456), "1,234.56");
        assert_eq!(format_currency(-100_000_001), "-1,000,000.01");
    }

    #[test]
    fn tooltip_rounds_numbers_only() {
        assert_eq!(tooltip_value(Some(12.5)), Some(13));
        assert_eq!(tooltip_value(Some(-2.4)), Some(-2));
        assert_eq!(tooltip_value(Some(f64::NAN)), None);
        assert_eq!(tooltip_value(None), None);
    }
}
