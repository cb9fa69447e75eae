use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use super::engine::project;
use super::types::{
    Condition, ConditionsOp, MonthlyDelta, ProjectionBands, ProjectionConfig, Transaction,
};
use crate::error::ProjectionError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum TextField {
    Account,
    Category,
    Payee,
    Notes,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum TextOp {
    Is,
    IsNot,
    Contains,
    DoesNotContain,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum CmpOp {
    Is,
    IsNot,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "is" => Some(Self::Is),
            "isNot" => Some(Self::IsNot),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Is => ord == Ordering::Equal,
            Self::IsNot => ord != Ordering::Equal,
            Self::Gt => ord == Ordering::Greater,
            Self::Gte => ord != Ordering::Less,
            Self::Lt => ord == Ordering::Less,
            Self::Lte => ord != Ordering::Greater,
        }
    }
}

#[derive(Clone, Debug)]
enum Predicate {
    Text {
        field: TextField,
        op: TextOp,
        needle: String,
    },
    Amount {
        op: CmpOp,
        value: i64,
    },
    Date {
        op: CmpOp,
        value: NaiveDate,
    },
}

impl Predicate {
    fn compile(cond: &Condition) -> Result<Self, ProjectionError> {
        let invalid = || {
            ProjectionError::InvalidCondition(format!(
                "unsupported `{}` on field `{}`",
                cond.op, cond.field
            ))
        };

        let text_field = match cond.field.as_str() {
            "account" => Some(TextField::Account),
            "category" => Some(TextField::Category),
            "payee" => Some(TextField::Payee),
            "notes" => Some(TextField::Notes),
            _ => None,
        };
        if let Some(field) = text_field {
            let op = match cond.op.as_str() {
                "is" => TextOp::Is,
                "isNot" => TextOp::IsNot,
                "contains" => TextOp::Contains,
                "doesNotContain" => TextOp::DoesNotContain,
                _ => return Err(invalid()),
            };
            return Ok(Self::Text {
                field,
                op,
                needle: cond.value.to_lowercase(),
            });
        }

        match cond.field.as_str() {
            "amount" => {
                let op = CmpOp::parse(&cond.op).ok_or_else(invalid)?;
                let value = cond.value.trim().parse::<i64>().map_err(|_| {
                    ProjectionError::InvalidCondition(format!(
                        "amount `{}` is not an integer",
                        cond.value
                    ))
                })?;
                Ok(Self::Amount { op, value })
            }
            "date" => {
                let op = CmpOp::parse(&cond.op).ok_or_else(invalid)?;
                let value = NaiveDate::parse_from_str(cond.value.trim(), "%Y-%m-%d").map_err(
                    |_| {
                        ProjectionError::InvalidCondition(format!(
                            "date `{}` is not YYYY-MM-DD",
                            cond.value
                        ))
                    },
                )?;
                Ok(Self::Date { op, value })
            }
            _ => Err(ProjectionError::InvalidCondition(format!(
                "unknown field `{}`",
                cond.field
            ))),
        }
    }

    fn matches(&self, tx: &Transaction) -> bool {
        match self {
            Self::Text { field, op, needle } => {
                let haystack = match field {
                    TextField::Account => &tx.account,
                    TextField::Category => &tx.category,
                    TextField::Payee => &tx.payee,
                    TextField::Notes => &tx.notes,
                }
                .to_lowercase();
                match op {
                    TextOp::Is => haystack == *needle,
                    TextOp::IsNot => haystack != *needle,
                    TextOp::Contains => haystack.contains(needle.as_str()),
                    TextOp::DoesNotContain => !haystack.contains(needle.as_str()),
                }
            }
            Self::Amount { op, value } => op.holds(tx.amount.cmp(value)),
            Self::Date { op, value } => op.holds(tx.date.cmp(value)),
        }
    }
}

/// Applies report conditions to a transaction set.
///
/// Conditions carrying a `custom_name` label a saved report and are skipped.
/// No remaining conditions means every transaction matches.
pub fn filter_transactions<'a>(
    transactions: &'a [Transaction],
    conditions: &[Condition],
    op: ConditionsOp,
) -> Result<Vec<&'a Transaction>, ProjectionError> {
    let predicates = conditions
        .iter()
        .filter(|c| c.custom_name.is_none())
        .map(Predicate::compile)
        .collect::<Result<Vec<_>, _>>()?;

    if predicates.is_empty() {
        return Ok(transactions.iter().collect());
    }

    Ok(transactions
        .iter()
        .filter(|tx| match op {
            ConditionsOp::And => predicates.iter().all(|p| p.matches(tx)),
            ConditionsOp::Or => predicates.iter().any(|p| p.matches(tx)),
        })
        .collect())
}

/// Sums amounts per calendar month, oldest month first. Months without any
/// transaction are not emitted. A month whose total leaves the `i64` range
/// is an error.
pub fn monthly_deltas<'a, I>(transactions: I) -> Result<Vec<MonthlyDelta>, ProjectionError>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut by_month: BTreeMap<String, i64> = BTreeMap::new();
    for tx in transactions {
        let month = tx.date.format("%Y-%m").to_string();
        let total = by_month.entry(month).or_default();
        *total = total.checked_add(tx.amount).ok_or_else(|| {
            ProjectionError::InvalidConfig(format!(
                "monthly total for {} is out of range",
                tx.date.format("%Y-%m")
            ))
        })?;
    }
    Ok(by_month
        .into_iter()
        .map(|(month, amount)| MonthlyDelta { month, amount })
        .collect())
}

pub fn delta_values(months: &[MonthlyDelta]) -> Vec<f64> {
    months.iter().map(|m| m.amount as f64).collect()
}

/// Filter, bucket by month, then project. Fails with `EmptyDeltas` when the
/// filter leaves no history to resample.
pub fn project_transactions(
    transactions: &[Transaction],
    conditions: &[Condition],
    op: ConditionsOp,
    config: &ProjectionConfig,
) -> Result<(Vec<MonthlyDelta>, ProjectionBands), ProjectionError> {
    let filtered = filter_transactions(transactions, conditions, op)?;
    let months = monthly_deltas(filtered.iter().copied())?;
    debug!(
        transactions = transactions.len(),
        matched = filtered.len(),
        months = months.len(),
        "aggregated monthly deltas"
    );
    let bands = project(&delta_values(&months), config)?;
    Ok((months, bands))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(date: &str, amount: i64, category: &str, payee: &str) -> Transaction {
        Transaction {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("valid date"),
            amount,
            account: "Checking".to_string(),
            category: category.to_string(),
            payee: payee.to_string(),
            notes: String::new(),
        }
    }

    fn cond(field: &str, op: &str, value: &str) -> Condition {
        Condition {
            field: field.to_string(),
            op: op.to_string(),
            value: value.to_string(),
            custom_name: None,
        }
    }

    fn sample_history() -> Vec<Transaction> {
        vec![
            tx("2024-01-03", 300_000, "Income", "Employer"),
            tx("2024-01-15", -120_000, "Rent", "Landlord"),
            tx("2024-01-20", -8_500, "Food", "Grocer"),
            tx("2024-02-03", 300_000, "Income", "Employer"),
            tx("2024-02-15", -120_000, "Rent", "Landlord"),
            tx("2024-03-01", -4_000, "Food", "Corner Grocer"),
            tx("2023-12-31", 50_000, "Gift", "Family"),
        ]
    }

    #[test]
    fn monthly_deltas_sum_per_month_in_order() {
        let history = sample_history();
        let months = monthly_deltas(&history).expect("in range");
        let pairs: Vec<(&str, i64)> = months.iter().map(|m| (m.month.as_str(), m.amount)).collect();
        assert_eq!(
            pairs,
            vec![
                ("2023-12", 50_000),
                ("2024-01", 171_500),
                ("2024-02", 180_000),
                ("2024-03", -4_000),
            ]
        );
        assert_eq!(delta_values(&months), vec![50_000.0, 171_500.0, 180_000.0, -4_000.0]);
    }

    #[test]
    fn monthly_total_overflow_is_rejected() {
        let history = vec![
            tx("2024-01-03", i64::MAX, "Income", "Employer"),
            tx("2024-01-20", 1, "Income", "Employer"),
        ];
        let err = monthly_deltas(&history).expect_err("sum leaves i64");
        assert!(err.to_string().contains("2024-01"), "{err}");

        let config = ProjectionConfig::default();
        let err = project_transactions(&history, &[], ConditionsOp::And, &config)
            .expect_err("overflow surfaces before projecting");
        assert!(matches!(err, ProjectionError::InvalidConfig(_)), "{err:?}");
    }

    #[test]
    fn no_conditions_match_everything() {
        let history = sample_history();
        let matched = filter_transactions(&history, &[], ConditionsOp::And).expect("valid");
        assert_eq!(matched.len(), history.len());
    }

    #[test]
    fn and_requires_every_condition() {
        let history = sample_history();
        let conditions = [cond("category", "is", "food"), cond("amount", "lt", "-5000")];
        let matched =
            filter_transactions(&history, &conditions, ConditionsOp::And).expect("valid");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].amount, -8_500);
    }

    #[test]
    fn or_accepts_any_condition() {
        let history = sample_history();
        let conditions = [cond("payee", "contains", "grocer"), cond("category", "is", "Gift")];
        let matched = filter_transactions(&history, &conditions, ConditionsOp::Or).expect("valid");
        assert_eq!(matched.len(), 3);
    }

    #[test]
    fn custom_named_conditions_are_skipped() {
        let history = sample_history();
        let mut label = cond("category", "is", "nothing-matches-this");
        label.custom_name = Some("My saved report".to_string());
        let matched = filter_transactions(&history, &[label], ConditionsOp::And).expect("valid");
        assert_eq!(matched.len(), history.len());
    }

    #[test]
    fn date_conditions_compare_calendar_days() {
        let history = sample_history();
        let conditions = [cond("date", "gte", "2024-02-01")];
        let matched =
            filter_transactions(&history, &conditions, ConditionsOp::And).expect("valid");
        assert_eq!(matched.len(), 3);
    }

    #[test]
    fn negated_text_ops_exclude_matches() {
        let history = sample_history();
        let conditions = [
            cond("category", "isNot", "Rent"),
            cond("payee", "doesNotContain", "grocer"),
        ];
        let matched =
            filter_transactions(&history, &conditions, ConditionsOp::And).expect("valid");
        assert_eq!(matched.len(), 3);
    }

    #[test]
    fn malformed_conditions_are_reported() {
        let history = sample_history();
        for bad in [
            cond("amount", "contains", "1"),
            cond("amount", "gt", "ten"),
            cond("date", "lt", "03/01/2024"),
            cond("merchant", "is", "x"),
        ] {
            let err = filter_transactions(&history, &[bad], ConditionsOp::And)
                .expect_err("condition must be rejected");
            assert!(matches!(err, ProjectionError::InvalidCondition(_)));
        }
    }

    #[test]
    fn project_transactions_fails_when_filter_leaves_nothing() {
        let history = sample_history();
        let conditions = [cond("category", "is", "Travel")];
        let err = project_transactions(
            &history,
            &conditions,
            ConditionsOp::And,
            &ProjectionConfig::default(),
        )
        .expect_err("empty history must fail");
        assert_eq!(err, ProjectionError::EmptyDeltas);
    }

    #[test]
    fn project_transactions_draws_only_observed_months() {
        let history = sample_history();
        let config = ProjectionConfig {
            seed: Some(17),
            ..ProjectionConfig::default()
        };
        let (months, bands) =
            project_transactions(&history, &[], ConditionsOp::And, &config).expect("valid");
        assert_eq!(months.len(), 4);
        let observed = delta_values(&months);
        let mut previous = 0.0;
        for v in &bands.low_band {
            assert!(observed.contains(&(v - previous)));
            previous = *v;
        }
    }
}
