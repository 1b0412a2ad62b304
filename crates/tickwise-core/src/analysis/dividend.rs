use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::{Dividend, UtcDateTime};

/// Standard deviation of yearly growth, in percentage points, above which
/// the history is volatile.
const VOLATILE_STD_DEV: f64 = 20.0;
/// Average yearly growth, in percent, beyond which the trend has a direction.
const TREND_BAND: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DividendTrend {
    Increasing,
    Decreasing,
    Stable,
    Volatile,
    InsufficientData,
}

impl DividendTrend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
            Self::Volatile => "volatile",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

impl Display for DividendTrend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payments of one calendar year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyDividends {
    pub year: i32,
    pub total: f64,
    pub payments: usize,
    pub average: f64,
    pub first_payment: String,
    pub last_payment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DividendAnalysis {
    pub total_payments: usize,
    /// Most recent year first.
    pub yearly: Vec<YearlyDividends>,
    pub highest_year: i32,
    pub highest_total: f64,
    pub lowest_year: i32,
    pub lowest_total: f64,
    pub trend: DividendTrend,
    /// Mean year-over-year change of yearly totals, in percent.
    pub average_growth: Option<f64>,
    /// Population standard deviation of those changes.
    pub growth_std_dev: Option<f64>,
    /// Sum of payments in the 365 days up to the analysis date.
    pub trailing_twelve_months: Option<f64>,
    /// 0 to 10, penalizing gaps, uneven totals and irregular payment counts.
    pub consistency_score: Option<f64>,
    pub years_without_dividends: Vec<i32>,
}

/// Aggregate dividend events by calendar year and derive trend and
/// consistency measures. `None` when there are no payments.
///
/// Ties for highest or lowest year go to the most recent year.
pub fn dividend_history(dividends: &[Dividend], as_of: UtcDateTime) -> Option<DividendAnalysis> {
    let yearly = aggregate_by_year(dividends);
    let newest = yearly.first()?;

    let (mut highest, mut lowest) = (newest, newest);
    for year in &yearly {
        if year.total > highest.total {
            highest = year;
        }
        if year.total < lowest.total {
            lowest = year;
        }
    }

    let growth = growth_rates(&yearly);
    let (trend, average_growth, growth_std_dev) = match mean_and_std_dev(&growth) {
        Some((mean, std_dev)) => (classify(mean, std_dev), Some(mean), Some(std_dev)),
        None => (DividendTrend::InsufficientData, None, None),
    };

    let window_start = as_of.minus_days(365);
    let recent: Vec<f64> = dividends
        .iter()
        .filter(|d| d.ex_date >= window_start && d.ex_date <= as_of)
        .map(|d| d.amount)
        .collect();
    let trailing_twelve_months = (!recent.is_empty()).then(|| recent.iter().sum());

    let paid_years: Vec<i32> = yearly.iter().map(|y| y.year).collect();
    let years_without_dividends = match (paid_years.iter().min(), paid_years.iter().max()) {
        (Some(&first), Some(&last)) => (first..=last)
            .filter(|year| !paid_years.contains(year))
            .collect(),
        _ => Vec::new(),
    };

    Some(DividendAnalysis {
        total_payments: dividends.len(),
        highest_year: highest.year,
        highest_total: highest.total,
        lowest_year: lowest.year,
        lowest_total: lowest.total,
        trend,
        average_growth,
        growth_std_dev,
        trailing_twelve_months,
        consistency_score: consistency_score(&yearly),
        years_without_dividends,
        yearly,
    })
}

fn aggregate_by_year(dividends: &[Dividend]) -> Vec<YearlyDividends> {
    let mut by_year: BTreeMap<i32, Vec<&Dividend>> = BTreeMap::new();
    for dividend in dividends {
        by_year.entry(dividend.ex_date.year()).or_default().push(dividend);
    }

    by_year
        .into_iter()
        .rev()
        .filter_map(|(year, mut payments)| {
            payments.sort_by_key(|d| d.ex_date);
            let first = payments.first()?;
            let last = payments.last()?;
            let total: f64 = payments.iter().map(|d| d.amount).sum();
            Some(YearlyDividends {
                year,
                total,
                payments: payments.len(),
                average: total / payments.len() as f64,
                first_payment: first.ex_date.date_string(),
                last_payment: last.ex_date.date_string(),
            })
        })
        .collect()
}

/// Year-over-year percentage changes, oldest pair first. Years following a
/// zero total are skipped.
fn growth_rates(yearly: &[YearlyDividends]) -> Vec<f64> {
    let oldest_first: Vec<f64> = yearly.iter().rev().map(|y| y.total).collect();
    oldest_first
        .windows(2)
        .filter(|pair| pair[0] > 0.0)
        .map(|pair| (pair[1] - pair[0]) / pair[0] * 100.0)
        .collect()
}

fn mean_and_std_dev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    Some((mean, variance.sqrt()))
}

fn classify(average_growth: f64, std_dev: f64) -> DividendTrend {
    if std_dev > VOLATILE_STD_DEV {
        DividendTrend::Volatile
    } else if average_growth > TREND_BAND {
        DividendTrend::Increasing
    } else if average_growth < -TREND_BAND {
        DividendTrend::Decreasing
    } else {
        DividendTrend::Stable
    }
}

fn consistency_score(yearly: &[YearlyDividends]) -> Option<f64> {
    if yearly.len() < 2 {
        return None;
    }
    let mut score = 10.0;

    let years: Vec<i32> = yearly.iter().map(|y| y.year).collect();
    let span = years.iter().max()? - years.iter().min()? + 1;
    let gaps = span as usize - years.len();
    score -= gaps as f64 * 1.5;

    let totals: Vec<f64> = yearly.iter().map(|y| y.total).collect();
    if let Some((mean, std_dev)) = mean_and_std_dev(&totals) {
        if mean > 0.0 {
            score -= std_dev / mean * 5.0;
        }
    }

    // Most common payment count; ties go to the larger count.
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for year in yearly {
        *counts.entry(year.payments).or_default() += 1;
    }
    let usual = counts
        .iter()
        .max_by_key(|(payments, frequency)| (**frequency, **payments))
        .map(|(payments, _)| *payments)?;
    let irregular = yearly.iter().filter(|y| y.payments != usual).count();
    score -= irregular as f64 / yearly.len() as f64 * 2.0;

    Some(score.clamp(0.0, 10.0))
}
