//! Magic Formula screening.
//!
//! Each ticker gets two ratios from its most recent reported period:
//!
//! | Ratio | Formula |
//! |-------|---------|
//! | Earnings yield (EY) | EBIT / enterprise value |
//! | Return on capital (ROC) | EBIT / invested capital |
//!
//! Both are ranked independently, highest first, using standard competition
//! ranking (ties share the best rank, the next rank skips). The combined score
//! is `EY rank + ROC rank`; lower is better.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::data_access::DataAccess;
use crate::provider::{ProviderError, ProviderErrorKind};
use crate::{latest, Frequency, RunStatus, Symbol};

/// Raw inputs of the formula for one ticker, derived each run and never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundamentalSnapshot {
    pub symbol: Symbol,
    pub company_name: Option<String>,
    pub ebit: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub invested_capital: Option<f64>,
}

/// A ticker whose ratios are defined and can be ranked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub symbol: Symbol,
    pub company_name: Option<String>,
    pub earnings_yield: f64,
    pub return_on_capital: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStock {
    /// 1-based position in the final ordering.
    pub position: u32,
    pub symbol: Symbol,
    pub company_name: Option<String>,
    pub earnings_yield: f64,
    pub return_on_capital: f64,
    pub ey_rank: u32,
    pub roc_rank: u32,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub symbol: Symbol,
    pub reason: ProviderErrorKind,
    pub message: String,
}

impl Exclusion {
    fn invalid(symbol: &Symbol, message: impl Into<String>) -> Self {
        Self {
            symbol: symbol.clone(),
            reason: ProviderErrorKind::InvalidData,
            message: message.into(),
        }
    }

    fn from_error(symbol: &Symbol, error: &ProviderError) -> Self {
        Self {
            symbol: symbol.clone(),
            reason: error.kind(),
            message: error.message().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenReport {
    pub frequency: Frequency,
    pub status: RunStatus,
    pub ranked: Vec<RankedStock>,
    /// Excluded tickers in input order.
    pub excluded: Vec<Exclusion>,
}

impl FundamentalSnapshot {
    /// Compute both ratios, or explain why they are undefined.
    ///
    /// EBIT may be zero or negative. Such tickers stay in the ranking and sort
    /// to the bottom on both ratios instead of being excluded as invalid EBIT.
    /// Callers that want the stricter screen can drop ranked stocks whose
    /// `earnings_yield` is not positive.
    pub fn evaluate(&self) -> Result<Candidate, Exclusion> {
        let enterprise_value = positive(
            &self.symbol,
            "enterprise value",
            "earnings yield",
            self.enterprise_value,
        )?;
        let invested_capital = positive(
            &self.symbol,
            "invested capital",
            "return on capital",
            self.invested_capital,
        )?;
        let ebit = match self.ebit {
            Some(ebit) if ebit.is_finite() => ebit,
            Some(_) => return Err(Exclusion::invalid(&self.symbol, "EBIT is not a finite number")),
            None => return Err(Exclusion::invalid(&self.symbol, "EBIT is missing")),
        };

        Ok(Candidate {
            symbol: self.symbol.clone(),
            company_name: self.company_name.clone(),
            earnings_yield: ebit / enterprise_value,
            return_on_capital: ebit / invested_capital,
        })
    }
}

fn positive(
    symbol: &Symbol,
    field: &str,
    ratio: &str,
    value: Option<f64>,
) -> Result<f64, Exclusion> {
    match value {
        None => Err(Exclusion::invalid(
            symbol,
            format!("{field} is missing; {ratio} undefined"),
        )),
        Some(value) if !value.is_finite() => Err(Exclusion::invalid(
            symbol,
            format!("{field} is not a finite number; {ratio} undefined"),
        )),
        Some(value) if value == 0.0 => Err(Exclusion::invalid(
            symbol,
            format!("{field} is zero; {ratio} undefined"),
        )),
        Some(value) if value < 0.0 => Err(Exclusion::invalid(
            symbol,
            format!("{field} is negative ({value}); {ratio} undefined"),
        )),
        Some(value) => Ok(value),
    }
}

/// Standard competition ranks, highest value first: `[5, 7, 7, 1]` ranks `[3, 1, 1, 4]`.
pub fn competition_ranks(values: &[f64]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

    let mut ranks = vec![0_u32; values.len()];
    for (position, &index) in order.iter().enumerate() {
        ranks[index] = match position.checked_sub(1).map(|prev| order[prev]) {
            Some(prev) if values[prev] == values[index] => ranks[prev],
            _ => position as u32 + 1,
        };
    }
    ranks
}

/// Rank candidates and order them by score, then EY rank, then ticker.
///
/// The result does not depend on the order of `candidates`.
pub fn rank(candidates: Vec<Candidate>) -> Vec<RankedStock> {
    let yields: Vec<f64> = candidates.iter().map(|c| c.earnings_yield).collect();
    let returns: Vec<f64> = candidates.iter().map(|c| c.return_on_capital).collect();
    let ey_ranks = competition_ranks(&yields);
    let roc_ranks = competition_ranks(&returns);

    let mut ranked: Vec<RankedStock> = candidates
        .into_iter()
        .zip(ey_ranks.into_iter().zip(roc_ranks))
        .map(|(candidate, (ey_rank, roc_rank))| RankedStock {
            position: 0,
            symbol: candidate.symbol,
            company_name: candidate.company_name,
            earnings_yield: candidate.earnings_yield,
            return_on_capital: candidate.return_on_capital,
            ey_rank,
            roc_rank,
            score: ey_rank + roc_rank,
        })
        .collect();

    ranked.sort_by(|left, right| {
        left.score
            .cmp(&right.score)
            .then(left.ey_rank.cmp(&right.ey_rank))
            .then_with(|| left.symbol.cmp(&right.symbol))
    });
    for (index, stock) in ranked.iter_mut().enumerate() {
        stock.position = index as u32 + 1;
    }
    ranked
}

pub struct MagicFormulaScreener {
    access: Arc<DataAccess>,
    workers: usize,
}

impl MagicFormulaScreener {
    pub fn new(access: Arc<DataAccess>, workers: usize) -> Self {
        Self {
            access,
            workers: workers.max(1),
        }
    }

    /// Screen `symbols` at `frequency`. Duplicate tickers are screened once.
    pub async fn screen(&self, symbols: &[Symbol], frequency: Frequency) -> ScreenReport {
        let mut seen = BTreeSet::new();
        let unique: Vec<Symbol> = symbols
            .iter()
            .filter(|symbol| seen.insert((*symbol).clone()))
            .cloned()
            .collect();

        info!(
            tickers = unique.len(),
            %frequency,
            workers = self.workers,
            "starting magic formula screen"
        );

        let outcomes = self.gather_all(&unique, frequency).await;

        let mut candidates = Vec::new();
        let mut excluded = Vec::new();
        for (symbol, outcome) in unique.iter().zip(outcomes) {
            let evaluated = match outcome {
                Some(Ok(snapshot)) => snapshot.evaluate(),
                Some(Err(error)) => Err(Exclusion::from_error(symbol, &error)),
                None => Err(Exclusion::invalid(symbol, "fetch task aborted")),
            };
            match evaluated {
                Ok(candidate) => candidates.push(candidate),
                Err(exclusion) => {
                    warn!(
                        symbol = %exclusion.symbol,
                        reason = %exclusion.reason,
                        message = %exclusion.message,
                        "ticker excluded from screen"
                    );
                    excluded.push(exclusion);
                }
            }
        }

        let unavailable = excluded
            .iter()
            .filter(|exclusion| exclusion.reason == ProviderErrorKind::Unavailable)
            .count();
        let status = RunStatus::from_counts(unique.len(), excluded.len(), unavailable);
        let ranked = rank(candidates);

        info!(
            ranked = ranked.len(),
            excluded = excluded.len(),
            status = status.as_str(),
            "magic formula screen finished"
        );

        ScreenReport {
            frequency,
            status,
            ranked,
            excluded,
        }
    }

    /// Fetch snapshots concurrently; the result is aligned with `symbols`.
    async fn gather_all(
        &self,
        symbols: &[Symbol],
        frequency: Frequency,
    ) -> Vec<Option<Result<FundamentalSnapshot, ProviderError>>> {
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for (index, symbol) in symbols.iter().cloned().enumerate() {
            let access = Arc::clone(&self.access);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, gather(&access, &symbol, frequency).await)
            });
        }

        let mut outcomes: Vec<Option<_>> = vec![None; symbols.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(error) => warn!(%error, "screen task failed"),
            }
        }
        outcomes
    }
}

async fn gather(
    access: &DataAccess,
    symbol: &Symbol,
    frequency: Frequency,
) -> Result<FundamentalSnapshot, ProviderError> {
    let info = access.company_info(symbol).await?;
    let income = access.income_statements(symbol, frequency).await?;
    let balance = access.balance_sheets(symbol, frequency).await?;

    let snapshot = FundamentalSnapshot {
        symbol: symbol.clone(),
        company_name: info.name,
        ebit: latest(&income, |row| row.period_end).and_then(|row| row.ebit),
        enterprise_value: info.enterprise_value,
        invested_capital: latest(&balance, |row| row.period_end)
            .and_then(|row| row.invested_capital),
    };
    debug!(?snapshot, "fundamentals gathered");
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(ticker: &str, ey: f64, roc: f64) -> Candidate {
        Candidate {
            symbol: Symbol::parse(ticker).expect("valid"),
            company_name: None,
            earnings_yield: ey,
            return_on_capital: roc,
        }
    }

    fn snapshot(ev: Option<f64>, ebit: Option<f64>, capital: Option<f64>) -> FundamentalSnapshot {
        FundamentalSnapshot {
            symbol: Symbol::parse("TEST").expect("valid"),
            company_name: None,
            ebit,
            enterprise_value: ev,
            invested_capital: capital,
        }
    }

    #[test]
    fn competition_ranking_shares_ties_and_skips() {
        assert_eq!(competition_ranks(&[5.0, 7.0, 7.0, 1.0]), vec![3, 1, 1, 4]);
        assert_eq!(competition_ranks(&[]), Vec::<u32>::new());
    }

    #[test]
    fn final_order_breaks_ties_by_ey_rank_then_ticker() {
        let ranked = rank(vec![
            candidate("BBB", 0.05, 0.10),
            candidate("AAA", 0.05, 0.10),
            candidate("CCC", 0.08, 0.02),
        ]);
        let order: Vec<&str> = ranked.iter().map(|r| r.symbol.as_str()).collect();
        // AAA and BBB: EY 2, ROC 1 -> 3; CCC: EY 1, ROC 3 -> 4.
        assert_eq!(order, vec!["AAA", "BBB", "CCC"]);
        assert_eq!(ranked[0].score, 3);
        assert_eq!(ranked[2].position, 3);
    }

    #[test]
    fn zero_enterprise_value_is_excluded_as_undefined() {
        let exclusion = snapshot(Some(0.0), Some(10.0), Some(50.0))
            .evaluate()
            .expect_err("must be excluded");
        assert_eq!(exclusion.reason, ProviderErrorKind::InvalidData);
        assert!(exclusion.message.contains("undefined"));
    }

    #[test]
    fn missing_ebit_or_negative_capital_is_excluded() {
        assert!(snapshot(Some(100.0), None, Some(50.0)).evaluate().is_err());
        assert!(snapshot(Some(100.0), Some(5.0), Some(-1.0)).evaluate().is_err());
    }

    #[test]
    fn negative_ebit_is_still_ranked() {
        let candidate = snapshot(Some(100.0), Some(-5.0), Some(50.0))
            .evaluate()
            .expect("ranked");
        assert!(candidate.earnings_yield < 0.0);
    }
}
