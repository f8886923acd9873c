//! Daily returns, covariance and portfolio variance.
//!
//! Every computation here fails closed: a held symbol without enough return
//! history is an error, never an implicit zero.

use crate::domain::bar_store::BarStore;
use crate::domain::error::TradeloopError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

/// Percentage change of close between consecutive bars, keyed by the later bar's timestamp.
pub fn daily_returns(store: &BarStore, symbol: &str) -> BTreeMap<DateTime<Utc>, f64> {
    let rows: Vec<_> = store.symbol_rows(symbol).collect();
    rows.windows(2)
        .filter(|pair| pair[0].close != 0.0)
        .map(|pair| (pair[1].timestamp, pair[1].close / pair[0].close - 1.0))
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample covariance (n - 1 denominator) over timestamps present in both series.
fn pairwise_covariance(
    a: &BTreeMap<DateTime<Utc>, f64>,
    b: &BTreeMap<DateTime<Utc>, f64>,
) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = a
        .iter()
        .filter_map(|(ts, x)| b.get(ts).map(|y| (*x, *y)))
        .unzip();
    if xs.len() < 2 {
        return None;
    }
    let mx = mean(&xs);
    let my = mean(&ys);
    let sum: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    Some(sum / (xs.len() - 1) as f64)
}

/// Square covariance matrix labelled by symbol, always held in sorted symbol order.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    symbols: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl CovarianceMatrix {
    /// Builds a matrix from labelled rows, reordering rows and columns so
    /// the labels are sorted.
    pub fn new(symbols: Vec<String>, values: Vec<Vec<f64>>) -> Result<Self, TradeloopError> {
        let n = symbols.len();
        if values.len() != n || values.iter().any(|row| row.len() != n) {
            return Err(TradeloopError::CovarianceMismatch {
                reason: format!("expected a {n}x{n} matrix"),
            });
        }
        let unique: HashSet<&String> = symbols.iter().collect();
        if unique.len() != n {
            return Err(TradeloopError::CovarianceMismatch {
                reason: "duplicate symbol labels".to_string(),
            });
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| symbols[i].cmp(&symbols[j]));

        let sorted_symbols = order.iter().map(|&i| symbols[i].clone()).collect();
        let sorted_values = order
            .iter()
            .map(|&i| order.iter().map(|&j| values[i][j]).collect())
            .collect();

        Ok(Self {
            symbols: sorted_symbols,
            values: sorted_values,
        })
    }

    /// Covariance of daily returns for `symbols`, read from a daily bar store.
    pub fn from_daily_bars(store: &BarStore, symbols: &[String]) -> Result<Self, TradeloopError> {
        let mut sorted: Vec<String> = symbols.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut returns = Vec::with_capacity(sorted.len());
        for symbol in &sorted {
            let series = daily_returns(store, symbol);
            if series.len() < 2 {
                return Err(TradeloopError::MissingReturns {
                    symbol: symbol.clone(),
                });
            }
            returns.push(series);
        }

        let mut values = vec![vec![0.0; sorted.len()]; sorted.len()];
        for i in 0..sorted.len() {
            for j in i..sorted.len() {
                let cov = pairwise_covariance(&returns[i], &returns[j]).ok_or_else(|| {
                    TradeloopError::CovarianceMismatch {
                        reason: format!(
                            "{} and {} share fewer than two return dates",
                            sorted[i], sorted[j]
                        ),
                    }
                })?;
                values[i][j] = cov;
                values[j][i] = cov;
            }
        }

        Ok(Self {
            symbols: sorted,
            values,
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.symbols.binary_search_by(|s| s.as_str().cmp(a)).ok()?;
        let j = self.symbols.binary_search_by(|s| s.as_str().cmp(b)).ok()?;
        Some(self.values[i][j])
    }

    pub fn row(&self, symbol: &str) -> Option<BTreeMap<String, f64>> {
        let i = self.symbols.binary_search_by(|s| s.as_str().cmp(symbol)).ok()?;
        Some(
            self.symbols
                .iter()
                .cloned()
                .zip(self.values[i].iter().copied())
                .collect(),
        )
    }
}

/// wᵀ·C·w with the weight vector formed in sorted symbol order.
///
/// The weight symbols must be exactly the matrix labels. Round-off that
/// lands a hair below zero is reported as zero.
pub fn portfolio_variance<'a, W>(
    weights: W,
    covariance: &CovarianceMatrix,
) -> Result<f64, TradeloopError>
where
    W: IntoIterator<Item = (&'a String, &'a f64)>,
{
    let mut sorted: Vec<(&String, f64)> = weights.into_iter().map(|(s, w)| (s, *w)).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let labels: Vec<&String> = sorted.iter().map(|(s, _)| *s).collect();
    if labels.len() != covariance.symbols.len()
        || labels.iter().zip(&covariance.symbols).any(|(a, b)| *a != b)
    {
        return Err(TradeloopError::CovarianceMismatch {
            reason: format!(
                "weights cover [{}], matrix covers [{}]",
                labels
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                covariance.symbols.join(", ")
            ),
        });
    }

    let w: Vec<f64> = sorted.iter().map(|(_, w)| *w).collect();
    let variance: f64 = covariance
        .values
        .iter()
        .zip(&w)
        .map(|(row, wi)| wi * row.iter().zip(&w).map(|(c, wj)| c * wj).sum::<f64>())
        .sum();

    let scale: f64 = covariance
        .values
        .iter()
        .flatten()
        .map(|c| c.abs())
        .sum::<f64>()
        * w.iter().map(|x| x * x).sum::<f64>();
    if variance < 0.0 && -variance <= scale * 1e-12 {
        return Ok(0.0);
    }
    Ok(variance)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMetrics {
    pub weight: f64,
    pub average_return: f64,
    pub weighted_return: f64,
    pub standard_deviation: f64,
    pub variance: f64,
    pub covariance: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioMetrics {
    pub symbols: BTreeMap<String, SymbolMetrics>,
    pub variance: f64,
}

/// Per-symbol return statistics plus the portfolio variance.
pub fn portfolio_metrics(
    weights: &BTreeMap<String, f64>,
    daily: &BarStore,
) -> Result<PortfolioMetrics, TradeloopError> {
    let symbols: Vec<String> = weights.keys().cloned().collect();
    let covariance = CovarianceMatrix::from_daily_bars(daily, &symbols)?;
    let variance = portfolio_variance(weights, &covariance)?;

    let mut per_symbol = BTreeMap::new();
    for (symbol, weight) in weights {
        let returns: Vec<f64> = daily_returns(daily, symbol).into_values().collect();
        let average_return = mean(&returns);
        let sample_variance = returns
            .iter()
            .map(|r| (r - average_return).powi(2))
            .sum::<f64>()
            / (returns.len() - 1) as f64;
        let standard_deviation = sample_variance.sqrt();

        per_symbol.insert(
            symbol.clone(),
            SymbolMetrics {
                weight: *weight,
                average_return,
                weighted_return: average_return * weight,
                standard_deviation,
                variance: standard_deviation.powi(2),
                covariance: covariance.row(symbol).unwrap_or_default(),
            },
        );
    }

    Ok(PortfolioMetrics {
        symbols: per_symbol,
        variance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 21, 0, 0).unwrap() + Duration::days(n)
    }

    fn daily_bar(symbol: &str, n: i64, close: f64) -> Bar {
        Bar {
            symbol: symbol.into(),
            timestamp: day(n),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100,
        }
    }

    fn store_with(series: &[(&str, &[f64])]) -> BarStore {
        let mut store = BarStore::new();
        for (symbol, closes) in series {
            for (i, close) in closes.iter().enumerate() {
                store.upsert(daily_bar(symbol, i as i64, *close));
            }
        }
        store
    }

    #[test]
    fn daily_returns_are_pct_change() {
        let store = store_with(&[("AAPL", &[100.0, 110.0, 99.0])]);
        let returns: Vec<f64> = daily_returns(&store, "AAPL").into_values().collect();
        assert_eq!(returns.len(), 2);
        assert_relative_eq!(returns[0], 0.10, epsilon = 1e-12);
        assert_relative_eq!(returns[1], -0.10, epsilon = 1e-12);
    }

    #[test]
    fn covariance_of_identical_series_equals_variance() {
        let closes = [100.0, 102.0, 101.0, 105.0, 104.0];
        let store = store_with(&[("AAPL", &closes), ("MSFT", &closes)]);
        let cov =
            CovarianceMatrix::from_daily_bars(&store, &["MSFT".into(), "AAPL".into()]).unwrap();

        assert_eq!(cov.symbols(), &["AAPL".to_string(), "MSFT".to_string()]);
        let var = cov.get("AAPL", "AAPL").unwrap();
        assert!(var > 0.0);
        assert_relative_eq!(cov.get("AAPL", "MSFT").unwrap(), var, epsilon = 1e-15);
    }

    #[test]
    fn covariance_requires_history_for_every_symbol() {
        let store = store_with(&[("AAPL", &[100.0, 101.0, 102.0]), ("MSFT", &[10.0])]);
        let err = CovarianceMatrix::from_daily_bars(&store, &["AAPL".into(), "MSFT".into()])
            .unwrap_err();
        assert!(matches!(err, TradeloopError::MissingReturns { symbol } if symbol == "MSFT"));
    }

    #[test]
    fn new_sorts_labels_and_permutes_values() {
        let cov = CovarianceMatrix::new(
            vec!["MSFT".into(), "AAPL".into()],
            vec![vec![4.0, 1.0], vec![1.0, 9.0]],
        )
        .unwrap();
        assert_eq!(cov.symbols(), &["AAPL".to_string(), "MSFT".to_string()]);
        assert_eq!(cov.get("AAPL", "AAPL"), Some(9.0));
        assert_eq!(cov.get("MSFT", "MSFT"), Some(4.0));
        assert_eq!(cov.get("AAPL", "MSFT"), Some(1.0));
    }

    #[test]
    fn new_rejects_non_square() {
        let err = CovarianceMatrix::new(vec!["A".into(), "B".into()], vec![vec![1.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, TradeloopError::CovarianceMismatch { .. }));
    }

    #[test]
    fn variance_independent_of_weight_order() {
        let cov = CovarianceMatrix::new(
            vec!["AAPL".into(), "MSFT".into()],
            vec![vec![0.04, 0.01], vec![0.01, 0.09]],
        )
        .unwrap();

        let mut a = HashMap::new();
        a.insert("MSFT".to_string(), 0.25);
        a.insert("AAPL".to_string(), 0.75);
        let b: BTreeMap<String, f64> = a.clone().into_iter().collect();

        let va = portfolio_variance(&a, &cov).unwrap();
        let vb = portfolio_variance(&b, &cov).unwrap();
        // 0.75²·0.04 + 2·0.75·0.25·0.01 + 0.25²·0.09
        let expected = 0.5625 * 0.04 + 2.0 * 0.1875 * 0.01 + 0.0625 * 0.09;
        assert_relative_eq!(va, expected, epsilon = 1e-15);
        assert_relative_eq!(va, vb, epsilon = 1e-15);
    }

    #[test]
    fn variance_rejects_mismatched_symbols() {
        let cov = CovarianceMatrix::new(vec!["AAPL".into()], vec![vec![0.04]]).unwrap();
        let mut weights = BTreeMap::new();
        weights.insert("MSFT".to_string(), 1.0);
        let err = portfolio_variance(&weights, &cov).unwrap_err();
        assert!(matches!(err, TradeloopError::CovarianceMismatch { .. }));
    }

    #[test]
    fn metrics_cover_every_weighted_symbol() {
        let store = store_with(&[
            ("AAPL", &[100.0, 102.0, 101.0, 105.0]),
            ("MSFT", &[10.0, 10.5, 10.2, 10.1]),
        ]);
        let mut weights = BTreeMap::new();
        weights.insert("AAPL".to_string(), 0.75);
        weights.insert("MSFT".to_string(), 0.25);

        let metrics = portfolio_metrics(&weights, &store).unwrap();
        assert_eq!(metrics.symbols.len(), 2);
        assert!(metrics.variance >= 0.0);

        let aapl = &metrics.symbols["AAPL"];
        assert_relative_eq!(aapl.weighted_return, aapl.average_return * 0.75);
        assert_relative_eq!(aapl.variance, aapl.standard_deviation.powi(2));
        assert_eq!(aapl.covariance.len(), 2);
    }
}
