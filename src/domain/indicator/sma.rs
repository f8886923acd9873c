//! Simple moving average over closing prices.
//!
//! Warmup: the first (n-1) rows have no value.

pub fn calculate_sma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; closes.len()];
    }

    let mut values = Vec::with_capacity(closes.len());
    let mut sum = 0.0;
    for (i, close) in closes.iter().enumerate() {
        sum += close;
        if i >= period {
            sum -= closes[i - period];
        }
        if i + 1 >= period {
            values.push(Some(sum / period as f64));
        } else {
            values.push(None);
        }
    }
    values
}
