//! Exponential moving average over closing prices.
//!
//! k = 2/(n+1), seeded with the SMA of the first n closes, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k). The first (n-1) rows have no value.

pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; closes.len()];
    }

    let mut values = Vec::with_capacity(closes.len());
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, close) in closes.iter().enumerate() {
        if i + 1 < period {
            sum += close;
            values.push(None);
        } else if i + 1 == period {
            sum += close;
            ema = sum / period as f64;
            values.push(Some(ema));
        } else {
            ema = close * k + ema * (1.0 - k);
            values.push(Some(ema));
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ema_warmup() {
        let values = calculate_ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        assert!(values[0].is_none());
        assert!(values[1].is_none());
        assert!(values[2..].iter().all(Option::is_some));
    }

    #[test]
    fn ema_period_1_tracks_close() {
        let values = calculate_ema(&[10.0, 20.0, 30.0], 1);
        assert_eq!(values, vec![Some(10.0), Some(20.0), Some(30.0)]);
    }

    #[test]
    fn ema_recursive_calculation() {
        let values = calculate_ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        let k = 0.5;
        let seed = 20.0;
        let ema_3 = 40.0 * k + seed * (1.0 - k);
        let ema_4 = 50.0 * k + ema_3 * (1.0 - k);

        assert_relative_eq!(values[2].unwrap(), seed);
        assert_relative_eq!(values[3].unwrap(), ema_3);
        assert_relative_eq!(values[4].unwrap(), ema_4);
    }

    #[test]
    fn ema_equal_prices() {
        let values = calculate_ema(&[100.0; 5], 3);
        for v in values.into_iter().flatten() {
            assert_relative_eq!(v, 100.0);
        }
    }

    #[test]
    fn ema_empty_and_zero_period() {
        assert!(calculate_ema(&[], 3).is_empty());
        assert_eq!(calculate_ema(&[1.0, 2.0], 0), vec![None, None]);
    }
}
