//! ATR (Average True Range).
//!
//! Wilder 평활을 사용합니다: 첫 값은 처음 `period`개 True Range의 단순 평균,
//! 이후 `atr = (prev × (period − 1) + tr) ÷ period`.

use rust_decimal::Decimal;
use trader_core::Kline;

/// 캔들 목록의 True Range를 계산합니다. 첫 캔들은 이전 종가가 없으므로 제외됩니다.
pub fn true_ranges(klines: &[Kline]) -> Vec<Decimal> {
    klines
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let k = &w[1];
            (k.high - k.low)
                .max((k.high - prev_close).abs())
                .max((k.low - prev_close).abs())
        })
        .collect()
}

/// 마지막 캔들 기준 ATR. 캔들이 `period + 1`개 미만이면 `None`.
pub fn atr(klines: &[Kline], period: usize) -> Option<Decimal> {
    if period == 0 {
        return None;
    }

    let tr = true_ranges(klines);
    if tr.len() < period {
        return None;
    }

    let n = Decimal::from(period as u64);
    let seed: Decimal = tr[..period].iter().sum::<Decimal>() / n;
    let value = tr[period..]
        .iter()
        .fold(seed, |prev, tr| (prev * (n - Decimal::ONE) + tr) / n);

    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn kline(i: i64, high: Decimal, low: Decimal, close: Decimal) -> Kline {
        Kline {
            open_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::minutes(15 * i),
            open: close,
            high,
            low,
            close,
            volume: dec!(1),
        }
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let klines = vec![
            kline(0, dec!(101), dec!(99), dec!(100)),
            // 갭 상승: high - prev_close = 8
            kline(1, dec!(108), dec!(105), dec!(107)),
        ];
        assert_eq!(true_ranges(&klines), vec![dec!(8)]);
    }

    #[test]
    fn test_constant_range_atr() {
        let klines: Vec<_> = (0..20)
            .map(|i| kline(i, dec!(102), dec!(98), dec!(100)))
            .collect();
        assert_eq!(atr(&klines, 14), Some(dec!(4)));
    }

    #[test]
    fn test_wilder_smoothing_step() {
        // 3개 TR = 2, 다음 TR = 5 → (2 * 2 + 5) / 3 = 3
        let mut klines: Vec<_> = (0..4)
            .map(|i| kline(i, dec!(101), dec!(99), dec!(100)))
            .collect();
        klines.push(kline(4, dec!(104), dec!(99), dec!(100)));

        assert_eq!(atr(&klines, 3), Some(dec!(3)));
    }

    #[test]
    fn test_insufficient_data() {
        let klines: Vec<_> = (0..14)
            .map(|i| kline(i, dec!(102), dec!(98), dec!(100)))
            .collect();
        assert_eq!(atr(&klines, 14), None);
        assert_eq!(atr(&klines, 0), None);
    }
}
