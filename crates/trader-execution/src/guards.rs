//! 시각 기반 가드: 진입 허용 시간대, 강제 청산 시각, 일일 킬스위치.
//!
//! 모든 판단은 설정된 시간대의 현지 시각 기준입니다.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;

/// 신규 주문 허용 시간대 `[start, end]` (현지 시각, 양끝 포함).
///
/// `start > end`이면 자정을 넘는 시간대로 해석합니다 (예: 23:00~02:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl EntryWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, local: NaiveTime) -> bool {
        if self.start <= self.end {
            local >= self.start && local <= self.end
        } else {
            local >= self.start || local <= self.end
        }
    }

    /// UTC 시각이 시간대 안에 있는지 확인합니다.
    pub fn contains_at(&self, tz: Tz, now: DateTime<Utc>) -> bool {
        self.contains(now.with_timezone(&tz).time())
    }
}

/// 일 1회 강제 청산.
#[derive(Debug, Clone)]
pub struct TimeStop {
    cutoff: NaiveTime,
    fired_on: Option<NaiveDate>,
}

impl TimeStop {
    pub fn new(cutoff: NaiveTime) -> Self {
        Self {
            cutoff,
            fired_on: None,
        }
    }

    pub fn cutoff(&self) -> NaiveTime {
        self.cutoff
    }

    /// 현지 시각이 기준을 지났고 오늘 아직 발동하지 않았으면 발동으로 표시하고 `true`.
    pub fn check(&mut self, tz: Tz, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&tz);
        let today = local.date_naive();
        if local.time() < self.cutoff || self.fired_on == Some(today) {
            return false;
        }
        self.fired_on = Some(today);
        true
    }
}

/// 일일 손실 킬스위치.
///
/// 발동하면 그 현지 거래일 동안 신규 진입을 멈춥니다. 다음 날이 되면 자동으로
/// 해제됩니다.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    fired_on: Option<NaiveDate>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 실현 손익이 한도 이하인지 판단합니다.
    ///
    /// `stop_ratio`는 음수 비율(-0.03 = -3%)입니다. 0 이상이면 비활성입니다.
    pub fn breached(daily_pnl: Decimal, equity: Decimal, stop_ratio: Decimal) -> bool {
        if stop_ratio >= Decimal::ZERO || equity <= Decimal::ZERO {
            return false;
        }
        daily_pnl <= equity * stop_ratio
    }

    /// 오늘 이미 발동했는지 확인합니다.
    pub fn is_paused(&self, tz: Tz, now: DateTime<Utc>) -> bool {
        self.fired_on == Some(now.with_timezone(&tz).date_naive())
    }

    /// 오늘 발동으로 표시합니다. 이미 발동했으면 `false`.
    pub fn fire(&mut self, tz: Tz, now: DateTime<Utc>) -> bool {
        let today = now.with_timezone(&tz).date_naive();
        if self.fired_on == Some(today) {
            return false;
        }
        self.fired_on = Some(today);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Kyiv;
    use rust_decimal_macros::dec;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_entry_window() {
        let window = EntryWindow::new(hm(8, 0), hm(20, 0));
        assert!(window.contains(hm(8, 0)));
        assert!(window.contains(hm(20, 0)));
        assert!(!window.contains(hm(21, 0)));

        let overnight = EntryWindow::new(hm(23, 0), hm(2, 0));
        assert!(overnight.contains(hm(23, 30)));
        assert!(overnight.contains(hm(1, 0)));
        assert!(!overnight.contains(hm(12, 0)));

        // 05:00 UTC = 08:00 Kyiv (summer)
        let now = Utc.with_ymd_and_hms(2025, 8, 4, 5, 0, 0).unwrap();
        assert!(window.contains_at(Kyiv, now));
    }

    #[test]
    fn test_time_stop_fires_once_per_day() {
        let mut stop = TimeStop::new(hm(23, 0));
        // 19:59 UTC = 22:59 Kyiv
        assert!(!stop.check(Kyiv, Utc.with_ymd_and_hms(2025, 8, 4, 19, 59, 0).unwrap()));
        assert!(stop.check(Kyiv, Utc.with_ymd_and_hms(2025, 8, 4, 20, 0, 0).unwrap()));
        assert!(!stop.check(Kyiv, Utc.with_ymd_and_hms(2025, 8, 4, 20, 15, 0).unwrap()));
        assert!(stop.check(Kyiv, Utc.with_ymd_and_hms(2025, 8, 5, 20, 1, 0).unwrap()));
    }

    #[test]
    fn test_kill_switch_threshold() {
        // equity 1000, -3% => -30
        assert!(KillSwitch::breached(dec!(-30), dec!(1000), dec!(-0.03)));
        assert!(KillSwitch::breached(dec!(-45), dec!(1000), dec!(-0.03)));
        assert!(!KillSwitch::breached(dec!(-29.99), dec!(1000), dec!(-0.03)));
        assert!(!KillSwitch::breached(dec!(-100), dec!(1000), Decimal::ZERO));
    }

    #[test]
    fn test_kill_switch_pauses_local_day() {
        let mut switch = KillSwitch::new();
        let noon = Utc.with_ymd_and_hms(2025, 8, 4, 9, 0, 0).unwrap();
        assert!(!switch.is_paused(Kyiv, noon));

        assert!(switch.fire(Kyiv, noon));
        assert!(!switch.fire(Kyiv, noon));
        assert!(switch.is_paused(Kyiv, noon));

        // 21:30 UTC = 00:30 next day in Kyiv
        let next_day = Utc.with_ymd_and_hms(2025, 8, 4, 21, 30, 0).unwrap();
        assert!(!switch.is_paused(Kyiv, next_day));
    }
}
