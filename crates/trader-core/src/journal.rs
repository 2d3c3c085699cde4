//! 거래 저널.
//!
//! 청산된 거래를 기록하고 일일 손익을 집계합니다. 킬스위치는
//! [`Journal::daily_pnl`]의 실현 손익을 기준으로 판단합니다.
//!
//! 날짜는 거래일 기준입니다. 기록 시각(UTC)을 엔진 시간대로 변환한
//! 현지 달력 날짜로 묶으며, 킬스위치의 일시정지 날짜와 같은 기준을 씁니다.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::domain::Side;
use crate::error::{TraderError, TraderResult};

/// 청산된 거래 기록.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// 기록 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 심볼
    pub symbol: String,
    /// 포지션 방향
    pub side: Side,
    /// 진입가
    pub entry_price: Decimal,
    /// 청산가
    pub exit_price: Decimal,
    /// 수량
    pub quantity: Decimal,
    /// 실현 손익 (USDT)
    pub pnl: Decimal,
    /// 청산 사유
    pub reason: String,
}

/// 일일 거래 요약.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub total_pnl: Decimal,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// 승률 (퍼센트)
    pub win_rate: Decimal,
}

impl DailySummary {
    /// 거래 기록에서 요약을 계산합니다.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a TradeRecord>) -> Self {
        let mut summary = DailySummary::default();
        for record in records {
            summary.total_pnl += record.pnl;
            summary.total_trades += 1;
            if record.pnl > Decimal::ZERO {
                summary.winning_trades += 1;
            } else if record.pnl < Decimal::ZERO {
                summary.losing_trades += 1;
            }
        }
        if summary.total_trades > 0 {
            summary.win_rate = Decimal::from(summary.winning_trades) * Decimal::ONE_HUNDRED
                / Decimal::from(summary.total_trades);
        }
        summary
    }
}

/// 거래 저널 trait.
#[async_trait]
pub trait Journal: Send + Sync {
    /// 거래를 기록합니다.
    async fn append_trade(&self, record: TradeRecord) -> TraderResult<()>;

    /// `tz` 기준 거래일의 실현 손익 합계.
    async fn daily_pnl(&self, date: NaiveDate, tz: Tz) -> TraderResult<Decimal> {
        Ok(self.daily_summary(date, tz).await?.total_pnl)
    }

    /// `tz` 기준 거래일의 거래 요약.
    async fn daily_summary(&self, date: NaiveDate, tz: Tz) -> TraderResult<DailySummary>;
}

/// 기록이 `tz` 기준 `date` 거래일에 속하는지 여부.
fn on_trading_day(record: &TradeRecord, date: NaiveDate, tz: Tz) -> bool {
    record.timestamp.with_timezone(&tz).date_naive() == date
}

/// JSON Lines 파일 저널.
///
/// 거래 하나당 한 줄의 JSON 객체를 추가합니다. 파일과 상위 디렉토리는
/// 첫 기록 시 생성됩니다.
#[derive(Debug, Clone)]
pub struct JsonlJournal {
    path: PathBuf,
}

impl JsonlJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_day(&self, date: NaiveDate, tz: Tz) -> TraderResult<Vec<TradeRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TradeRecord>(line) {
                Ok(record) if on_trading_day(&record, date, tz) => records.push(record),
                Ok(_) => {}
                Err(e) => warn!(line = line_no + 1, error = %e, "Skipping malformed journal line"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl Journal for JsonlJournal {
    async fn append_trade(&self, record: TradeRecord) -> TraderResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!(symbol = %record.symbol, pnl = %record.pnl, reason = %record.reason, "Trade journaled");
        Ok(())
    }

    async fn daily_summary(&self, date: NaiveDate, tz: Tz) -> TraderResult<DailySummary> {
        let records = self.read_day(date, tz).await?;
        debug!(%date, trades = records.len(), "Journal day loaded");
        Ok(DailySummary::from_records(&records))
    }
}

/// 메모리 저널 (페이퍼 트레이딩, 테스트용).
#[derive(Debug, Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<TradeRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기록된 모든 거래.
    pub fn records(&self) -> Vec<TradeRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn append_trade(&self, record: TradeRecord) -> TraderResult<()> {
        self.records
            .lock()
            .map_err(|_| TraderError::Journal("journal lock poisoned".to_string()))?
            .push(record);
        Ok(())
    }

    async fn daily_summary(&self, date: NaiveDate, tz: Tz) -> TraderResult<DailySummary> {
        let records = self
            .records
            .lock()
            .map_err(|_| TraderError::Journal("journal lock poisoned".to_string()))?;
        Ok(DailySummary::from_records(
            records.iter().filter(|r| on_trading_day(r, date, tz)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn record(day: u32, pnl: Decimal) -> TradeRecord {
        TradeRecord {
            timestamp: Utc.with_ymd_and_hms(2025, 7, day, 12, 0, 0).unwrap(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            entry_price: dec!(60000),
            exit_price: dec!(60100),
            quantity: dec!(0.01),
            pnl,
            reason: "TP/SL".to_string(),
        }
    }

    #[test]
    fn test_summary_from_records() {
        let records = vec![record(28, dec!(10)), record(28, dec!(-4)), record(28, dec!(6))];
        let summary = DailySummary::from_records(&records);

        assert_eq!(summary.total_pnl, dec!(12));
        assert_eq!(summary.total_trades, 3);
        assert_eq!(summary.winning_trades, 2);
        assert_eq!(summary.losing_trades, 1);
        assert_eq!(summary.win_rate.round_dp(2), dec!(66.67));
    }

    #[tokio::test]
    async fn test_memory_journal_filters_by_date() {
        let journal = MemoryJournal::new();
        journal.append_trade(record(27, dec!(100))).await.unwrap();
        journal.append_trade(record(28, dec!(-400))).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 7, 28).unwrap();
        assert_eq!(journal.daily_pnl(date, Tz::UTC).await.unwrap(), dec!(-400));
    }

    #[tokio::test]
    async fn test_trading_day_follows_local_calendar() {
        let journal = MemoryJournal::new();
        let kyiv = chrono_tz::Europe::Kyiv;
        // 2025-08-04 22:00 UTC = 2025-08-05 01:00 Kyiv
        let mut late = record(28, dec!(-400));
        late.timestamp = Utc.with_ymd_and_hms(2025, 8, 4, 22, 0, 0).unwrap();
        journal.append_trade(late).await.unwrap();

        let aug4 = NaiveDate::from_ymd_opt(2025, 8, 4).unwrap();
        let aug5 = NaiveDate::from_ymd_opt(2025, 8, 5).unwrap();
        assert_eq!(journal.daily_pnl(aug4, kyiv).await.unwrap(), Decimal::ZERO);
        assert_eq!(journal.daily_pnl(aug5, kyiv).await.unwrap(), dec!(-400));
        assert_eq!(journal.daily_pnl(aug4, Tz::UTC).await.unwrap(), dec!(-400));
    }

    #[tokio::test]
    async fn test_jsonl_journal_round_trip() {
        let dir = std::env::temp_dir().join(format!("trader-journal-{}", uuid::Uuid::new_v4()));
        let journal = JsonlJournal::new(dir.join("nested").join("journal.jsonl"));
        let date = NaiveDate::from_ymd_opt(2025, 7, 28).unwrap();

        assert_eq!(journal.daily_pnl(date, Tz::UTC).await.unwrap(), Decimal::ZERO);

        journal.append_trade(record(28, dec!(15.5))).await.unwrap();
        journal.append_trade(record(28, dec!(-5.5))).await.unwrap();
        journal.append_trade(record(29, dec!(99))).await.unwrap();

        let summary = journal.daily_summary(date, Tz::UTC).await.unwrap();
        assert_eq!(summary.total_pnl, dec!(10));
        assert_eq!(summary.total_trades, 2);

        std::fs::remove_dir_all(&dir).ok();
    }
}
