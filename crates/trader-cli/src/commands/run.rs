//! 플랜 실행 명령.
//!
//! 설정과 플랜을 로드하고, 거래소 커넥터/게이트웨이/리스크 관리자/알림/저널을
//! 조립한 뒤 시작 점검을 통과하면 Ctrl+C까지 엔진 루프를 실행합니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use tracing::{info, warn};
use trader_core::{load_section, AppConfig, ExchangeConfig, JsonlJournal, TradingPlan};
use trader_exchange::{
    BinanceFuturesClient, BinanceFuturesConfig, ExchangeGateway, FuturesExchange, SimulatedExchange,
};
use trader_execution::Engine;
use trader_notification::{LogSender, NotificationManager, TelegramSender};
use trader_risk::{RiskConfig, RiskManager};

/// 실행 옵션.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// 플랜 JSON 경로
    pub plan_path: PathBuf,
    /// 설정 파일 경로 (없으면 기본값 + 환경 변수)
    pub config_path: Option<PathBuf>,
    /// 모의투자 모드
    pub paper: bool,
    /// 모의투자 초기 잔고
    pub paper_balance: Decimal,
}

/// 설정 파일이 있으면 파일 + 환경 변수, 없으면 환경 변수만으로 로드합니다.
pub fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::from_env().context("Failed to load config from environment")?,
    };
    Ok(config)
}

/// `[risk]` 섹션을 로드합니다.
pub fn load_risk_config(path: Option<&Path>) -> Result<RiskConfig> {
    load_section(path, "risk").context("Failed to load [risk] section")
}

/// 테스트넷 여부. `BINANCE_TESTNET` 환경 변수가 설정 파일보다 우선합니다.
fn resolve_testnet(config: &ExchangeConfig) -> bool {
    std::env::var("BINANCE_TESTNET")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(config.testnet)
}

/// 거래소 커넥터를 생성합니다.
///
/// 모의투자는 공개 시장 데이터만 Binance에서 가져오고 주문과 포지션은
/// 시뮬레이션합니다.
fn build_exchange(config: &ExchangeConfig, options: &RunOptions) -> Result<Arc<dyn FuturesExchange>> {
    let testnet = resolve_testnet(config);

    if options.paper {
        let public = BinanceFuturesConfig::public_only(testnet)
            .with_timeouts(config.timeout_secs, config.recv_window_ms);
        let market = BinanceFuturesClient::new(public)?;
        info!(balance = %options.paper_balance, testnet, "Paper trading on live market data");
        let simulated =
            SimulatedExchange::with_balance(options.paper_balance).with_market_source(Arc::new(market));
        return Ok(Arc::new(simulated));
    }

    let credentials = BinanceFuturesConfig::from_env(Some(testnet))
        .ok_or_else(|| {
            anyhow!(
                "Binance API credentials missing (set BINANCE_API_KEY / BINANCE_API_SECRET{})",
                if testnet { " or the BINANCE_TESTNET_* pair" } else { "" }
            )
        })?
        .with_timeouts(config.timeout_secs, config.recv_window_ms);
    info!(testnet, "Live trading");
    Ok(Arc::new(BinanceFuturesClient::new(credentials)?))
}

fn build_notifier(config: &AppConfig) -> NotificationManager {
    let mut notifier = NotificationManager::new();
    notifier.add_sender(LogSender);

    if config.notifications.telegram.enabled {
        match TelegramSender::from_env() {
            Some(sender) => notifier.add_sender(sender),
            None => warn!("Telegram enabled but TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set"),
        }
    }

    info!(senders = ?notifier.sender_names(), "Notification channels ready");
    notifier
}

/// 엔진을 조립하고 종료 신호까지 실행합니다.
pub async fn run_engine(options: RunOptions) -> Result<()> {
    let app = load_app_config(options.config_path.as_deref())?;
    let risk_config = load_risk_config(options.config_path.as_deref())?;

    let plan = TradingPlan::load(&options.plan_path)
        .with_context(|| format!("Failed to load plan {}", options.plan_path.display()))?;
    info!(
        plan_date = %plan.plan_date,
        version = %plan.plan_version,
        assets = plan.active_assets.len(),
        phases = plan.trade_phases.len(),
        "Plan loaded"
    );

    let exchange = build_exchange(&app.exchange, &options)?;
    let gateway = Arc::new(ExchangeGateway::from_config(exchange, &app.exchange));
    let risk = Arc::new(RiskManager::new(
        gateway,
        Arc::new(plan),
        risk_config,
        app.engine.quote_asset.clone(),
    ));

    let journal = Arc::new(JsonlJournal::new(&app.journal.path));
    let notifier = build_notifier(&app);

    let mut engine = Engine::new(app.engine.clone(), risk, notifier, journal)?;
    engine.startup_checks().await?;

    engine
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
