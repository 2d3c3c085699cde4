//! 트레이딩 플랜 실행 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 플랜 사전 점검 (거래소 연결 없음)
//! trader check-plan -p plans/sample_plan.json
//! trader check-plan -p plans/sample_plan.json --json
//!
//! # 모의투자 (실시간 시세 + 시뮬레이션 체결)
//! trader run -p plans/sample_plan.json -c config/default.toml --paper
//!
//! # 실거래 (BINANCE_API_KEY / BINANCE_API_SECRET 필요)
//! trader run -p plans/sample_plan.json -c config/default.toml
//!
//! # 유효 설정 확인
//! trader config -c config/default.toml
//! ```

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{error, info};
use trader_core::{init_logging, EngineConfig, LogConfig};

mod commands;

use commands::check_plan::check_plan;
use commands::config::show_config;
use commands::run::{load_app_config, load_risk_config, run_engine, RunOptions};

#[derive(Parser)]
#[command(name = "trader")]
#[command(about = "Trading plan engine - Binance USDⓈ-M futures", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 트레이딩 플랜 실행
    Run {
        /// 플랜 JSON 파일
        #[arg(short, long)]
        plan: PathBuf,

        /// 설정 파일 (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// 모의투자 모드 (주문은 시뮬레이션, 시세는 거래소)
        #[arg(long, default_value = "false")]
        paper: bool,

        /// 모의투자 초기 잔고
        #[arg(long, default_value = "10000")]
        paper_balance: Decimal,
    },

    /// 플랜 파일 점검 (거래소 연결 없음)
    CheckPlan {
        /// 플랜 JSON 파일
        #[arg(short, long)]
        plan: PathBuf,

        /// 설정 파일 (TOML, 시간대와 리스크 설정에 사용)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// 결과를 JSON으로 출력
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// 유효 설정 출력
    Config {
        /// 설정 파일 (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn setup_logging(config: LogConfig) -> Result<()> {
    init_logging(config).map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env가 없어도 계속 진행
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            plan,
            config,
            paper,
            paper_balance,
        } => {
            let app = load_app_config(config.as_deref())?;
            setup_logging(LogConfig::from_settings(&app.logging))?;
            info!(plan = %plan.display(), paper, "Starting trading engine");

            let options = RunOptions {
                plan_path: plan,
                config_path: config,
                paper,
                paper_balance,
            };
            if let Err(e) = run_engine(options).await {
                error!("Engine failed: {:#}", e);
                return Err(e);
            }
        }

        Commands::CheckPlan { plan, config, json } => {
            setup_logging(LogConfig::from_env())?;
            let engine: EngineConfig = load_app_config(config.as_deref())?.engine;
            let risk = load_risk_config(config.as_deref())?;

            let report = check_plan(&plan, &engine, &risk)?;
            if json {
                println!("{}", report.to_json()?);
            } else {
                println!("{}", report.render());
                println!("Plan OK");
            }
        }

        Commands::Config { config } => {
            setup_logging(LogConfig::from_env())?;
            println!("{}", show_config(config.as_deref())?);
        }
    }

    Ok(())
}
