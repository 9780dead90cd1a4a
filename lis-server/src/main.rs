//! LIS服务器主程序

use clap::Parser;
use lis_core::{LisConfig, LisError, Result};
use lis_lab::{catalog, LabEngine, LogNotificationSender};
use lis_web::WebServer;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber;

/// LIS服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "lis-server")]
#[command(about = "LIS (Laboratory Information System) 检验医嘱与危急值报警服务器")]
struct Args {
    /// 监听地址，缺省取配置文件
    #[arg(long)]
    host: Option<String>,

    /// 监听端口，缺省取配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("启动LIS服务器...");

    let config = LisConfig::load(args.config.as_deref())?;
    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    info!("LIS服务器配置:");
    info!("  监听地址: {}:{}", host, port);
    info!("  报警最大重试: {}", config.dispatch.max_attempts);
    info!("  统计时区偏移: {} 分钟", config.stats.utc_offset_minutes);

    let engine = Arc::new(LabEngine::new(&config, Arc::new(LogNotificationSender)));

    // 载入检验目录: 配置指定的JSON文件，或内置种子
    let entries = match &config.catalog_file {
        Some(path) => {
            info!("  目录文件: {}", path);
            let json = std::fs::read_to_string(path)?;
            catalog::entries_from_json(&json)?
        }
        None => catalog::default_entries(),
    };
    engine.seed_catalog(entries).await?;

    engine.start_workers();

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| LisError::Validation(format!("非法监听地址: {}", e)))?;

    let server = WebServer::new(addr, engine);
    if let Err(e) = server.run().await {
        error!("服务器启动失败: {}", e);
        return Err(e);
    }

    Ok(())
}
