use actix::prelude::*;
use actix_web::{middleware::Logger, web, App, HttpServer};

use storeproxy::admission::limiter::RateLimiterActor;
use storeproxy::admission::AdmissionControl;
use storeproxy::cli;
use storeproxy::server::{self, AppState};
use storeproxy::storage;
use storeproxy::utils::logger::init_logger;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // 解析参数和配置
    let (args, config) = match cli::Args::parse_args() {
        Ok((args, config)) => (args, config),
        Err(e) => {
            eprintln!("参数解析失败: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logger(args.log_level, config.server.log_file.as_deref())?;
    log::info!(
        "storeproxy {} 启动 (构建于 {})",
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_BUILD_TIMESTAMP")
    );
    log::info!("配置文件路径: {}", args.config);
    log::info!("{}", config.get_summary());

    let store = storage::from_settings(&config.storage)?;
    let state = web::Data::new(AppState::from_config(&config, store));

    // 限流状态在整个进程内只有一份，所有 worker 共用同一个 Actor
    let limiter = RateLimiterActor::from_settings(&config.rate_limit).start();
    let admission = web::Data::new(AdmissionControl::from_config(limiter, &config));

    let body_limit = config.server.body_limit_bytes;
    let addr = (config.server.bind.clone(), config.server.port);
    log::info!("监听 {}:{}", addr.0, addr.1);

    HttpServer::new(move || {
        let state = state.clone();
        let admission = admission.clone();
        App::new()
            .wrap(Logger::default())
            .configure(|cfg| server::configure(cfg, state, admission, body_limit))
    })
    .workers(config.server.workers)
    .bind(addr)?
    .run()
    .await?;

    log::info!("服务已停止");
    Ok(())
}
