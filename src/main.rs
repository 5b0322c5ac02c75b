use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter

use marketplace_booking::{
    AppServices,
    config::Config,
    database::{create_pool, run_migrations},
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    swagger::swagger_config,
    tasks,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Failed to load configuration")?;

    // 创建数据库连接池
    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database connection pool")?;

    // 运行数据库迁移
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let jwt_service = JwtService::new(&config.jwt.secret, config.jwt.access_token_expires_in);
    let services = AppServices::build(pool, &config.payment);

    tasks::spawn_all(
        config.tasks.clone(),
        services.job_queue.clone(),
        services.notification_service.clone(),
        services.points_service.clone(),
    );

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .configure(|cfg| services.configure(cfg))
            .configure(swagger_config)
            .configure(handlers::webhook_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::booking_config)
                    .configure(handlers::catalog_config)
                    .configure(handlers::coupon_config)
                    .configure(handlers::points_config)
                    .configure(handlers::wallet_config)
                    .configure(handlers::admin_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;
    Ok(())
}
