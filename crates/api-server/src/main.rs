use std::net::SocketAddr;
use std::sync::Arc;

use shared::agent::ResponseAgent;
use shared::config::ApiConfig;
use shared::llm::{OpenRouterGateway, OpenRouterGatewayConfig};
use shared::push::{HttpPushTransport, PushDispatcher};
use shared::repos::Store;
use shared::turn::TurnOrchestrator;
use tracing::{error, info};

mod http;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "api_server=debug,shared=debug,axum=info".to_string()),
        )
        .init();

    let config = match ApiConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };

    let store = match Store::connect(&config.database_url, config.database_max_connections).await {
        Ok(store) => store,
        Err(err) => {
            error!("failed to connect to postgres: {err}");
            std::process::exit(1);
        }
    };

    let migrator = match sqlx::migrate::Migrator::new(config.migrations_dir.clone()).await {
        Ok(migrator) => migrator,
        Err(err) => {
            error!("failed to load migrations: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = migrator.run(store.pool()).await {
        error!("failed to run migrations: {err}");
        std::process::exit(1);
    }

    let gateway_config = match OpenRouterGatewayConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read llm gateway config: {err}");
            std::process::exit(1);
        }
    };

    let gateway = match OpenRouterGateway::new(gateway_config) {
        Ok(gateway) => gateway,
        Err(err) => {
            error!("failed to build llm gateway: {err}");
            std::process::exit(1);
        }
    };

    let push = PushDispatcher::new(Arc::new(HttpPushTransport::new(
        config.push_endpoint.clone(),
        config.push_auth_token.clone(),
    )));

    let orchestrator = TurnOrchestrator::new(
        Arc::new(store.clone()),
        ResponseAgent::new(Arc::new(gateway)),
        push,
    );

    let app = http::build_router(http::AppState {
        store,
        orchestrator,
        session_ttl_seconds: config.session_ttl_seconds,
    });

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .unwrap_or_else(|_| "127.0.0.1:8080".parse().expect("valid default bind addr"));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind should succeed");

    info!(
        "api server listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    axum::serve(listener, app).await.expect("server should run");
}
