// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storefront_server::api::router;
use storefront_server::auth::{Authenticator, RoleName};
use storefront_server::config::{LogFormat, Settings, DEFAULT_LOG_FILTER};
use storefront_server::state::AppState;
use storefront_server::storage::AuthDatabase;
use storefront_server::token_pruner::TokenPruner;

#[tokio::main]
async fn main() {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    init_tracing(settings.log_format);

    if let Err(e) = run(settings).await {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = settings.database_path();
    let db = Arc::new(AuthDatabase::open(&db_path)?);
    info!(path = %db_path.display(), "Auth database opened");

    // Explicit wiring: one database backs all three collaborators
    let authenticator = Authenticator::new(db.clone(), db.clone(), db)
        .with_policy(settings.token_policy)
        .with_password_cost(settings.bcrypt_cost)
        .with_storage_timeout(settings.storage_timeout);

    authenticator.seed_roles().await?;
    if let Some(admin) = &settings.seed_admin {
        authenticator
            .seed_user(&admin.name, &admin.email, &admin.password, RoleName::Admin)
            .await?;
    }

    let state = AppState::new(authenticator);
    let shutdown = CancellationToken::new();

    let pruner = settings.prune_interval.map(|interval| {
        let pruner = TokenPruner::new(state.authenticator.clone()).with_interval(interval);
        tokio::spawn(pruner.run(shutdown.clone()))
    });
    if pruner.is_none() {
        info!("Token pruner disabled");
    }

    let addr = settings.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Storefront auth server listening (docs at /docs)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = pruner {
        let _ = handle.await;
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
