// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expired Token Pruner
//!
//! Background task that periodically deletes token rows whose `expires_at`
//! has passed. Expired rows are already rejected at validation time; the
//! sweep only keeps the token table from growing without bound.
//!
//! A failed sweep is logged and retried at the next interval.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;

/// Default interval between sweeps.
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

pub struct TokenPruner {
    authenticator: Arc<Authenticator>,
    interval: Duration,
}

impl TokenPruner {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self {
            authenticator,
            interval: DEFAULT_PRUNE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(pruner.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Token pruner starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Token pruner shutting down");
                return;
            }

            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Token pruner shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep. Returns the number of rows removed.
    pub async fn sweep(&self) -> u64 {
        match self.authenticator.prune_expired_tokens().await {
            Ok(0) => {
                debug!("Token pruner: nothing to remove");
                0
            }
            Ok(removed) => {
                info!(removed, "Token pruner: removed expired tokens");
                removed
            }
            Err(e) => {
                warn!(error = %e, "Token pruner: sweep failed");
                0
            }
        }
    }
}
