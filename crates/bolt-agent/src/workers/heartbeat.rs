//! Heartbeat — periodic keep_alive pings so the inference server never
//! unloads the always-on models mid-session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::provider::ModelHost;

/// 4.5 minutes — under the server's default 5 minute keep_alive.
const HEARTBEAT_INTERVAL_SECS: u64 = 270;

pub struct Heartbeat {
    host: Arc<dyn ModelHost>,
    models: Vec<String>,
}

impl Heartbeat {
    /// `models` is typically the router + companion pair.
    pub fn new(host: Arc<dyn ModelHost>, models: Vec<String>) -> Self {
        Self { host, models }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => self.pulse().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("heartbeat shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn pulse(&self) {
        for model in &self.models {
            debug!(model, "keep-alive ping");
            self.host.keep_alive(model).await;
        }
    }
}
