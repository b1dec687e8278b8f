//! Periodic self-ping
//!
//! Hosting platforms that idle out quiet services can be kept awake by
//! fetching our own `/keep-alive` endpoint on an interval.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Request timeout for a single ping
const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawn the ping loop. It stops once `shutdown` flips to `true` or its
/// sender is dropped.
pub fn spawn_keepalive(
    url: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(PING_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Failed to build keep-alive client, self-ping disabled");
                return;
            }
        };

        info!(url = %url, interval_secs = interval.as_secs(), "Keep-alive started");

        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; the server is awake right now.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => ping(&client, &url).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Keep-alive stopped");
    })
}

async fn ping(client: &reqwest::Client, url: &str) {
    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(url = %url, status = %response.status(), "Keep-alive ping ok");
        }
        Ok(response) => {
            warn!(url = %url, status = %response.status(), "Keep-alive ping returned an error status");
        }
        Err(e) => {
            debug!(url = %url, error = %e, "Keep-alive ping failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let handle = spawn_keepalive(
            "http://127.0.0.1:9/keep-alive".to_string(),
            Duration::from_secs(3600),
            rx,
        );

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("keep-alive did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        let handle = spawn_keepalive(
            "http://127.0.0.1:9/keep-alive".to_string(),
            Duration::from_secs(3600),
            rx,
        );

        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("keep-alive did not stop")
            .unwrap();
    }
}
