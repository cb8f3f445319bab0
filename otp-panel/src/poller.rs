use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use otp_client::OtpApi;

use crate::dashboard::Dashboard;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Background task calling [`Dashboard::refresh_all`] on a fixed interval.
///
/// The first refresh happens immediately. Dropping the poller stops it.
pub struct Poller {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn spawn<A: OtpApi>(dashboard: Dashboard<A>, every: Duration) -> Self {
        let cancel = CancellationToken::new();
        let cancel_for_loop = cancel.clone();
        let handle = tokio::spawn(async move {
            run_refresh_loop(dashboard, every, cancel_for_loop).await;
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_refresh_loop<A: OtpApi>(
    dashboard: Dashboard<A>,
    every: Duration,
    cancel: CancellationToken,
) {
    info!(interval_secs = every.as_secs(), "Refresh loop started");

    let mut interval = tokio::time::interval(every);
    // No catch-up bursts after a slow refresh.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Refresh loop shutting down");
                break;
            }
            _ = interval.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Refresh loop shutting down");
                        break;
                    }
                    result = dashboard.refresh_all() => {
                        if let Err(e) = result {
                            warn!(error = %e, "Periodic refresh failed");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use otp_client::MockApi;

    use super::*;
    use crate::state::Tab;

    #[tokio::test(start_paused = true)]
    async fn refreshes_immediately_then_every_interval() {
        let api = MockApi::with_demo_data();
        let dashboard = Dashboard::new(api.clone(), Tab::Devices);
        let poller = Poller::spawn(dashboard.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        // Ticks at 0s, 5s and 10s.
        assert_eq!(api.request_count(), 3);
        assert!(poller.is_running());
        assert_eq!(dashboard.snapshot().await.devices.items().len(), 2);

        poller.shutdown().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_poller_stops_refreshing() {
        let api = MockApi::new();
        let dashboard = Dashboard::new(api.clone(), Tab::Devices);
        let poller = Poller::spawn(dashboard, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let seen = api.request_count();
        assert_eq!(seen, 1);

        drop(poller);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.request_count(), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_loop() {
        let api = MockApi::new();
        api.set_offline(true);
        let dashboard = Dashboard::new(api.clone(), Tab::Devices);
        let poller = Poller::spawn(dashboard.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(api.request_count(), 2);
        assert!(dashboard.snapshot().await.devices.error().is_some());

        api.set_offline(false);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(dashboard.snapshot().await.devices.error().is_none());

        poller.shutdown().await;
    }
}
