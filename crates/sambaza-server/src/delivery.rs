use crate::api::campaigns::refresh_campaign_counters;
use crate::state::AppState;
use tokio::time::{interval, Duration};

/// Periodic delivery tracker for campaigns in `sending`.
///
/// Every tick the counters are recomputed from message rows and written
/// back wholesale. The delivery-report callback does the same on arrival;
/// the two paths are not coordinated and the later write wins, matching
/// the observed behavior of the console this replaces.
pub struct DeliveryTracker {
    state: AppState,
    tick_secs: u64,
}

impl DeliveryTracker {
    pub fn new(state: AppState, tick_secs: u64) -> Self {
        Self { state, tick_secs }
    }

    pub async fn run(&self) {
        tracing::info!(tick_secs = self.tick_secs, "Delivery tracker started");
        let mut tick = interval(Duration::from_secs(self.tick_secs));
        loop {
            tick.tick().await;
            if let Err(e) = self.refresh_sending_campaigns().await {
                tracing::error!(error = %e, "Delivery tracking cycle failed");
            }
        }
    }

    async fn refresh_sending_campaigns(&self) -> anyhow::Result<()> {
        let campaigns = self.state.store.list_campaigns_by_status("sending").await?;
        if campaigns.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = campaigns.len(), "Refreshing sending campaigns");
        for campaign in campaigns {
            refresh_campaign_counters(&self.state, &campaign.id, &campaign.user_id).await;
        }
        Ok(())
    }
}
