use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::{info, warn};

use crate::repo::Repo;
use crate::storage::ImageStore;

pub const GRACE_PERIOD_HOURS: i64 = 24;

/// Counts reported by one sweep. Per-item failures are logged, never
/// propagated; the next scheduled run re-selects whatever was missed.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepSummary {
    pub lapsed: u64,
    pub deleted: u64,
    pub images_deleted: u64,
    pub image_failures: u64,
}

/// Scheduled reclamation of expired listings. Runs under a service
/// identity: it is handed repository and object-store handles directly at
/// construction and bypasses the per-request role guard.
///
/// The sweep is idempotent and safe to overlap: lapsing flips only
/// `active` rows past expiry, reclamation deletes only `expired` rows past
/// the grace window, and re-deleting an absent row is a no-op.
pub struct ExpiryReclaimer {
    repo: Arc<dyn Repo>,
    images: Arc<dyn ImageStore>,
    grace: Duration,
}

impl ExpiryReclaimer {
    pub fn new(repo: Arc<dyn Repo>, images: Arc<dyn ImageStore>) -> Self {
        Self {
            repo,
            images,
            grace: Duration::hours(GRACE_PERIOD_HOURS),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub async fn run(&self) -> SweepSummary {
        self.run_at(Utc::now()).await
    }

    /// One full sweep at `now`. The lapse phase completes before the
    /// reclamation phase reads expired rows; the grace cutoff additionally
    /// keeps just-lapsed listings out of the same pass.
    pub async fn run_at(&self, now: DateTime<Utc>) -> SweepSummary {
        let mut summary = SweepSummary::default();

        // Phase 1: flip active listings past expiry to expired.
        match self.repo.lapse_listings(now).await {
            Ok(ids) => {
                summary.lapsed = ids.len() as u64;
                for id in &ids {
                    info!(listing_id = %id, "listing lapsed");
                }
            }
            Err(e) => {
                warn!("lapse sweep failed: {e}");
            }
        }

        // Phase 2: expired listings past the grace window lose their
        // images, then the record itself.
        let cutoff = now - self.grace;
        let reclaimable = match self.repo.reclaimable_listings(cutoff).await {
            Ok(v) => v,
            Err(e) => {
                warn!("reclamation select failed: {e}");
                Vec::new()
            }
        };
        for listing in reclaimable {
            for url in &listing.images {
                // Best-effort: one unreachable object must not wedge the
                // rest of the listing or the sweep.
                let Some(path) = self.images.path_for_url(url) else {
                    warn!(listing_id = %listing.id, url, "unrecognized image url, skipping");
                    summary.image_failures += 1;
                    continue;
                };
                match self.images.delete(&path).await {
                    Ok(()) => summary.images_deleted += 1,
                    Err(e) => {
                        warn!(listing_id = %listing.id, path, "image delete failed: {e}");
                        summary.image_failures += 1;
                    }
                }
            }
            match self.repo.delete_listing(listing.id).await {
                Ok(true) => {
                    summary.deleted += 1;
                    info!(listing_id = %listing.id, title = %listing.title, "listing reclaimed");
                }
                Ok(false) => {} // already gone (overlapping run)
                Err(e) => {
                    warn!(listing_id = %listing.id, "listing delete failed: {e}");
                }
            }
        }

        counter!("reclaimer_listings_lapsed_total", summary.lapsed);
        counter!("reclaimer_listings_deleted_total", summary.deleted);
        counter!("reclaimer_images_deleted_total", summary.images_deleted);
        counter!("reclaimer_image_failures_total", summary.image_failures);
        info!(
            lapsed = summary.lapsed,
            deleted = summary.deleted,
            images_deleted = summary.images_deleted,
            image_failures = summary.image_failures,
            "reclaimer sweep finished"
        );
        summary
    }

    /// Run the sweep on a fixed interval until the task is dropped.
    pub fn spawn(self: Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run().await;
            }
        })
    }
}
