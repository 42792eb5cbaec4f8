//! Time-based expiry of shares.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backend::ShareBackend;
use crate::store::{ListedShare, ShareStore};
use crate::Result;

/// What a sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Ids removed because they were past their expiry.
    pub expired: Vec<String>,
    /// Ids removed because their manifest was missing or unreadable.
    pub corrupt: Vec<String>,
}

impl PruneReport {
    pub fn count(&self) -> usize {
        self.expired.len() + self.corrupt.len()
    }
}

/// Delete every share that is corrupt or expired at `now` (strictly after
/// `expires_at`). Running it again with the same `now` removes nothing.
pub fn sweep<B: ShareBackend>(store: &ShareStore<B>, now: DateTime<Utc>) -> Result<PruneReport> {
    let mut report = PruneReport::default();

    for listed in store.list()? {
        let (id, bucket) = match listed {
            ListedShare::Broken { id, reason } => {
                debug!(share_id = %id, %reason, "Pruning broken share");
                (id, &mut report.corrupt)
            }
            ListedShare::Valid(record) if record.is_expired(now) => {
                debug!(share_id = %record.id, "Pruning expired share");
                (record.id, &mut report.expired)
            }
            ListedShare::Valid(_) => continue,
        };

        // Another actor may have removed it since listing.
        match store.backend().remove(&id) {
            Ok(true) => bucket.push(id),
            Ok(false) => debug!(share_id = %id, "Share already gone"),
            Err(e) => warn!(share_id = %id, error = %e, "Failed to remove share"),
        }
    }

    info!(removed = report.count(), "Prune finished");
    Ok(report)
}
