use chrono::{DateTime, Duration, Utc};
use shared::types::{DiscoveryRecord, ServiceCategory};
use crate::self_filter::LocalAddresses;

/// What a merged sighting did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Added,
    Refreshed,
    Removed,
    /// Self sighting, deregistration of an unknown entry, or wrong category
    Ignored,
}

impl MergeOutcome {
    /// Only additions and removals are visible to subscribers.
    pub fn changed(self) -> bool {
        matches!(self, MergeOutcome::Added | MergeOutcome::Removed)
    }
}

/// Ordered, duplicate-free list of the live entries of one category.
#[derive(Debug)]
pub struct CategoryStore {
    category: ServiceCategory,
    records: Vec<DiscoveryRecord>,
}

impl CategoryStore {
    pub fn new(category: ServiceCategory) -> Self {
        Self {
            category,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[DiscoveryRecord] {
        &self.records
    }

    pub fn snapshot(&self) -> Vec<DiscoveryRecord> {
        self.records.clone()
    }

    /// Drop every entry whose deadline has passed. Returns true when at least
    /// one entry was removed.
    pub fn clean_up(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.records.len();

        self.records.retain(|record| {
            if record.expired_at(now) {
                tracing::warn!(
                    "Removing not responding {} at {}:{} ({})",
                    record.name(),
                    record.address,
                    record.port,
                    record.host_name
                );
                false
            } else {
                true
            }
        });

        self.records.len() != before
    }

    /// Apply one sighting.
    ///
    /// Sightings of the host itself are discarded before anything else. A
    /// repeated sighting only pushes the entry's deadline forward.
    pub fn merge(
        &mut self,
        mut incoming: DiscoveryRecord,
        local: &dyn LocalAddresses,
        ttl_window: Duration,
        now: DateTime<Utc>,
    ) -> MergeOutcome {
        if incoming.category != self.category {
            return MergeOutcome::Ignored;
        }

        if local.is_local(&incoming.address) {
            tracing::trace!("Ignoring self sighting at {}:{}", incoming.address, incoming.port);
            return MergeOutcome::Ignored;
        }

        if incoming.exists {
            if let Some(existing) = self.records.iter_mut().find(|r| **r == incoming) {
                existing.reset_ttl_at(now, ttl_window);
                tracing::debug!("Refreshed {} at {}:{}", existing.name(), existing.address, existing.port);
                return MergeOutcome::Refreshed;
            }

            incoming.reset_ttl_at(now, ttl_window);
            tracing::info!(
                "Found {} at {}:{} ({})",
                incoming.name(),
                incoming.address,
                incoming.port,
                incoming.host_name
            );
            self.records.push(incoming);
            MergeOutcome::Added
        } else {
            let before = self.records.len();
            self.records.retain(|r| *r != incoming);

            if self.records.len() == before {
                return MergeOutcome::Ignored;
            }

            tracing::info!(
                "Deregistered {} at {}:{} ({})",
                incoming.name(),
                incoming.address,
                incoming.port,
                incoming.host_name
            );
            MergeOutcome::Removed
        }
    }
}
