//! Instance selection by tag, and autoscaling exclusion.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use nightshift_core::{InstanceId, InstanceRef, TagFilter};
use nightshift_provider::{AutoscalingMembership, InstanceInventory};

use crate::error::SchedulerResult;
use crate::types::InstanceSnapshot;

/// Translates a tag filter into the concrete instances of one region.
pub struct InstanceSelector {
    inventory: Arc<dyn InstanceInventory>,
    autoscaling: Arc<dyn AutoscalingMembership>,
}

impl InstanceSelector {
    pub fn new(
        inventory: Arc<dyn InstanceInventory>,
        autoscaling: Arc<dyn AutoscalingMembership>,
    ) -> Self {
        Self {
            inventory,
            autoscaling,
        }
    }

    /// Instances tagged exactly `tag_key=tag_value`.
    ///
    /// The filter is validated before any remote call. No match is an empty
    /// snapshot, not an error.
    pub async fn list_instances(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> SchedulerResult<InstanceSnapshot> {
        let filter = TagFilter::new(tag_key, tag_value)?;
        self.list_matching(filter).await
    }

    /// Same as [`list_instances`](Self::list_instances) for an already
    /// validated filter.
    pub async fn list_matching(&self, filter: TagFilter) -> SchedulerResult<InstanceSnapshot> {
        let mut instances = self.inventory.describe_instances(&filter).await?;

        let returned = instances.len();
        instances.retain(|i| filter.matches(&i.tags));
        if instances.len() != returned {
            debug!(
                %filter,
                returned,
                kept = instances.len(),
                "Dropped instances the inventory returned without the tag"
            );
        }

        instances.sort_by(|a, b| a.id.cmp(&b.id));
        instances.dedup_by(|a, b| a.id == b.id);

        debug!(%filter, count = instances.len(), "Listed tagged instances");
        Ok(InstanceSnapshot::new(filter, instances))
    }

    /// Ids among `instances` that belong to an autoscaling group.
    ///
    /// Membership reported inline by the inventory is trusted as is; the
    /// remaining ids are cross-checked against the autoscaling API. Records
    /// for ids that were not asked about are ignored.
    pub async fn list_managed_by_autoscaling(
        &self,
        instances: &[InstanceRef],
    ) -> SchedulerResult<BTreeSet<InstanceId>> {
        let mut managed: BTreeSet<InstanceId> = instances
            .iter()
            .filter(|i| i.is_autoscaling_managed())
            .map(|i| i.id.clone())
            .collect();

        let unknown: Vec<InstanceId> = instances
            .iter()
            .filter(|i| !managed.contains(&i.id))
            .map(|i| i.id.clone())
            .collect();

        if unknown.is_empty() {
            return Ok(managed);
        }

        let members = self.autoscaling.describe_auto_scaling_instances(&unknown).await?;
        for member in members {
            if unknown.contains(&member.instance_id) {
                debug!(
                    instance_id = %member.instance_id,
                    group = %member.group_name,
                    "Instance is autoscaling-managed"
                );
                managed.insert(member.instance_id);
            } else {
                warn!(
                    instance_id = %member.instance_id,
                    "Autoscaling API reported an instance that was not queried"
                );
            }
        }

        Ok(managed)
    }
}
