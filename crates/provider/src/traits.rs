//! Collaborator contracts the scheduler consumes.
//!
//! Each trait is one narrow slice of a provider API. Implementations
//! translate every SDK failure into [`ProviderError`] before returning, so
//! callers only ever see the transient/permanent split.

use async_trait::async_trait;

use nightshift_core::{AutoscalingMember, InstanceId, InstanceRef, ProviderError, TagFilter, WatchedAlarm};

/// Compute inventory query.
#[async_trait]
pub trait InstanceInventory: Send + Sync {
    /// Instances carrying the filter's tag. Providers without server-side tag
    /// filtering may return a superset; callers re-check the tag.
    async fn describe_instances(&self, filter: &TagFilter) -> Result<Vec<InstanceRef>, ProviderError>;
}

/// Compute power control. Both calls return once the request is accepted;
/// state convergence is not awaited.
#[async_trait]
pub trait PowerControl: Send + Sync {
    async fn stop_instances(&self, ids: &[InstanceId]) -> Result<(), ProviderError>;

    async fn start_instances(&self, ids: &[InstanceId]) -> Result<(), ProviderError>;
}

/// Autoscaling membership query.
#[async_trait]
pub trait AutoscalingMembership: Send + Sync {
    /// Membership records for those of `ids` that belong to a group.
    /// Ids outside any group are simply absent from the result.
    async fn describe_auto_scaling_instances(
        &self,
        ids: &[InstanceId],
    ) -> Result<Vec<AutoscalingMember>, ProviderError>;
}

/// Per-instance result of a batched alarm lookup, in request order.
pub type AlarmLookup = Vec<(InstanceId, Result<Vec<WatchedAlarm>, ProviderError>)>;

/// Alarm discovery by instance dimension.
#[async_trait]
pub trait AlarmDiscovery: Send + Sync {
    async fn describe_alarms_for_instance(
        &self,
        instance_id: &str,
    ) -> Result<Vec<WatchedAlarm>, ProviderError>;

    /// Alarms for several instances. One entry per id, in order.
    ///
    /// The default asks per instance. Providers whose alarm listing cannot
    /// be filtered server-side override this to list once per batch.
    async fn describe_alarms_for_instances(&self, instance_ids: &[InstanceId]) -> AlarmLookup {
        let mut lookup = Vec::with_capacity(instance_ids.len());
        for id in instance_ids {
            let result = self.describe_alarms_for_instance(id).await;
            lookup.push((id.clone(), result));
        }
        lookup
    }
}

/// Alarm action toggling.
#[async_trait]
pub trait AlarmMutation: Send + Sync {
    async fn disable_alarm_actions(&self, alarm_names: &[String]) -> Result<(), ProviderError>;

    async fn enable_alarm_actions(&self, alarm_names: &[String]) -> Result<(), ProviderError>;
}

/// A single provider backend that covers every collaborator contract.
pub trait CloudProvider:
    InstanceInventory + PowerControl + AutoscalingMembership + AlarmDiscovery + AlarmMutation
{
    /// Short backend name for logs ("aws", "memory").
    fn provider_name(&self) -> &str;
}
