//! In-memory provider backend.
//!
//! Holds a seeded inventory of instances, autoscaling groups and alarms for
//! one region, applies power actions immediately (stop ⇒ `stopped`, start ⇒
//! `running`) and records every call so callers can assert on call order.
//! Faults can be injected per operation, optionally scoped to one subject
//! (instance id or alarm name).

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use nightshift_core::{
    AutoscalingMember, InstanceId, InstanceRef, InstanceState, PowerAction, ProviderError, TagFilter,
    WatchedAlarm, AUTOSCALING_GROUP_TAG,
};

use crate::traits::{
    AlarmDiscovery, AlarmMutation, AutoscalingMembership, CloudProvider, InstanceInventory,
    PowerControl,
};

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudCall {
    DescribeInstances { key: String, value: String },
    StopInstances(Vec<InstanceId>),
    StartInstances(Vec<InstanceId>),
    DescribeAutoScalingInstances(Vec<InstanceId>),
    DescribeAlarms(InstanceId),
    DisableAlarmActions(Vec<String>),
    EnableAlarmActions(Vec<String>),
}

impl CloudCall {
    /// Provider operation name, as used in [`ProviderError`].
    pub fn operation(&self) -> &'static str {
        match self {
            CloudCall::DescribeInstances { .. } => "DescribeInstances",
            CloudCall::StopInstances(_) => "StopInstances",
            CloudCall::StartInstances(_) => "StartInstances",
            CloudCall::DescribeAutoScalingInstances(_) => "DescribeAutoScalingInstances",
            CloudCall::DescribeAlarms(_) => "DescribeAlarms",
            CloudCall::DisableAlarmActions(_) => "DisableAlarmActions",
            CloudCall::EnableAlarmActions(_) => "EnableAlarmActions",
        }
    }

    /// True for calls that change provider state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            CloudCall::StopInstances(_)
                | CloudCall::StartInstances(_)
                | CloudCall::DisableAlarmActions(_)
                | CloudCall::EnableAlarmActions(_)
        )
    }

    /// Instance ids or alarm names the call is about.
    pub fn subjects(&self) -> Vec<&str> {
        match self {
            CloudCall::DescribeInstances { .. } => Vec::new(),
            CloudCall::DescribeAlarms(id) => vec![id.as_str()],
            CloudCall::StopInstances(items)
            | CloudCall::StartInstances(items)
            | CloudCall::DescribeAutoScalingInstances(items)
            | CloudCall::DisableAlarmActions(items)
            | CloudCall::EnableAlarmActions(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct Fault {
    operation: &'static str,
    subject: Option<String>,
    error: ProviderError,
}

impl Fault {
    fn applies_to(&self, call: &CloudCall) -> bool {
        self.operation == call.operation()
            && self
                .subject
                .as_deref()
                .map_or(true, |s| call.subjects().contains(&s))
    }
}

#[derive(Debug, Clone)]
struct FakeAlarm {
    instance_id: InstanceId,
    actions_enabled: bool,
}

#[derive(Debug, Default)]
struct CloudState {
    instances: BTreeMap<InstanceId, InstanceRef>,
    /// instance id → autoscaling group, as the autoscaling API reports it.
    groups: BTreeMap<InstanceId, String>,
    alarms: BTreeMap<String, FakeAlarm>,
    calls: Vec<CloudCall>,
    faults: Vec<Fault>,
    next_id: u64,
    ignore_tag_filter: bool,
}

impl CloudState {
    /// Record the call, then fail it if a matching fault is armed.
    fn record(&mut self, call: CloudCall) -> Result<(), ProviderError> {
        let fault = self.faults.iter().find(|f| f.applies_to(&call)).cloned();
        self.calls.push(call);
        match fault {
            Some(f) => Err(f.error),
            None => Ok(()),
        }
    }

    fn allocate_id(&mut self) -> InstanceId {
        self.next_id += 1;
        format!("i-{:017x}", self.next_id)
    }
}

/// A single-region cloud that lives in memory.
pub struct InMemoryCloud {
    region: String,
    state: Mutex<CloudState>,
}

impl InMemoryCloud {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: Mutex::new(CloudState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding ───────────────────────────────────────────────

    /// Insert (or replace) an instance. If it carries the autoscaling group
    /// tag it is also registered as a group member.
    pub fn add_instance(&self, instance: InstanceRef) {
        let mut state = self.lock();
        if let Some(group) = instance.tag(AUTOSCALING_GROUP_TAG) {
            state.groups.insert(instance.id.clone(), group.to_string());
        }
        state.instances.insert(instance.id.clone(), instance);
    }

    /// Launch `count` running instances tagged `tag_key=tag_value`.
    pub fn launch_instances(&self, count: usize, tag_key: &str, tag_value: &str) -> Vec<InstanceId> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.lock().allocate_id();
            self.add_instance(
                InstanceRef::new(id.clone(), InstanceState::Running).with_tag(tag_key, tag_value),
            );
            ids.push(id);
        }
        ids
    }

    /// Launch `count` running members of autoscaling group `group`, each
    /// tagged `tag_key=tag_value` plus the group tag.
    pub fn launch_autoscaling_group(
        &self,
        group: &str,
        count: usize,
        tag_key: &str,
        tag_value: &str,
    ) -> Vec<InstanceId> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.lock().allocate_id();
            self.add_instance(
                InstanceRef::new(id.clone(), InstanceState::Running)
                    .with_tag(tag_key, tag_value)
                    .with_tag(AUTOSCALING_GROUP_TAG, group),
            );
            ids.push(id);
        }
        ids
    }

    /// Register `instance_id` as a member of `group` on the autoscaling side
    /// only, without the inventory tag.
    pub fn register_group_member(&self, instance_id: &str, group: &str) {
        self.lock()
            .groups
            .insert(instance_id.to_string(), group.to_string());
    }

    /// Create a metric alarm whose `InstanceId` dimension is `instance_id`.
    pub fn add_alarm(&self, name: &str, instance_id: &str, actions_enabled: bool) {
        self.lock().alarms.insert(
            name.to_string(),
            FakeAlarm {
                instance_id: instance_id.to_string(),
                actions_enabled,
            },
        );
    }

    pub fn set_state(&self, instance_id: &str, new_state: InstanceState) {
        if let Some(instance) = self.lock().instances.get_mut(instance_id) {
            instance.state = new_state;
        }
    }

    /// Serve every instance from `describe_instances`, ignoring the tag
    /// filter, like a provider without server-side filtering.
    pub fn ignore_tag_filter(&self) {
        self.lock().ignore_tag_filter = true;
    }

    // ── Fault injection ───────────────────────────────────────

    /// Fail every call to `operation` with `error`.
    pub fn fail(&self, operation: &'static str, error: ProviderError) {
        self.lock().faults.push(Fault {
            operation,
            subject: None,
            error,
        });
    }

    /// Fail calls to `operation` that mention `subject` (an instance id or
    /// alarm name).
    pub fn fail_for(&self, operation: &'static str, subject: &str, error: ProviderError) {
        self.lock().faults.push(Fault {
            operation,
            subject: Some(subject.to_string()),
            error,
        });
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn state_of(&self, instance_id: &str) -> Option<InstanceState> {
        self.lock().instances.get(instance_id).map(|i| i.state)
    }

    pub fn alarm_actions_enabled(&self, name: &str) -> Option<bool> {
        self.lock().alarms.get(name).map(|a| a.actions_enabled)
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<CloudCall> {
        self.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<CloudCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn apply_power(
        &self,
        call: CloudCall,
        ids: &[InstanceId],
        action: PowerAction,
    ) -> Result<(), ProviderError> {
        let operation = call.operation();
        let mut state = self.lock();
        state.record(call)?;

        // Validate the whole batch first; the provider rejects it atomically.
        for id in ids {
            match state.instances.get(id) {
                None => {
                    return Err(ProviderError::permanent(
                        operation,
                        format!("InvalidInstanceID.NotFound: {id}"),
                    ))
                }
                Some(i) if !i.state.accepts(action) => {
                    return Err(ProviderError::permanent(
                        operation,
                        format!("IncorrectInstanceState: {id} is {}", i.state),
                    ))
                }
                Some(_) => {}
            }
        }

        let target = action.target_state();
        for id in ids {
            if let Some(instance) = state.instances.get_mut(id) {
                instance.state = target;
            }
        }
        debug!(region = %self.region, operation, count = ids.len(), "Applied power action");
        Ok(())
    }

    fn set_alarm_actions(
        &self,
        call: CloudCall,
        names: &[String],
        enabled: bool,
    ) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.record(call)?;
        // Unknown names are ignored, as CloudWatch does.
        for name in names {
            if let Some(alarm) = state.alarms.get_mut(name) {
                alarm.actions_enabled = enabled;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceInventory for InMemoryCloud {
    async fn describe_instances(&self, filter: &TagFilter) -> Result<Vec<InstanceRef>, ProviderError> {
        let mut state = self.lock();
        state.record(CloudCall::DescribeInstances {
            key: filter.key().to_string(),
            value: filter.value().to_string(),
        })?;

        let ignore_filter = state.ignore_tag_filter;
        Ok(state
            .instances
            .values()
            .filter(|i| ignore_filter || filter.matches(&i.tags))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PowerControl for InMemoryCloud {
    async fn stop_instances(&self, ids: &[InstanceId]) -> Result<(), ProviderError> {
        self.apply_power(
            CloudCall::StopInstances(ids.to_vec()),
            ids,
            PowerAction::Stop,
        )
    }

    async fn start_instances(&self, ids: &[InstanceId]) -> Result<(), ProviderError> {
        self.apply_power(
            CloudCall::StartInstances(ids.to_vec()),
            ids,
            PowerAction::Start,
        )
    }
}

#[async_trait]
impl AutoscalingMembership for InMemoryCloud {
    async fn describe_auto_scaling_instances(
        &self,
        ids: &[InstanceId],
    ) -> Result<Vec<AutoscalingMember>, ProviderError> {
        let mut state = self.lock();
        state.record(CloudCall::DescribeAutoScalingInstances(ids.to_vec()))?;

        Ok(ids
            .iter()
            .filter_map(|id| {
                state.groups.get(id).map(|group| AutoscalingMember {
                    instance_id: id.clone(),
                    group_name: group.clone(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl AlarmDiscovery for InMemoryCloud {
    async fn describe_alarms_for_instance(
        &self,
        instance_id: &str,
    ) -> Result<Vec<WatchedAlarm>, ProviderError> {
        let mut state = self.lock();
        state.record(CloudCall::DescribeAlarms(instance_id.to_string()))?;

        Ok(state
            .alarms
            .iter()
            .filter(|(_, alarm)| alarm.instance_id == instance_id)
            .map(|(name, alarm)| WatchedAlarm {
                name: name.clone(),
                actions_enabled: alarm.actions_enabled,
            })
            .collect())
    }
}

#[async_trait]
impl AlarmMutation for InMemoryCloud {
    async fn disable_alarm_actions(&self, alarm_names: &[String]) -> Result<(), ProviderError> {
        self.set_alarm_actions(
            CloudCall::DisableAlarmActions(alarm_names.to_vec()),
            alarm_names,
            false,
        )
    }

    async fn enable_alarm_actions(&self, alarm_names: &[String]) -> Result<(), ProviderError> {
        self.set_alarm_actions(
            CloudCall::EnableAlarmActions(alarm_names.to_vec()),
            alarm_names,
            true,
        )
    }
}

impl CloudProvider for InMemoryCloud {
    fn provider_name(&self) -> &str {
        "memory"
    }
}
