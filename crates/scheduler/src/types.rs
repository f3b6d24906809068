use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use nightshift_core::{AlarmRef, InstanceId, InstanceRef, PowerAction, ProviderError, TagFilter};

/// One inventory query's worth of matching instances.
///
/// Consumed once; listing again re-queries the provider.
#[derive(Debug)]
pub struct InstanceSnapshot {
    filter: TagFilter,
    inner: std::vec::IntoIter<InstanceRef>,
}

impl InstanceSnapshot {
    pub(crate) fn new(filter: TagFilter, instances: Vec<InstanceRef>) -> Self {
        Self {
            filter,
            inner: instances.into_iter(),
        }
    }

    pub fn filter(&self) -> &TagFilter {
        &self.filter
    }
}

impl Iterator for InstanceSnapshot {
    type Item = InstanceRef;

    fn next(&mut self) -> Option<InstanceRef> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for InstanceSnapshot {}

// ── Alarm outcomes ────────────────────────────────────────────

/// Step of per-instance alarm handling that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmPhase {
    Discover,
    Disable,
    Enable,
}

/// An alarm operation that failed for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmFailure {
    pub instance_id: InstanceId,
    pub phase: AlarmPhase,
    /// Alarms the failed mutation covered; empty for discovery failures.
    pub alarm_names: Vec<String>,
    pub error: ProviderError,
}

/// Aggregate result of suspending or resuming alarms for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlarmOutcome {
    /// Alarms discovered per instance (instances with no alarms included).
    pub discovered: Vec<AlarmRef>,
    /// Alarm names whose actions this call actually changed.
    pub mutated: Vec<String>,
    pub failures: Vec<AlarmFailure>,
}

impl AlarmOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Alarms that were enabled before a suspend and may now be disabled:
    /// the ones changed, plus the ones a failed disable covered.
    pub fn suspended(&self) -> Vec<String> {
        let failed = self
            .failures
            .iter()
            .filter(|f| f.phase == AlarmPhase::Disable)
            .flat_map(|f| f.alarm_names.iter().cloned());
        self.mutated.iter().cloned().chain(failed).collect()
    }
}

// ── Plan & report ─────────────────────────────────────────────

/// What a start/stop would touch for a tag filter, without touching it.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulePlan {
    pub action: PowerAction,
    pub filter: TagFilter,
    /// Every instance the filter matched.
    pub matched: Vec<InstanceRef>,
    /// Matched instances owned by an autoscaling group.
    pub excluded: BTreeSet<InstanceId>,
    /// Matched instances that are terminated or terminating.
    pub skipped: Vec<InstanceId>,
    /// Instances the power action and alarm changes apply to.
    pub targets: Vec<InstanceId>,
}

impl SchedulePlan {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Result of one start/stop invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReport {
    pub run_id: Uuid,
    pub action: PowerAction,
    pub tag_key: String,
    pub tag_value: String,
    pub matched: Vec<InstanceId>,
    pub excluded: Vec<InstanceId>,
    pub skipped: Vec<InstanceId>,
    pub targets: Vec<InstanceId>,
    /// Alarms found watching each target.
    pub alarms: Vec<AlarmRef>,
    pub alarms_mutated: Vec<String>,
    pub alarm_failures: Vec<AlarmFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScheduleReport {
    pub(crate) fn from_plan(run_id: Uuid, plan: &SchedulePlan, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            action: plan.action,
            tag_key: plan.filter.key().to_string(),
            tag_value: plan.filter.value().to_string(),
            matched: plan.matched.iter().map(|i| i.id.clone()).collect(),
            excluded: plan.excluded.iter().cloned().collect(),
            skipped: plan.skipped.clone(),
            targets: plan.targets.clone(),
            alarms: Vec::new(),
            alarms_mutated: Vec::new(),
            alarm_failures: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    pub(crate) fn record_alarms(&mut self, outcome: AlarmOutcome) {
        self.alarms = outcome.discovered;
        self.alarms_mutated = outcome.mutated;
        self.alarm_failures = outcome.failures;
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// True when the power action ran but some alarm handling failed.
    pub fn is_partial(&self) -> bool {
        !self.alarm_failures.is_empty()
    }

    /// True when nothing matched (or everything was excluded).
    pub fn is_noop(&self) -> bool {
        self.targets.is_empty()
    }
}
