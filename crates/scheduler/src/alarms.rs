//! Suspends and resumes the alarms watching a set of instances.
//!
//! Alarms for the whole batch are looked up once, then each instance's
//! alarms are toggled independently: a discovery or mutation failure for one
//! instance is recorded and the rest of the batch still runs.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use nightshift_core::{AlarmRef, InstanceId, ProviderError, WatchedAlarm};
use nightshift_provider::{AlarmDiscovery, AlarmMutation};

use crate::types::{AlarmFailure, AlarmOutcome, AlarmPhase};

/// Instances handled at once unless configured otherwise.
pub const DEFAULT_ALARM_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    Suspend,
    Resume,
}

impl Toggle {
    /// Whether an alarm in this state still needs changing.
    fn needs_change(self, alarm: &WatchedAlarm) -> bool {
        match self {
            Toggle::Suspend => alarm.actions_enabled,
            Toggle::Resume => !alarm.actions_enabled,
        }
    }

    fn phase(self) -> AlarmPhase {
        match self {
            Toggle::Suspend => AlarmPhase::Disable,
            Toggle::Resume => AlarmPhase::Enable,
        }
    }
}

/// Result of handling one instance's alarms.
struct InstanceAlarms {
    alarms: AlarmRef,
    mutated: Vec<String>,
}

struct InstanceFailure {
    phase: AlarmPhase,
    error: ProviderError,
    /// Alarm names the failed mutation covered. A batched mutation can fail
    /// after part of it was applied.
    attempted: Vec<String>,
    alarms: Option<AlarmRef>,
}

pub struct AlarmCoordinator {
    discovery: Arc<dyn AlarmDiscovery>,
    mutation: Arc<dyn AlarmMutation>,
    concurrency: usize,
}

impl AlarmCoordinator {
    pub fn new(discovery: Arc<dyn AlarmDiscovery>, mutation: Arc<dyn AlarmMutation>) -> Self {
        Self {
            discovery,
            mutation,
            concurrency: DEFAULT_ALARM_CONCURRENCY,
        }
    }

    /// Handle up to `concurrency` instances at once. Results keep input order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Disable actions on every alarm watching `instance_ids`.
    ///
    /// Alarms whose actions are already disabled are left alone.
    pub async fn suspend_alarms(&self, instance_ids: &[InstanceId]) -> AlarmOutcome {
        self.toggle(instance_ids, Toggle::Suspend).await
    }

    /// Enable actions on every alarm watching `instance_ids`.
    ///
    /// Alarms whose actions are already enabled are left alone.
    pub async fn resume_alarms(&self, instance_ids: &[InstanceId]) -> AlarmOutcome {
        self.toggle(instance_ids, Toggle::Resume).await
    }

    /// Re-enable exactly `alarm_names`, e.g. alarms suspended by a stop whose
    /// power action then failed. See [`AlarmOutcome::suspended`].
    pub async fn restore(&self, alarm_names: &[String]) -> Result<(), ProviderError> {
        if alarm_names.is_empty() {
            return Ok(());
        }
        self.mutation.enable_alarm_actions(alarm_names).await
    }

    async fn toggle(&self, instance_ids: &[InstanceId], toggle: Toggle) -> AlarmOutcome {
        let lookup = self.discovery.describe_alarms_for_instances(instance_ids).await;

        let results: Vec<(InstanceId, Result<InstanceAlarms, InstanceFailure>)> =
            stream::iter(lookup)
                .map(|(id, found)| async move {
                    let result = self.toggle_instance(&id, found, toggle).await;
                    (id, result)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut outcome = AlarmOutcome::default();
        for (instance_id, result) in results {
            match result {
                Ok(handled) => {
                    outcome.discovered.push(handled.alarms);
                    outcome.mutated.extend(handled.mutated);
                }
                Err(failed) => {
                    warn!(
                        %instance_id,
                        phase = ?failed.phase,
                        error = %failed.error,
                        retryable = failed.error.is_retryable(),
                        "Alarm handling failed for instance"
                    );
                    outcome.discovered.extend(failed.alarms);
                    outcome.failures.push(AlarmFailure {
                        instance_id,
                        phase: failed.phase,
                        alarm_names: failed.attempted,
                        error: failed.error,
                    });
                }
            }
        }

        info!(
            ?toggle,
            instances = instance_ids.len(),
            mutated = outcome.mutated.len(),
            failures = outcome.failures.len(),
            "Alarm batch complete"
        );
        outcome
    }

    async fn toggle_instance(
        &self,
        instance_id: &str,
        found: Result<Vec<WatchedAlarm>, ProviderError>,
        toggle: Toggle,
    ) -> Result<InstanceAlarms, InstanceFailure> {
        let alarms = found.map_err(|error| InstanceFailure {
            phase: AlarmPhase::Discover,
            error,
            attempted: Vec::new(),
            alarms: None,
        })?;

        let mut pending: Vec<String> = alarms
            .iter()
            .filter(|a| toggle.needs_change(a))
            .map(|a| a.name.clone())
            .collect();
        pending.sort();
        pending.dedup();

        let alarm_ref = AlarmRef::new(instance_id, &alarms);

        if pending.is_empty() {
            debug!(instance_id, alarms = alarms.len(), ?toggle, "No alarms need changing");
            return Ok(InstanceAlarms {
                alarms: alarm_ref,
                mutated: Vec::new(),
            });
        }

        let result = match toggle {
            Toggle::Suspend => self.mutation.disable_alarm_actions(&pending).await,
            Toggle::Resume => self.mutation.enable_alarm_actions(&pending).await,
        };
        if let Err(error) = result {
            return Err(InstanceFailure {
                phase: toggle.phase(),
                error,
                attempted: pending,
                alarms: Some(alarm_ref),
            });
        }

        debug!(instance_id, changed = pending.len(), ?toggle, "Alarm actions toggled");
        Ok(InstanceAlarms {
            alarms: alarm_ref,
            mutated: pending,
        })
    }
}
