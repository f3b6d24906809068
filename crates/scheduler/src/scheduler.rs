//! Start/stop orchestration over the selector and alarm coordinator.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use nightshift_core::{InstanceRef, PowerAction};
use nightshift_provider::{CloudProvider, PowerControl};

use crate::alarms::AlarmCoordinator;
use crate::error::SchedulerResult;
use crate::selector::InstanceSelector;
use crate::types::{SchedulePlan, ScheduleReport};

/// Runs one power action against every tagged, non-autoscaling instance.
///
/// Holds no state between calls; every invocation re-reads the inventory.
pub struct InstanceScheduler {
    selector: InstanceSelector,
    alarms: AlarmCoordinator,
    power: Arc<dyn PowerControl>,
}

impl InstanceScheduler {
    pub fn new(
        selector: InstanceSelector,
        alarms: AlarmCoordinator,
        power: Arc<dyn PowerControl>,
    ) -> Self {
        Self {
            selector,
            alarms,
            power,
        }
    }

    /// Wire every collaborator to the same provider.
    pub fn from_provider<P>(provider: Arc<P>, alarm_concurrency: usize) -> Self
    where
        P: CloudProvider + 'static,
    {
        info!(
            provider = provider.provider_name(),
            alarm_concurrency, "Scheduler wired to provider"
        );
        let selector = InstanceSelector::new(provider.clone(), provider.clone());
        let alarms = AlarmCoordinator::new(provider.clone(), provider.clone())
            .with_concurrency(alarm_concurrency);
        Self::new(selector, alarms, provider)
    }

    /// Work out what `action` would touch, without mutating anything.
    ///
    /// Instances whose current state the provider would reject for `action`
    /// are skipped rather than failing the whole batch.
    pub async fn plan(
        &self,
        action: PowerAction,
        tag_key: &str,
        tag_value: &str,
    ) -> SchedulerResult<SchedulePlan> {
        let snapshot = self.selector.list_instances(tag_key, tag_value).await?;
        let filter = snapshot.filter().clone();
        let matched: Vec<InstanceRef> = snapshot.collect();
        let excluded = self.selector.list_managed_by_autoscaling(&matched).await?;

        let mut skipped = Vec::new();
        let mut targets = Vec::new();
        for instance in &matched {
            if excluded.contains(&instance.id) {
                continue;
            }
            if instance.state.accepts(action) {
                targets.push(instance.id.clone());
            } else {
                debug!(
                    instance_id = %instance.id,
                    state = %instance.state,
                    %action,
                    "Instance state does not accept action"
                );
                skipped.push(instance.id.clone());
            }
        }

        if !skipped.is_empty() {
            warn!(%action, %filter, ?skipped, "Skipping instances in an incompatible state");
        }
        info!(
            %action,
            %filter,
            matched = matched.len(),
            excluded = excluded.len(),
            targets = targets.len(),
            "Planned power action"
        );

        Ok(SchedulePlan {
            action,
            filter,
            matched,
            excluded,
            skipped,
            targets,
        })
    }

    /// Suspend alarms on the tagged instances, then stop them.
    ///
    /// If the stop request fails, alarms suspended by this call are
    /// re-enabled before the error is returned.
    pub async fn stop(&self, tag_key: &str, tag_value: &str) -> SchedulerResult<ScheduleReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let plan = self.plan(PowerAction::Stop, tag_key, tag_value).await?;
        let mut report = ScheduleReport::from_plan(run_id, &plan, started_at);

        if plan.is_empty() {
            info!(%run_id, filter = %plan.filter, "No instances to stop");
            return Ok(report.finish());
        }

        let outcome = self.alarms.suspend_alarms(&plan.targets).await;
        let suspended = outcome.suspended();
        report.record_alarms(outcome);

        if let Err(e) = self.power.stop_instances(&plan.targets).await {
            error!(%run_id, error = %e, targets = plan.targets.len(), "Stop request failed");
            if let Err(restore_err) = self.alarms.restore(&suspended).await {
                error!(
                    %run_id,
                    error = %restore_err,
                    alarms = ?suspended,
                    "Could not re-enable alarms after failed stop"
                );
            }
            return Err(e.into());
        }

        let report = report.finish();
        log_report(&report);
        Ok(report)
    }

    /// Start the tagged instances, then resume their alarms.
    pub async fn start(&self, tag_key: &str, tag_value: &str) -> SchedulerResult<ScheduleReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let plan = self.plan(PowerAction::Start, tag_key, tag_value).await?;
        let mut report = ScheduleReport::from_plan(run_id, &plan, started_at);

        if plan.is_empty() {
            info!(%run_id, filter = %plan.filter, "No instances to start");
            return Ok(report.finish());
        }

        self.power.start_instances(&plan.targets).await?;

        let outcome = self.alarms.resume_alarms(&plan.targets).await;
        report.record_alarms(outcome);

        let report = report.finish();
        log_report(&report);
        Ok(report)
    }

    pub async fn run(
        &self,
        action: PowerAction,
        tag_key: &str,
        tag_value: &str,
    ) -> SchedulerResult<ScheduleReport> {
        match action {
            PowerAction::Start => self.start(tag_key, tag_value).await,
            PowerAction::Stop => self.stop(tag_key, tag_value).await,
        }
    }
}

fn log_report(report: &ScheduleReport) {
    if report.is_partial() {
        warn!(
            run_id = %report.run_id,
            action = %report.action,
            targets = report.targets.len(),
            alarm_failures = report.alarm_failures.len(),
            "Power action completed with alarm failures"
        );
    } else {
        info!(
            run_id = %report.run_id,
            action = %report.action,
            targets = report.targets.len(),
            alarms = report.alarms_mutated.len(),
            "Power action completed"
        );
    }
}
