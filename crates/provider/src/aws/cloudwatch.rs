use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_cloudwatch::types::{AlarmType, MetricAlarm};
use tracing::{debug, info};

use nightshift_core::{InstanceId, ProviderError, WatchedAlarm};

use super::{classify, AwsCloud};
use crate::traits::{AlarmDiscovery, AlarmLookup, AlarmMutation};

/// Dimension EC2 metrics use to identify an instance.
const INSTANCE_DIMENSION: &str = "InstanceId";

/// Disable/EnableAlarmActions accept at most 100 alarm names per request.
const MUTATION_BATCH: usize = 100;

/// Largest page DescribeAlarms returns.
const DESCRIBE_PAGE: i32 = 100;

impl AwsCloud {
    /// Every metric alarm in the region.
    ///
    /// DescribeAlarms cannot filter on dimensions, so callers list once and
    /// match locally.
    async fn list_metric_alarms(&self) -> Result<Vec<MetricAlarm>, ProviderError> {
        let mut alarms = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .cloudwatch
                .describe_alarms()
                .alarm_types(AlarmType::MetricAlarm)
                .max_records(DESCRIBE_PAGE)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| classify("DescribeAlarms", e))?;

            alarms.extend(resp.metric_alarms().iter().cloned());

            match resp.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(region = %self.region, count = alarms.len(), "Listed metric alarms");
        Ok(alarms)
    }
}

#[async_trait]
impl AlarmDiscovery for AwsCloud {
    async fn describe_alarms_for_instance(
        &self,
        instance_id: &str,
    ) -> Result<Vec<WatchedAlarm>, ProviderError> {
        let alarms = self.list_metric_alarms().await?;
        let ids = [instance_id.to_string()];
        Ok(index_by_instance(&alarms, &ids)
            .remove(instance_id)
            .unwrap_or_default())
    }

    async fn describe_alarms_for_instances(&self, instance_ids: &[InstanceId]) -> AlarmLookup {
        match self.list_metric_alarms().await {
            Ok(alarms) => {
                let mut index = index_by_instance(&alarms, instance_ids);
                instance_ids
                    .iter()
                    .map(|id| (id.clone(), Ok(index.remove(id).unwrap_or_default())))
                    .collect()
            }
            Err(e) => instance_ids
                .iter()
                .map(|id| (id.clone(), Err(e.clone())))
                .collect(),
        }
    }
}

#[async_trait]
impl AlarmMutation for AwsCloud {
    async fn disable_alarm_actions(&self, alarm_names: &[String]) -> Result<(), ProviderError> {
        for chunk in alarm_names.chunks(MUTATION_BATCH) {
            self.cloudwatch
                .disable_alarm_actions()
                .set_alarm_names(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| classify("DisableAlarmActions", e))?;
        }
        info!(region = %self.region, count = alarm_names.len(), "Alarm actions disabled");
        Ok(())
    }

    async fn enable_alarm_actions(&self, alarm_names: &[String]) -> Result<(), ProviderError> {
        for chunk in alarm_names.chunks(MUTATION_BATCH) {
            self.cloudwatch
                .enable_alarm_actions()
                .set_alarm_names(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| classify("EnableAlarmActions", e))?;
        }
        info!(region = %self.region, count = alarm_names.len(), "Alarm actions enabled");
        Ok(())
    }
}

/// Group `alarms` under each of `instance_ids` they watch. Ids without
/// alarms are absent.
fn index_by_instance(
    alarms: &[MetricAlarm],
    instance_ids: &[InstanceId],
) -> BTreeMap<InstanceId, Vec<WatchedAlarm>> {
    let mut index: BTreeMap<InstanceId, Vec<WatchedAlarm>> = BTreeMap::new();
    for alarm in alarms {
        let Some(name) = alarm.alarm_name() else {
            continue;
        };
        for id in instance_ids.iter().filter(|id| watches_instance(alarm, id)) {
            index.entry(id.clone()).or_default().push(WatchedAlarm {
                name: name.to_string(),
                actions_enabled: alarm.actions_enabled().unwrap_or(true),
            });
        }
    }
    index
}

fn watches_instance(alarm: &MetricAlarm, instance_id: &str) -> bool {
    alarm
        .dimensions()
        .iter()
        .any(|d| d.name() == INSTANCE_DIMENSION && d.value() == instance_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudwatch::types::Dimension;

    fn alarm(name: &str, enabled: bool, dimensions: &[(&str, &str)]) -> MetricAlarm {
        let mut builder = MetricAlarm::builder().alarm_name(name).actions_enabled(enabled);
        for (k, v) in dimensions {
            builder = builder.dimensions(Dimension::builder().name(*k).value(*v).build().unwrap());
        }
        builder.build()
    }

    #[test]
    fn only_instance_id_dimension_matches() {
        let cpu = alarm("cpu", true, &[("InstanceId", "i-1")]);
        assert!(watches_instance(&cpu, "i-1"));
        assert!(!watches_instance(&cpu, "i-2"));

        let volume = alarm("volume", true, &[("VolumeId", "i-1")]);
        assert!(!watches_instance(&volume, "i-1"));

        let elb = alarm("elb", true, &[("LoadBalancerName", "web"), ("InstanceId", "i-10")]);
        assert!(!watches_instance(&elb, "i-1"));
        assert!(watches_instance(&elb, "i-10"));
    }

    #[test]
    fn one_listing_is_grouped_per_instance() {
        let alarms = vec![
            alarm("cpu-1", true, &[("InstanceId", "i-1")]),
            alarm("status-1", false, &[("InstanceId", "i-1")]),
            alarm("cpu-2", true, &[("InstanceId", "i-2")]),
            alarm("cpu-other", true, &[("InstanceId", "i-9")]),
            alarm("queue-depth", true, &[("QueueName", "jobs")]),
        ];
        let ids = vec!["i-1".to_string(), "i-2".to_string(), "i-3".to_string()];

        let index = index_by_instance(&alarms, &ids);

        assert_eq!(index.len(), 2);
        assert_eq!(
            index["i-1"],
            vec![
                WatchedAlarm { name: "cpu-1".into(), actions_enabled: true },
                WatchedAlarm { name: "status-1".into(), actions_enabled: false },
            ]
        );
        assert_eq!(index["i-2"].len(), 1);
        assert!(!index.contains_key("i-3"));
    }
}
