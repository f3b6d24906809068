use async_trait::async_trait;
use aws_sdk_ec2::types::{Filter, Instance};
use tracing::{debug, info, warn};

use nightshift_core::{InstanceId, InstanceRef, InstanceState, ProviderError, TagFilter};

use super::{classify, AwsCloud};
use crate::traits::{InstanceInventory, PowerControl};

#[async_trait]
impl InstanceInventory for AwsCloud {
    async fn describe_instances(&self, filter: &TagFilter) -> Result<Vec<InstanceRef>, ProviderError> {
        let tag_filter = Filter::builder()
            .name(format!("tag:{}", filter.key()))
            .values(filter.value())
            .build();

        let mut instances = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .ec2
                .describe_instances()
                .filters(tag_filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| classify("DescribeInstances", e))?;

            for reservation in resp.reservations() {
                instances.extend(reservation.instances().iter().filter_map(to_instance_ref));
            }

            match resp.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(region = %self.region, %filter, count = instances.len(), "Described EC2 instances");
        Ok(instances)
    }
}

#[async_trait]
impl PowerControl for AwsCloud {
    async fn stop_instances(&self, ids: &[InstanceId]) -> Result<(), ProviderError> {
        let resp = self
            .ec2
            .stop_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| classify("StopInstances", e))?;

        info!(
            region = %self.region,
            requested = ids.len(),
            stopping = resp.stopping_instances().len(),
            "StopInstances accepted"
        );
        Ok(())
    }

    async fn start_instances(&self, ids: &[InstanceId]) -> Result<(), ProviderError> {
        let resp = self
            .ec2
            .start_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| classify("StartInstances", e))?;

        info!(
            region = %self.region,
            requested = ids.len(),
            starting = resp.starting_instances().len(),
            "StartInstances accepted"
        );
        Ok(())
    }
}

fn to_instance_ref(instance: &Instance) -> Option<InstanceRef> {
    let id = instance.instance_id()?;

    let state = instance.state().and_then(|s| {
        s.name()
            .and_then(|name| InstanceState::from_name(name.as_str()))
            .or_else(|| {
                s.code()
                    .and_then(|code| u16::try_from(code).ok())
                    .and_then(InstanceState::from_code)
            })
    });

    let Some(state) = state else {
        warn!(instance_id = id, "Skipping instance with unknown state");
        return None;
    };

    let mut instance_ref = InstanceRef::new(id, state);
    for tag in instance.tags() {
        if let (Some(key), Some(value)) = (tag.key(), tag.value()) {
            instance_ref = instance_ref.with_tag(key, value);
        }
    }
    Some(instance_ref)
}
