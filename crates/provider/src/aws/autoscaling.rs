use async_trait::async_trait;
use tracing::debug;

use nightshift_core::{AutoscalingMember, InstanceId, ProviderError};

use super::{classify, AwsCloud};
use crate::traits::AutoscalingMembership;

/// DescribeAutoScalingInstances accepts at most 50 ids per request.
const DESCRIBE_BATCH: usize = 50;

#[async_trait]
impl AutoscalingMembership for AwsCloud {
    async fn describe_auto_scaling_instances(
        &self,
        ids: &[InstanceId],
    ) -> Result<Vec<AutoscalingMember>, ProviderError> {
        let mut members = Vec::new();

        for chunk in ids.chunks(DESCRIBE_BATCH) {
            let mut next_token: Option<String> = None;
            loop {
                let resp = self
                    .autoscaling
                    .describe_auto_scaling_instances()
                    .set_instance_ids(Some(chunk.to_vec()))
                    .set_next_token(next_token.take())
                    .send()
                    .await
                    .map_err(|e| classify("DescribeAutoScalingInstances", e))?;

                members.extend(resp.auto_scaling_instances().iter().map(|detail| {
                    AutoscalingMember {
                        instance_id: detail.instance_id().to_string(),
                        group_name: detail.auto_scaling_group_name().to_string(),
                    }
                }));

                match resp.next_token() {
                    Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                    _ => break,
                }
            }
        }

        debug!(
            region = %self.region,
            queried = ids.len(),
            members = members.len(),
            "Described autoscaling membership"
        );
        Ok(members)
    }
}
