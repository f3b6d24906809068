//! AWS-backed collaborators: EC2 inventory and power control, Auto Scaling
//! membership, CloudWatch alarm discovery and action toggling.

mod autoscaling;
mod cloudwatch;
mod ec2;

use std::fmt::Debug;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_types::region::Region;
use tracing::info;

use nightshift_core::config::AwsConfig;
use nightshift_core::ProviderError;

use crate::traits::CloudProvider;

/// Error codes AWS uses for throttling and temporary unavailability.
const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "RequestThrottledException",
    "TooManyRequestsException",
    "SlowDown",
    "PriorRequestNotComplete",
    "RequestTimeout",
    "RequestTimeoutException",
    "InternalError",
    "InternalFailure",
    "ServiceUnavailable",
    "Unavailable",
];

/// Region-scoped AWS clients. Built once per invocation and shared by every
/// collaborator trait.
pub struct AwsCloud {
    region: String,
    ec2: aws_sdk_ec2::Client,
    autoscaling: aws_sdk_autoscaling::Client,
    cloudwatch: aws_sdk_cloudwatch::Client,
}

impl AwsCloud {
    /// Build EC2, Auto Scaling and CloudWatch clients for `aws.region`.
    ///
    /// Static credentials are used when both key id and secret are set,
    /// otherwise the default provider chain applies.
    pub async fn connect(aws: &AwsConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(aws.region.clone()));

        if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                aws.session_token.clone(),
                None,
                "nightshift-static",
            );
            loader = loader.credentials_provider(creds);
        }

        if let Some(ref endpoint) = aws.endpoint_url {
            let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("https://{endpoint}")
            };
            loader = loader.endpoint_url(url);
        }

        let sdk_config = loader.load().await;

        info!(
            region = %aws.region,
            static_credentials = aws.has_static_credentials(),
            "AWS clients initialised"
        );

        Self {
            region: aws.region.clone(),
            ec2: aws_sdk_ec2::Client::new(&sdk_config),
            autoscaling: aws_sdk_autoscaling::Client::new(&sdk_config),
            cloudwatch: aws_sdk_cloudwatch::Client::new(&sdk_config),
        }
    }
}

impl CloudProvider for AwsCloud {
    fn provider_name(&self) -> &str {
        "aws"
    }
}

pub(crate) fn is_transient_code(code: &str) -> bool {
    TRANSIENT_CODES.contains(&code)
}

/// Translate an SDK failure into the provider taxonomy.
///
/// Timeouts, dispatch failures and unparseable responses are transient, as
/// are service errors carrying a throttling/unavailability code.
pub(crate) fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + Debug,
    R: Debug,
{
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
        SdkError::ServiceError(service) => service.err().code().is_some_and(is_transient_code),
        _ => false,
    };

    let message = match err.as_service_error() {
        Some(service) => format!(
            "{}: {}",
            service.code().unwrap_or("Unknown"),
            service.message().unwrap_or("no message")
        ),
        None => format!("{err:?}"),
    };

    if transient {
        ProviderError::transient(operation, message)
    } else {
        ProviderError::permanent(operation, message)
    }
}
