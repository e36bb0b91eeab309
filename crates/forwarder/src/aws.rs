//! Shared AWS SDK configuration for the Firehose and SQS clients.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;

use vigil_core::config::AwsConfig;

/// Resolve SDK config from the project's AWS settings.
///
/// Static credentials win when both key parts are set; otherwise the default
/// provider chain applies (instance role, SSO, shared profile).
pub async fn sdk_config(aws: &AwsConfig) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));

    if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        let creds = Credentials::new(
            key_id,
            secret,
            aws.session_token.clone(),
            None,
            "vigil-static",
        );
        loader = loader.credentials_provider(creds);
    }

    if let Some(url) = endpoint_url(aws) {
        loader = loader.endpoint_url(url);
    }

    loader.load().await
}

/// Explicit endpoint override (LocalStack and friends), scheme defaulted to https.
fn endpoint_url(aws: &AwsConfig) -> Option<String> {
    let endpoint = aws.endpoint_url.as_deref()?.trim();
    if endpoint.is_empty() {
        return None;
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Some(endpoint.to_string())
    } else {
        Some(format!("https://{endpoint}"))
    }
}
