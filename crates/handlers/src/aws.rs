//! Shared SDK configuration for the provider-backed collaborators.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;

use sourcetrack_core::config::AwsConfig;

use crate::external::ExternalError;

/// Region and credentials from `aws`, static keys taking precedence over the
/// default provider chain.
pub(crate) async fn load_shared(aws: &AwsConfig, provider_name: &'static str) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));
    if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key_id,
            secret,
            aws.session_token.clone(),
            None,
            provider_name,
        ));
    }
    loader.load().await
}

/// Endpoint override for local emulators; blank means the real service.
pub(crate) fn endpoint_override(aws: &AwsConfig) -> Option<&str> {
    aws.endpoint_url.as_deref().filter(|e| !e.is_empty())
}

/// A service error code is a definite answer; anything else may pass.
pub(crate) fn classify(resource_key: &str, code: Option<&str>, detail: impl std::fmt::Debug) -> ExternalError {
    match code {
        Some(code) => ExternalError::Rejected(format!("{resource_key}: {code}")),
        None => ExternalError::Transient(format!("{resource_key}: {detail:?}")),
    }
}
