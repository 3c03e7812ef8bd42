/// Shared AWS SDK configuration, resolved from the environment
/// (region, credentials chain, profile).
use aws_config::{BehaviorVersion, SdkConfig};

pub async fn load_sdk_config() -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest()).load().await
}
