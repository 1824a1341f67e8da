use anyhow::Result;
use aws_config::{meta::region::RegionProviderChain, timeout::TimeoutConfig, BehaviorVersion};
use aws_types::{app_name::AppName, region::Region, SdkConfig};
use tokio::time::Duration;
use tracing::debug;

const APP_NAME: &str = "asg-event-controller";

/// Loads the shared SDK configuration.
///
/// An explicit region wins over the default provider chain. Every service
/// call is bounded by `operation_timeout`, including its retries.
pub(crate) async fn load(
    region: Option<String>,
    endpoint_url: Option<String>,
    operation_timeout: Duration,
) -> Result<SdkConfig> {
    let region = RegionProviderChain::first_try(region.map(Region::new)).or_default_provider();
    let timeouts = TimeoutConfig::builder()
        .operation_timeout(operation_timeout)
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .timeout_config(timeouts)
        .app_name(AppName::new(APP_NAME)?);
    if let Some(url) = endpoint_url {
        loader = loader.endpoint_url(url);
    }

    let config = loader.load().await;
    debug!(region = ?config.region(), "Loaded AWS configuration");
    Ok(config)
}
