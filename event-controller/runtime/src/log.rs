use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Installs the global subscriber.
pub(crate) fn init(filter: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(filter)?;
    let fmt = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Plain => fmt.try_init(),
        LogFormat::Json => fmt.json().with_current_span(true).try_init(),
    }
    .map_err(|e| anyhow!(e))
}
