use crate::{
    admin::Admin,
    aws::{EventBridgeRules, SqsQueues},
    core::{EventPipeline, EventRules, PipelineMetrics, QueueProvisioner, Queues},
    log, sdk, LogFormat,
};
use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use tokio::{
    sync::watch,
    time::{self, Duration, MissedTickBehavior},
};
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "asg-event-controller",
    about = "Routes autoscaling group lifecycle events to a per-cluster queue"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "asg_event_controller=info,warn",
        env = "ASG_EVENT_CONTROLLER_LOG"
    )]
    log_level: String,

    #[clap(long, value_enum, default_value = "plain")]
    log_format: LogFormat,

    /// Region of the cluster's event bus and queue.
    ///
    /// Falls back to the default provider chain when unset.
    #[clap(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Overrides the service endpoint, e.g. for a local emulator.
    #[clap(long, env = "AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Deadline for a single service call, including retries.
    #[clap(long, default_value = "10000")]
    operation_timeout_ms: u64,

    /// Deadline for a whole reconcile or delete.
    #[clap(long, default_value = "60000")]
    reconcile_timeout_ms: u64,

    #[clap(long, default_value = "0.0.0.0:9990")]
    admin_addr: SocketAddr,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Creates or repairs the cluster's rule, target and queue policy once.
    Reconcile(Cluster),

    /// Removes the cluster's target, rule and queue once.
    Delete(Cluster),

    /// Reconciles periodically until interrupted, serving the admin endpoints.
    Run {
        #[clap(flatten)]
        cluster: Cluster,

        #[clap(long, default_value = "60")]
        reconcile_period_secs: u64,
    },
}

#[derive(Debug, ClapArgs)]
struct Cluster {
    #[clap(long, env = "CLUSTER_NAME")]
    cluster_name: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            region,
            endpoint_url,
            operation_timeout_ms,
            reconcile_timeout_ms,
            admin_addr,
            command,
        } = self;

        log::init(&log_level, log_format)?;

        let config = sdk::load(
            region,
            endpoint_url,
            Duration::from_millis(operation_timeout_ms),
        )
        .await?;

        let mut prom = <Registry>::default();
        let metrics = PipelineMetrics::register(prom.sub_registry_with_prefix("asg_events"));

        let queues = SqsQueues::new(&config);
        let pipeline = EventPipeline::new(EventBridgeRules::new(&config), queues.clone(), queues)
            .with_metrics(metrics);
        let timeout = Duration::from_millis(reconcile_timeout_ms);

        match command {
            Command::Reconcile(Cluster { cluster_name }) => {
                reconcile(&pipeline, &cluster_name, timeout).await?;
                info!(cluster = %cluster_name, "Reconciled");
            }

            Command::Delete(Cluster { cluster_name }) => {
                time::timeout(timeout, pipeline.delete_asg_ec2_events(&cluster_name))
                    .await
                    .context("delete timed out")??;
                info!(cluster = %cluster_name, "Deleted");
            }

            Command::Run {
                cluster: Cluster { cluster_name },
                reconcile_period_secs,
            } => {
                let (ready_tx, ready_rx) = watch::channel(false);
                let admin = Admin::new(ready_rx, prom).bind(admin_addr)?;
                tokio::spawn(
                    async move {
                        if let Err(error) = admin.await {
                            warn!(%error, "Admin server failed");
                        }
                    }
                    .instrument(info_span!("admin")),
                );

                let period = Duration::from_secs(reconcile_period_secs);
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        res?;
                        info!("Received shutdown signal");
                    }
                    res = run(&pipeline, &cluster_name, period, timeout, ready_tx) => res?,
                }
            }
        }

        Ok(())
    }
}

/// Reconciles on every tick of `period`. Failures are logged and retried on
/// the next tick.
///
/// The first success marks the controller ready. Later failures do not clear
/// readiness.
async fn run<R, Q, P>(
    pipeline: &EventPipeline<R, Q, P>,
    cluster: &str,
    period: Duration,
    timeout: Duration,
    ready: watch::Sender<bool>,
) -> Result<()>
where
    R: EventRules,
    Q: Queues,
    P: QueueProvisioner,
{
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match reconcile(pipeline, cluster, timeout).await {
            Ok(()) => {
                if !ready.send_replace(true) {
                    info!(%cluster, "Initial reconcile complete");
                }
            }
            Err(error) => warn!(%cluster, "Reconcile failed: {error:#}"),
        }
    }
}

async fn reconcile<R, Q, P>(
    pipeline: &EventPipeline<R, Q, P>,
    cluster: &str,
    timeout: Duration,
) -> Result<()>
where
    R: EventRules,
    Q: Queues,
    P: QueueProvisioner,
{
    time::timeout(timeout, pipeline.reconcile_asg_ec2_events(cluster))
        .await
        .context("reconcile timed out")??;
    Ok(())
}
