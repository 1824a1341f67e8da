use crate::{
    client::{EventRules, QueueProvisioner, Queues},
    Error, PipelineMetrics, ResourceNames, RuleReconciler, Stage,
};
use tracing::{debug, info_span, Instrument};

/// Sets up and tears down the delivery of a cluster's ASG lifecycle events.
///
/// This is the entrypoint for the cluster controller: it calls
/// [`EventPipeline::reconcile_asg_ec2_events`] while reconciling a cluster and
/// [`EventPipeline::delete_asg_ec2_events`] while deleting one. Neither call
/// retries or rolls back; the caller is expected to call again on its own
/// cadence.
#[derive(Clone, Debug)]
pub struct EventPipeline<R, Q, P> {
    rules: RuleReconciler<R, Q>,
    provisioner: P,
    metrics: Option<PipelineMetrics>,
}

impl<R, Q, P> EventPipeline<R, Q, P>
where
    R: EventRules,
    Q: Queues,
    P: QueueProvisioner,
{
    pub fn new(rules: R, queues: Q, provisioner: P) -> Self {
        Self {
            rules: RuleReconciler::new(rules, queues),
            provisioner,
            metrics: None,
        }
    }

    pub fn with_metrics(self, metrics: PipelineMetrics) -> Self {
        Self {
            rules: self.rules.with_metrics(metrics.clone()),
            provisioner: self.provisioner,
            metrics: Some(metrics),
        }
    }

    /// Ensures the cluster's queue exists and that its event rule delivers
    /// ASG lifecycle events to it.
    pub async fn reconcile_asg_ec2_events(&self, cluster: &str) -> Result<(), Error> {
        let names = ResourceNames::for_cluster(cluster);
        let observer = self.metrics.as_ref().map(|m| m.start("reconcile"));

        let res = async {
            self.ensure_queue(&names).await?;
            self.rules.reconcile_rule(&names).await
        }
        .instrument(info_span!("reconcile", %cluster))
        .await;

        if let Some(observer) = observer {
            observer.end(res.as_ref().err().map(Error::kind));
        }
        res
    }

    /// Removes the cluster's rule and queue.
    ///
    /// The rule, and with it the target referencing the queue, is removed
    /// before the queue.
    pub async fn delete_asg_ec2_events(&self, cluster: &str) -> Result<(), Error> {
        let names = ResourceNames::for_cluster(cluster);
        let observer = self.metrics.as_ref().map(|m| m.start("delete"));

        let res = async {
            self.rules.delete_rule(&names).await?;
            self.delete_queue(&names).await
        }
        .instrument(info_span!("delete", %cluster))
        .await;

        if let Some(observer) = observer {
            observer.end(res.as_ref().err().map(Error::kind));
        }
        res
    }

    async fn ensure_queue(&self, names: &ResourceNames) -> Result<(), Error> {
        self.provisioner
            .ensure_queue(&names.queue)
            .await
            .map_err(Error::api(&names.cluster, Stage::EnsureQueue))?;
        debug!(queue = %names.queue, "Queue exists");
        Ok(())
    }

    async fn delete_queue(&self, names: &ResourceNames) -> Result<(), Error> {
        self.provisioner
            .delete_queue(&names.queue)
            .await
            .map_err(Error::api(&names.cluster, Stage::DeleteQueue))?;
        debug!(queue = %names.queue, "Queue deleted");
        Ok(())
    }
}
