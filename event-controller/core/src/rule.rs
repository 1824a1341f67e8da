use crate::{
    client::{EventPattern, EventRules, Queues, Rule, RuleSpec, RuleState, Target},
    policy, Error, PipelineMetrics, ResourceNames, Stage,
};
use tracing::{debug, info, info_span, Instrument};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Wires a cluster's event rule to its queue.
///
/// Every stage reads the remote state before deciding whether to mutate it,
/// so reconciliation can be repeated any number of times and resumes cleanly
/// after a failure between stages.
#[derive(Clone, Debug)]
pub struct RuleReconciler<R, Q> {
    rules: R,
    queues: Q,
    metrics: Option<PipelineMetrics>,
}

/// A queue resolved by name, with the attributes the reconciler needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueRef {
    pub name: String,
    pub url: String,
    pub arn: String,
    pub policy: Option<String>,
}

impl<R: EventRules, Q: Queues> RuleReconciler<R, Q> {
    pub fn new(rules: R, queues: Q) -> Self {
        Self {
            rules,
            queues,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Ensures the rule exists, targets the cluster's queue, and that the
    /// queue accepts messages from the rule.
    ///
    /// The cluster's queue must already exist.
    pub async fn reconcile_rule(&self, names: &ResourceNames) -> Result<()> {
        let rule_arn = self
            .ensure_rule(names)
            .instrument(info_span!("ensure_rule", rule = %names.rule))
            .await?;

        let queue = self
            .resolve_queue(names)
            .instrument(info_span!("resolve_queue", queue = %names.queue))
            .await?;

        self.ensure_target(names, &queue)
            .instrument(info_span!("ensure_target", rule = %names.rule))
            .await?;

        self.ensure_queue_policy(names, &rule_arn, &queue)
            .instrument(info_span!("ensure_queue_policy", queue = %names.queue))
            .await?;

        Ok(())
    }

    /// Returns the ARN of the cluster's rule, creating the rule if it does
    /// not exist.
    pub async fn ensure_rule(&self, names: &ResourceNames) -> Result<String> {
        let rule = match self.rules.describe_rule(&names.rule).await {
            Ok(rule) => rule,
            Err(error) if error.is_not_found() => {
                debug!("Event rule not found");
                self.create_rule(names).await?
            }
            Err(error) => return Err(Error::api(&names.cluster, Stage::EnsureRule)(error)),
        };

        rule.arn.ok_or_else(|| Error::MissingRuleArn {
            rule: names.rule.clone(),
        })
    }

    async fn create_rule(&self, names: &ResourceNames) -> Result<Rule> {
        let event_pattern = EventPattern::asg_lifecycle()
            .to_json()
            .map_err(|source| Error::Encode {
                resource: names.rule.clone(),
                source,
            })?;
        let spec = RuleSpec {
            name: names.rule.clone(),
            event_pattern,
            state: RuleState::Enabled,
        };

        let err = Error::api(&names.cluster, Stage::EnsureRule);
        self.rules.put_rule(&spec).await.map_err(err)?;
        self.record_mutation("create_rule");
        info!(rule = %names.rule, "Created event rule");

        // Creating a rule does not reliably report the full resource, so it
        // is read back to learn its ARN.
        let err = Error::api(&names.cluster, Stage::EnsureRule);
        self.rules.describe_rule(&names.rule).await.map_err(err)
    }

    /// Looks up the cluster's queue and reads its ARN and access policy.
    pub async fn resolve_queue(&self, names: &ResourceNames) -> Result<QueueRef> {
        let err = Error::api(&names.cluster, Stage::ResolveQueue);
        let url = self.queues.get_queue_url(&names.queue).await.map_err(err)?;

        let err = Error::api(&names.cluster, Stage::ResolveQueue);
        let attrs = self
            .queues
            .get_queue_attributes(&url)
            .await
            .map_err(err)?;

        let policy = attrs.policy().map(str::to_string);
        let arn = attrs.arn.ok_or_else(|| Error::MissingQueueArn {
            queue: names.queue.clone(),
        })?;
        Ok(QueueRef {
            name: names.queue.clone(),
            url,
            arn,
            policy,
        })
    }

    /// Adds the queue as a target of the rule unless this cluster's target is
    /// already attached. Targets owned by anyone else are never modified.
    pub async fn ensure_target(&self, names: &ResourceNames, queue: &QueueRef) -> Result<()> {
        let target = Target {
            id: names.target_id.clone(),
            arn: queue.arn.clone(),
        };

        let err = Error::api(&names.cluster, Stage::EnsureTarget);
        let targets = self.rules.list_targets(&names.rule).await.map_err(err)?;
        if targets.contains(&target) {
            debug!(target = %target.id, "Queue target already attached");
            return Ok(());
        }

        let err = Error::api(&names.cluster, Stage::EnsureTarget);
        self.rules
            .put_targets(&names.rule, std::slice::from_ref(&target))
            .await
            .map_err(err)?;
        self.record_mutation("attach_target");
        info!(target = %target.id, arn = %target.arn, "Attached queue target");
        Ok(())
    }

    /// Authorizes the rule to deliver to the queue if the queue has no access
    /// policy. An existing policy is left as it is, whatever it grants.
    pub async fn ensure_queue_policy(
        &self,
        names: &ResourceNames,
        rule_arn: &str,
        queue: &QueueRef,
    ) -> Result<()> {
        if queue.policy.is_some() {
            debug!("Queue already has an access policy");
            return Ok(());
        }

        let policy = policy::build(names, rule_arn, &queue.arn)
            .to_json()
            .map_err(|source| Error::Encode {
                resource: names.queue.clone(),
                source,
            })?;

        let err = Error::api(&names.cluster, Stage::EnsureQueuePolicy);
        self.queues
            .set_queue_policy(&queue.url, &policy)
            .await
            .map_err(err)?;
        self.record_mutation("set_queue_policy");
        info!(queue = %queue.name, "Set queue access policy");
        Ok(())
    }

    /// Detaches the cluster's target and deletes the rule. Resources that are
    /// already gone are not an error.
    pub async fn delete_rule(&self, names: &ResourceNames) -> Result<()> {
        let ids = [names.target_id.clone()];
        match self.rules.remove_targets(&names.rule, &ids).await {
            Ok(()) => {
                self.record_mutation("remove_target");
                info!(rule = %names.rule, target = %names.target_id, "Removed queue target");
            }
            Err(error) if error.is_not_found() => {
                debug!(rule = %names.rule, "Queue target already removed");
            }
            Err(error) => return Err(Error::api(&names.cluster, Stage::RemoveTarget)(error)),
        }

        match self.rules.delete_rule(&names.rule).await {
            Ok(()) => {
                self.record_mutation("delete_rule");
                info!(rule = %names.rule, "Deleted event rule");
            }
            Err(error) if error.is_not_found() => {
                debug!(rule = %names.rule, "Event rule already deleted");
            }
            Err(error) => return Err(Error::api(&names.cluster, Stage::DeleteRule)(error)),
        }

        Ok(())
    }

    fn record_mutation(&self, mutation: &'static str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_mutation(mutation);
        }
    }
}
