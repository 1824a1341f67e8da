/// The names of every remote resource owned by a cluster's event pipeline.
///
/// All names are derived from the cluster name alone so that repeated
/// reconciliation, and deletion, always address the same resources. The
/// formats are shared with pipelines that are already deployed and must not
/// change.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceNames {
    pub cluster: String,
    pub rule: String,
    pub queue: String,
    pub target_id: String,
}

impl ResourceNames {
    pub fn for_cluster(cluster: impl Into<String>) -> Self {
        let cluster = cluster.into();
        let rule = rule_name(&cluster);
        let queue = queue_name(&cluster);
        Self {
            target_id: queue.clone(),
            cluster,
            rule,
            queue,
        }
    }
}

pub fn rule_name(cluster: &str) -> String {
    format!("{cluster}-asg-rule")
}

/// SQS queue names may not contain dots, so they are replaced with dashes.
pub fn queue_name(cluster: &str) -> String {
    format!("{}-queue", cluster.replace('.', "-"))
}
