
use self::fake::{Call, FakeAws};
use crate::{
    client::{RuleSpec, RuleState, Target},
    ErrorKind, EventPipeline, PipelineMetrics, ResourceNames, RuleReconciler, Stage,
};
use pretty_assertions::assert_eq;
use prometheus_client::registry::Registry;
use tokio::time;

const CLUSTER: &str = "test-cluster";
const RULE: &str = "test-cluster-asg-rule";
const QUEUE: &str = "test-cluster-queue";
const QUEUE_ARN: &str = "test-cluster-queue-arn";
const QUEUE_URL: &str = "test-cluster-queue-url";
const RULE_ARN: &str = "rule-arn";

struct TestConfig {
    aws: FakeAws,
    names: ResourceNames,
    metrics: PipelineMetrics,
    _tracing: tracing::subscriber::DefaultGuard,
}

impl TestConfig {
    /// A cluster whose queue exists but has not been wired to anything.
    fn fresh() -> Self {
        let mut reg = Registry::default();
        Self {
            aws: FakeAws::with_queue(QUEUE, QUEUE_ARN),
            names: ResourceNames::for_cluster(CLUSTER),
            metrics: PipelineMetrics::register(&mut reg),
            _tracing: Self::init_tracing(),
        }
    }

    /// A cluster whose pipeline is fully wired.
    fn wired() -> Self {
        let test = Self::default_with_aws(FakeAws::default());
        test.aws.add_queue(QUEUE, QUEUE_ARN, Some("some policy"));
        test.aws.add_rule(RULE, RULE_ARN);
        test.aws.add_target(RULE, QUEUE, QUEUE_ARN);
        test
    }

    fn default_with_aws(aws: FakeAws) -> Self {
        Self {
            aws,
            ..Self::fresh()
        }
    }

    fn reconciler(&self) -> RuleReconciler<FakeAws, FakeAws> {
        RuleReconciler::new(self.aws.clone(), self.aws.clone()).with_metrics(self.metrics.clone())
    }

    fn pipeline(&self) -> EventPipeline<FakeAws, FakeAws, FakeAws> {
        EventPipeline::new(self.aws.clone(), self.aws.clone(), self.aws.clone())
            .with_metrics(self.metrics.clone())
    }

    fn init_tracing() -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .finish(),
        )
    }
}

fn asg_rule_spec() -> RuleSpec {
    RuleSpec {
        name: RULE.to_string(),
        event_pattern: r#"{"source":["aws.autoscaling"]}"#.to_string(),
        state: RuleState::Enabled,
    }
}

fn target(id: &str, arn: &str) -> Target {
    Target {
        id: id.to_string(),
        arn: arn.to_string(),
    }
}

/// A fresh cluster gets a rule, a target and a policy: three mutating calls.
#[tokio::test]
async fn creates_missing_rule_target_and_policy() {
    let test = TestConfig::fresh();
    test.reconciler()
        .reconcile_rule(&test.names)
        .await
        .expect("reconcile must succeed");

    let rule = test.aws.rule(RULE).expect("rule must exist");
    let rule_arn = rule.arn.clone().unwrap();
    assert_eq!(rule.state, RuleState::Enabled);
    assert_eq!(
        rule.event_pattern.as_deref(),
        Some(r#"{"source":["aws.autoscaling"]}"#)
    );
    assert_eq!(test.aws.targets(RULE), vec![target(QUEUE, QUEUE_ARN)]);

    let policy = test.aws.queue_policy(QUEUE).expect("policy must be set");
    let policy: serde_json::Value = serde_json::from_str(&policy).unwrap();
    assert_eq!(
        policy["Statement"][0]["Condition"]["ArnEquals"]["aws:SourceArn"],
        rule_arn.as_str()
    );
    assert_eq!(policy["Statement"][0]["Resource"][0], QUEUE_ARN);

    let mutations = test.aws.mutations();
    assert_eq!(mutations.len(), 3, "{mutations:?}");
    assert_eq!(mutations[0], Call::PutRule(asg_rule_spec()));
    assert_eq!(
        mutations[1],
        Call::PutTargets(RULE.to_string(), vec![target(QUEUE, QUEUE_ARN)])
    );
    assert!(matches!(&mutations[2], Call::SetQueuePolicy(url, _) if url == QUEUE_URL));

    assert_eq!(test.metrics.mutations("create_rule"), 1);
    assert_eq!(test.metrics.mutations("attach_target"), 1);
    assert_eq!(test.metrics.mutations("set_queue_policy"), 1);
}

/// The rule is read back after creation to learn its ARN.
#[tokio::test]
async fn describes_rule_again_after_creating_it() {
    let test = TestConfig::fresh();
    let arn = test.reconciler().ensure_rule(&test.names).await.unwrap();
    assert_eq!(arn, test.aws.rule(RULE).unwrap().arn.unwrap());
    assert_eq!(
        test.aws.calls(),
        vec![
            Call::DescribeRule(RULE.to_string()),
            Call::PutRule(asg_rule_spec()),
            Call::DescribeRule(RULE.to_string()),
        ]
    );
}

/// A fully wired pipeline is only read.
#[tokio::test]
async fn skips_existing_target_and_policy() {
    let test = TestConfig::wired();
    test.reconciler().reconcile_rule(&test.names).await.unwrap();

    assert_eq!(
        test.aws.calls(),
        vec![
            Call::DescribeRule(RULE.to_string()),
            Call::GetQueueUrl(QUEUE.to_string()),
            Call::GetQueueAttributes(QUEUE_URL.to_string()),
            Call::ListTargets(RULE.to_string()),
        ]
    );
    assert_eq!(test.aws.queue_policy(QUEUE).as_deref(), Some("some policy"));
}

#[tokio::test]
async fn second_reconcile_issues_no_mutations() {
    let test = TestConfig::fresh();
    let pipeline = test.pipeline();

    pipeline.reconcile_asg_ec2_events(CLUSTER).await.unwrap();
    let rule = test.aws.rule(RULE);
    let targets = test.aws.targets(RULE);
    let policy = test.aws.queue_policy(QUEUE);
    test.aws.clear_calls();

    pipeline.reconcile_asg_ec2_events(CLUSTER).await.unwrap();
    assert_eq!(test.aws.mutations(), Vec::<Call>::new());
    assert_eq!(test.aws.rule(RULE), rule);
    assert_eq!(test.aws.targets(RULE), targets);
    assert_eq!(test.aws.queue_policy(QUEUE), policy);
    assert_eq!(test.metrics.operations("reconcile", "success"), 2);
}

/// A policy set by someone else is never replaced, even if it does not
/// authorize this rule.
#[tokio::test]
async fn preserves_existing_policy() {
    let test = TestConfig::fresh();
    test.aws
        .add_queue(QUEUE, QUEUE_ARN, Some(r#"{"Statement":[]}"#));

    test.reconciler().reconcile_rule(&test.names).await.unwrap();

    assert_eq!(
        test.aws.queue_policy(QUEUE).as_deref(),
        Some(r#"{"Statement":[]}"#)
    );
    assert!(!test
        .aws
        .calls()
        .iter()
        .any(|c| matches!(c, Call::SetQueuePolicy(..))));
}

#[tokio::test]
async fn empty_policy_is_replaced() {
    let test = TestConfig::fresh();
    test.aws.add_queue(QUEUE, QUEUE_ARN, Some(""));

    test.reconciler().reconcile_rule(&test.names).await.unwrap();

    let policy = test.aws.queue_policy(QUEUE).unwrap();
    assert!(policy.contains("sqs:SendMessage"), "{policy}");
}

/// A foreign target is kept and the cluster's own target is added beside it.
#[tokio::test]
async fn preserves_unrelated_targets() {
    let test = TestConfig::fresh();
    test.aws.add_rule(RULE, RULE_ARN);
    test.aws.add_target(RULE, "another-queue", "another-queue-arn");

    test.reconciler().reconcile_rule(&test.names).await.unwrap();

    assert_eq!(
        test.aws.targets(RULE),
        vec![
            target("another-queue", "another-queue-arn"),
            target(QUEUE, QUEUE_ARN),
        ]
    );
    assert!(test.aws.calls().contains(&Call::PutTargets(
        RULE.to_string(),
        vec![target(QUEUE, QUEUE_ARN)]
    )));
}

/// A target with the cluster's id that points at another ARN is not a match,
/// so the target is put again with the queue's ARN.
#[tokio::test]
async fn repairs_target_with_wrong_arn() {
    let test = TestConfig::fresh();
    test.aws.add_rule(RULE, RULE_ARN);
    test.aws.add_target(RULE, QUEUE, "stale-arn");

    test.reconciler().reconcile_rule(&test.names).await.unwrap();

    assert_eq!(test.aws.targets(RULE), vec![target(QUEUE, QUEUE_ARN)]);
}

#[tokio::test]
async fn describe_failure_stops_reconcile() {
    let test = TestConfig::fresh();
    test.aws.fail_on("DescribeRule", ErrorKind::Transient);

    let error = test
        .reconciler()
        .reconcile_rule(&test.names)
        .await
        .expect_err("reconcile must fail");

    assert_eq!(error.kind(), ErrorKind::Transient);
    assert_eq!(error.stage(), Some(Stage::EnsureRule));
    assert_eq!(test.aws.calls(), vec![Call::DescribeRule(RULE.to_string())]);
}

#[tokio::test]
async fn failures_are_attributed_to_their_stage() {
    for (operation, stage) in [
        ("PutRule", Stage::EnsureRule),
        ("GetQueueUrl", Stage::ResolveQueue),
        ("GetQueueAttributes", Stage::ResolveQueue),
        ("ListTargets", Stage::EnsureTarget),
        ("PutTargets", Stage::EnsureTarget),
        ("SetQueuePolicy", Stage::EnsureQueuePolicy),
    ] {
        let test = TestConfig::fresh();
        test.aws.fail_on(operation, ErrorKind::Other);

        let error = test
            .reconciler()
            .reconcile_rule(&test.names)
            .await
            .expect_err("reconcile must fail");
        assert_eq!(error.stage(), Some(stage), "{operation}");
        assert_eq!(error.kind(), ErrorKind::Other, "{operation}");
    }
}

/// Reconciling before the queue exists is an ordinary error.
#[tokio::test]
async fn missing_queue_is_an_error() {
    let test = TestConfig::default_with_aws(FakeAws::default());

    let error = test
        .reconciler()
        .reconcile_rule(&test.names)
        .await
        .expect_err("reconcile must fail");

    assert_eq!(error.stage(), Some(Stage::ResolveQueue));
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert!(!test
        .aws
        .calls()
        .iter()
        .any(|c| matches!(c, Call::ListTargets(_) | Call::PutTargets(..))));
}

/// Dropping a stalled reconcile abandons the stages that follow.
#[tokio::test]
async fn cancelled_reconcile_stops_early() {
    let test = TestConfig::fresh();
    test.aws.stall_on("ListTargets");

    let res = time::timeout(
        time::Duration::from_millis(50),
        test.pipeline().reconcile_asg_ec2_events(CLUSTER),
    )
    .await;

    assert!(res.is_err(), "reconcile must not complete");
    assert_eq!(test.aws.queue_policy(QUEUE), None);
    assert!(!test
        .aws
        .calls()
        .iter()
        .any(|c| matches!(c, Call::PutTargets(..) | Call::SetQueuePolicy(..))));
}

#[tokio::test]
async fn removes_target_and_rule() {
    let test = TestConfig::wired();
    test.reconciler().delete_rule(&test.names).await.unwrap();

    assert_eq!(
        test.aws.calls(),
        vec![
            Call::RemoveTargets(RULE.to_string(), vec![QUEUE.to_string()]),
            Call::DeleteRule(RULE.to_string()),
        ]
    );
    assert_eq!(test.aws.rule(RULE), None);
}

/// The rule is still deleted when its target is already gone.
#[tokio::test]
async fn deletes_rule_when_target_is_missing() {
    let test = TestConfig::wired();
    test.aws.fail_on("RemoveTargets", ErrorKind::NotFound);

    test.reconciler().delete_rule(&test.names).await.unwrap();

    assert_eq!(test.aws.rule(RULE), None);
}

#[tokio::test]
async fn delete_surfaces_unexpected_errors() {
    let test = TestConfig::wired();
    test.aws.fail_on("RemoveTargets", ErrorKind::Transient);
    let error = test
        .reconciler()
        .delete_rule(&test.names)
        .await
        .expect_err("delete must fail");
    assert_eq!(error.stage(), Some(Stage::RemoveTarget));
    assert_eq!(error.kind(), ErrorKind::Transient);
    assert!(test.aws.rule(RULE).is_some());

    let test = TestConfig::wired();
    test.aws.fail_on("DeleteRule", ErrorKind::Other);
    let error = test
        .reconciler()
        .delete_rule(&test.names)
        .await
        .expect_err("delete must fail");
    assert_eq!(error.stage(), Some(Stage::DeleteRule));
}

/// Deleting a cluster that has nothing left is a success.
#[tokio::test]
async fn delete_tolerates_absent_resources() {
    let test = TestConfig::default_with_aws(FakeAws::default());

    test.pipeline().delete_asg_ec2_events(CLUSTER).await.unwrap();

    assert_eq!(
        test.aws.calls(),
        vec![
            Call::RemoveTargets(RULE.to_string(), vec![QUEUE.to_string()]),
            Call::DeleteRule(RULE.to_string()),
            Call::DeleteQueue(QUEUE.to_string()),
        ]
    );
    assert_eq!(test.metrics.operations("delete", "success"), 1);
}

#[tokio::test]
async fn delete_removes_rule_before_queue() {
    let test = TestConfig::wired();
    test.pipeline().delete_asg_ec2_events(CLUSTER).await.unwrap();

    let calls = test.aws.calls();
    let rule_deleted = calls
        .iter()
        .position(|c| matches!(c, Call::DeleteRule(_)))
        .unwrap();
    let queue_deleted = calls
        .iter()
        .position(|c| matches!(c, Call::DeleteQueue(_)))
        .unwrap();
    assert!(rule_deleted < queue_deleted);
    assert!(!test.aws.has_queue(QUEUE));
}

/// A failed rule deletion leaves the queue in place for the next attempt.
#[tokio::test]
async fn delete_keeps_queue_when_rule_deletion_fails() {
    let test = TestConfig::wired();
    test.aws.fail_on("DeleteRule", ErrorKind::Transient);

    test.pipeline()
        .delete_asg_ec2_events(CLUSTER)
        .await
        .expect_err("delete must fail");

    assert!(test.aws.has_queue(QUEUE));
    assert_eq!(test.metrics.operations("delete", "transient"), 1);
}

/// Reconciling, deleting and reconciling again addresses the same resources.
#[tokio::test]
async fn reconcile_after_delete_recreates_same_resources() {
    let test = TestConfig::default_with_aws(FakeAws::default());
    let pipeline = test.pipeline();

    pipeline.reconcile_asg_ec2_events(CLUSTER).await.unwrap();
    let first = test.aws.calls();
    pipeline.delete_asg_ec2_events(CLUSTER).await.unwrap();
    assert_eq!(test.aws.rule(RULE), None);
    test.aws.clear_calls();

    pipeline.reconcile_asg_ec2_events(CLUSTER).await.unwrap();
    assert_eq!(test.aws.calls(), first);
    assert!(test.aws.rule(RULE).is_some());
    assert_eq!(test.aws.targets(RULE).len(), 1);
}

#[tokio::test]
async fn reconcile_fails_fast_when_queue_cannot_be_ensured() {
    let test = TestConfig::fresh();
    test.aws.fail_on("EnsureQueue", ErrorKind::Other);

    let error = test
        .pipeline()
        .reconcile_asg_ec2_events(CLUSTER)
        .await
        .expect_err("reconcile must fail");

    assert_eq!(error.stage(), Some(Stage::EnsureQueue));
    assert_eq!(test.aws.calls(), vec![Call::EnsureQueue(QUEUE.to_string())]);
    assert_eq!(test.metrics.operations("reconcile", "error"), 1);
}
