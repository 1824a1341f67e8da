use crate::error::from_sdk;
use asg_event_controller_core::{
    client::Result, ApiError, ErrorKind, EventRules, Rule, RuleSpec, RuleState, Target,
};
use aws_sdk_eventbridge::types;
use aws_types::SdkConfig;
use tracing::debug;

/// The event-rule service, backed by Amazon EventBridge.
#[derive(Clone, Debug)]
pub struct EventBridgeRules {
    client: aws_sdk_eventbridge::Client,
}

impl EventBridgeRules {
    pub fn new(config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_eventbridge::Client::new(config))
    }

    pub fn from_client(client: aws_sdk_eventbridge::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl EventRules for EventBridgeRules {
    async fn describe_rule(&self, name: &str) -> Result<Rule> {
        let rsp = self
            .client
            .describe_rule()
            .name(name)
            .send()
            .await
            .map_err(|e| from_sdk("DescribeRule", e))?;

        let state = match rsp.state {
            Some(types::RuleState::Disabled) => RuleState::Disabled,
            _ => RuleState::Enabled,
        };
        Ok(Rule {
            name: rsp.name.unwrap_or_else(|| name.to_string()),
            arn: rsp.arn,
            event_pattern: rsp.event_pattern,
            state,
        })
    }

    async fn put_rule(&self, rule: &RuleSpec) -> Result<()> {
        let state = match rule.state {
            RuleState::Enabled => types::RuleState::Enabled,
            RuleState::Disabled => types::RuleState::Disabled,
        };
        let rsp = self
            .client
            .put_rule()
            .name(&rule.name)
            .event_pattern(&rule.event_pattern)
            .state(state)
            .send()
            .await
            .map_err(|e| from_sdk("PutRule", e))?;
        debug!(rule = %rule.name, arn = ?rsp.rule_arn, "Put event rule");
        Ok(())
    }

    async fn list_targets(&self, rule: &str) -> Result<Vec<Target>> {
        let mut targets = Vec::new();
        let mut next_token = None;
        loop {
            let rsp = self
                .client
                .list_targets_by_rule()
                .rule(rule)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| from_sdk("ListTargetsByRule", e))?;

            targets.extend(rsp.targets.unwrap_or_default().into_iter().map(|t| Target {
                id: t.id,
                arn: t.arn,
            }));

            match rsp.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => return Ok(targets),
            }
        }
    }

    async fn put_targets(&self, rule: &str, targets: &[Target]) -> Result<()> {
        let mut req = self.client.put_targets().rule(rule);
        for target in targets {
            let target = types::Target::builder()
                .id(&target.id)
                .arn(&target.arn)
                .build()
                .map_err(|e| ApiError::new(ErrorKind::Other, "PutTargets").with_source(e))?;
            req = req.targets(target);
        }

        let rsp = req.send().await.map_err(|e| from_sdk("PutTargets", e))?;
        partial_failure(
            "PutTargets",
            rsp.failed_entry_count,
            rsp.failed_entries
                .unwrap_or_default()
                .into_iter()
                .map(|e| e.error_code),
        )
    }

    async fn remove_targets(&self, rule: &str, ids: &[String]) -> Result<()> {
        let rsp = self
            .client
            .remove_targets()
            .rule(rule)
            .set_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| from_sdk("RemoveTargets", e))?;
        partial_failure(
            "RemoveTargets",
            rsp.failed_entry_count,
            rsp.failed_entries
                .unwrap_or_default()
                .into_iter()
                .map(|e| e.error_code),
        )
    }

    async fn delete_rule(&self, name: &str) -> Result<()> {
        self.client
            .delete_rule()
            .name(name)
            .send()
            .await
            .map_err(|e| from_sdk("DeleteRule", e))?;
        Ok(())
    }
}

/// Target operations succeed at the API level even when individual entries
/// fail, so the per-entry results are checked as well.
fn partial_failure(
    operation: &'static str,
    failed: i32,
    mut codes: impl Iterator<Item = Option<String>>,
) -> Result<()> {
    if failed == 0 {
        return Ok(());
    }

    let code = codes.find_map(|code| code);
    let error = ApiError::new(crate::classify_code(code.as_deref()), operation)
        .with_source(format!("{failed} entries failed"));
    Err(match code {
        Some(code) => error.with_code(code),
        None => error,
    })
}
