//! Builds the queue access policy that lets an event rule deliver to a queue.

use crate::ResourceNames;
use serde::Serialize;

const POLICY_VERSION: &str = "2012-10-17";
const EVENTS_SERVICE_PRINCIPAL: &str = "events.amazonaws.com";
const SEND_MESSAGE_ACTION: &str = "sqs:SendMessage";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub sid: String,
    pub principal: Principal,
    pub effect: Effect,
    pub action: Vec<String>,
    pub resource: Vec<String>,
    pub condition: Condition,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Principal {
    pub service: Vec<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Condition {
    pub arn_equals: SourceArn,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceArn {
    #[serde(rename = "aws:SourceArn")]
    pub source_arn: String,
}

/// Grants the event-rule service permission to send messages to `queue_arn`,
/// but only on behalf of the rule identified by `rule_arn`.
pub fn build(names: &ResourceNames, rule_arn: &str, queue_arn: &str) -> PolicyDocument {
    PolicyDocument {
        version: POLICY_VERSION.to_string(),
        statement: vec![PolicyStatement {
            sid: format!("CAPAEvents_{}_{}", names.rule, names.queue),
            principal: Principal {
                service: vec![EVENTS_SERVICE_PRINCIPAL.to_string()],
            },
            effect: Effect::Allow,
            action: vec![SEND_MESSAGE_ACTION.to_string()],
            resource: vec![queue_arn.to_string()],
            condition: Condition {
                arn_equals: SourceArn {
                    source_arn: rule_arn.to_string(),
                },
            },
        }],
        id: queue_arn.to_string(),
    }
}

impl PolicyDocument {
    /// Encodes the document as compact JSON, ready to be set as a queue's
    /// `Policy` attribute.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
