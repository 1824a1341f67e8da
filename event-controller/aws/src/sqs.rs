use crate::error::from_sdk;
use asg_event_controller_core::{
    client::Result, ApiError, ErrorKind, QueueAttributes, QueueProvisioner, Queues,
};
use aws_sdk_sqs::{error::ProvideErrorMetadata, types::QueueAttributeName};
use aws_types::SdkConfig;
use tracing::{debug, info};

/// Consumers long-poll the queue for up to this many seconds.
const RECEIVE_MESSAGE_WAIT_TIME_SECS: &str = "20";

/// Codes returned when creating a queue whose name is already taken.
const QUEUE_EXISTS_CODES: &[&str] = &[
    "QueueAlreadyExists",
    "QueueNameExists",
    "AWS.SimpleQueueService.QueueNameExists",
];

/// The queue service, backed by Amazon SQS.
#[derive(Clone, Debug)]
pub struct SqsQueues {
    client: aws_sdk_sqs::Client,
}

impl SqsQueues {
    pub fn new(config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_sqs::Client::new(config))
    }

    pub fn from_client(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Queues for SqsQueues {
    async fn get_queue_url(&self, name: &str) -> Result<String> {
        let rsp = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| from_sdk("GetQueueUrl", e))?;
        rsp.queue_url.ok_or_else(|| {
            ApiError::new(ErrorKind::Other, "GetQueueUrl").with_source("response has no queue URL")
        })
    }

    async fn get_queue_attributes(&self, url: &str) -> Result<QueueAttributes> {
        let rsp = self
            .client
            .get_queue_attributes()
            .queue_url(url)
            .attribute_names(QueueAttributeName::QueueArn)
            .attribute_names(QueueAttributeName::Policy)
            .send()
            .await
            .map_err(|e| from_sdk("GetQueueAttributes", e))?;

        let mut attrs = rsp.attributes.unwrap_or_default();
        Ok(QueueAttributes {
            arn: attrs.remove(&QueueAttributeName::QueueArn),
            policy: attrs.remove(&QueueAttributeName::Policy),
        })
    }

    async fn set_queue_policy(&self, url: &str, policy: &str) -> Result<()> {
        self.client
            .set_queue_attributes()
            .queue_url(url)
            .attributes(QueueAttributeName::Policy, policy)
            .send()
            .await
            .map_err(|e| from_sdk("SetQueueAttributes", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl QueueProvisioner for SqsQueues {
    async fn ensure_queue(&self, name: &str) -> Result<()> {
        let res = self
            .client
            .create_queue()
            .queue_name(name)
            .attributes(
                QueueAttributeName::ReceiveMessageWaitTimeSeconds,
                RECEIVE_MESSAGE_WAIT_TIME_SECS,
            )
            .send()
            .await;
        match res {
            Ok(rsp) => {
                debug!(queue = %name, url = ?rsp.queue_url, "Queue exists");
                Ok(())
            }
            Err(error) if error.code().is_some_and(|c| QUEUE_EXISTS_CODES.contains(&c)) => {
                debug!(queue = %name, "Queue already exists with other attributes");
                Ok(())
            }
            Err(error) => Err(from_sdk("CreateQueue", error)),
        }
    }

    async fn delete_queue(&self, name: &str) -> Result<()> {
        let url = match self.get_queue_url(name).await {
            Ok(url) => url,
            Err(error) if error.is_not_found() => {
                debug!(queue = %name, "Queue already deleted");
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        match self.client.delete_queue().queue_url(&url).send().await {
            Ok(_) => {
                info!(queue = %name, "Deleted queue");
                Ok(())
            }
            Err(error) => {
                let error = from_sdk("DeleteQueue", error);
                if error.is_not_found() {
                    debug!(queue = %name, "Queue already deleted");
                    return Ok(());
                }
                Err(error)
            }
        }
    }
}
