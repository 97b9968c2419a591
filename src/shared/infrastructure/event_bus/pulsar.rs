// Producer speaking the Pulsar REST publish API. Messages are keyed by
// aggregate id; the broker acknowledges only after the configured replicas
// have the message, and transient transport errors are retried here before
// the failure bubbles up to the dispatcher's own retry policy.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{EventEnvelope, EventProducer, EventProducerError};
use crate::config::BusConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const PUBLISH_ATTEMPTS: u32 = 3;
const PUBLISH_RETRY_PAUSE: Duration = Duration::from_millis(500);

pub struct PulsarEventBus {
    client: Client,
    base_url: String,
    tenant: String,
    namespace: String,
    producer_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProducerMessage {
    payload: String,
    key: Option<String>,
    context: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProducerBody {
    producer_name: String,
    messages: Vec<ProducerMessage>,
}

impl PulsarEventBus {
    pub fn new(config: &BusConfig) -> Result<Self, EventProducerError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| EventProducerError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            tenant: config.tenant.clone(),
            namespace: config.namespace.clone(),
            producer_name: config.producer_name.clone(),
        })
    }

    fn topic_url(&self, topic: &str) -> String {
        format!(
            "{}/topics/persistent/{}/{}/{}",
            self.base_url, self.tenant, self.namespace, topic
        )
    }
}

#[async_trait]
impl EventProducer for PulsarEventBus {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(), EventProducerError> {
        // The payload is the serialized envelope; its event id doubles as
        // the broker-side message context for consumer deduplication.
        let context = serde_json::from_slice::<EventEnvelope>(payload)
            .ok()
            .map(|envelope| envelope.event_id);

        let body = ProducerBody {
            producer_name: self.producer_name.clone(),
            messages: vec![ProducerMessage {
                payload: String::from_utf8_lossy(payload).into_owned(),
                key: Some(key.to_string()),
                context,
            }],
        };

        let url = self.topic_url(topic);
        let mut last_error = EventProducerError::Transport("no publish attempt made".into());

        for attempt in 1..=PUBLISH_ATTEMPTS {
            match self.client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(topic, key, "published message to bus");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status();
                    if !(status.is_server_error() || status.as_u16() == 429) {
                        return Err(EventProducerError::Rejected(status.as_u16()));
                    }
                    warn!(topic, key, attempt, %status, "broker publish failed, retrying");
                    last_error = EventProducerError::Rejected(status.as_u16());
                }
                Err(err) => {
                    warn!(topic, key, attempt, error = %err, "bus transport error, retrying");
                    last_error = EventProducerError::Transport(err.to_string());
                }
            }

            if attempt < PUBLISH_ATTEMPTS {
                tokio::time::sleep(PUBLISH_RETRY_PAUSE).await;
            }
        }

        Err(last_error)
    }
}
