//! Completion notifier: publish the terminal apply status to the message
//! broker's sidecar publish endpoint.
//!
//! At-least-once from the caller's perspective: the publish is attempted on
//! every terminal transition, and a delivery failure is logged without ever
//! blocking finalization.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use lap_config::MessageBrokerSection;
use lap_engine::CompletionNotifier;
use lap_schemas::ApplyStatus;

pub struct BrokerNotifier {
    publish_url: String,
    http: reqwest::Client,
}

impl BrokerNotifier {
    pub fn new(broker: &MessageBrokerSection) -> Self {
        BrokerNotifier {
            publish_url: broker.publish_url(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionNotifier for BrokerNotifier {
    async fn notify(&self, apply_id: &str, status: ApplyStatus) {
        let payload = json!({
            "applyID": apply_id,
            "status": status.as_str(),
        });
        match self.http.post(&self.publish_url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(apply_id, status = status.as_str(), "completion published");
            }
            Ok(resp) => {
                warn!(
                    apply_id,
                    status_code = resp.status().as_u16(),
                    "completion publish rejected"
                );
            }
            Err(err) => {
                warn!(apply_id, error = %err, "completion publish failed");
            }
        }
    }
}
