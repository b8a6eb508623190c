//! Domain event sink.
//!
//! Events go to NATS when a client is configured and to the log otherwise.
//! Publishing happens after the store commit, so a failure here is logged
//! and never fails the request.

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct Notifier { nats: Option<async_nats::Client> }

impl Notifier {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// Log-only sink.
    pub fn disabled() -> Self { Self::default() }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(&event).await;
        }
    }

    pub async fn publish(&self, event: &DomainEvent) {
        let subject = event.subject();
        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(subject, error = %e, "failed to encode event");
                return;
            }
        };
        match &self.nats {
            Some(client) => {
                if let Err(e) = client.publish(subject.to_string(), payload.into()).await {
                    tracing::warn!(subject, error = %e, "failed to publish event");
                }
            }
            None => tracing::debug!(subject, payload = %String::from_utf8_lossy(&payload), "event"),
        }
    }
}
