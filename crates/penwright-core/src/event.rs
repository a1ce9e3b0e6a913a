use crate::types::PipelineEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: PipelineEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    /// Shorthand for an agent progress line.
    pub fn agent_log(&self, agent: &str, message: impl Into<String>) {
        self.publish(PipelineEvent::AgentLog {
            agent: agent.to_string(),
            message: message.into(),
        });
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_agent_logs() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.agent_log("WRITER", "Writing final research report...");
        match rx.recv().await.unwrap() {
            PipelineEvent::AgentLog { agent, message } => {
                assert_eq!(agent, "WRITER");
                assert!(message.starts_with("Writing"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.agent_log("EDITOR", "nobody listening");
    }
}
