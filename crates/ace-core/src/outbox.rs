//! Outbox delivery for pipeline events.
//!
//! Mutating operations return `Vec<PipelineEvent>`; the host hands them to
//! `dispatch_all`. A dispatcher failure is logged and counted, and never
//! reaches the operation that already committed its write.

use tracing::{info, warn};

use ace_contracts::{error::AceResult, events::PipelineEvent};

use crate::traits::EventDispatcher;

/// Dispatcher that records each event as a structured log line.
#[derive(Debug, Default)]
pub struct LoggingDispatcher;

impl EventDispatcher for LoggingDispatcher {
    fn dispatch(&self, event: &PipelineEvent) -> AceResult<()> {
        let payload = serde_json::to_string(event).unwrap_or_default();
        info!(event = event.name(), %payload, "pipeline event");
        Ok(())
    }
}

/// Deliver every event, returning how many were delivered successfully.
pub fn dispatch_all(dispatcher: &dyn EventDispatcher, events: &[PipelineEvent]) -> usize {
    let mut delivered = 0;
    for event in events {
        match dispatcher.dispatch(event) {
            Ok(()) => delivered += 1,
            Err(e) => warn!(event = event.name(), error = %e, "event dispatch failed"),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use ace_contracts::{agent::TraceId, error::AceError};

    use super::*;

    /// Fails every other event and remembers the ones it accepted.
    struct FlakyDispatcher {
        calls: Arc<Mutex<u32>>,
        accepted: Arc<Mutex<Vec<String>>>,
    }

    impl EventDispatcher for FlakyDispatcher {
        fn dispatch(&self, event: &PipelineEvent) -> AceResult<()> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls % 2 == 0 {
                return Err(AceError::Capability {
                    capability: "event sink".to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            self.accepted.lock().unwrap().push(event.name().to_string());
            Ok(())
        }
    }

    #[test]
    fn dispatch_all_counts_successes_and_keeps_going_after_failures() {
        let dispatcher = FlakyDispatcher {
            calls: Arc::new(Mutex::new(0)),
            accepted: Arc::new(Mutex::new(vec![])),
        };
        let events = vec![
            PipelineEvent::CurationDue { agent: "a".to_string() },
            PipelineEvent::SatisfactionRecorded { trace_id: TraceId::new("t"), score: 5 },
            PipelineEvent::ReflectionDue { agent: "a".to_string(), pending_traces: 10 },
        ];

        let delivered = dispatch_all(&dispatcher, &events);

        assert_eq!(delivered, 2);
        assert_eq!(*dispatcher.calls.lock().unwrap(), 3);
        assert_eq!(
            *dispatcher.accepted.lock().unwrap(),
            vec!["curation_due".to_string(), "reflection_due".to_string()]
        );
    }

    #[test]
    fn logging_dispatcher_never_fails() {
        let events = vec![PipelineEvent::CurationDue { agent: "a".to_string() }];
        assert_eq!(dispatch_all(&LoggingDispatcher, &events), 1);
    }
}
