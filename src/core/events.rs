use std::path::PathBuf;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use crate::core::types::Caller;

/// Notifications raised by the generator for whoever binds it to a UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum GeneratorEvent {
    ReadyChanged(bool),
    ProgressChanged(f64),
    ReportingChanged(bool),
    ReportComplete(PathBuf),
    /// Diagnostic text from the renderer or from a failed request
    RendererError(String),
    #[serde(rename_all = "camelCase")]
    NewImage { caller: Caller, path: PathBuf },
    #[serde(rename_all = "camelCase")]
    ImageFailed { caller: Caller, error: String },
}

/// Send side of the event stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<GeneratorEvent>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<GeneratorEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: GeneratorEvent) {
        // A dropped receiver only means nobody is listening any more
        if self.tx.send(event).is_err() {
            debug!("Event receiver gone, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_for_frontends() {
        let event = GeneratorEvent::NewImage {
            caller: 3,
            path: PathBuf::from("/tmp/img-1.png"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "newImage");
        assert_eq!(json["payload"]["caller"], 3);
        assert_eq!(json["payload"]["path"], "/tmp/img-1.png");
    }

    #[test]
    fn emit_survives_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        EventSink::new(tx).emit(GeneratorEvent::ReadyChanged(true));
    }
}
