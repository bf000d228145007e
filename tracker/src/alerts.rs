use std::sync::Mutex;

use crate::session::TrackingEvent;

/// Vibration pattern (on, off, on) played when the runner leaves the route.
pub const OFF_ROUTE_VIBRATION_MS: [u64; 3] = [100, 50, 100];

/// Output channels for alerts: haptics, speech and on-screen cues.
pub trait AlertSink: Send + Sync {
    fn vibrate(&self, pattern_ms: &[u64]);
    fn speak(&self, text: &str);
    fn display(&self, _event: &TrackingEvent) {}
}

/// Routes one tracking event to the right channels.
pub fn deliver(sink: &dyn AlertSink, event: &TrackingEvent) {
    if matches!(event, TrackingEvent::OffRoute { .. }) {
        sink.vibrate(&OFF_ROUTE_VIBRATION_MS);
    }
    if let Some(text) = event.announcement() {
        sink.speak(&text);
    }
    sink.display(event);
}

/// Writes alerts to the log; used by the command line replay.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn vibrate(&self, pattern_ms: &[u64]) {
        tracing::info!("vibrate {:?}", pattern_ms);
    }

    fn speak(&self, text: &str) {
        tracing::info!("say: {}", text);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    Vibrate(Vec<u64>),
    Speak(String),
    Display(TrackingEvent),
}

/// Keeps every alert in memory so tests can inspect them.
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryAlertSink {
    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|alert| match alert {
                Alert::Speak(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn vibrations(&self) -> usize {
        self.lock()
            .iter()
            .filter(|alert| matches!(alert, Alert::Vibrate(_)))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Alert>> {
        // a poisoned log is still readable
        self.alerts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AlertSink for MemoryAlertSink {
    fn vibrate(&self, pattern_ms: &[u64]) {
        self.lock().push(Alert::Vibrate(pattern_ms.to_vec()));
    }

    fn speak(&self, text: &str) {
        self.lock().push(Alert::Speak(text.to_string()));
    }

    fn display(&self, event: &TrackingEvent) {
        self.lock().push(Alert::Display(event.clone()));
    }
}
