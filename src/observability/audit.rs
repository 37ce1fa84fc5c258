/// Structured session lifecycle events
///
/// Events are serialized to JSON and emitted on the `chrootbox::audit` log
/// target so they can be routed separately from diagnostic output.
use crate::config::types::SetupPhase;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    SessionCloned,
    SourceCloned,
    SetupStarted,
    SetupCompleted,
    SetupFailed,
    DeviceLocked,
    DeviceUnlocked,
    SessionRecorded,
    SessionRemoved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub timestamp: DateTime<Utc>,
    pub chroot: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<SetupPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, chroot: impl Into<String>) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            chroot: chroot.into(),
            phase: None,
            details: None,
        }
    }

    pub fn with_phase(mut self, phase: SetupPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Emit on the audit log target
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => info!(target: "chrootbox::audit", "{}", json),
            Err(e) => error!(target: "chrootbox::audit", "failed to serialize audit event: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_phase_name() {
        let event = AuditEvent::new(AuditEventType::SetupStarted, "sid")
            .with_phase(SetupPhase::Start)
            .with_details("status 0");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"SetupStarted\""));
        assert!(json.contains("\"setup-start\""));
        assert!(json.contains("\"chroot\":\"sid\""));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let json = serde_json::to_string(&AuditEvent::new(AuditEventType::SessionRemoved, "s1")).unwrap();
        assert!(!json.contains("phase"));
        assert!(!json.contains("details"));
    }
}
