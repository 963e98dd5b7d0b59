//! Telemetry line parser for the controller's wire protocol
//!
//! The controller emits newline-terminated text lines dispatched by prefix:
//!
//! | Prefix    | Meaning                                        |
//! |-----------|------------------------------------------------|
//! | `ack:`    | Command acknowledgement (log-only)             |
//! | `pos:`    | Position report, forwarded to clients verbatim |
//! | `status:` | Firmware status message                        |
//!
//! Unknown prefixes are ignored so newer firmware can add message types
//! without breaking the bridge.

use crate::events::ConnectivityStatus;

/// Token the firmware includes in its status line once ready to move
const READY_TOKEN: &str = "pronto";

/// One decoded telemetry line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// Command acknowledgement, raw line included
    Ack(String),
    /// Position report, raw line included (payload is opaque)
    Position(String),
    /// Firmware status text, prefix stripped and trimmed
    Status(String),
}

/// Decode one telemetry line; unknown prefixes yield `None`
pub fn parse_line(line: &str) -> Option<TelemetryEvent> {
    if line.starts_with("ack:") {
        Some(TelemetryEvent::Ack(line.to_string()))
    } else if line.starts_with("pos:") {
        Some(TelemetryEvent::Position(line.to_string()))
    } else if let Some(rest) = line.strip_prefix("status:") {
        Some(TelemetryEvent::Status(rest.trim().to_string()))
    } else {
        None
    }
}

/// Classify a firmware status message as a connectivity state
///
/// A status containing the ready token means the controller has finished
/// homing/calibration; anything else is still part of the boot sequence.
pub fn classify_status(message: &str) -> ConnectivityStatus {
    if message.to_lowercase().contains(READY_TOKEN) {
        ConnectivityStatus::Connected
    } else {
        ConnectivityStatus::Connecting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_line() {
        assert_eq!(
            parse_line("ack:10,20,0,5,1"),
            Some(TelemetryEvent::Ack("ack:10,20,0,5,1".to_string()))
        );
    }

    #[test]
    fn test_position_line_kept_verbatim() {
        assert_eq!(
            parse_line("pos:120,45"),
            Some(TelemetryEvent::Position("pos:120,45".to_string()))
        );
    }

    #[test]
    fn test_status_line_trimmed() {
        assert_eq!(
            parse_line("status: Sistema pronto"),
            Some(TelemetryEvent::Status("Sistema pronto".to_string()))
        );
    }

    #[test]
    fn test_unknown_prefix_ignored() {
        assert_eq!(parse_line("noise"), None);
        assert_eq!(parse_line("debug: internal"), None);
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn test_ready_status_classified_connected() {
        assert_eq!(
            classify_status("Sistema pronto"),
            ConnectivityStatus::Connected
        );
        // Token match is case-insensitive
        assert_eq!(classify_status("PRONTO"), ConnectivityStatus::Connected);
    }

    #[test]
    fn test_boot_status_classified_connecting() {
        assert_eq!(classify_status("Calibrando"), ConnectivityStatus::Connecting);
        assert_eq!(classify_status("Homing eixo Z"), ConnectivityStatus::Connecting);
    }
}
