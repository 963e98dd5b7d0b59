//! Client-facing event types
//!
//! Events are serialized as JSON lines on the client connection. Two shapes
//! exist: connectivity transitions and raw position reports.

use serde::Serialize;

/// Connectivity state of the controller link as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Outbound event pushed to every connected client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Link connectivity transition with a human-readable diagnostic
    ConnectionStatus {
        status: ConnectivityStatus,
        message: String,
    },
    /// Raw position line from the controller, forwarded unmodified
    RobotStatus { data: String },
}

impl ClientEvent {
    pub fn connection_status(status: ConnectivityStatus, message: impl Into<String>) -> Self {
        ClientEvent::ConnectionStatus {
            status,
            message: message.into(),
        }
    }

    pub fn robot_status(data: impl Into<String>) -> Self {
        ClientEvent::RobotStatus { data: data.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_status_json_shape() {
        let event =
            ClientEvent::connection_status(ConnectivityStatus::Connecting, "Procurando controlador");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"connection_status","status":"connecting","message":"Procurando controlador"}"#
        );
    }

    #[test]
    fn test_robot_status_json_shape() {
        let event = ClientEvent::robot_status("pos:120,45");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"robot_status","data":"pos:120,45"}"#);
    }

    #[test]
    fn test_status_values_lowercase() {
        for (status, expected) in [
            (ConnectivityStatus::Disconnected, "\"disconnected\""),
            (ConnectivityStatus::Connecting, "\"connecting\""),
            (ConnectivityStatus::Connected, "\"connected\""),
        ] {
            assert_eq!(serde_json::to_string(&status).unwrap(), expected);
        }
    }
}
