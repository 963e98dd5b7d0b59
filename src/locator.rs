//! Controller discovery via serial port enumeration
//!
//! Scans the available serial ports and picks the first one whose USB
//! descriptor strings match a known controller signature. Absence is a
//! normal, recurring condition while the robot is unplugged; it is never
//! an error.

use serialport::{SerialPortInfo, SerialPortType};

/// Find the first serial port matching one of the controller signatures
///
/// Signatures are matched as substrings of the port's USB product,
/// manufacturer, and serial strings (e.g. "Arduino", "CH340").
pub fn find(signatures: &[String]) -> Option<String> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            log::warn!("Serial port enumeration failed: {}", e);
            return None;
        }
    };

    for info in &ports {
        let description = port_description(info);
        if matches_signature(&description, signatures) {
            log::info!(
                "Controller found on {} ({})",
                info.port_name,
                description
            );
            return Some(info.port_name.clone());
        }
    }
    None
}

/// Human-readable descriptor for a port (USB strings joined)
fn port_description(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let mut parts: Vec<&str> = Vec::new();
            if let Some(m) = usb.manufacturer.as_deref() {
                parts.push(m);
            }
            if let Some(p) = usb.product.as_deref() {
                parts.push(p);
            }
            if let Some(s) = usb.serial_number.as_deref() {
                parts.push(s);
            }
            parts.join(" ")
        }
        _ => String::new(),
    }
}

/// True if the description contains any of the signatures
pub fn matches_signature(description: &str, signatures: &[String]) -> bool {
    signatures.iter().any(|s| description.contains(s.as_str()))
}
