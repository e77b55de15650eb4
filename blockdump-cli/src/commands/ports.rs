//! List-ports command implementation.

use blockdump::{DetectedPort, detect_ports, format_port_list};
use console::style;
use serde::Serialize;

/// Detected port plus the display fields shown by `--json`.
#[derive(Serialize)]
struct PortEntry<'a> {
    #[serde(flatten)]
    port: &'a DetectedPort,
    device_name: &'static str,
    known: bool,
}

impl<'a> From<&'a DetectedPort> for PortEntry<'a> {
    fn from(port: &'a DetectedPort) -> Self {
        Self {
            port,
            device_name: port.device.name(),
            known: port.device.is_known(),
        }
    }
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> anyhow::Result<()> {
    let detected = detect_ports();

    if json {
        let entries: Vec<PortEntry<'_>> = detected
            .iter()
            .map(PortEntry::from)
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
    } else {
        for line in format_port_list(&detected) {
            eprintln!("  {} {}", style("•").green(), line);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockdump::{DeviceKind, TransportKind};

    #[test]
    fn test_port_entry_fields() {
        let port = DetectedPort {
            name: "/dev/ttyUSB0".to_string(),
            transport: TransportKind::Usb,
            device: DeviceKind::Cp210x,
            vid: Some(0x10C4),
            pid: Some(0xEA60),
            manufacturer: Some("Silicon Labs".to_string()),
            product: None,
            serial: Some("0001".to_string()),
        };

        let value = serde_json::to_value(PortEntry::from(&port)).unwrap();
        assert_eq!(value["name"], "/dev/ttyUSB0");
        assert_eq!(value["transport"], "usb");
        assert_eq!(value["device"], "cp210x");
        assert_eq!(value["device_name"], "CP210x");
        assert_eq!(value["known"], true);
        assert_eq!(value["vid"], 0x10C4);
        assert_eq!(value["serial"], "0001");
        assert!(value["product"].is_null());
    }

    #[test]
    fn test_port_entry_unlisted() {
        let port = DetectedPort::unlisted("COM36");
        let value = serde_json::to_value(PortEntry::from(&port)).unwrap();
        assert_eq!(value["transport"], "unknown");
        assert_eq!(value["device"], "unknown");
        assert_eq!(value["known"], false);
        assert!(value["vid"].is_null());
    }
}
