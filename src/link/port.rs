//! Serial device enumeration and the connection seam used by the link.
use std::fmt::Display;
use std::io::{Read, Write};
use std::time::Duration;

use serialport::{SerialPortInfo, SerialPortType};
use thiserror::Error;

/// Baud rate of the USB DMX interface.
pub const BAUD_RATE: u32 = 57_600;

/// A byte stream to the DMX interface.
pub trait Connection: Read + Write + Send {}

impl<T> Connection for T where T: Read + Write + Send {}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("no serial device matching \"{0}\" was found")]
    NoMatchingPort(String),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Description of one serial device found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescription {
    pub name: String,
    pub product: Option<String>,
    pub manufacturer: Option<String>,
}

impl PortDescription {
    /// Return true if the port name or its USB descriptors contain the substring.
    pub fn matches(&self, substring: &str) -> bool {
        self.name.contains(substring)
            || self
                .product
                .as_deref()
                .is_some_and(|p| p.contains(substring))
            || self
                .manufacturer
                .as_deref()
                .is_some_and(|m| m.contains(substring))
    }
}

impl Display for PortDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        match (&self.manufacturer, &self.product) {
            (Some(m), Some(p)) => write!(f, " ({m} {p})"),
            (None, Some(p)) => write!(f, " ({p})"),
            (Some(m), None) => write!(f, " ({m})"),
            (None, None) => Ok(()),
        }
    }
}

impl From<SerialPortInfo> for PortDescription {
    fn from(info: SerialPortInfo) -> Self {
        let (product, manufacturer) = match info.port_type {
            SerialPortType::UsbPort(usb) => (usb.product, usb.manufacturer),
            _ => (None, None),
        };
        Self {
            name: info.port_name,
            product,
            manufacturer,
        }
    }
}

/// List the serial devices currently available.
pub fn list_ports() -> Result<Vec<PortDescription>, LinkError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(PortDescription::from)
        .collect())
}

/// Find the first port whose description contains the substring.
pub fn find_port(ports: &[PortDescription], substring: &str) -> Option<PortDescription> {
    ports.iter().find(|p| p.matches(substring)).cloned()
}

/// Open the first serial device matching the substring.
pub fn open_matching(
    substring: &str,
    timeout: Duration,
) -> Result<(PortDescription, Box<dyn Connection>), LinkError> {
    let ports = list_ports()?;
    let port = find_port(&ports, substring)
        .ok_or_else(|| LinkError::NoMatchingPort(substring.to_string()))?;
    let serial = serialport::new(&port.name, BAUD_RATE)
        .timeout(timeout)
        .open()?;
    Ok((port, Box::new(serial)))
}

#[cfg(test)]
mod test {
    use super::*;

    fn ports() -> Vec<PortDescription> {
        vec![
            PortDescription {
                name: "/dev/ttyS0".to_string(),
                product: None,
                manufacturer: None,
            },
            PortDescription {
                name: "/dev/ttyUSB0".to_string(),
                product: Some("DMX USB PRO".to_string()),
                manufacturer: Some("ENTTEC".to_string()),
            },
        ]
    }

    #[test]
    fn test_find_by_name() {
        assert_eq!("/dev/ttyUSB0", find_port(&ports(), "USB").unwrap().name);
        assert_eq!("/dev/ttyS0", find_port(&ports(), "tty").unwrap().name);
    }

    #[test]
    fn test_find_by_descriptor() {
        assert_eq!("/dev/ttyUSB0", find_port(&ports(), "ENTTEC").unwrap().name);
        assert_eq!("/dev/ttyUSB0", find_port(&ports(), "DMX").unwrap().name);
        assert!(find_port(&ports(), "nope").is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!("/dev/ttyUSB0 (ENTTEC DMX USB PRO)", ports()[1].to_string());
    }
}
