//! Serial link
//!
//! The transport only needs to write bytes and read "at least n" bytes back.
//! [`SerialLink`] is that seam; [`SerialPortLink`] implements it on top of
//! the `serialport` crate and reopens the port on demand.

use serde::{Deserialize, Serialize};
use serialport::{SerialPort, SerialPortType};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

use super::{RelayError, Result, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS, MAX_ADU_SIZE};

/// Byte-oriented link to a relay board
pub trait SerialLink: Send {
    /// Make sure the underlying port is open (reopening it if needed)
    fn ensure_open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Write the whole buffer
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Block until at least `n` bytes have arrived and return everything read
    fn read_at_least(&mut self, n: usize) -> io::Result<Vec<u8>>;
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn ensure_open(&mut self) -> Result<()> {
        (**self).ensure_open()
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn read_at_least(&mut self, n: usize) -> io::Result<Vec<u8>> {
        (**self).read_at_least(n)
    }
}

/// Parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    #[serde(rename = "N")]
    None,
    #[serde(rename = "E")]
    Even,
    #[serde(rename = "O")]
    Odd,
}

/// Port settings for a board
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM7")
    pub port_name: String,
    /// Line speed
    pub baud_rate: u32,
    /// 5 to 8
    pub data_bits: u8,
    /// Parity check mode
    pub parity: Parity,
    /// 1 or 2
    pub stop_bits: u8,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl SerialSettings {
    /// Default settings for `port_name`
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    fn data_bits(&self) -> Result<serialport::DataBits> {
        match self.data_bits {
            5 => Ok(serialport::DataBits::Five),
            6 => Ok(serialport::DataBits::Six),
            7 => Ok(serialport::DataBits::Seven),
            8 => Ok(serialport::DataBits::Eight),
            n => Err(RelayError::SerialError(format!("unsupported data bits: {n}"))),
        }
    }

    fn stop_bits(&self) -> Result<serialport::StopBits> {
        match self.stop_bits {
            1 => Ok(serialport::StopBits::One),
            2 => Ok(serialport::StopBits::Two),
            n => Err(RelayError::SerialError(format!("unsupported stop bits: {n}"))),
        }
    }

    fn parity(&self) -> serialport::Parity {
        match self.parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        }
    }
}

/// Open a serial port with the given settings
pub fn open_port(settings: &SerialSettings) -> Result<Box<dyn SerialPort>> {
    serialport::new(&settings.port_name, settings.baud_rate)
        .data_bits(settings.data_bits()?)
        .parity(settings.parity())
        .stop_bits(settings.stop_bits()?)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(settings.timeout_ms))
        .open()
        .map_err(|e| RelayError::SerialError(e.to_string()))
}

/// [`SerialLink`] backed by a real serial port
pub struct SerialPortLink {
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortLink {
    /// Create a link; the port is opened on first use
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
        }
    }

    /// Open the port now instead of waiting for the first request
    pub fn connect(settings: SerialSettings) -> Result<Self> {
        let mut link = Self::new(settings);
        link.ensure_open()?;
        Ok(link)
    }

    /// Settings the link was opened with
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// True while a port handle is held
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Release the port; the next request reopens it
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("closed {}", self.settings.port_name);
        }
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port not open"))
    }

    fn drop_on_error<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if e.kind() != io::ErrorKind::TimedOut {
                warn!("{}: {}, closing port", self.settings.port_name, e);
                self.port = None;
            }
        }
        result
    }
}

impl SerialLink for SerialPortLink {
    fn ensure_open(&mut self) -> Result<()> {
        if self.port.is_none() {
            debug!(
                "opening {} at {} baud",
                self.settings.port_name, self.settings.baud_rate
            );
            let port = open_port(&self.settings)?;
            port.clear(serialport::ClearBuffer::All)
                .map_err(|e| RelayError::SerialError(e.to_string()))?;
            self.port = Some(port);
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let result = self
            .port_mut()
            .and_then(|port| port.write_all(bytes).and_then(|_| port.flush()));
        self.drop_on_error(result)
    }

    fn read_at_least(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let result = self.port_mut().and_then(|port| {
            let mut buf = vec![0u8; n.max(MAX_ADU_SIZE)];
            let mut filled = 0;
            while filled < n {
                match port.read(&mut buf[filled..]) {
                    Ok(0) => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("port closed after {filled} of {n} bytes"),
                        ))
                    }
                    Ok(k) => filled += k,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e),
                }
            }
            buf.truncate(filled);
            Ok(buf)
        });
        self.drop_on_error(result)
    }
}

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// System port name
    pub name: String,
    /// USB vendor and product ID, if a USB adapter
    pub usb_id: Option<(u16, u16)>,
    /// USB product string
    pub product: Option<String>,
}

/// Sort key putting USB adapters first, in numeric order
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "ttyUSB"), (0, "COM"), (1, "ttyACM")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (2, 0, basename.to_string())
}

/// List available serial ports in a stable order
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|info| {
            let (usb_id, product) = match info.port_type {
                SerialPortType::UsbPort(usb) => (Some((usb.vid, usb.pid)), usb.product),
                _ => (None, None),
            };
            PortInfo {
                name: info.port_name,
                usb_id,
                product,
            }
        })
        .collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}
