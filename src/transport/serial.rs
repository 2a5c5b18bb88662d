//! Serial port transport for RS-232/USB-serial CPCs.
//!
//! Wraps the `serialport` crate. Reads go through a `BufReader` so a response line is
//! assembled from however many chunks the driver hands back; the port's own read
//! timeout bounds every read.

use crate::config::ChannelConfig;
use crate::error::TransportError;
use crate::transport::{Connector, Transport};

#[cfg(feature = "instrument_serial")]
pub use imp::SerialTransport;

/// Opens real serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    #[cfg(feature = "instrument_serial")]
    fn connect(&self, channel: &ChannelConfig) -> Result<Box<dyn Transport>, TransportError> {
        let transport = SerialTransport::open(&channel.serial)?;
        Ok(Box::new(transport))
    }

    #[cfg(not(feature = "instrument_serial"))]
    fn connect(&self, _channel: &ChannelConfig) -> Result<Box<dyn Transport>, TransportError> {
        Err(TransportError::FeatureDisabled)
    }
}

#[cfg(feature = "instrument_serial")]
mod imp {
    use super::*;
    use crate::config::{Parity, SerialSettings};
    use crate::transport::decode_line;
    use serialport::{ClearBuffer, DataBits, SerialPort, StopBits};
    use std::io::{BufRead, BufReader, ErrorKind, Write};
    use tracing::{debug, trace};

    /// An open serial port.
    pub struct SerialTransport {
        port_name: String,
        reader: BufReader<Box<dyn SerialPort>>,
    }

    impl std::fmt::Debug for SerialTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SerialTransport")
                .field("port_name", &self.port_name)
                .finish_non_exhaustive()
        }
    }

    impl SerialTransport {
        /// Open the port described by `settings`.
        pub fn open(settings: &SerialSettings) -> Result<Self, TransportError> {
            let open_error = |reason: String| TransportError::Open {
                port: settings.port.clone(),
                reason,
            };
            let data_bits = match settings.byte_size {
                5 => DataBits::Five,
                6 => DataBits::Six,
                7 => DataBits::Seven,
                8 => DataBits::Eight,
                other => return Err(open_error(format!("unsupported byte size {other}"))),
            };
            let stop_bits = match settings.stop_bits {
                2 => StopBits::Two,
                _ => StopBits::One,
            };
            let parity = match settings.parity {
                Parity::None => serialport::Parity::None,
                Parity::Even => serialport::Parity::Even,
                Parity::Odd => serialport::Parity::Odd,
            };

            let port = serialport::new(&settings.port, settings.baud)
                .data_bits(data_bits)
                .parity(parity)
                .stop_bits(stop_bits)
                .timeout(settings.timeout())
                .open()
                .map_err(|e| open_error(e.to_string()))?;

            debug!(
                port = %settings.port,
                baud = settings.baud,
                "Opened serial port '{}' at {} baud",
                settings.port,
                settings.baud
            );

            Ok(Self {
                port_name: settings.port.clone(),
                reader: BufReader::new(port),
            })
        }

        /// Port this transport was opened on.
        pub fn port_name(&self) -> &str {
            &self.port_name
        }
    }

    impl Transport for SerialTransport {
        fn write_line(&mut self, line: &str, terminator: &str) -> Result<(), TransportError> {
            let cmd = format!("{}{}", line, terminator);
            trace!("Sending command to {}: '{}'", self.port_name, cmd.escape_default());
            let port = self.reader.get_mut();
            port.write_all(cmd.as_bytes())?;
            port.flush()?;
            Ok(())
        }

        fn read_line(&mut self) -> Result<String, TransportError> {
            let mut buf = Vec::new();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => Err(TransportError::Timeout),
                Ok(_) => {
                    trace!(
                        "Received response from {}: '{}'",
                        self.port_name,
                        String::from_utf8_lossy(&buf).escape_default()
                    );
                    decode_line(buf)
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => Err(TransportError::Timeout),
                Err(e) => Err(e.into()),
            }
        }

        fn clear_input(&mut self) -> Result<(), TransportError> {
            let buffered = self.reader.buffer().len();
            self.reader.consume(buffered);
            self.reader
                .get_mut()
                .clear(ClearBuffer::Input)
                .map_err(std::io::Error::from)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "instrument_serial")]
    #[test]
    fn test_open_missing_port_fails() {
        let channel = ChannelConfig::new("ghost", "/dev/definitely-not-a-port", vec![]);
        match SerialConnector.connect(&channel) {
            Err(TransportError::Open { port, .. }) => {
                assert_eq!(port, "/dev/definitely-not-a-port")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a port that does not exist"),
        }
    }

    #[cfg(not(feature = "instrument_serial"))]
    #[test]
    fn test_feature_disabled() {
        let channel = ChannelConfig::new("ghost", "/dev/ttyUSB0", vec![]);
        assert!(matches!(
            SerialConnector.connect(&channel),
            Err(TransportError::FeatureDisabled)
        ));
    }
}
