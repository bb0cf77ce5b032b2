//! Modbus Connection Management
//!
//! TCP and RTU links with lazy connect, explicit open/close and
//! request/response transactions.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use voltage_comlink::error::{ComLinkError, Result};
use voltage_comlink::ConnectionState;

#[cfg(feature = "modbus-rtu")]
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::config::LinkConfig;
use super::constants;
use super::frame::{FrameMode, FrameProcessor, ParsedFrame};
use super::pdu::ModbusPdu;

/// Modbus connection type
#[derive(Debug)]
pub enum ModbusConnection {
    /// TCP connection
    Tcp(TcpStream),
    /// Serial RTU connection
    #[cfg(feature = "modbus-rtu")]
    Rtu(SerialStream),
}

impl ModbusConnection {
    /// Create a TCP connection
    pub async fn connect_tcp(host: &str, port: u16, timeout_duration: Duration) -> Result<Self> {
        let addr = format!("{host}:{port}");
        debug!("TCP connecting: {}", addr);

        match timeout(timeout_duration, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY: {}", e);
                }

                info!("TCP connected: {}", addr);
                Ok(ModbusConnection::Tcp(stream))
            },
            Ok(Err(e)) => {
                error!("TCP err: {} - {}", addr, e);
                Err(ComLinkError::connection(format!("Failed to connect to {addr}: {e}")))
            },
            Err(_) => {
                warn!("TCP timeout: {}", addr);
                Err(ComLinkError::timeout(format!("Connection to {addr} timed out")))
            },
        }
    }

    /// Open a serial RTU connection
    #[cfg(feature = "modbus-rtu")]
    pub async fn connect_rtu(
        device: &str,
        baud_rate: u32,
        data_bits: u8,
        stop_bits: u8,
        parity: &str,
        timeout_duration: Duration,
    ) -> Result<Self> {
        debug!("RTU: {} @{}baud", device, baud_rate);

        let parity = match parity {
            "Even" => tokio_serial::Parity::Even,
            "Odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let data_bits = match data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        let stop_bits = match stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        match tokio_serial::new(device, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(timeout_duration)
            .open_native_async()
        {
            Ok(serial_port) => {
                info!("RTU opened: {}", device);
                Ok(ModbusConnection::Rtu(serial_port))
            },
            Err(e) => {
                error!("RTU err: {} - {}", device, e);
                Err(ComLinkError::connection(format!(
                    "Failed to open serial port {device}: {e}"
                )))
            },
        }
    }

    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            ModbusConnection::Tcp(stream) => {
                stream.write_all(data).await.map_err(|e| {
                    error!("TCP TX: {}", e);
                    ComLinkError::io(format!("TCP send error: {e}"))
                })?;
                debug!("TCP TX: {}B", data.len());
            },
            #[cfg(feature = "modbus-rtu")]
            ModbusConnection::Rtu(port) => {
                port.write_all(data).await.map_err(|e| {
                    error!("RTU TX: {}", e);
                    ComLinkError::io(format!("Serial send error: {e}"))
                })?;
                port.flush().await.map_err(|e| {
                    error!("RTU flush: {}", e);
                    ComLinkError::io(format!("Serial flush error: {e}"))
                })?;
                debug!("RTU TX: {}B", data.len());
            },
        }
        Ok(())
    }

    /// Receive one complete frame into `buffer`
    pub async fn receive(&mut self, buffer: &mut [u8], timeout_duration: Duration) -> Result<usize> {
        match self {
            ModbusConnection::Tcp(stream) => {
                // [Transaction ID(2)][Protocol ID(2)][Length(2)][Unit ID(1)][PDU(N)]
                // Only a timeout before the first byte leaves the stream at a
                // frame boundary; every other failure is reported as I/O.
                let deadline = Instant::now() + timeout_duration;
                let mut header = [0u8; constants::MBAP_HEADER_LEN];
                let mut filled = 0;
                while filled < header.len() {
                    match timeout_at(deadline, stream.read(&mut header[filled..])).await {
                        Ok(Ok(0)) => {
                            error!("TCP closed by peer");
                            return Err(ComLinkError::connection("TCP connection closed by peer"));
                        },
                        Ok(Ok(bytes)) => filled += bytes,
                        Ok(Err(e)) => {
                            error!("TCP header RX: {}", e);
                            return Err(ComLinkError::io(format!("TCP header read error: {e}")));
                        },
                        Err(_) if filled == 0 => {
                            debug!("TCP header timeout");
                            return Err(ComLinkError::timeout("TCP header read timeout"));
                        },
                        Err(_) => {
                            debug!("TCP header timeout after {}B", filled);
                            return Err(ComLinkError::io(format!(
                                "TCP frame incomplete: header timeout after {filled} bytes"
                            )));
                        },
                    }
                }

                // Unit id is counted in the length field
                let length = u16::from_be_bytes([header[4], header[5]]) as usize;
                if length == 0 || length > constants::MAX_MBAP_LENGTH {
                    error!("TCP invalid len: {}", length);
                    return Err(ComLinkError::protocol(format!("Invalid TCP frame length: {length}")));
                }

                let total_size = constants::MBAP_HEADER_LEN + length;
                if buffer.len() < total_size {
                    error!("Buffer small: need={} have={}", total_size, buffer.len());
                    return Err(ComLinkError::protocol("Buffer too small for complete frame"));
                }
                buffer[..constants::MBAP_HEADER_LEN].copy_from_slice(&header);

                match timeout_at(
                    deadline,
                    stream.read_exact(&mut buffer[constants::MBAP_HEADER_LEN..total_size]),
                )
                .await
                {
                    Ok(Ok(_)) => {
                        debug!("TCP RX: {}B", total_size);
                        Ok(total_size)
                    },
                    Ok(Err(e)) => {
                        error!("TCP PDU RX: {}", e);
                        Err(ComLinkError::io(format!("TCP PDU read error: {e}")))
                    },
                    Err(_) => {
                        debug!("TCP PDU timeout");
                        Err(ComLinkError::io("TCP frame incomplete: PDU read timeout"))
                    },
                }
            },
            #[cfg(feature = "modbus-rtu")]
            ModbusConnection::Rtu(port) => {
                // [Unit ID(1)][PDU(N)][CRC(2)], frame ends at an inter-byte gap
                let inter_byte = Duration::from_millis(constants::RTU_INTER_BYTE_TIMEOUT_MS);
                let mut total_bytes = 0;
                let start_time = Instant::now();

                loop {
                    if start_time.elapsed() >= timeout_duration {
                        if total_bytes == 0 {
                            debug!("RTU timeout");
                            return Err(ComLinkError::timeout("RTU response timeout"));
                        }
                        if total_bytes < constants::RTU_MIN_FRAME_LEN {
                            debug!("RTU timeout: {}B", total_bytes);
                            return Err(ComLinkError::io("RTU frame incomplete: total timeout"));
                        }
                        break;
                    }

                    let remaining = &mut buffer[total_bytes..];
                    let read_size = remaining.len().min(128);

                    match timeout(inter_byte, port.read(&mut remaining[..read_size])).await {
                        Ok(Ok(0)) => {
                            error!("RTU closed");
                            return Err(ComLinkError::connection("Serial connection closed"));
                        },
                        Ok(Ok(bytes)) => {
                            total_bytes += bytes;
                            if total_bytes >= buffer.len() {
                                error!("RTU overflow: {}B", total_bytes);
                                return Err(ComLinkError::protocol("RTU frame exceeds buffer size"));
                            }
                        },
                        Ok(Err(e)) => {
                            error!("RTU RX: {}", e);
                            return Err(ComLinkError::io(format!("Serial read error: {e}")));
                        },
                        Err(_) => {
                            if total_bytes >= constants::RTU_MIN_FRAME_LEN {
                                break;
                            } else if total_bytes > 0 {
                                debug!("RTU partial: {}B", total_bytes);
                                return Err(ComLinkError::io("RTU frame incomplete: inter-byte timeout"));
                            }
                            // nothing yet, keep waiting
                        },
                    }
                }

                debug!("RTU RX: {}B", total_bytes);
                Ok(total_bytes)
            },
        }
    }
}

#[derive(Debug)]
struct LinkInner {
    connection: Option<ModbusConnection>,
    state: ConnectionState,
    frames: FrameProcessor,
}

/// Owns one physical link and serializes transactions on it
#[derive(Debug)]
pub struct ModbusConnectionManager {
    link: LinkConfig,
    inner: Mutex<LinkInner>,
}

impl ModbusConnectionManager {
    pub fn new(link: LinkConfig) -> Self {
        let mode = match link {
            LinkConfig::Tcp { .. } => FrameMode::Tcp,
            LinkConfig::Serial { .. } => FrameMode::Rtu,
        };
        Self {
            link,
            inner: Mutex::new(LinkInner {
                connection: None,
                state: ConnectionState::Uninitialized,
                frames: FrameProcessor::new(mode),
            }),
        }
    }

    pub fn link(&self) -> &LinkConfig {
        &self.link
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Connect now; no-op when already connected
    ///
    /// Also re-arms a link that was explicitly closed.
    pub async fn open(&self, timeout_duration: Duration) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.connection.is_some() {
            return Ok(());
        }
        self.connect(&mut inner, timeout_duration).await
    }

    /// Drop the connection; transactions fail until the next `open`
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.connection.take().is_some() {
            info!("Link closed: {}", self.link);
        }
        inner.frames.clear();
        inner.state = ConnectionState::Closed;
        Ok(())
    }

    async fn connect(&self, inner: &mut LinkInner, timeout_duration: Duration) -> Result<()> {
        inner.state = ConnectionState::Connecting;
        let result = match &self.link {
            LinkConfig::Tcp { host, port } => ModbusConnection::connect_tcp(host, *port, timeout_duration).await,
            #[cfg(feature = "modbus-rtu")]
            LinkConfig::Serial {
                device,
                baud_rate,
                data_bits,
                stop_bits,
                parity,
            } => {
                ModbusConnection::connect_rtu(device, *baud_rate, *data_bits, *stop_bits, parity, timeout_duration)
                    .await
            },
            #[cfg(not(feature = "modbus-rtu"))]
            LinkConfig::Serial { device, .. } => Err(ComLinkError::config(format!(
                "{device}: serial links require the modbus-rtu feature"
            ))),
        };
        match result {
            Ok(connection) => {
                inner.connection = Some(connection);
                inner.frames.clear();
                inner.state = ConnectionState::Connected;
                Ok(())
            },
            Err(e) => {
                inner.state = ConnectionState::Disconnected;
                Err(e)
            },
        }
    }

    /// Send one request PDU and wait for its response PDU
    ///
    /// Connects lazily unless the link was closed. Responses to earlier
    /// requests are discarded while waiting. A clean timeout keeps the
    /// connection, since a late response is skipped by its transaction id.
    /// Any other failure may leave the stream mid-frame, so the connection
    /// is dropped and the next transaction reconnects.
    pub async fn transact(&self, unit_id: u8, pdu: &ModbusPdu, timeout_duration: Duration) -> Result<ModbusPdu> {
        let mut inner = self.inner.lock().await;

        if inner.connection.is_none() {
            if !inner.state.can_open() {
                return Err(ComLinkError::NotConnected);
            }
            self.connect(&mut inner, timeout_duration).await?;
        }

        let result = Self::exchange(&mut inner, unit_id, pdu, timeout_duration).await;
        if let Err(e) = &result {
            if !e.is_timeout() {
                warn!("Link {} lost: {}", self.link, e);
                inner.connection = None;
                inner.state = ConnectionState::Disconnected;
            }
        }
        result
    }

    async fn exchange(inner: &mut LinkInner, unit_id: u8, pdu: &ModbusPdu, timeout_duration: Duration) -> Result<ModbusPdu> {
        let LinkInner {
            connection, frames, ..
        } = inner;
        let connection = connection.as_mut().ok_or(ComLinkError::NotConnected)?;

        let request = frames.build_frame(unit_id, pdu);
        connection.send(&request).await?;

        let deadline = Instant::now() + timeout_duration;
        let mut buffer = [0u8; constants::MODBUS_RESPONSE_BUFFER_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                frames.clear();
                return Err(ComLinkError::timeout(format!(
                    "no response within {}ms",
                    timeout_duration.as_millis()
                )));
            }
            let received = match connection.receive(&mut buffer, remaining).await {
                Ok(received) => received,
                Err(e) => {
                    frames.clear();
                    return Err(e);
                },
            };
            match frames.parse_frame(&buffer[..received])? {
                ParsedFrame::Response { pdu, .. } => return Ok(pdu),
                ParsedFrame::Stale { transaction_id } => {
                    debug!("Discarding stale response tid={}", transaction_id);
                },
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::modbus::frame::build_tcp_frame;
    use tokio::net::TcpListener;

    fn tcp_link(port: u16) -> LinkConfig {
        LinkConfig::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    fn read_request() -> ModbusPdu {
        ModbusPdu::from_slice(&[0x03, 0x00, 0x00, 0x00, 0x01]).unwrap()
    }

    #[tokio::test]
    async fn test_initial_state() {
        let manager = ModbusConnectionManager::new(tcp_link(502));
        assert_eq!(manager.state().await, ConnectionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_closed_link_rejects_transactions() {
        let manager = ModbusConnectionManager::new(tcp_link(502));
        manager.close().await.unwrap();
        let result = manager
            .transact(1, &read_request(), Duration::from_millis(100))
            .await;
        assert_eq!(result.unwrap_err(), ComLinkError::NotConnected);
        assert_eq!(manager.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let manager = ModbusConnectionManager::new(tcp_link(port));
        let result = manager
            .transact(1, &read_request(), Duration::from_millis(500))
            .await;
        assert!(result.is_err());
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stale_response_is_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
            let tid = u16::from_be_bytes([request[0], request[1]]);

            let stale = ModbusPdu::from_slice(&[0x03, 0x02, 0x00, 0x01]).unwrap();
            let fresh = ModbusPdu::from_slice(&[0x03, 0x02, 0x00, 0x2A]).unwrap();
            socket
                .write_all(&build_tcp_frame(tid.wrapping_sub(1), 1, &stale))
                .await
                .unwrap();
            socket.write_all(&build_tcp_frame(tid, 1, &fresh)).await.unwrap();
        });

        let manager = ModbusConnectionManager::new(tcp_link(port));
        let pdu = manager
            .transact(1, &read_request(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(pdu.as_slice(), &[0x03, 0x02, 0x00, 0x2A]);
        assert_eq!(manager.state().await, ConnectionState::Connected);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_frame_forces_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut first = true;
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let slow = first;
                first = false;
                tokio::spawn(async move {
                    let mut request = [0u8; 12];
                    while socket.read_exact(&mut request).await.is_ok() {
                        let tid = u16::from_be_bytes([request[0], request[1]]);
                        let reply = ModbusPdu::from_slice(&[0x03, 0x02, 0x00, 0x2A]).unwrap();
                        let frame = build_tcp_frame(tid, 1, &reply);
                        if slow {
                            // header now, the rest after the client gave up
                            socket.write_all(&frame[..constants::MBAP_HEADER_LEN]).await.unwrap();
                            tokio::time::sleep(Duration::from_millis(400)).await;
                            let _ = socket.write_all(&frame[constants::MBAP_HEADER_LEN..]).await;
                        } else {
                            socket.write_all(&frame).await.unwrap();
                        }
                    }
                });
            }
        });

        let manager = ModbusConnectionManager::new(tcp_link(port));
        let timeout = Duration::from_millis(200);
        let err = manager.transact(1, &read_request(), timeout).await.unwrap_err();
        assert!(matches!(err, ComLinkError::Io(_)));
        assert_eq!(manager.state().await, ConnectionState::Disconnected);

        for _ in 0..3 {
            let pdu = manager.transact(1, &read_request(), timeout).await.unwrap();
            assert_eq!(pdu.as_slice(), &[0x03, 0x02, 0x00, 0x2A]);
        }
        assert_eq!(manager.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_clean_timeout_keeps_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            let mut late = None;
            while socket.read_exact(&mut request).await.is_ok() {
                let tid = u16::from_be_bytes([request[0], request[1]]);
                let Some(previous) = late.replace(tid) else {
                    // first request stays unanswered for now
                    continue;
                };
                let stale = ModbusPdu::from_slice(&[0x03, 0x02, 0x00, 0x01]).unwrap();
                let fresh = ModbusPdu::from_slice(&[0x03, 0x02, 0x00, 0x2A]).unwrap();
                socket.write_all(&build_tcp_frame(previous, 1, &stale)).await.unwrap();
                socket.write_all(&build_tcp_frame(tid, 1, &fresh)).await.unwrap();
            }
        });

        let manager = ModbusConnectionManager::new(tcp_link(port));
        let timeout = Duration::from_millis(200);
        let err = manager.transact(1, &read_request(), timeout).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(manager.state().await, ConnectionState::Connected);

        // late answer to the first request is skipped
        let pdu = manager.transact(1, &read_request(), timeout).await.unwrap();
        assert_eq!(pdu.as_slice(), &[0x03, 0x02, 0x00, 0x2A]);
    }

    #[tokio::test]
    async fn test_open_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let manager = ModbusConnectionManager::new(tcp_link(port));

        manager.open(Duration::from_secs(1)).await.unwrap();
        assert!(manager.state().await.is_connected());
        manager.close().await.unwrap();
        manager.close().await.unwrap();
        assert_eq!(manager.state().await, ConnectionState::Closed);
        manager.open(Duration::from_secs(1)).await.unwrap();
        assert!(manager.state().await.is_connected());
    }
}
