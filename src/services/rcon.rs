//! Minimal Source-RCON client over TCP.
//!
//! Implements just enough of the protocol for command dispatch: an
//! authentication exchange followed by sequential exec-command requests.
//! Packets are length-prefixed little-endian frames:
//!
//! ```text
//! [len: i32][id: i32][type: i32][body: NUL-terminated][NUL]
//! ```
//!
//! Connections are short-lived; callers open one per dispatch invocation
//! and close it on both success and failure paths. Connect, auth, and every
//! send are bounded by a 5 second timeout so a hung game server can never
//! hold a pipeline task open indefinitely.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const SERVERDATA_AUTH: i32 = 3;
const SERVERDATA_EXECCOMMAND: i32 = 2;
const SERVERDATA_AUTH_RESPONSE: i32 = 2;
const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Applies to connect, auth, and each command round-trip.
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single packet body; anything larger is malformed.
const MAX_PACKET_LEN: usize = 4096;

/// Remote console failure.
#[derive(Debug, thiserror::Error)]
pub enum RconError {
    /// Connection parameters are incomplete (no host, port, or password).
    #[error("RCON endpoint is not configured")]
    NotConfigured,

    /// TCP-level failure while connecting or exchanging packets.
    #[error("RCON I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server did not answer within the I/O deadline.
    #[error("RCON operation timed out")]
    Timeout,

    /// The server rejected the password.
    #[error("RCON authentication rejected")]
    AuthFailed,

    /// The server sent a frame that does not follow the protocol.
    #[error("malformed RCON response")]
    Malformed,
}

/// An authenticated remote console connection.
pub struct RconClient {
    stream: TcpStream,
    next_id: i32,
}

impl RconClient {
    /// Connect and authenticate against a game server.
    ///
    /// # Errors
    ///
    /// - `Timeout` if the server does not accept the connection or answer
    ///   the auth request in time
    /// - `AuthFailed` if the password is rejected
    pub async fn connect(host: &str, port: u16, password: &str) -> Result<Self, RconError> {
        let stream = timeout(IO_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| RconError::Timeout)??;

        let mut client = Self { stream, next_id: 0 };
        timeout(IO_TIMEOUT, client.authenticate(password))
            .await
            .map_err(|_| RconError::Timeout)??;

        Ok(client)
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), RconError> {
        let id = self.write_packet(SERVERDATA_AUTH, password).await?;

        // Some servers send an empty RESPONSE_VALUE before the auth reply;
        // skip anything until the auth response arrives.
        loop {
            let (reply_id, reply_type, _body) = self.read_packet().await?;
            if reply_type != SERVERDATA_AUTH_RESPONSE {
                continue;
            }
            if reply_id == id {
                return Ok(());
            }
            // Auth failure is signalled with id -1
            if reply_id == -1 {
                return Err(RconError::AuthFailed);
            }
            return Err(RconError::Malformed);
        }
    }

    /// Execute one command and return the server's textual response.
    pub async fn send(&mut self, command: &str) -> Result<String, RconError> {
        let id = self.write_packet(SERVERDATA_EXECCOMMAND, command).await?;

        let (reply_id, reply_type, body) = timeout(IO_TIMEOUT, self.read_packet())
            .await
            .map_err(|_| RconError::Timeout)??;

        if reply_type != SERVERDATA_RESPONSE_VALUE || reply_id != id {
            return Err(RconError::Malformed);
        }

        Ok(body)
    }

    /// Close the connection. Errors on shutdown are ignored; the socket is
    /// dropped either way.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }

    async fn write_packet(&mut self, packet_type: i32, body: &str) -> Result<i32, RconError> {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let id = self.next_id;

        let frame = encode_packet(id, packet_type, body);
        self.stream.write_all(&frame).await?;

        Ok(id)
    }

    async fn read_packet(&mut self) -> Result<(i32, i32, String), RconError> {
        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf).await?;

        let len = i32::from_le_bytes(len_buf);
        // id + type + two NULs is the minimum legal payload
        if !(10..=MAX_PACKET_LEN as i32).contains(&len) {
            return Err(RconError::Malformed);
        }

        let mut payload = vec![0u8; len as usize];
        self.stream.read_exact(&mut payload).await?;

        decode_packet(&payload)
    }
}

/// Encode a full frame (length prefix included).
fn encode_packet(id: i32, packet_type: i32, body: &str) -> Vec<u8> {
    let len = 4 + 4 + body.len() + 2;
    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&(len as i32).to_le_bytes());
    frame.extend_from_slice(&id.to_le_bytes());
    frame.extend_from_slice(&packet_type.to_le_bytes());
    frame.extend_from_slice(body.as_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame
}

/// Decode a packet payload (length prefix already consumed).
fn decode_packet(payload: &[u8]) -> Result<(i32, i32, String), RconError> {
    if payload.len() < 10 {
        return Err(RconError::Malformed);
    }

    let id = i32::from_le_bytes(payload[0..4].try_into().map_err(|_| RconError::Malformed)?);
    let packet_type =
        i32::from_le_bytes(payload[4..8].try_into().map_err(|_| RconError::Malformed)?);

    // Body runs up to the two trailing NULs
    let body_bytes = &payload[8..payload.len() - 2];
    let body = String::from_utf8_lossy(body_bytes).into_owned();

    Ok((id, packet_type, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_packet_has_expected_layout() {
        let frame = encode_packet(7, SERVERDATA_EXECCOMMAND, "say hi");

        // length prefix covers id + type + body + two NULs
        assert_eq!(&frame[0..4], &(16i32).to_le_bytes());
        assert_eq!(&frame[4..8], &(7i32).to_le_bytes());
        assert_eq!(&frame[8..12], &(2i32).to_le_bytes());
        assert_eq!(&frame[12..18], b"say hi");
        assert_eq!(&frame[18..], &[0, 0]);
    }

    #[test]
    fn decode_roundtrips_encode() {
        let frame = encode_packet(42, SERVERDATA_AUTH, "password");
        let (id, packet_type, body) = decode_packet(&frame[4..]).expect("decodes");
        assert_eq!(id, 42);
        assert_eq!(packet_type, SERVERDATA_AUTH);
        assert_eq!(body, "password");
    }

    #[test]
    fn decode_handles_empty_body() {
        let frame = encode_packet(1, SERVERDATA_RESPONSE_VALUE, "");
        let (id, packet_type, body) = decode_packet(&frame[4..]).expect("decodes");
        assert_eq!((id, packet_type), (1, SERVERDATA_RESPONSE_VALUE));
        assert!(body.is_empty());
    }

    #[test]
    fn truncated_payload_is_malformed() {
        assert!(matches!(decode_packet(&[0u8; 5]), Err(RconError::Malformed)));
    }
}
