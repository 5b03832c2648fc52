//! Framed TCP transport and session handshake.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::decoder::MessageDecoder;
use crate::encoder::{build_connect_request, MessageEncoder};
use crate::errors::{IBApiError, Result};
use crate::protocol::{outgoing, HEADER_LEN, MAX_CLIENT_VER, MAX_MSG_LEN, MIN_CLIENT_VER};

/// Read one length-prefixed frame, buffering partial reads in `buf`.
async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    while buf.len() < HEADER_LEN {
        if reader.read_buf(buf).await? == 0 {
            return Err(IBApiError::Disconnected("peer closed the connection".into()));
        }
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len == 0 || len > MAX_MSG_LEN {
        return Err(IBApiError::Protocol(format!("invalid frame length {len}")));
    }

    while buf.len() < HEADER_LEN + len {
        if reader.read_buf(buf).await? == 0 {
            return Err(IBApiError::Disconnected("connection closed mid-frame".into()));
        }
    }

    buf.advance(HEADER_LEN);
    Ok(buf.split_to(len).to_vec())
}

/// A handshaken session, not yet split into reader and writer halves.
pub struct Transport {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    read_buf: BytesMut,
    server_version: i32,
    tws_time: String,
}

impl Transport {
    /// Open the socket and negotiate a server version.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| IBApiError::Connection(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;
        let (reader, mut writer) = stream.into_split();

        writer.write_all(&build_connect_request()).await?;

        let mut transport = Self {
            reader,
            writer,
            read_buf: BytesMut::with_capacity(8192),
            server_version: 0,
            tws_time: String::new(),
        };
        transport.read_connect_ack().await?;
        Ok(transport)
    }

    /// The ack is `[version][time]`, or `[negative version][host:port]`
    /// when the gateway wants the client to go elsewhere.
    async fn read_connect_ack(&mut self) -> Result<()> {
        let ack = read_frame(&mut self.reader, &mut self.read_buf).await?;
        let mut dec = MessageDecoder::new(&ack, 0);
        let sv = dec.decode_i32()?;

        if sv < 0 {
            let target = dec.decode_string()?;
            return Err(IBApiError::Protocol(format!("gateway redirected to {target}")));
        }
        if !(MIN_CLIENT_VER..=MAX_CLIENT_VER).contains(&sv) {
            return Err(IBApiError::Protocol(format!(
                "unsupported server version {sv} (client speaks {MIN_CLIENT_VER}..{MAX_CLIENT_VER})"
            )));
        }

        self.server_version = sv;
        self.tws_time = dec.decode_string()?;
        tracing::info!(server_version = sv, tws_time = %self.tws_time, "handshake complete");
        Ok(())
    }

    /// Send START_API, which binds the session to `client_id`.
    pub async fn start_api(&mut self, client_id: i32) -> Result<()> {
        let mut enc = MessageEncoder::new(self.server_version, outgoing::START_API);
        enc.field(2).field(client_id).field_empty(); // optional capabilities
        let frame = enc.finish()?;
        self.writer.write_all(&frame).await?;
        Ok(())
    }

    pub fn server_version(&self) -> i32 {
        self.server_version
    }

    pub fn tws_time(&self) -> &str {
        &self.tws_time
    }

    pub fn into_split(self) -> (TransportReader, TransportWriter) {
        (
            TransportReader {
                reader: self.reader,
                read_buf: self.read_buf,
            },
            TransportWriter {
                writer: self.writer,
            },
        )
    }
}

/// Read half, owned by the reader task.
pub struct TransportReader {
    reader: OwnedReadHalf,
    read_buf: BytesMut,
}

impl TransportReader {
    pub async fn read_message(&mut self) -> Result<Vec<u8>> {
        read_frame(&mut self.reader, &mut self.read_buf).await
    }
}

/// Write half, owned by the client.
pub struct TransportWriter {
    writer: OwnedWriteHalf,
}

impl TransportWriter {
    pub async fn send_message(&mut self, frame: &[u8]) -> Result<()> {
        self.writer
            .write_all(frame)
            .await
            .map_err(|e| IBApiError::Disconnected(format!("write failed: {e}")))
    }

    /// Half-close the socket; the peer sees EOF.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(error = %e, "socket shutdown failed");
        }
    }
}
