//! # Connection
//!
//! Purpose: Own one authenticated duplex stream to one endpoint and pair each
//! request with exactly one reply.
//!
//! ## Design Principles
//! 1. **Handshake Before Use**: AUTH, SELECT and CLIENT SETNAME complete inside
//!    `open`; a connection is never pooled half-initialized.
//! 2. **One Outstanding Command**: A command that did not finish (error or a
//!    dropped future) leaves the wire state unknown, so the connection is
//!    marked unhealthy and never reused.
//! 3. **Buffer Reuse**: Read and write buffers live on the connection.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use rkv_common::{Command, Endpoint};

use crate::error::{ClientError, ClientResult};
use crate::resp::{encode_command, take_reply, FrameScanner, RespValue};

/// Session parameters applied during the handshake.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: i64,
    /// Sent with `CLIENT SETNAME` when non-empty.
    pub client_id: String,
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            username: None,
            password: None,
            database: 0,
            client_id: String::new(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// A single authenticated connection.
#[derive(Debug)]
pub struct Connection {
    endpoint: Endpoint,
    stream: TcpStream,
    read_buf: BytesMut,
    scanner: FrameScanner,
    write_buf: BytesMut,
    in_flight: bool,
    broken: bool,
}

impl Connection {
    /// Connects to `endpoint` and runs the handshake.
    pub async fn open(endpoint: &Endpoint, options: &ConnectOptions) -> ClientResult<Self> {
        let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        let stream = match tokio::time::timeout(options.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ClientError::Connect {
                    endpoint: endpoint.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(ClientError::Connect {
                    endpoint: endpoint.clone(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };
        stream.set_nodelay(true)?;

        let mut conn = Connection {
            endpoint: endpoint.clone(),
            stream,
            read_buf: BytesMut::with_capacity(4096),
            scanner: FrameScanner::default(),
            write_buf: BytesMut::with_capacity(256),
            in_flight: false,
            broken: false,
        };
        conn.handshake(options).await?;
        debug!(endpoint = %conn.endpoint, "connection established");
        Ok(conn)
    }

    async fn handshake(&mut self, options: &ConnectOptions) -> ClientResult<()> {
        if let Some(password) = &options.password {
            let mut auth = Command::new("AUTH");
            if let Some(username) = &options.username {
                auth = auth.arg(username.as_str());
            }
            self.handshake_step(auth.arg(password.as_str())).await?;
        }
        if options.database != 0 {
            self.handshake_step(Command::new("SELECT").arg(options.database))
                .await?;
        }
        if !options.client_id.is_empty() {
            let setname = Command::new("CLIENT")
                .arg("SETNAME")
                .arg(options.client_id.as_str());
            self.handshake_step(setname).await?;
        }
        Ok(())
    }

    async fn handshake_step(&mut self, command: Command) -> ClientResult<()> {
        match self.send_and_receive(&command).await {
            Ok(RespValue::Error(reply)) => {
                warn!(endpoint = %self.endpoint, error = %reply, "handshake rejected");
                Err(ClientError::Auth {
                    endpoint: self.endpoint.clone(),
                    reply,
                })
            }
            Ok(_) => Ok(()),
            Err(ClientError::Io(source)) => Err(ClientError::Connect {
                endpoint: self.endpoint.clone(),
                source,
            }),
            Err(err) => Err(err),
        }
    }

    /// Writes one command and waits for its reply.
    ///
    /// Error replies are returned as `RespValue::Error`; only transport and
    /// framing failures are `Err`, and those leave the connection unhealthy.
    pub async fn send_and_receive(&mut self, command: &Command) -> ClientResult<RespValue> {
        self.send(command).await?;
        self.receive().await
    }

    /// Writes one command frame. Its reply must be read with `receive`
    /// before another command is sent.
    pub async fn send(&mut self, command: &Command) -> ClientResult<()> {
        if self.in_flight {
            return Err(ClientError::Protocol(
                "previous command on this connection has no reply yet".to_string(),
            ));
        }
        if self.broken {
            return Err(ClientError::Protocol("connection is closed".to_string()));
        }
        if command.is_empty() {
            return Err(ClientError::InvalidCommand("empty command".to_string()));
        }

        self.in_flight = true;
        self.write_buf.clear();
        encode_command(command, &mut self.write_buf);
        if let Err(err) = write_frame(&mut self.stream, &self.write_buf).await {
            self.broken = true;
            return Err(err.into());
        }
        Ok(())
    }

    /// Reads the reply to the command last sent.
    pub async fn receive(&mut self) -> ClientResult<RespValue> {
        if !self.in_flight {
            return Err(ClientError::Protocol("no command awaiting a reply".to_string()));
        }
        match self.read_reply().await {
            Ok(reply) => {
                self.in_flight = false;
                Ok(reply)
            }
            Err(err) => {
                self.broken = true;
                Err(err)
            }
        }
    }

    async fn read_reply(&mut self) -> ClientResult<RespValue> {
        loop {
            if let Some(reply) = take_reply(&mut self.read_buf, &mut self.scanner)? {
                trace!(endpoint = %self.endpoint, reply = reply.type_name(), "reply received");
                return Ok(reply);
            }
            let read = self.stream.read_buf(&mut self.read_buf).await?;
            if read == 0 {
                return Err(ClientError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                )));
            }
        }
    }

    /// False once an exchange failed or was abandoned mid-flight.
    pub fn is_healthy(&self) -> bool {
        !self.broken && !self.in_flight
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

async fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> io::Result<()> {
    stream.write_all(frame).await?;
    stream.flush().await
}
