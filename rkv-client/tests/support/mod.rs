//! In-process RESP mock server for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rkv_client::resp::{parse_reply, RespValue};
use rkv_client::Endpoint;

/// What the mock does with one command.
pub enum Reply {
    Now(Vec<u8>),
    After(Duration, Vec<u8>),
    /// Never answer; keep the socket open.
    Never,
    /// Drop the connection without answering.
    Close,
}

pub type Handler = Arc<dyn Fn(&[String]) -> Reply + Send + Sync>;

pub struct MockServer {
    pub endpoint: Endpoint,
    commands: Arc<Mutex<Vec<Vec<String>>>>,
    connections: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
    peak_open: Arc<AtomicUsize>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> anyhow::Result<Self>
    where
        F: Fn(&[String]) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let server = MockServer {
            endpoint: Endpoint::new("127.0.0.1", port),
            commands: Arc::default(),
            connections: Arc::default(),
            open: Arc::default(),
            peak_open: Arc::default(),
        };

        let handler: Handler = Arc::new(handler);
        let commands = server.commands.clone();
        let connections = server.connections.clone();
        let open = server.open.clone();
        let peak_open = server.peak_open.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                let now_open = open.fetch_add(1, Ordering::SeqCst) + 1;
                peak_open.fetch_max(now_open, Ordering::SeqCst);
                let handler = handler.clone();
                let commands = commands.clone();
                let open = open.clone();
                tokio::spawn(async move {
                    serve(socket, handler, commands).await;
                    open.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
        Ok(server)
    }

    /// Every command received so far, across all connections.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().clone()
    }

    /// Number of received commands whose name is `name`.
    pub fn count(&self, name: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|args| args.first().map(String::as_str) == Some(name))
            .count()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn peak_open(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }
}

async fn serve(mut socket: TcpStream, handler: Handler, commands: Arc<Mutex<Vec<Vec<String>>>>) {
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        let frame = match parse_reply(&mut buf) {
            Ok(Some(frame)) => frame,
            Ok(None) => match socket.read_buf(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => continue,
            },
            Err(_) => return,
        };
        let RespValue::Array(items) = frame else {
            return;
        };
        let args: Vec<String> = items
            .into_iter()
            .map(|item| match item {
                RespValue::Bulk(data) => String::from_utf8_lossy(&data).into_owned(),
                other => format!("{other:?}"),
            })
            .collect();
        commands.lock().push(args.clone());

        match handler(&args) {
            Reply::Now(bytes) => {
                if socket.write_all(&bytes).await.is_err() {
                    return;
                }
            }
            Reply::After(delay, bytes) => {
                tokio::time::sleep(delay).await;
                if socket.write_all(&bytes).await.is_err() {
                    return;
                }
            }
            Reply::Never => {
                let mut sink = [0u8; 256];
                while let Ok(n) = socket.read(&mut sink).await {
                    if n == 0 {
                        return;
                    }
                }
                return;
            }
            Reply::Close => return,
        }
    }
}

pub fn simple(msg: &str) -> Vec<u8> {
    format!("+{msg}\r\n").into_bytes()
}

pub fn error(msg: &str) -> Vec<u8> {
    format!("-{msg}\r\n").into_bytes()
}

pub fn integer(value: i64) -> Vec<u8> {
    format!(":{value}\r\n").into_bytes()
}

pub fn bulk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

pub fn nil() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

pub fn array(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

/// `CLUSTER SLOTS` reply for `(start, end, master)` ranges.
pub fn cluster_slots(ranges: &[(u16, u16, &Endpoint)]) -> Vec<u8> {
    let entries: Vec<Vec<u8>> = ranges
        .iter()
        .map(|(start, end, master)| {
            let node = array(&[
                bulk(master.host.as_bytes()),
                integer(master.port as i64),
                bulk(b"0123456789abcdef"),
            ]);
            array(&[integer(*start as i64), integer(*end as i64), node])
        })
        .collect();
    array(&entries)
}

/// A port with nothing listening on it.
pub async fn closed_endpoint() -> anyhow::Result<Endpoint> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(Endpoint::new("127.0.0.1", port))
}

/// Installs a test subscriber so `RUST_LOG` shows engine logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
