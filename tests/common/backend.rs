//! Minimal HTTP backend standing in for the detections API.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

/// How the mock answers each request
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Status(u16),
    /// Read the request, then never answer
    Hang,
}

pub struct MockBackend {
    pub url: Url,
    bodies: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    /// Request bodies received so far, in arrival order
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

/// Starts a backend on an ephemeral port of the current tokio runtime
pub async fn spawn_backend(reply: Reply) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock backend");
    let addr = listener.local_addr().expect("Mock backend has no address");
    let bodies = Arc::new(Mutex::new(Vec::new()));

    let recorded = bodies.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let _ = handle(socket, reply, recorded).await;
            });
        }
    });

    MockBackend {
        url: Url::parse(&format!("http://{}/api/detections", addr)).unwrap(),
        bodies,
    }
}

/// An address nothing listens on
pub async fn closed_endpoint() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{}/api/detections", addr)).unwrap()
}

async fn handle(
    mut socket: TcpStream,
    reply: Reply,
    recorded: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let body = read_request(&mut socket).await?;
    recorded.lock().unwrap().push(body);

    match reply {
        Reply::Status(code) => {
            let response = format!(
                "HTTP/1.1 {} Mock\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                code
            );
            socket.write_all(response.as_bytes()).await?;
            socket.shutdown().await
        }
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(String::new());
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let start = header_end + 4;
        if buf.len() >= start + length {
            return Ok(String::from_utf8_lossy(&buf[start..start + length]).into_owned());
        }
    }
}
