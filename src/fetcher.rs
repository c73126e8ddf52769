//! Asset Fetcher
//!
//! Downloads the bytes behind one absolute URL. Every failure (network
//! error, non-2xx status, timeout) collapses to `None`; callers treat that
//! as "asset unavailable" and leave the reference alone.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Capability to download a URL with a bounded timeout.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str, timeout: Duration) -> impl Future<Output = Option<Vec<u8>>> + Send;
}

/// Fetcher backed by a shared reqwest client
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str) -> Result<Option<Vec<u8>>, reqwest::Error> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            debug!(url = %url, status = %response.status(), "asset request rejected");
            return Ok(None);
        }

        let bytes = response.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Option<Vec<u8>> {
        // Dropping the request future on timeout aborts the transfer.
        match tokio::time::timeout(timeout, self.download(url)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                debug!(url = %url, error = %e, "asset request failed");
                None
            }
            Err(_) => {
                debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "asset request timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response on a random local port.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/asset.png", addr)
    }

    #[tokio::test]
    async fn returns_body_on_success() {
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello").await;
        let fetcher = HttpFetcher::new("test-agent").unwrap();
        let bytes = fetcher.fetch(&url, Duration::from_secs(5)).await;
        assert_eq!(bytes.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn non_success_status_is_none() {
        let url = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let fetcher = HttpFetcher::new("test-agent").unwrap();
        assert!(fetcher.fetch(&url, Duration::from_secs(5)).await.is_none());
    }

    #[tokio::test]
    async fn slow_server_times_out_to_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection without ever answering.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let fetcher = HttpFetcher::new("test-agent").unwrap();
        let started = std::time::Instant::now();
        let result = fetcher
            .fetch(&format!("http://{}/slow.css", addr), Duration::from_millis(200))
            .await;
        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn connection_refused_is_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new("test-agent").unwrap();
        assert!(fetcher
            .fetch(&format!("http://{}/gone.js", addr), Duration::from_secs(2))
            .await
            .is_none());
    }
}
