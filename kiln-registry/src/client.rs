//! Best-effort HTTP client for the discovery service

use std::collections::HashMap;

use tracing::{debug, warn};
use url::Url;

use crate::error::Result;
use crate::types::RegistryEntry;

/// Port the local discovery service conventionally listens on.
pub const DEFAULT_REGISTRY_PORT: u16 = 6284;

/// Client for the local worker discovery service.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base: Url,
    client: reqwest::Client,
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::local(DEFAULT_REGISTRY_PORT)
    }
}

impl RegistryClient {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }

    /// Client for a discovery service on the loopback interface.
    pub fn local(port: u16) -> Self {
        let base =
            Url::parse(&format!("http://127.0.0.1:{port}")).expect("registry URL is valid");
        Self::new(base)
    }

    fn worker_url(&self, name: &str) -> Result<Url> {
        Ok(self.base.join(&format!("workers/{name}"))?)
    }

    /// Publish a worker's entry. Best-effort: failures are logged, never
    /// returned, since registry availability must not block the dev server.
    pub async fn publish(&self, name: &str, entry: &RegistryEntry) {
        if let Err(e) = self.try_publish(name, entry).await {
            warn!("Failed to register worker {} with local registry: {}", name, e);
        }
    }

    /// Remove a worker's entry. Best-effort, like [`publish`](Self::publish).
    pub async fn retract(&self, name: &str) {
        if let Err(e) = self.try_retract(name).await {
            warn!("Failed to deregister worker {} from local registry: {}", name, e);
        }
    }

    /// All currently registered workers, for resolving service and
    /// stateful-object bindings against siblings.
    pub async fn query(&self) -> Result<HashMap<String, RegistryEntry>> {
        let url = self.base.join("workers")?;
        let workers = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(workers)
    }

    pub(crate) async fn try_publish(&self, name: &str, entry: &RegistryEntry) -> Result<()> {
        let url = self.worker_url(name)?;
        self.client
            .post(url)
            .json(entry)
            .send()
            .await?
            .error_for_status()?;
        debug!("Registered worker {} at {}:{}", name, entry.host, entry.port);
        Ok(())
    }

    pub(crate) async fn try_retract(&self, name: &str) -> Result<()> {
        let url = self.worker_url(name)?;
        self.client.delete(url).send().await?.error_for_status()?;
        debug!("Deregistered worker {}", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RegistryMode, StatefulObjectRecord};
    use kiln_core::Protocol;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;

    fn entry() -> RegistryEntry {
        RegistryEntry {
            protocol: Protocol::Http,
            mode: RegistryMode::Local,
            host: "127.0.0.1".to_string(),
            port: 8787,
            stateful_objects: vec![StatefulObjectRecord {
                name: "COUNTER".to_string(),
                class_name: "Counter".to_string(),
            }],
            stateful_object_host: None,
            stateful_object_port: None,
        }
    }

    /// Read one full HTTP request (headers plus declared body) as text.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text
                    .lines()
                    .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(str::trim).map(String::from))
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    /// Accept one connection, capture the raw request, answer with `body`.
    async fn serve_once(body: &'static str) -> (std::net::SocketAddr, mpsc::Receiver<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = tx.send(request).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });
        (addr, rx)
    }

    #[tokio::test]
    async fn test_publish_posts_entry() {
        let (addr, mut rx) = serve_once("{}").await;
        let client = RegistryClient::new(Url::parse(&format!("http://{addr}")).unwrap());

        client.try_publish("api", &entry()).await.unwrap();

        let request = rx.recv().await.unwrap();
        assert!(request.starts_with("POST /workers/api "));
        assert!(request.contains("\"mode\":\"local\""));
        assert!(request.contains("\"className\":\"Counter\""));
    }

    #[tokio::test]
    async fn test_retract_deletes_entry() {
        let (addr, mut rx) = serve_once("").await;
        let client = RegistryClient::new(Url::parse(&format!("http://{addr}")).unwrap());

        client.try_retract("api").await.unwrap();

        let request = rx.recv().await.unwrap();
        assert!(request.starts_with("DELETE /workers/api "));
    }

    #[tokio::test]
    async fn test_query_decodes_workers() {
        let body = r#"{"chat":{"protocol":"http","mode":"local","host":"127.0.0.1","port":9000,"statefulObjects":[]}}"#;
        let (addr, _rx) = serve_once(body).await;
        let client = RegistryClient::new(Url::parse(&format!("http://{addr}")).unwrap());

        let workers = client.query().await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers["chat"].port, 9000);
    }

    #[tokio::test]
    async fn test_publish_swallows_unreachable_registry() {
        // Bind then drop so nothing is listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RegistryClient::new(Url::parse(&format!("http://{addr}")).unwrap());
        // Must not panic or propagate
        client.publish("api", &entry()).await;
        client.retract("api").await;
    }
}
