//! Firefox remote debugging protocol client
//!
//! Packets are `<byte length>:<JSON>` over TCP. Each request is addressed to an
//! actor and answered by a packet `from` that actor; unsolicited events and
//! packets from other actors are skipped while waiting.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use async_trait::async_trait;
use extrun_core::{InstallResult, InstalledAddon, RemoteConnector, RemoteSession, TempInstallNotSupported};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Firefox needs a moment after launch before its debugger server listens
const CONNECT_RETRIES: u32 = 250;
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(120);

/// Event packets that can arrive between a request and its reply
const UNSOLICITED_EVENTS: &[&str] = &[
    "tabNavigated",
    "styleApplied",
    "propertyChange",
    "networkEventUpdate",
    "networkEvent",
    "newMutations",
    "frameUpdate",
    "tabListChanged",
    "addonListChanged",
    "workerListChanged",
    "serviceWorkerRegistrationListChanged",
];

/// Longest `<length>:` prefix accepted, colon included
const MAX_HEADER_LEN: u64 = 20;
/// Largest packet body accepted from the peer
const MAX_PACKET_LEN: usize = 64 * 1024 * 1024;

/// Error reply from a remote actor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}: {message}")]
pub struct RemoteError {
    pub error: String,
    pub message: String,
}

pub async fn write_packet<S>(stream: &mut S, packet: &Value) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let body = serde_json::to_string(packet)?;
    stream
        .write_all(format!("{}:{}", body.len(), body).as_bytes())
        .await?;
    stream.flush().await?;
    Ok(())
}

pub async fn read_packet<S>(stream: &mut BufReader<S>) -> Result<Value>
where
    S: AsyncRead + Unpin,
{
    let mut header = Vec::new();
    let read = (&mut *stream)
        .take(MAX_HEADER_LEN)
        .read_until(b':', &mut header)
        .await?;
    if header.last() != Some(&b':') {
        if read as u64 == MAX_HEADER_LEN {
            bail!("packet header exceeds {} bytes", MAX_HEADER_LEN);
        }
        bail!("Firefox closed the remote debugging connection");
    }
    header.pop();

    let length: usize = std::str::from_utf8(&header)?
        .trim()
        .parse()
        .context("invalid packet length")?;
    if length > MAX_PACKET_LEN {
        bail!("packet length {} exceeds limit of {} bytes", length, MAX_PACKET_LEN);
    }
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await?;
    serde_json::from_slice(&body).context("invalid packet JSON")
}

/// Request/reply client over one connection
pub struct RdpClient<S> {
    stream: Mutex<BufReader<S>>,
}

impl<S> RdpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a fresh connection, consuming the root actor's greeting
    pub async fn new(stream: S) -> Result<Self> {
        let mut stream = BufReader::new(stream);
        let greeting = read_packet(&mut stream).await?;
        debug!(
            application = ?greeting.get("applicationType"),
            "Connected to Firefox remote debugger"
        );
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }

    pub async fn request(&self, to: &str, kind: &str, params: Value) -> Result<Value> {
        let mut packet = json!({ "to": to, "type": kind });
        if let (Some(packet), Value::Object(params)) = (packet.as_object_mut(), params) {
            packet.extend(params);
        }

        let mut stream = self.stream.lock().await;
        write_packet(stream.get_mut(), &packet).await?;

        loop {
            let reply = read_packet(&mut *stream).await?;
            if reply.get("from").and_then(Value::as_str) != Some(to) {
                debug!("Skipping packet from another actor: {}", reply);
                continue;
            }
            if let Some(event) = reply.get("type").and_then(Value::as_str) {
                if UNSOLICITED_EVENTS.contains(&event) {
                    debug!("Skipping unsolicited event: {}", event);
                    continue;
                }
            }
            if let Some(error) = reply.get("error").and_then(Value::as_str) {
                return Err(RemoteError {
                    error: error.to_string(),
                    message: reply
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }
                .into());
            }
            return Ok(reply);
        }
    }
}

pub struct RdpSession<S> {
    client: RdpClient<S>,
}

impl<S> RdpSession<S> {
    pub fn new(client: RdpClient<S>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<S> RemoteSession for RdpSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn install_temporary_addon(
        &self,
        extension_path: &Path,
        open_devtools: bool,
    ) -> Result<InstallResult> {
        let root = self.client.request("root", "getRoot", json!({})).await?;
        let Some(addons_actor) = root.get("addonsActor").and_then(Value::as_str) else {
            return Err(TempInstallNotSupported {
                reason: "This version of Firefox does not provide an add-ons actor for remote installation"
                    .to_string(),
            }
            .into());
        };

        let reply = self
            .client
            .request(
                addons_actor,
                "installTemporaryAddon",
                json!({
                    "addonPath": extension_path.to_string_lossy(),
                    "openDevTools": open_devtools,
                }),
            )
            .await
            .map_err(|err| {
                let unsupported = err
                    .downcast_ref::<RemoteError>()
                    .filter(|remote| remote.error == "unknownMethod")
                    .map(ToString::to_string);
                match unsupported {
                    Some(reason) => TempInstallNotSupported { reason }.into(),
                    None => err,
                }
            })?;

        let id = reply
            .get("addon")
            .and_then(|addon| addon.get("id"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        debug!(addon_id = %id, "installTemporaryAddon reply");

        Ok(InstallResult {
            addon: InstalledAddon { id: id.to_string() },
        })
    }

    async fn reload_addon(&self, addon_id: &str) -> Result<()> {
        let reply = self.client.request("root", "listAddons", json!({})).await?;
        let actor = reply
            .get("addons")
            .and_then(Value::as_array)
            .and_then(|addons| {
                addons
                    .iter()
                    .find(|addon| addon.get("id").and_then(Value::as_str) == Some(addon_id))
            })
            .and_then(|addon| addon.get("actor"))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("The remote Firefox does not have your extension installed"))?;

        self.client.request(actor, "reload", json!({})).await?;
        Ok(())
    }
}

/// Connects to the debugger server of a local Firefox
#[derive(Debug, Clone)]
pub struct RdpConnector {
    host: String,
    retries: u32,
    retry_interval: Duration,
}

impl Default for RdpConnector {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            retries: CONNECT_RETRIES,
            retry_interval: CONNECT_RETRY_INTERVAL,
        }
    }
}

impl RdpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    async fn connect_with_retries(&self, port: u16) -> Result<TcpStream> {
        let addr = format!("{}:{}", self.host, port);
        let mut last_error = None;

        for attempt in 1..=self.retries {
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    debug!(attempt, "Connected to {}", addr);
                    return Ok(stream);
                }
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    debug!(attempt, "Remote debugger not ready on {}", addr);
                    last_error = Some(e);
                    tokio::time::sleep(self.retry_interval).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to connect to {}", addr));
                }
            }
        }

        Err(anyhow!(
            "Firefox remote debugger on {} did not accept connections after {} attempts: {}",
            addr,
            self.retries,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }
}

#[async_trait]
impl RemoteConnector for RdpConnector {
    async fn connect(&self, port: u16) -> Result<Box<dyn RemoteSession>> {
        let stream = self.connect_with_retries(port).await?;
        let client = RdpClient::new(stream).await?;
        Ok(Box::new(RdpSession::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    /// Fake Firefox: sends a greeting, then answers each request via `respond`
    fn fake_firefox<F>(server: DuplexStream, respond: F) -> tokio::task::JoinHandle<Vec<Value>>
    where
        F: Fn(&Value) -> Vec<Value> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut stream = BufReader::new(server);
            write_packet(
                stream.get_mut(),
                &json!({"from": "root", "applicationType": "browser"}),
            )
            .await
            .unwrap();

            let mut received = Vec::new();
            while let Ok(request) = read_packet(&mut stream).await {
                for reply in respond(&request) {
                    write_packet(stream.get_mut(), &reply).await.unwrap();
                }
                received.push(request);
            }
            received
        })
    }

    fn firefox_replies(request: &Value) -> Vec<Value> {
        match (request["to"].as_str(), request["type"].as_str()) {
            (Some("root"), Some("getRoot")) => vec![
                json!({"from": "root", "type": "tabListChanged"}),
                json!({"from": "root", "addonsActor": "server1.conn0.addonsActor2"}),
            ],
            (Some("server1.conn0.addonsActor2"), Some("installTemporaryAddon")) => vec![json!({
                "from": "server1.conn0.addonsActor2",
                "addon": {"id": "demo@extrun", "actor": false}
            })],
            (Some("root"), Some("listAddons")) => vec![json!({
                "from": "root",
                "addons": [
                    {"id": "other@extrun", "actor": "server1.conn0.addon7"},
                    {"id": "demo@extrun", "actor": "server1.conn0.addon9"}
                ]
            })],
            (Some("server1.conn0.addon9"), Some("reload")) => vec![
                json!({"from": "server1.conn0.unrelated", "type": "frameUpdate"}),
                json!({"from": "server1.conn0.addon9"}),
            ],
            (Some(to), _) => vec![json!({"from": to, "error": "noSuchActor", "message": "no such actor"})],
            _ => Vec::new(),
        }
    }

    async fn session_with<F>(respond: F) -> (RdpSession<DuplexStream>, tokio::task::JoinHandle<Vec<Value>>)
    where
        F: Fn(&Value) -> Vec<Value> + Send + 'static,
    {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let handle = fake_firefox(server, respond);
        let client = RdpClient::new(client).await.unwrap();
        (RdpSession::new(client), handle)
    }

    #[tokio::test]
    async fn test_packet_framing() {
        let (mut a, b) = tokio::io::duplex(1024);
        write_packet(&mut a, &json!({"to": "root", "type": "getRoot"}))
            .await
            .unwrap();
        drop(a);

        let mut reader = BufReader::new(b);
        let packet = read_packet(&mut reader).await.unwrap();
        assert_eq!(packet["type"], "getRoot");
        assert!(read_packet(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_packets_rejected() {
        for input in [
            &b"18446744073709551615:{}"[..],
            &b"999999999999:{}"[..],
            &b"111111111111111111111111111111"[..],
        ] {
            let (mut a, b) = tokio::io::duplex(1024);
            a.write_all(input).await.unwrap();
            drop(a);

            let mut reader = BufReader::new(b);
            assert!(read_packet(&mut reader).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_body_limit_message() {
        let (mut a, b) = tokio::io::duplex(1024);
        a.write_all(b"67108865:{}").await.unwrap();
        drop(a);

        let err = read_packet(&mut BufReader::new(b)).await.unwrap_err();
        assert!(err.to_string().contains("exceeds limit"));
    }

    #[tokio::test]
    async fn test_install_temporary_addon() {
        let (session, server) = session_with(firefox_replies).await;
        let result = session
            .install_temporary_addon(Path::new("/ext/demo"), true)
            .await
            .unwrap();
        assert_eq!(result.addon.id, "demo@extrun");

        drop(session);
        let requests = server.await.unwrap();
        assert_eq!(requests[1]["addonPath"], "/ext/demo");
        assert_eq!(requests[1]["openDevTools"], true);
    }

    #[tokio::test]
    async fn test_missing_addons_actor_is_not_supported() {
        let (session, _server) = session_with(|request| {
            vec![json!({"from": request["to"], "tabs": []})]
        })
        .await;

        let err = session
            .install_temporary_addon(Path::new("/ext/demo"), false)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<TempInstallNotSupported>().is_some());
    }

    #[tokio::test]
    async fn test_unknown_method_is_not_supported() {
        let (session, _server) = session_with(|request| match request["type"].as_str() {
            Some("getRoot") => vec![json!({"from": "root", "addonsActor": "addons1"})],
            _ => vec![json!({"from": request["to"], "error": "unknownMethod", "message": "nope"})],
        })
        .await;

        let err = session
            .install_temporary_addon(Path::new("/ext/demo"), false)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<TempInstallNotSupported>().is_some());
    }

    #[tokio::test]
    async fn test_reload_addon() {
        let (session, server) = session_with(firefox_replies).await;
        session.reload_addon("demo@extrun").await.unwrap();

        let err = session.reload_addon("missing@extrun").await.unwrap_err();
        assert!(err.to_string().contains("does not have your extension installed"));

        drop(session);
        let requests = server.await.unwrap();
        let kinds: Vec<_> = requests
            .iter()
            .map(|r| r["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(kinds, vec!["listAddons", "reload", "listAddons"]);
        assert_eq!(requests[1]["to"], "server1.conn0.addon9");
    }

    #[tokio::test]
    async fn test_error_reply() {
        let (session, _server) = session_with(firefox_replies).await;
        let err = session
            .client
            .request("server1.conn0.gone", "detach", json!({}))
            .await
            .unwrap_err();
        let remote = err.downcast_ref::<RemoteError>().unwrap();
        assert_eq!(remote.error, "noSuchActor");
        assert_eq!(err.to_string(), "noSuchActor: no such actor");
    }

    #[tokio::test]
    async fn test_connector_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            write_packet(&mut socket, &json!({"from": "root", "applicationType": "browser"}))
                .await
                .unwrap();
            // Hold the connection open until the client goes away
            let mut buf = [0u8; 64];
            while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
        });

        let connector = RdpConnector {
            retries: 5,
            retry_interval: Duration::from_millis(10),
            ..RdpConnector::new()
        };
        assert!(connector.connect(port).await.is_ok());
    }
}
