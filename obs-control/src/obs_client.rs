use crate::error::{ObsError, Result};
use crate::protocol::{
    self, Hello, Identified, Identify, OpCode, Request, RequestResponse, CLOSE_AUTHENTICATION_FAILED,
    GET_CURRENT_PROGRAM_SCENE, RPC_VERSION, SET_CURRENT_PROGRAM_SCENE,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use interfaces::defs::{ControllerError, SceneController};
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_PORT: u16 = 4455;

#[derive(Clone)]
pub struct ObsConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ObsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            password: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ObsConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Parse OBS connection settings from a URI
    /// Expected URI format: obsws://[:password@]host[:port]
    pub fn from_uri(uri: &str) -> Result<Self> {
        let parsed = Url::parse(uri).map_err(|e| ObsError::InvalidUri(format!("{}: {}", uri, e)))?;

        // Validate scheme
        if !matches!(parsed.scheme(), "obsws" | "ws") {
            return Err(ObsError::InvalidUri(format!(
                "URI must use 'obsws://' or 'ws://' scheme, got: {}",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ObsError::InvalidUri(format!("No host specified in URI: {}", uri)))?
            .to_string();

        let port = parsed.port().unwrap_or(DEFAULT_PORT);
        // Url keeps userinfo percent-encoded
        let password = parsed
            .password()
            .map(|p| {
                percent_decode_str(p)
                    .decode_utf8()
                    .map(|decoded| decoded.into_owned())
                    .map_err(|e| ObsError::InvalidUri(format!("password is not valid UTF-8: {}", e)))
            })
            .transpose()?;

        Ok(Self::new(host, port).with_password(password))
    }

    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

/// Client for the OBS WebSocket v5 protocol, limited to program scene control.
pub struct ObsClient {
    config: ObsConfig,
    socket: Option<Socket>,
    negotiated_rpc_version: u32,
}

impl ObsClient {
    /// Open the socket and complete the Hello / Identify / Identified handshake.
    pub async fn connect(config: ObsConfig) -> Result<Self> {
        let url = config.websocket_url();
        debug!("Connecting to OBS at {}", url);

        let (socket, _) = tokio::time::timeout(config.request_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ObsError::Timeout(format!("connection to {}", url)))??;

        let mut client = Self {
            config,
            socket: Some(socket),
            negotiated_rpc_version: 0,
        };

        let timeout = client.config.request_timeout;
        match tokio::time::timeout(timeout, client.handshake()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                client.socket = None;
                return Err(e);
            }
            Err(_) => {
                client.socket = None;
                return Err(ObsError::Timeout("OBS handshake".to_string()));
            }
        }

        info!(
            "Connected to OBS at {} (rpc version {})",
            url, client.negotiated_rpc_version
        );
        Ok(client)
    }

    async fn handshake(&mut self) -> Result<()> {
        // Step 1: server greets with Hello, possibly carrying an auth challenge
        let hello: Hello = match self.next_message().await? {
            (OpCode::Hello, payload) => serde_json::from_value(payload)?,
            (op, _) => return Err(ObsError::Protocol(format!("expected Hello, got {:?}", op))),
        };
        debug!(
            "OBS Hello: websocket version {:?}, rpc version {}",
            hello.obs_web_socket_version, hello.rpc_version
        );

        // Step 2: answer with Identify
        let authentication = match (&hello.authentication, &self.config.password) {
            (Some(challenge), Some(password)) => Some(protocol::authentication_string(
                password,
                &challenge.salt,
                &challenge.challenge,
            )),
            (Some(_), None) => {
                return Err(ObsError::Authentication(
                    "server requires a password but none was configured".to_string(),
                ))
            }
            (None, _) => None,
        };
        let identify = Identify {
            rpc_version: RPC_VERSION.min(hello.rpc_version),
            authentication,
            event_subscriptions: 0,
        };
        self.send_text(protocol::encode(OpCode::Identify, &identify)?).await?;

        // Step 3: wait for Identified; a bad password closes the socket instead
        match self.next_message().await {
            Ok((OpCode::Identified, payload)) => {
                let identified: Identified = serde_json::from_value(payload)?;
                self.negotiated_rpc_version = identified.negotiated_rpc_version;
                Ok(())
            }
            Ok((op, _)) => Err(ObsError::Protocol(format!("expected Identified, got {:?}", op))),
            Err(ObsError::Closed { code, reason }) if code == CLOSE_AUTHENTICATION_FAILED => {
                Err(ObsError::Authentication(reason))
            }
            Err(e) => Err(e),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    pub fn negotiated_rpc_version(&self) -> u32 {
        self.negotiated_rpc_version
    }

    pub async fn get_current_program_scene(&mut self) -> Result<String> {
        let data = self.call(GET_CURRENT_PROGRAM_SCENE, None).await?.unwrap_or(Value::Null);

        // Older servers only send the deprecated `sceneName` field.
        data.get("currentProgramSceneName")
            .or_else(|| data.get("sceneName"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ObsError::Protocol("response carried no scene name".to_string()))
    }

    pub async fn set_current_program_scene(&mut self, scene: &str) -> Result<()> {
        self.call(SET_CURRENT_PROGRAM_SCENE, Some(json!({ "sceneName": scene })))
            .await?;
        info!("OBS program scene set to '{}'", scene);
        Ok(())
    }

    /// Close the socket. Safe to call more than once.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut socket) = self.socket.take() {
            socket.close(None).await?;
            info!("Disconnected from OBS at {}", self.config.websocket_url());
        }
        Ok(())
    }

    async fn call(&mut self, request_type: &str, request_data: Option<Value>) -> Result<Option<Value>> {
        let timeout = self.config.request_timeout;
        let result = match tokio::time::timeout(timeout, self.exchange(request_type, request_data)).await {
            Ok(result) => result,
            Err(_) => Err(ObsError::Timeout(request_type.to_string())),
        };

        if let Err(e) = &result {
            if e.is_connection_lost() {
                warn!("OBS connection lost during {}: {}", request_type, e);
                self.socket = None;
            }
        }
        result
    }

    async fn exchange(&mut self, request_type: &str, request_data: Option<Value>) -> Result<Option<Value>> {
        let request = Request {
            request_type: request_type.to_string(),
            request_id: Uuid::new_v4().to_string(),
            request_data,
        };
        self.send_text(protocol::encode(OpCode::Request, &request)?).await?;

        loop {
            let (op, payload) = self.next_message().await?;
            if op != OpCode::RequestResponse {
                debug!("Skipping OBS message with opcode {:?}", op);
                continue;
            }

            let response: RequestResponse = serde_json::from_value(payload)?;
            if response.request_id != request.request_id {
                debug!("Skipping stale OBS response {}", response.request_id);
                continue;
            }

            if !response.request_status.result {
                return Err(ObsError::RequestFailed {
                    request_type: response.request_type,
                    code: response.request_status.code,
                    comment: response.request_status.comment.unwrap_or_default(),
                });
            }
            return Ok(response.response_data);
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        let socket = self.socket.as_mut().ok_or(ObsError::NotConnected)?;
        socket.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Result<(OpCode, Value)> {
        let socket = self.socket.as_mut().ok_or(ObsError::NotConnected)?;
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return protocol::decode(&text),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Err(ObsError::Closed { code, reason });
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ObsError::WebSocket(e)),
                None => {
                    return Err(ObsError::Closed {
                        code: 1006,
                        reason: "stream ended".to_string(),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl SceneController for ObsClient {
    async fn current_scene(&mut self) -> std::result::Result<String, ControllerError> {
        self.get_current_program_scene()
            .await
            .map_err(ObsError::into_query_error)
    }

    async fn set_current_scene(&mut self, scene: &str) -> std::result::Result<(), ControllerError> {
        self.set_current_program_scene(scene)
            .await
            .map_err(ObsError::into_switch_error)
    }

    async fn disconnect(&mut self) -> std::result::Result<(), ControllerError> {
        ObsClient::disconnect(self)
            .await
            .map_err(|e| ControllerError::Connection(e.to_string()))
    }
}
