#![allow(dead_code)]

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use obs_control::protocol::authentication_string;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

const SALT: &str = "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=";
const CHALLENGE: &str = "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=";

/// Scene state shared between the fake server and the test body
#[derive(Debug, Default)]
pub struct FakeObsState {
    pub program_scene: String,
    pub scenes: Vec<String>,
    pub set_requests: Vec<String>,
    pub identified: bool,
}

/// Minimal in-process OBS WebSocket v5 server for exercising the client
pub struct FakeObs {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<FakeObsState>>,
}

impl FakeObs {
    /// Start a server that accepts a single client connection
    pub async fn start(password: Option<&str>, scenes: &[&str]) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(FakeObsState {
            program_scene: scenes.first().map(|s| s.to_string()).unwrap_or_default(),
            scenes: scenes.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }));

        let password = password.map(|p| p.to_string());
        let server_state = state.clone();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                if let Err(e) = serve(stream, password, server_state).await {
                    println!("fake OBS connection ended: {}", e);
                }
            }
        });

        Ok(Self { addr, state })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn program_scene(&self) -> String {
        self.state.lock().unwrap().program_scene.clone()
    }

    pub fn set_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().set_requests.clone()
    }

    pub fn was_identified(&self) -> bool {
        self.state.lock().unwrap().identified
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    password: Option<String>,
    state: Arc<Mutex<FakeObsState>>,
) -> Result<()> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;

    // Step 1: Hello
    let mut hello = json!({"obsWebSocketVersion": "5.4.2", "rpcVersion": 1});
    if password.is_some() {
        hello["authentication"] = json!({"challenge": CHALLENGE, "salt": SALT});
    }
    ws.send(Message::Text(json!({"op": 0, "d": hello}).to_string())).await?;

    // Step 2: Identify, checked against the expected auth string
    let identify = next_json(&mut ws).await?;
    if let Some(password) = &password {
        let expected = authentication_string(password, SALT, CHALLENGE);
        if identify["d"]["authentication"].as_str() != Some(expected.as_str()) {
            ws.close(Some(CloseFrame {
                code: CloseCode::from(4009),
                reason: "Authentication failed.".into(),
            }))
            .await?;
            return Ok(());
        }
    }
    state.lock().unwrap().identified = true;
    ws.send(Message::Text(json!({"op": 2, "d": {"negotiatedRpcVersion": 1}}).to_string()))
        .await?;

    // Step 3: serve requests until the client goes away
    loop {
        let request = match next_json(&mut ws).await {
            Ok(request) => request,
            Err(_) => return Ok(()),
        };
        let request_type = request["d"]["requestType"].as_str().unwrap_or_default().to_string();
        let request_id = request["d"]["requestId"].clone();

        // An unsolicited event first, which the client must skip
        ws.send(Message::Text(
            json!({"op": 5, "d": {"eventType": "StudioModeStateChanged", "eventIntent": 1024}}).to_string(),
        ))
        .await?;

        let (status, data) = {
            let mut state = state.lock().unwrap();
            match request_type.as_str() {
                "GetCurrentProgramScene" => (
                    json!({"result": true, "code": 100}),
                    Some(json!({
                        "currentProgramSceneName": state.program_scene,
                        "sceneName": state.program_scene
                    })),
                ),
                "SetCurrentProgramScene" => {
                    let scene = request["d"]["requestData"]["sceneName"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    state.set_requests.push(scene.clone());
                    if state.scenes.contains(&scene) {
                        state.program_scene = scene;
                        (json!({"result": true, "code": 100}), None)
                    } else {
                        (
                            json!({"result": false, "code": 600, "comment": "No source was found by the name of `scene`."}),
                            None,
                        )
                    }
                }
                _ => (json!({"result": false, "code": 204}), None),
            }
        };

        let mut response = json!({
            "requestType": request_type,
            "requestId": request_id,
            "requestStatus": status
        });
        if let Some(data) = data {
            response["responseData"] = data;
        }
        ws.send(Message::Text(json!({"op": 7, "d": response}).to_string()))
            .await?;
    }
}

async fn next_json<S>(ws: &mut S) -> Result<Value>
where
    S: StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
            Some(Ok(Message::Close(_))) | None => return Err(anyhow::anyhow!("client closed")),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}
