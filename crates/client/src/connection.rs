//! `Connection`: the per-chat state machine driving the WebSocket↔WebRTC
//! handoff (§4.2). Owns the chat's websocket to the signaling server, the
//! SDP offer/answer exchange, the `RTCPeerConnection`/`DataChannel`, and
//! presence tracking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::domain::{envelope::kind, Envelope};
use crate::protocol::ws::{self, WsSender};
use crate::{Error, Result};

/// 10 s, per §4.2 — every awaited response future except `register_response`.
pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Offer,
    Answer,
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum P2pState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Offline,
    Unknown,
}

/// The envelope kind an inbound ciphertext arrived under (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Drained from the offline spool; decrypt under the sender's
    /// long-term public key.
    LongTermPublicKey,
    /// Arrived live with a fresh ephemeral public key attached.
    PublicKey,
    /// Arrived over an open data channel (reserved; §9 Open Questions).
    None,
}

/// One item produced by `Connection` for the owning `ChatOrchestrator` to
/// decrypt and dispatch.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub ciphertext: String,
    pub envelope_kind: EnvelopeKind,
    pub public_key_hint: Option<String>,
}

struct State {
    role: Role,
    p2p_state: P2pState,
    target_online: Presence,
    pending_peer_public_key: Option<String>,
}

/// The per-chat connection state machine (§3 Connection, §4.2).
pub struct Connection {
    user_id: String,
    target_user_id: String,
    server_url: String,
    stun_servers: Vec<String>,
    inbound_tx: mpsc::Sender<Inbound>,

    sender: Mutex<Option<WsSender>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Envelope>>>>,
    state: Mutex<State>,
    p2p_failed: AtomicBool,
    local_disconnect_initialized: AtomicBool,
    peer_connection: Mutex<Option<Arc<RTCPeerConnection>>>,
    data_channel: Mutex<Option<Arc<RTCDataChannel>>>,
}

impl Connection {
    pub fn new(
        user_id: impl Into<String>,
        target_user_id: impl Into<String>,
        server_url: impl Into<String>,
        stun_servers: Vec<String>,
        inbound_tx: mpsc::Sender<Inbound>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            target_user_id: target_user_id.into(),
            server_url: server_url.into(),
            stun_servers,
            inbound_tx,
            sender: Mutex::new(None),
            reader_task: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            state: Mutex::new(State {
                role: Role::Unset,
                p2p_state: P2pState::Disconnected,
                target_online: Presence::Unknown,
                pending_peer_public_key: None,
            }),
            p2p_failed: AtomicBool::new(false),
            local_disconnect_initialized: AtomicBool::new(false),
            peer_connection: Mutex::new(None),
            data_channel: Mutex::new(None),
        }
    }

    pub async fn p2p_state(&self) -> P2pState {
        self.state.lock().await.p2p_state
    }

    pub async fn target_online(&self) -> Presence {
        self.state.lock().await.target_online
    }

    pub fn p2p_failed(&self) -> bool {
        self.p2p_failed.load(Ordering::SeqCst)
    }

    /// Takes `self: &Arc<Self>` so the spawned reader task can hold its
    /// own strong reference to `Connection` — an unsolicited
    /// `connection_establishment_request` (§4.2: peer-initiated handshake)
    /// needs to run a new role handler on `self` from inside that task.
    async fn ensure_socket_open(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.sender.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let (sender, mut receiver) = ws::connect(&self.server_url).await?;
        *guard = Some(sender);

        let pending = Arc::clone(&self.pending);
        let inbound_tx = self.inbound_tx.clone();
        let user_id = self.user_id.clone();
        let target_user_id = self.target_user_id.clone();
        let connection = Arc::clone(self);

        let task = tokio::spawn(
            async move {
                while let Some(result) = receiver.recv().await {
                    let envelope = match result {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            warn!(error = %e, "transport error reading from signaling server");
                            break;
                        }
                    };

                    if let Some(tx) = pending.lock().await.remove(&envelope.kind) {
                        let _ = tx.send(envelope);
                        continue;
                    }

                    dispatch_unsolicited(envelope, &inbound_tx, &connection).await;
                }
                debug!("chat socket reader loop exiting");
            }
            .instrument(info_span!("chat_socket", user_id = %user_id, target_user_id = %target_user_id)),
        );

        *self.reader_task.lock().await = Some(task);
        Ok(())
    }

    /// Refresh presence/handshake state and return the peer's current
    /// ephemeral public key if a handshake has completed (§4.3's
    /// single-call `Connection.connect`). Idempotent once a role has
    /// already been assigned for this chat.
    pub async fn connect(self: &Arc<Self>, my_ephemeral_public_key: &str) -> Result<Option<String>> {
        if self.sender.lock().await.is_none() {
            return self.connect_to_server(my_ephemeral_public_key).await;
        }

        if let Some(peer_public_key) = self.state.lock().await.pending_peer_public_key.clone() {
            return Ok(Some(peer_public_key));
        }

        self.connect_to_peer().await
    }

    /// Fetch and cache the peer's long-term public key (§4.3 `open`).
    pub async fn get_long_term_public_key(self: &Arc<Self>) -> Result<String> {
        self.ensure_socket_open().await?;
        self.send(Envelope::from_user(
            kind::GET_LONG_TERM_PUBLIC_KEY,
            self.user_id.clone(),
            json!({"target_user_id": self.target_user_id}),
        ))
        .await?;

        let response = self.await_response(kind::GET_LONG_TERM_PUBLIC_KEY_RESPONSE, true).await?;
        response.content["long_term_public_key"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::UserNotRegistered(self.target_user_id.clone()))
    }

    async fn send(&self, envelope: Envelope) -> Result<()> {
        let mut guard = self.sender.lock().await;
        let sender = guard.as_mut().ok_or_else(|| Error::Transport("socket not open".to_string()))?;
        sender.send(&envelope).await
    }

    /// Relay a ciphertext through the server (no response is awaited —
    /// the server either forwards it live or spools it).
    pub async fn relay_message(&self, ciphertext: &str, public_key: Option<&str>) -> Result<()> {
        let mut content = json!({"target_user": self.target_user_id, "message": ciphertext});
        if let Some(public_key) = public_key {
            content["public_key"] = json!(public_key);
        }
        self.send(Envelope::from_user(kind::RELAY_MESSAGE, self.user_id.clone(), content)).await
    }

    async fn await_response(&self, response_type: &str, bounded: bool) -> Result<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(response_type.to_string(), tx);

        let recv = async {
            rx.await
                .map_err(|_| Error::Transport(format!("{response_type} future cancelled")))
        };

        if bounded {
            timeout(HANDSHAKE_TIMEOUT, recv)
                .await
                .map_err(|_| Error::ConnectionTimeout(response_type.to_string()))?
        } else {
            recv.await
        }
    }

    /// Register for this chat on the server and drive any handshake the
    /// server assigns. Returns the peer's ephemeral public key if a
    /// handshake role was assigned this call.
    pub async fn connect_to_server(self: &Arc<Self>, my_ephemeral_public_key: &str) -> Result<Option<String>> {
        self.ensure_socket_open().await?;

        self.send(Envelope::from_user(
            kind::REGISTER_REQUEST,
            self.user_id.clone(),
            json!({"target_user_id": self.target_user_id, "public_key": my_ephemeral_public_key}),
        ))
        .await?;

        let spooled = self.await_response(kind::SEND_STORED_MESSAGES, true).await?;
        for ciphertext in spooled.content["message"].as_array().cloned().unwrap_or_default() {
            if let Some(ciphertext) = ciphertext.as_str() {
                let _ = self
                    .inbound_tx
                    .send(Inbound {
                        ciphertext: ciphertext.to_string(),
                        envelope_kind: EnvelopeKind::LongTermPublicKey,
                        public_key_hint: None,
                    })
                    .await;
            }
        }

        let response = self.await_response(kind::REGISTER_RESPONSE, false).await?;
        self.handle_register_response(response).await
    }

    async fn handle_register_response(&self, response: Envelope) -> Result<Option<String>> {
        match response.content["register_response_type"].as_str() {
            Some(kind::CONNECTION_ESTABLISHMENT_REQUEST) => {
                let role = parse_role(response.content["role"].as_str())?;
                let peer_public_key = response.content["public_key"].as_str().map(str::to_string);
                self.run_role_handler(role, peer_public_key.clone()).await?;
                Ok(peer_public_key)
            }
            Some("target_user_online") => {
                self.state.lock().await.target_online = Presence::Online;
                Ok(None)
            }
            Some("target_user_offline") | _ => {
                self.state.lock().await.target_online = Presence::Offline;
                Ok(None)
            }
        }
    }

    /// Request a direct connection to the peer (§4.2 `connect_to_peer`).
    pub async fn connect_to_peer(self: &Arc<Self>) -> Result<Option<String>> {
        self.ensure_socket_open().await?;

        self.send(Envelope::from_user(
            kind::CONNECTION_REQUEST,
            self.user_id.clone(),
            json!({"target_user_id": self.target_user_id}),
        ))
        .await?;

        let response = self.await_response(kind::CONNECTION_RESPONSE, true).await?;
        match response.content["connection_response_type"].as_str() {
            Some("user_not_registered_error") => Err(Error::UserNotRegistered(self.target_user_id.clone())),
            Some("target_user_offline") => {
                self.state.lock().await.target_online = Presence::Offline;
                Ok(None)
            }
            Some(kind::CONNECTION_ESTABLISHMENT_REQUEST) => {
                let role = parse_role(response.content["role"].as_str())?;
                let peer_public_key = response.content["public_key"].as_str().map(str::to_string);
                self.run_role_handler(role, peer_public_key.clone()).await?;
                Ok(peer_public_key)
            }
            other => Err(Error::SchemaViolation {
                request_type: kind::CONNECTION_RESPONSE.to_string(),
                reason: format!("unexpected connection_response_type: {other:?}"),
            }),
        }
    }

    async fn run_role_handler(&self, role: Role, peer_public_key: Option<String>) -> Result<()> {
        self.state.lock().await.role = role;
        self.state.lock().await.p2p_state = P2pState::Connecting;
        self.state.lock().await.pending_peer_public_key = peer_public_key;
        self.p2p_failed.store(false, Ordering::SeqCst);

        let outcome = match role {
            Role::Offer => self.run_offer().await,
            Role::Answer => self.run_answer().await,
            Role::Unset => return Ok(()),
        };

        match outcome {
            Ok(()) => {
                self.state.lock().await.p2p_state = P2pState::Connected;
                Ok(())
            }
            Err(e) => {
                self.p2p_failed.store(true, Ordering::SeqCst);
                self.state.lock().await.p2p_state = P2pState::Disconnected;
                Err(e)
            }
        }
    }

    fn ice_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.stun_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    async fn run_offer(&self) -> Result<()> {
        let api = APIBuilder::new().build();
        let pc = Arc::new(
            api.new_peer_connection(self.ice_config())
                .await
                .map_err(|e| Error::Transport(e.to_string()))?,
        );

        let dc = pc
            .create_data_channel("channel", None)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let (opened_tx, opened_rx) = oneshot::channel();
        wire_data_channel(&dc, opened_tx, self.inbound_tx.clone(), self.user_id.clone(), self.target_user_id.clone());

        let offer = pc.create_offer(None).await.map_err(|e| Error::Transport(e.to_string()))?;
        pc.set_local_description(offer).await.map_err(|e| Error::Transport(e.to_string()))?;
        let _ = pc.gathering_complete_promise().await.recv().await;
        let local = pc
            .local_description()
            .await
            .ok_or_else(|| Error::Transport("no local description after gathering".to_string()))?;

        self.send(Envelope::from_user(
            kind::SHARE_OFFER,
            self.user_id.clone(),
            json!({"target_user_id": self.target_user_id, "offer": {"sdp": local.sdp, "type": "offer"}}),
        ))
        .await?;

        let answer = self.await_response(kind::SHARE_ANSWER, true).await?;
        let sdp = answer.content["answer"]["sdp"]
            .as_str()
            .ok_or_else(|| Error::SchemaViolation {
                request_type: kind::SHARE_ANSWER.to_string(),
                reason: "missing answer.sdp".to_string(),
            })?;
        let remote = RTCSessionDescription::answer(sdp.to_string()).map_err(|e| Error::Transport(e.to_string()))?;
        pc.set_remote_description(remote).await.map_err(|e| Error::Transport(e.to_string()))?;

        timeout(HANDSHAKE_TIMEOUT, opened_rx)
            .await
            .map_err(|_| Error::ConnectionTimeout("data channel open (offer)".to_string()))?
            .map_err(|_| Error::ConnectionTimeout("data channel open (offer)".to_string()))?;

        *self.peer_connection.lock().await = Some(pc);
        *self.data_channel.lock().await = Some(dc);
        Ok(())
    }

    async fn run_answer(&self) -> Result<()> {
        let api = APIBuilder::new().build();
        let pc = Arc::new(
            api.new_peer_connection(self.ice_config())
                .await
                .map_err(|e| Error::Transport(e.to_string()))?,
        );

        let (dc_tx, dc_rx) = oneshot::channel();
        let dc_tx = Arc::new(Mutex::new(Some(dc_tx)));
        let inbound_tx = self.inbound_tx.clone();
        let user_id = self.user_id.clone();
        let target_user_id = self.target_user_id.clone();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let inbound_tx = inbound_tx.clone();
            let user_id = user_id.clone();
            let target_user_id = target_user_id.clone();
            let dc_tx = Arc::clone(&dc_tx);
            Box::pin(async move {
                let (opened_tx, _opened_rx) = oneshot::channel();
                wire_data_channel(&dc, opened_tx, inbound_tx, user_id, target_user_id);
                if let Some(tx) = dc_tx.lock().await.take() {
                    let _ = tx.send(dc);
                }
            })
        }));

        let offer = self.await_response(kind::SHARE_OFFER, true).await?;
        let sdp = offer.content["offer"]["sdp"].as_str().ok_or_else(|| Error::SchemaViolation {
            request_type: kind::SHARE_OFFER.to_string(),
            reason: "missing offer.sdp".to_string(),
        })?;
        let remote = RTCSessionDescription::offer(sdp.to_string()).map_err(|e| Error::Transport(e.to_string()))?;
        pc.set_remote_description(remote).await.map_err(|e| Error::Transport(e.to_string()))?;

        let answer = pc.create_answer(None).await.map_err(|e| Error::Transport(e.to_string()))?;
        pc.set_local_description(answer).await.map_err(|e| Error::Transport(e.to_string()))?;
        let _ = pc.gathering_complete_promise().await.recv().await;
        let local = pc
            .local_description()
            .await
            .ok_or_else(|| Error::Transport("no local description after gathering".to_string()))?;

        self.send(Envelope::from_user(
            kind::SHARE_ANSWER,
            self.user_id.clone(),
            json!({"target_user_id": self.target_user_id, "answer": {"sdp": local.sdp, "type": "answer"}}),
        ))
        .await?;

        let dc = timeout(HANDSHAKE_TIMEOUT, dc_rx)
            .await
            .map_err(|_| Error::ConnectionTimeout("data channel (answer)".to_string()))?
            .map_err(|_| Error::ConnectionTimeout("data channel (answer)".to_string()))?;

        *self.peer_connection.lock().await = Some(pc);
        *self.data_channel.lock().await = Some(dc);
        Ok(())
    }

    /// Cancel pending futures, close the peer connection and socket, and
    /// return to `disconnected` (§4.2 `disconnect`).
    pub async fn disconnect(&self) {
        self.local_disconnect_initialized.store(true, Ordering::SeqCst);
        self.pending.lock().await.clear();

        if let Some(pc) = self.peer_connection.lock().await.take() {
            let _ = pc.close().await;
        }
        self.data_channel.lock().await.take();

        if let Some(mut sender) = self.sender.lock().await.take() {
            let _ = sender.close().await;
        }
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }

        let mut state = self.state.lock().await;
        state.p2p_state = P2pState::Disconnected;
        state.role = Role::Unset;
    }
}

fn wire_data_channel(
    dc: &Arc<RTCDataChannel>,
    opened_tx: oneshot::Sender<()>,
    inbound_tx: mpsc::Sender<Inbound>,
    user_id: String,
    target_user_id: String,
) {
    let opened_tx = Mutex::new(Some(opened_tx));
    dc.on_open(Box::new(move || {
        if let Ok(mut guard) = opened_tx.try_lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(());
            }
        }
        Box::pin(async move {
            info!(%user_id, %target_user_id, "data channel open");
        })
    }));

    let inbound_tx_for_message = inbound_tx.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let inbound_tx = inbound_tx_for_message.clone();
        let ciphertext = String::from_utf8_lossy(&msg.data).to_string();
        Box::pin(async move {
            let _ = inbound_tx
                .send(Inbound {
                    ciphertext,
                    envelope_kind: EnvelopeKind::None,
                    public_key_hint: None,
                })
                .await;
        })
    }));

    dc.on_close(Box::new(move || {
        Box::pin(async move {
            debug!("data channel closed");
        })
    }));
}

async fn dispatch_unsolicited(envelope: Envelope, inbound_tx: &mpsc::Sender<Inbound>, connection: &Arc<Connection>) {
    match envelope.kind.as_str() {
        k if k == kind::RELAY_MESSAGE => {
            let ciphertext = envelope.content["message"].as_str().unwrap_or_default().to_string();
            let public_key_hint = envelope.content["public_key"].as_str().map(str::to_string);
            let _ = inbound_tx
                .send(Inbound {
                    ciphertext,
                    envelope_kind: EnvelopeKind::PublicKey,
                    public_key_hint,
                })
                .await;
        }
        // Peer-initiated handshake (§4.2): the server pushes this to the
        // pending caller's chat socket once the waiting peer reconnects
        // (signaling's pending-peer resolution), with no request of ours
        // for it to match against a `pending` entry.
        k if k == kind::CONNECTION_ESTABLISHMENT_REQUEST => match parse_role(envelope.content["role"].as_str()) {
            Ok(role) => {
                let peer_public_key = envelope.content["public_key"].as_str().map(str::to_string);
                let connection = Arc::clone(connection);
                tokio::spawn(async move {
                    if let Err(e) = connection.run_role_handler(role, peer_public_key).await {
                        warn!(error = %e, "unsolicited role handler failed");
                    }
                });
            }
            Err(e) => warn!(error = %e, "malformed unsolicited connection_establishment_request"),
        },
        other => {
            debug!(kind = other, "unhandled unsolicited signaling frame");
        }
    }
}

fn parse_role(role: Option<&str>) -> Result<Role> {
    match role {
        Some("offer") => Ok(Role::Offer),
        Some("answer") => Ok(Role::Answer),
        other => Err(Error::SchemaViolation {
            request_type: kind::CONNECTION_ESTABLISHMENT_REQUEST.to_string(),
            reason: format!("missing or invalid role: {other:?}"),
        }),
    }
}
