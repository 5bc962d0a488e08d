//! Server network layer: HTTP routing, WebSocket upgrade, Init handshake and
//! the per-connection read/send tasks bridging a socket to its game session

use crate::game::{ConnectionHandle, Dispatch, Game, ShutdownSignal};
use crate::outbox::{Outbox, DEFAULT_CAPACITY};
use crate::registry::SessionRegistry;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, info, warn};
use shared::{ClientMessage, PlayerId, ProtocolError, ServerMessage};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

/// Body served on `/`.
pub const HTTP_BODY: &str = "game-server running";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Idle time on the send side before a Ping is written
    pub keepalive: Duration,
    /// How long a new connection has to complete the Init handshake
    pub init_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(30),
            init_timeout: Duration::from_secs(2),
            queue_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Why a connection was turned away before joining. The `Display` text is
/// what the client receives in its `Error` message.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Init message not received within {0:?}")]
    Timeout(Duration),
    #[error("Connection closed before Init")]
    Closed,
    #[error("Incorrect MessageType")]
    IncorrectMessageType,
    #[error("Incorrect ServerId")]
    IncorrectServerId,
    #[error("Unknown Game")]
    UnknownGame,
    #[error("Malformed Init message: {0}")]
    Malformed(#[from] ProtocolError),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] ProtocolError),
    #[error("failed to write message: {0}")]
    WebSocket(#[from] axum::Error),
}

/// How a joined connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The player sent Quit for itself and has been removed.
    Quit,
    /// Read or write failure, or the peer closed the socket.
    Disconnected,
    /// The session closed or replaced this connection's handle.
    Closed,
}

/// State handed to every route handler
#[derive(Clone)]
struct ServerState {
    registry: Arc<SessionRegistry>,
    config: ServerConfig,
}

/// Serves the liveness page on `/` and game connections on `/ws`
pub struct Server {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(
        addr: &str,
        registry: Arc<SessionRegistry>,
        config: ServerConfig,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            registry,
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until the listener fails.
    pub async fn run(self) -> io::Result<()> {
        info!("Server started successfully");

        let app = router(ServerState {
            registry: self.registry,
            config: self.config,
        });

        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// GET /
async fn liveness() -> &'static str {
    HTTP_BODY
}

/// GET /ws
async fn ws_upgrade(
    State(state): State<ServerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    debug!("WebSocket upgrade from {}", peer);
    ws.on_upgrade(move |socket| handle_connection(socket, peer, state))
}

async fn handle_connection(socket: WebSocket, peer: SocketAddr, state: ServerState) {
    let (mut sink, mut source) = socket.split();
    let (connection, shutdown) = ConnectionHandle::new(peer.to_string());

    let joined = read_init(
        &mut source,
        &state.registry,
        state.config.init_timeout,
        connection,
    )
    .await;

    let (player_id, game) = match joined {
        Ok(joined) => joined,
        Err(e) => {
            warn!("Rejected connection from {}: {}", peer, e);
            let rejection = ServerMessage::error(e.to_string());
            if let Err(e) = send_message(&mut sink, &rejection).await {
                debug!("Failed to send error to {}: {}", peer, e);
            }
            let _ = sink.close().await;
            return;
        }
    };

    info!("Player {} connected from {}", player_id, peer);
    serve_player(sink, source, player_id, game, shutdown, state.config.keepalive).await;
}

/// Reads the Init message and joins the requested game.
async fn read_init<St>(
    source: &mut St,
    registry: &SessionRegistry,
    wait: Duration,
    connection: ConnectionHandle,
) -> Result<(PlayerId, Arc<dyn Game>), HandshakeError>
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let text = timeout(wait, next_text(source))
        .await
        .map_err(|_| HandshakeError::Timeout(wait))??;

    let init = match ClientMessage::parse(&text) {
        Ok(ClientMessage::Init(init)) => init,
        Ok(_) | Err(ProtocolError::UnexpectedType(_)) | Err(ProtocolError::UnknownType(_)) => {
            return Err(HandshakeError::IncorrectMessageType)
        }
        Err(e) => return Err(e.into()),
    };

    if init.server_id != registry.server_id() {
        return Err(HandshakeError::IncorrectServerId);
    }

    let game = registry
        .select(init.game_type)
        .ok_or(HandshakeError::UnknownGame)?;
    let player_id = game.join(init.user_id, &init.player_name, connection);

    Ok((player_id, game))
}

async fn next_text<St>(source: &mut St) -> Result<String, HandshakeError>
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = source.next().await {
        match frame? {
            Message::Text(text) => return Ok(text.as_str().to_owned()),
            Message::Binary(data) => {
                return String::from_utf8(data.to_vec())
                    .map_err(|_| HandshakeError::IncorrectMessageType)
            }
            Message::Close(_) => return Err(HandshakeError::Closed),
            _ => continue,
        }
    }
    Err(HandshakeError::Closed)
}

/// Acknowledges the join, runs the session, then tears the player down.
///
/// A lost connection disables the player unless its handle was already
/// closed by a kick or a reconnect.
async fn serve_player<S, St>(
    mut sink: S,
    source: St,
    player_id: PlayerId,
    game: Arc<dyn Game>,
    shutdown: ShutdownSignal,
    keepalive: Duration,
) where
    S: Sink<Message, Error = axum::Error> + Unpin + Send + 'static,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let superseded = shutdown.clone();
    let end = match send_message(&mut sink, &ServerMessage::connected(player_id)).await {
        Ok(()) => {
            run_session(
                sink,
                source,
                player_id,
                Arc::clone(&game),
                shutdown,
                keepalive,
            )
            .await
        }
        Err(e) => {
            warn!("Failed to acknowledge player {}: {}", player_id, e);
            SessionEnd::Disconnected
        }
    };

    match end {
        SessionEnd::Disconnected if !superseded.is_shut_down() => {
            info!("Player {} disconnected", player_id);
            game.disable(player_id);
        }
        SessionEnd::Quit => info!("Player {} quit", player_id),
        _ => info!("Connection for player {} closed", player_id),
    }
}

/// Runs the read loop in place and the send loop as a task until either ends.
async fn run_session<S, St>(
    sink: S,
    mut source: St,
    player_id: PlayerId,
    game: Arc<dyn Game>,
    shutdown: ShutdownSignal,
    keepalive: Duration,
) -> SessionEnd
where
    S: Sink<Message, Error = axum::Error> + Unpin + Send + 'static,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let Some(outbox) = game.outbound_queue(player_id) else {
        return SessionEnd::Closed;
    };

    let (stop_tx, stop_rx) = oneshot::channel();
    let mut writer = tokio::spawn(send_loop(
        sink, outbox, player_id, shutdown, stop_rx, keepalive,
    ));

    tokio::select! {
        end = read_loop(&mut source, game.as_ref(), player_id) => {
            let _ = stop_tx.send(());
            let _ = (&mut writer).await;
            end
        }
        result = &mut writer => result.unwrap_or(SessionEnd::Disconnected),
    }
}

async fn read_loop<St>(source: &mut St, game: &dyn Game, player_id: PlayerId) -> SessionEnd
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = source.next().await {
        let dispatch = match frame {
            Ok(Message::Text(text)) => game.process_message(text.as_str()),
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => game.process_message(text),
                Err(_) => {
                    debug!("Ignoring non-UTF-8 frame from player {}", player_id);
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                debug!("Player {} closed the connection: {:?}", player_id, frame);
                return SessionEnd::Disconnected;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("Error reading from player {}: {}", player_id, e);
                return SessionEnd::Disconnected;
            }
        };

        if dispatch == Dispatch::Quit(player_id) {
            return SessionEnd::Quit;
        }
    }

    SessionEnd::Disconnected
}

/// Drains the outbox to the socket, pinging after `keepalive` of silence.
async fn send_loop<S>(
    mut sink: S,
    outbox: Arc<Outbox>,
    player_id: PlayerId,
    mut shutdown: ShutdownSignal,
    mut stop: oneshot::Receiver<()>,
    keepalive: Duration,
) -> SessionEnd
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let end = loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.wait() => break SessionEnd::Closed,
            _ = &mut stop => break SessionEnd::Disconnected,
            message = outbox.recv() => message,
            _ = sleep(keepalive) => ServerMessage::ping(),
        };

        if let Err(e) = send_message(&mut sink, &message).await {
            warn!("Failed to send {:?} to player {}: {}", message.message_type(), player_id, e);
            break SessionEnd::Disconnected;
        }
    };

    let _ = sink.close().await;

    let dropped = outbox.dropped();
    if dropped > 0 {
        warn!("Player {} fell behind, {} updates were dropped", player_id, dropped);
    }
    end
}

async fn send_message<S>(sink: &mut S, message: &ServerMessage) -> Result<(), SendError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let text = message.to_json()?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}
