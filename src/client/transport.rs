use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{ClientContext, ClientError, ConnectionState};
use crate::events::{ClientFrame, Room};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SharedContext = Arc<Mutex<ClientContext>>;

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (zero-based), capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.max(1).checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(multiplier)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

#[derive(Debug)]
pub enum Command {
    Subscribe(Room),
    Unsubscribe(Room),
    Shutdown,
}

enum Exit {
    Closed,
    Shutdown,
}

/// Handle to a background connection task started by [`spawn`].
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ClientHandle {
    pub fn subscribe(&self, room: Room) -> bool {
        self.commands.send(Command::Subscribe(room)).is_ok()
    }

    pub fn unsubscribe(&self, room: Room) -> bool {
        self.commands.send(Command::Unsubscribe(room)).is_ok()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Waits until the connection reaches `wanted`. Returns `false` if the
    /// task ended first.
    pub async fn wait_for(&mut self, wanted: ConnectionState) -> bool {
        self.state.wait_for(|state| *state == wanted).await.is_ok()
    }

    /// Closes the socket and waits for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(err) = self.task.await {
            log::warn!(target: "adminhub::client", "connection task ended abnormally: {err}");
        }
    }
}

/// Starts a task that keeps a socket to `url` open, reconnecting with
/// backoff and re-joining every room requested on `context`.
pub fn spawn(url: impl Into<String>, context: SharedContext, policy: ReconnectPolicy) -> ClientHandle {
    let (commands, receiver) = mpsc::unbounded_channel();
    let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
    let task = tokio::spawn(run(url.into(), context, policy, receiver, state_tx));
    ClientHandle { commands, state, task }
}

fn lock(context: &SharedContext) -> MutexGuard<'_, ClientContext> {
    context.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run(
    url: String,
    context: SharedContext,
    policy: ReconnectPolicy,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
) {
    let mut attempt = 0u32;
    loop {
        lock(&context).connecting();
        state.send_replace(ConnectionState::Connecting);

        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                attempt = 0;
                let outcome = drive(socket, &context, &state, &mut commands).await;
                lock(&context).disconnected();
                state.send_replace(ConnectionState::Disconnected);
                match outcome {
                    Ok(Exit::Shutdown) => return,
                    Ok(Exit::Closed) => log::info!(target: "adminhub::client", "socket closed by server"),
                    Err(err) => log::warn!(target: "adminhub::client", "socket failed: {err}"),
                }
            }
            Err(err) => {
                lock(&context).disconnected();
                state.send_replace(ConnectionState::Disconnected);
                log::warn!(target: "adminhub::client", "connect to {url} failed: {err}");
            }
        }

        let delay = policy.delay(attempt);
        attempt = attempt.saturating_add(1);
        log::debug!(target: "adminhub::client", "reconnecting in {delay:?}");

        // Keep taking subscription changes while waiting.
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => return,
                    Some(Command::Subscribe(room)) => {
                        lock(&context).subscribe(room);
                    }
                    Some(Command::Unsubscribe(room)) => {
                        lock(&context).unsubscribe(room);
                    }
                },
            }
        }
    }
}

async fn drive(
    socket: Socket,
    context: &SharedContext,
    state: &watch::Sender<ConnectionState>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Result<Exit, ClientError> {
    let (mut sink, mut stream) = socket.split();

    let joins = lock(context).connected();
    state.send_replace(ConnectionState::Connected);
    for frame in &joins {
        sink.send(encode(frame)?).await?;
    }

    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let handled = lock(context).handle_text(&text);
                    if let Err(err) = handled {
                        log::warn!(target: "adminhub::client", "unreadable frame: {err}");
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(Exit::Closed),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
            },
            command = commands.recv() => {
                let frame = match command {
                    None | Some(Command::Shutdown) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return Ok(Exit::Shutdown);
                    }
                    Some(Command::Subscribe(room)) => lock(context).subscribe(room),
                    Some(Command::Unsubscribe(room)) => lock(context).unsubscribe(room),
                };
                if let Some(frame) = frame {
                    sink.send(encode(&frame)?).await?;
                }
            }
        }
    }
}

fn encode(frame: &ClientFrame) -> Result<Message, ClientError> {
    let text = serde_json::to_string(frame).map_err(ClientError::Encode)?;
    Ok(Message::Text(text))
}
