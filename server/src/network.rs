//! Server network layer: TCP sessions feeding the single game loop

use crate::client_manager::Outbound;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::game::GameState;
use log::{debug, error, info, warn};
use shared::{Command, ProtocolError, MAX_LINE_BYTES};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from connection tasks to the game loop
#[derive(Debug)]
pub enum GameCommand {
    Login {
        username: String,
        password: String,
        addr: SocketAddr,
        outbound: Outbound,
        /// Receives the connection id, or `None` if the login was refused
        reply: oneshot::Sender<Option<u32>>,
    },
    Client {
        identity: String,
        client_id: u32,
        command: Command,
    },
    Disconnect {
        identity: String,
        client_id: u32,
    },
}

/// TCP front end owning the game state
pub struct Server {
    listener: Arc<TcpListener>,
    game: GameState,
    spawn_interval: Duration,
    despawn_interval: Duration,

    command_tx: mpsc::UnboundedSender<GameCommand>,
    command_rx: mpsc::UnboundedReceiver<GameCommand>,
}

impl Server {
    pub async fn bind(config: &ServerConfig, game: GameState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Arc::new(listener),
            game,
            spawn_interval: config.spawn_interval,
            despawn_interval: config.despawn_interval,
            command_tx,
            command_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Spawns task that accepts connections, one session task per peer
    fn spawn_acceptor(&self) {
        let listener = Arc::clone(&self.listener);
        let commands = self.command_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {}", addr);
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
                        }
                        let commands = commands.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, commands).await {
                                warn!("Connection {} ended with error: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn handle_command(&mut self, command: GameCommand) {
        match command {
            GameCommand::Login {
                username,
                password,
                addr,
                outbound,
                reply,
            } => {
                let result = self.game.login(&username, &password, addr, outbound);
                if let Err(e) = &result {
                    warn!("Login refused for {}: {}", addr, e);
                }
                // the session may already be gone
                let _ = reply.send(result.ok());
            }
            GameCommand::Client {
                identity,
                client_id,
                command,
            } => {
                match self.game.handle_command(&identity, client_id, command) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => error!("Command from {} failed: {}", identity, e),
                    Err(e) => warn!("Rejected command from {}: {}", identity, e),
                }
            }
            GameCommand::Disconnect {
                identity,
                client_id,
            } => {
                self.game.disconnect(&identity, client_id);
            }
        }
    }

    /// Main server loop: commands and spawn timers, one at a time
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_acceptor();

        self.game.spawn_tick();
        info!(
            "Initial spawn placed {} creatures",
            self.game.grid().creature_count()
        );

        let mut spawn_timer = interval(self.spawn_interval);
        let mut despawn_timer = interval(self.despawn_interval);
        spawn_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        despawn_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first ticks since they fire immediately
        spawn_timer.tick().await;
        despawn_timer.tick().await;

        info!("Server started successfully");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },
                _ = spawn_timer.tick() => {
                    self.game.spawn_tick();
                },
                _ = despawn_timer.tick() => {
                    self.game.despawn_tick();
                },
            }
        }

        Ok(())
    }
}

fn loop_gone() -> ServerError {
    ServerError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "game loop is not running",
    ))
}

/// One newline-terminated line as read off the socket
#[derive(Debug, PartialEq, Eq)]
enum RawLine {
    Line(Vec<u8>),
    /// `MAX_LINE_BYTES` were read without finding a newline
    TooLong,
    Eof,
}

/// Reads at most `MAX_LINE_BYTES` up to and including the next newline.
///
/// The terminator (`\n` or `\r\n`) is stripped. A trailing line without a
/// newline before EOF is still returned as a line.
async fn read_line_capped<R>(reader: &mut R) -> io::Result<RawLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = AsyncReadExt::take(&mut *reader, MAX_LINE_BYTES as u64)
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        return Ok(RawLine::Eof);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        return Ok(RawLine::Line(line));
    }
    if n < MAX_LINE_BYTES {
        return Ok(RawLine::Line(line));
    }
    Ok(RawLine::TooLong)
}

/// Reads one credential line. Anything but a readable line ends the session.
async fn read_credential<R>(reader: &mut R, addr: SocketAddr) -> Result<Option<String>, ServerError>
where
    R: AsyncBufRead + Unpin,
{
    let bytes = match read_line_capped(reader).await? {
        RawLine::Line(bytes) => bytes,
        RawLine::TooLong => {
            warn!(
                "Closing {}: {}",
                addr,
                ProtocolError::LineTooLong(MAX_LINE_BYTES)
            );
            return Ok(None);
        }
        RawLine::Eof => return Ok(None),
    };
    match String::from_utf8(bytes) {
        Ok(text) => Ok(Some(text.trim().to_string())),
        Err(_) => {
            warn!("Closing {}: {}", addr, ProtocolError::NotUtf8);
            Ok(None)
        }
    }
}

/// Runs one client session: two credential lines, then one command per line.
///
/// Everything the game sends goes through an outbound channel drained by a
/// separate writer task, so this task only ever reads. Lines are capped at
/// `MAX_LINE_BYTES`; an oversized or unreadable credential closes the
/// connection, while a bad command line is logged and skipped.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    commands: mpsc::UnboundedSender<GameCommand>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    let Some(username) = read_credential(&mut reader, addr).await? else {
        return Ok(());
    };
    let Some(password) = read_credential(&mut reader, addr).await? else {
        return Ok(());
    };

    let (outbound, frames) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_frames(writer, frames));

    let (reply, accepted) = oneshot::channel();
    commands
        .send(GameCommand::Login {
            username: username.clone(),
            password,
            addr,
            outbound,
            reply,
        })
        .map_err(|_| loop_gone())?;

    let Ok(Some(client_id)) = accepted.await else {
        // let the failure line reach the peer before closing
        let _ = writer_task.await;
        return Ok(());
    };

    let result = read_commands(&mut reader, &username, client_id, &commands).await;
    let _ = commands.send(GameCommand::Disconnect {
        identity: username,
        client_id,
    });
    result
}

/// Forwards parsed commands until EOF. Only I/O errors end the loop early.
async fn read_commands<R>(
    reader: &mut R,
    identity: &str,
    client_id: u32,
    commands: &mpsc::UnboundedSender<GameCommand>,
) -> Result<(), ServerError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let bytes = match read_line_capped(reader).await? {
            RawLine::Line(bytes) => bytes,
            RawLine::TooLong => {
                warn!(
                    "Ignoring line from {}: {}",
                    identity,
                    ProtocolError::LineTooLong(MAX_LINE_BYTES)
                );
                // drop the rest of the oversized line
                while read_line_capped(reader).await? == RawLine::TooLong {}
                continue;
            }
            RawLine::Eof => return Ok(()),
        };
        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(_) => {
                warn!("Ignoring line from {}: {}", identity, ProtocolError::NotUtf8);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                let sent = commands.send(GameCommand::Client {
                    identity: identity.to_string(),
                    client_id,
                    command,
                });
                if sent.is_err() {
                    return Err(loop_gone());
                }
            }
            Err(e) => warn!("Ignoring line from {}: {}", identity, e),
        }
    }
}

/// Writes queued frames until the game drops the sender or the peer goes away
async fn write_frames<W>(mut writer: W, mut frames: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        if let Err(e) = writer.write_all(frame.as_bytes()).await {
            debug!("Write failed: {}", e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}
