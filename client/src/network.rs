use crate::game::ClientGameState;
use crate::input::{parse_command, Command, InputError};
use crate::rendering::{prompt, render_message, HELP};
use log::{info, warn};
use shared::{read_envelope, write_envelope, ClientMessage, ProtocolError, ServerMessage};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub struct Client {
    writer: OwnedWriteHalf,
    incoming: mpsc::UnboundedReceiver<ServerMessage>,
    state: ClientGameState,
}

impl Client {
    pub async fn connect(server_addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", server_addr);

        let (reader, writer) = stream.into_split();
        let (tx, incoming) = mpsc::unbounded_channel();
        tokio::spawn(receive_loop(reader, tx));

        Ok(Client {
            writer,
            incoming,
            state: ClientGameState::new(),
        })
    }

    pub fn state(&self) -> &ClientGameState {
        &self.state
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ProtocolError> {
        write_envelope(&mut self.writer, &message.to_envelope()?).await
    }

    /// Next message from the server, already applied to the local state.
    /// `None` once the server closed the connection.
    pub async fn next_message(&mut self) -> Option<ServerMessage> {
        let message = self.incoming.recv().await?;
        self.state.apply(&message);
        Some(message)
    }

    /// Interactive loop: commands from stdin, messages from the server.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", HELP);
        show_prompt(&self.state);

        loop {
            tokio::select! {
                message = self.incoming.recv() => {
                    let Some(message) = message else {
                        println!("Connection closed by server");
                        break;
                    };
                    self.state.apply(&message);
                    println!("{}", render_message(&message));
                    show_prompt(&self.state);
                }

                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    match parse_command(&line) {
                        Ok(Command::Quit) => break,
                        Ok(Command::Help) => println!("{}", HELP),
                        Ok(command) => {
                            if let Some(message) = command.to_message() {
                                self.send(&message).await?;
                            }
                        }
                        Err(InputError::Empty) => {}
                        Err(e) => println!("{}", e),
                    }
                    show_prompt(&self.state);
                }
            }
        }

        Ok(())
    }
}

fn show_prompt(state: &ClientGameState) {
    print!("{}", prompt(state));
    let _ = std::io::stdout().flush();
}

/// Decodes frames off the socket. Runs in its own task so a partially read
/// frame is never lost to a `select!` on stdin.
async fn receive_loop(mut reader: OwnedReadHalf, tx: mpsc::UnboundedSender<ServerMessage>) {
    loop {
        let envelope = match read_envelope(&mut reader).await {
            Ok(envelope) => envelope,
            Err(e) => {
                if !e.is_disconnect() {
                    warn!("Connection error: {}", e);
                }
                break;
            }
        };

        match ServerMessage::from_envelope(envelope) {
            Ok(message) => {
                if tx.send(message).is_err() {
                    break;
                }
            }
            Err(e) => warn!("Ignoring message: {}", e),
        }
    }
}
