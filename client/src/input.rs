//! Parsing of typed commands.

use shared::{ClientMessage, Credentials, DeployRequest};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register { username: String, secret: String },
    Login { username: String, secret: String },
    Deploy(String),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("empty input")]
    Empty,

    #[error("usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// The wire message for this command, if it sends one.
    pub fn to_message(&self) -> Option<ClientMessage> {
        match self {
            Command::Register { username, secret } => Some(ClientMessage::Register(Credentials {
                username: username.clone(),
                secret: secret.clone(),
            })),
            Command::Login { username, secret } => Some(ClientMessage::Login(Credentials {
                username: username.clone(),
                secret: secret.clone(),
            })),
            Command::Deploy(troop) => Some(ClientMessage::Deploy(DeployRequest {
                troop: troop.clone(),
            })),
            Command::Help | Command::Quit => None,
        }
    }
}

/// Parses one input line. Anything that is not a keyword is taken as a troop
/// key to deploy.
pub fn parse_command(line: &str) -> Result<Command, InputError> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err(InputError::Empty);
    };

    match head.to_ascii_lowercase().as_str() {
        "register" => {
            let (username, secret) =
                credentials(&mut parts).ok_or(InputError::Usage("register <username> <secret>"))?;
            Ok(Command::Register { username, secret })
        }
        "login" => {
            let (username, secret) =
                credentials(&mut parts).ok_or(InputError::Usage("login <username> <secret>"))?;
            Ok(Command::Login { username, secret })
        }
        "deploy" => parts
            .next()
            .map(|troop| Command::Deploy(troop.to_string()))
            .ok_or(InputError::Usage("deploy <troop>")),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        _ => Ok(Command::Deploy(head.to_string())),
    }
}

fn credentials<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Option<(String, String)> {
    let username = parts.next()?;
    let secret = parts.next()?;
    Some((username.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_commands() {
        assert_eq!(
            parse_command("register alice s3cret"),
            Ok(Command::Register {
                username: "alice".to_string(),
                secret: "s3cret".to_string()
            })
        );
        assert_eq!(
            parse_command("  LOGIN   bob pw "),
            Ok(Command::Login {
                username: "bob".to_string(),
                secret: "pw".to_string()
            })
        );
    }

    #[test]
    fn test_missing_arguments() {
        assert_eq!(
            parse_command("login alice"),
            Err(InputError::Usage("login <username> <secret>"))
        );
        assert_eq!(
            parse_command("deploy"),
            Err(InputError::Usage("deploy <troop>"))
        );
        assert_eq!(parse_command("   "), Err(InputError::Empty));
    }

    #[test]
    fn test_deploy_forms() {
        assert_eq!(
            parse_command("deploy knight"),
            Ok(Command::Deploy("knight".to_string()))
        );
        assert_eq!(parse_command("queen"), Ok(Command::Deploy("queen".to_string())));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(parse_command("quit"), Ok(Command::Quit));
        assert_eq!(parse_command("exit"), Ok(Command::Quit));
        assert_eq!(parse_command("?"), Ok(Command::Help));
    }

    #[test]
    fn test_to_message() {
        let message = Command::Deploy("knight".to_string()).to_message().unwrap();
        assert_eq!(message.tag(), shared::message::DEPLOY);
        assert!(Command::Quit.to_message().is_none());
    }
}
