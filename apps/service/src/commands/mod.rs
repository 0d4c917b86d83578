//! Chat command surface.
//!
//! [`Command`] is the parsed form of one incoming message; [`CommandHandler`]
//! executes it on behalf of the chat and produces the reply text.

pub mod handler;

use std::str::FromStr;

use thiserror::Error;

pub use handler::CommandHandler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Register { username: String, password: String },
    Login { username: String, password: String },
    Logout,
    Add { name: String, url: String, interval: String },
    List,
    Show(String),
    Pause(String),
    Resume(String),
    Delete(String),
    Interval { id: String, seconds: String },
    History(String),
    Stats,
    Notifications(bool),
    Language(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unknown command")]
    Unknown,

    /// Known verb with the wrong arguments; carries the usage line
    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// Usage line shown when the arguments do not fit
    pub fn usage(verb: &str) -> Option<&'static str> {
        Some(match verb {
            "register" => "/register <username> <password>",
            "login" => "/login <username> <password>",
            "add" => "/add <name> <url> <interval>",
            "show" => "/show <id>",
            "pause" => "/pause <id>",
            "resume" => "/resume <id>",
            "delete" => "/delete <id>",
            "interval" => "/interval <id> <seconds>",
            "history" => "/history <id>",
            "notifications" => "/notifications on|off",
            "language" => "/language en|hi",
            _ => return None,
        })
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut words = text.split_whitespace();
        let head = words.next().ok_or(ParseError::Unknown)?;
        let verb = head.strip_prefix('/').ok_or(ParseError::Unknown)?;
        // Group chats address commands as /verb@botname
        let verb = verb.split('@').next().unwrap_or(verb).to_ascii_lowercase();
        let args: Vec<&str> = words.collect();
        let usage = || ParseError::Usage(Command::usage(&verb).unwrap_or_default());

        let single = |args: &[&str]| match args {
            [id] => Ok(id.to_string()),
            _ => Err(usage()),
        };

        let command = match verb.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "register" | "login" => {
                let [username, password] = args.as_slice() else {
                    return Err(usage());
                };
                let (username, password) = (username.to_string(), password.to_string());
                if verb == "register" {
                    Command::Register { username, password }
                } else {
                    Command::Login { username, password }
                }
            }
            "logout" => Command::Logout,
            "add" => {
                // Names may contain spaces; url and interval are always the last two words
                let [name @ .., url, interval] = args.as_slice() else {
                    return Err(usage());
                };
                if name.is_empty() {
                    return Err(usage());
                }
                Command::Add {
                    name: name.join(" "),
                    url: url.to_string(),
                    interval: interval.to_string(),
                }
            }
            "list" => Command::List,
            "show" => Command::Show(single(&args[..])?),
            "pause" => Command::Pause(single(&args[..])?),
            "resume" => Command::Resume(single(&args[..])?),
            "delete" => Command::Delete(single(&args[..])?),
            "interval" => {
                let [id, seconds] = args.as_slice() else {
                    return Err(usage());
                };
                Command::Interval { id: id.to_string(), seconds: seconds.to_string() }
            }
            "history" => Command::History(single(&args[..])?),
            "stats" => Command::Stats,
            "notifications" => match args[..] {
                [flag] if flag.eq_ignore_ascii_case("on") => Command::Notifications(true),
                [flag] if flag.eq_ignore_ascii_case("off") => Command::Notifications(false),
                _ => return Err(usage()),
            },
            "language" => Command::Language(single(&args[..])?),
            _ => return Err(ParseError::Unknown),
        };
        Ok(command)
    }
}
