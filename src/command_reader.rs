//! Line-oriented user commands.
//!
//! ```text
//! start | stop
//! auto on|off
//! string <n|label>     1-based index or label, e.g. "string 2", "string A"
//! custom <hz>
//! instrument <name>    guitar, banjo, ukulele, violin
//! status
//! quit | exit
//! ```

use crate::catalog::Instrument;
use crate::types::ControlEvent;
use crossbeam_channel::Sender;
use log::{info, warn};
use std::fmt;
use std::io::BufRead;

#[derive(Debug, PartialEq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    MissingArgument(&'static str),
    BadArgument { command: &'static str, value: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::Unknown(cmd) => write!(f, "unknown command {:?}", cmd),
            CommandError::MissingArgument(cmd) => write!(f, "{} needs an argument", cmd),
            CommandError::BadArgument { command, value } => {
                write!(f, "{}: bad argument {:?}", command, value)
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// Parse one command line into the event it stands for.
///
/// `custom` passes its text through unparsed; the controller validates it so
/// a bad value is refused in one place.
pub fn parse_command(line: &str) -> Result<ControlEvent, CommandError> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().ok_or(CommandError::Empty)?.to_ascii_lowercase();
    let rest: Vec<&str> = parts.collect();
    let arg = rest.join(" ");

    match cmd.as_str() {
        "start" => Ok(ControlEvent::Start),
        "stop" => Ok(ControlEvent::Stop),
        "status" | "refresh" => Ok(ControlEvent::Refresh),
        "quit" | "exit" | "q" => Ok(ControlEvent::Shutdown),
        "auto" => match arg.to_ascii_lowercase().as_str() {
            "" => Err(CommandError::MissingArgument("auto")),
            "on" | "true" | "1" => Ok(ControlEvent::SetAutoMode(true)),
            "off" | "false" | "0" => Ok(ControlEvent::SetAutoMode(false)),
            _ => Err(CommandError::BadArgument {
                command: "auto",
                value: arg,
            }),
        },
        "string" | "s" => {
            if arg.is_empty() {
                return Err(CommandError::MissingArgument("string"));
            }
            match arg.parse::<usize>() {
                Ok(0) => Err(CommandError::BadArgument {
                    command: "string",
                    value: arg,
                }),
                Ok(n) => Ok(ControlEvent::SelectString(n - 1)),
                Err(_) => Ok(ControlEvent::SelectStringLabel(arg)),
            }
        }
        "custom" | "pitch" => {
            if arg.is_empty() {
                return Err(CommandError::MissingArgument("custom"));
            }
            Ok(ControlEvent::SetCustomPitch(arg))
        }
        "instrument" | "i" => {
            if arg.is_empty() {
                return Err(CommandError::MissingArgument("instrument"));
            }
            arg.parse::<Instrument>()
                .map(ControlEvent::SetInstrument)
                .map_err(|_| CommandError::BadArgument {
                    command: "instrument",
                    value: arg,
                })
        }
        _ => Err(CommandError::Unknown(cmd)),
    }
}

/// Reads commands from `input` and forwards them to the controller.
pub struct CommandReader<R: BufRead> {
    input: R,
    tx: Sender<ControlEvent>,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(input: R, tx: Sender<ControlEvent>) -> Self {
        Self { input, tx }
    }

    /// Run until EOF or `quit`. Blocks the calling thread.
    /// EOF also shuts the controller down.
    pub fn run(mut self) {
        let mut line = String::new();
        loop {
            line.clear();
            match self.input.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Command input error: {}", e);
                    break;
                }
            }
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(ControlEvent::Shutdown) => break,
                Ok(event) => {
                    if self.tx.send(event).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
        info!("Command input closed");
        let _ = self.tx.send(ControlEvent::Shutdown);
    }
}
