//! Line-oriented command console
//!
//! Stand-in for a menu: each line read from stdin maps to one session
//! command. Parsing is separate from execution so it can be tested without a
//! keyboard.

use crate::core::session::{KeyboardSession, SessionError};
use crate::core::state::Layer;
use std::str::FromStr;

/// One console command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Select(Layer),
    Refresh,
    EnableKey,
    DisableKey,
    ToggleKey,
    Status,
    Help,
    Quit,
}

/// Text printed by `help`
pub const HELP: &str = "\
commands:
  windows | mac   select a layer
  refresh         ask the keyboard for its current layer
  enable          enable the layer switch key
  disable         disable the layer switch key
  toggle          flip the layer switch key
  status          print the current state
  quit            exit";

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" | "w" => ConsoleCommand::Select(Layer::Windows),
            "mac" | "m" => ConsoleCommand::Select(Layer::Mac),
            "refresh" | "r" => ConsoleCommand::Refresh,
            "enable" => ConsoleCommand::EnableKey,
            "disable" => ConsoleCommand::DisableKey,
            "toggle" | "t" => ConsoleCommand::ToggleKey,
            "status" | "s" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" | "q" => ConsoleCommand::Quit,
            other => return Err(format!("unknown command: {:?} (try \"help\")", other)),
        };
        Ok(command)
    }
}

/// What the console loop should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Command sent; the answer arrives later as an event
    Sent,
    /// Print this and keep going
    Print(String),
    Quit,
}

impl ConsoleCommand {
    pub fn execute(self, session: &KeyboardSession) -> Result<Outcome, SessionError> {
        match self {
            ConsoleCommand::Select(layer) => session.select_layer(layer)?,
            ConsoleCommand::Refresh => session.refresh_layer_state()?,
            ConsoleCommand::EnableKey => session.enable_layer_key()?,
            ConsoleCommand::DisableKey => session.disable_layer_key()?,
            ConsoleCommand::ToggleKey => session.toggle_layer_key()?,
            ConsoleCommand::Status => return Ok(Outcome::Print(session.snapshot().to_string())),
            ConsoleCommand::Help => return Ok(Outcome::Print(HELP.to_string())),
            ConsoleCommand::Quit => return Ok(Outcome::Quit),
        }
        Ok(Outcome::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SessionConfig;
    use crate::core::events::EventSender;
    use crate::hid::protocol::{decode, ProtocolMessage};
    use crate::hid::transport::{MemoryWriter, TransportHandle};
    use std::sync::Arc;

    #[test]
    fn test_parse_commands() {
        assert_eq!("windows".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Select(Layer::Windows)));
        assert_eq!(" MAC ".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Select(Layer::Mac)));
        assert_eq!("refresh".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Refresh));
        assert_eq!("t".parse::<ConsoleCommand>(), Ok(ConsoleCommand::ToggleKey));
        assert_eq!("q".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Quit));
        assert!("linux".parse::<ConsoleCommand>().is_err());
        assert!("".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn test_execute_while_disconnected() {
        let (events, _rx) = EventSender::channel();
        let session = KeyboardSession::new(SessionConfig::default(), Arc::new(events));

        assert!(matches!(
            ConsoleCommand::Select(Layer::Mac).execute(&session),
            Err(SessionError::NotConnected)
        ));
        assert_eq!(
            ConsoleCommand::Status.execute(&session).unwrap(),
            Outcome::Print("disconnected".to_string())
        );
        assert_eq!(ConsoleCommand::Quit.execute(&session).unwrap(), Outcome::Quit);
    }

    #[test]
    fn test_execute_sends_message() {
        let (events, _rx) = EventSender::channel();
        let session = KeyboardSession::new(SessionConfig::default(), Arc::new(events));
        let writer = MemoryWriter::new();
        session.handle_connect(TransportHandle::new(Box::new(writer.clone()), 32));
        writer.take();

        assert_eq!(ConsoleCommand::Refresh.execute(&session).unwrap(), Outcome::Sent);

        let reports = writer.take();
        assert_eq!(reports.len(), 1);
        assert_eq!(decode(&reports[0][1..]).unwrap(), ProtocolMessage::LayerStatusRequest);
    }
}
