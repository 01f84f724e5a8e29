//! Console input parsing and event display.

use dro_net::{ConnectionEvent, Packet};

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    /// Leave the client.
    Quit,
    /// Drop the current connection.
    Disconnect,
    /// Reconnect, optionally to another saved server.
    Connect(Option<String>),
    /// Show the command list.
    Help,
    /// Send a raw packet, e.g. `CT#name#hello`.
    Send(Packet),
}

/// Parse a console line. Blank lines and unknown commands yield `None`.
pub fn parse_input(line: &str) -> Option<Input> {
    let input = line.trim();
    if input.is_empty() {
        return None;
    }

    let Some(command) = input.strip_prefix('/') else {
        let Ok(packet) = input.parse::<Packet>();
        return Some(Input::Send(packet));
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, rest)| (name, rest.trim()));

    match name.to_lowercase().as_str() {
        "quit" | "exit" => Some(Input::Quit),
        "disconnect" => Some(Input::Disconnect),
        "connect" => Some(Input::Connect((!rest.is_empty()).then(|| rest.to_string()))),
        "help" | "?" => Some(Input::Help),
        _ => {
            eprintln!("Unknown command: '/{name}'. Type /help for available commands.");
            None
        }
    }
}

/// Print the command list.
pub fn print_help() {
    println!("\nAvailable commands:");
    println!("  /connect [server]  reconnect, or connect to a saved server");
    println!("  /disconnect        drop the connection");
    println!("  /quit              leave");
    println!("  HEADER#field#...   send a packet");
}

/// One-line rendering of a published event.
pub fn describe(event: &ConnectionEvent) -> String {
    match event {
        ConnectionEvent::StateChanged(state) => format!("-- {state}"),
        ConnectionEvent::PacketReceived(packet) => format!("<< {packet}"),
        ConnectionEvent::SocketError(message) => format!("!! {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dro_net::ConnectionState;

    #[test]
    fn test_slash_commands() {
        assert_eq!(parse_input("/quit"), Some(Input::Quit));
        assert_eq!(parse_input("  /EXIT "), Some(Input::Quit));
        assert_eq!(parse_input("/disconnect"), Some(Input::Disconnect));
        assert_eq!(parse_input("/connect"), Some(Input::Connect(None)));
        assert_eq!(
            parse_input("/connect Vanilla Server"),
            Some(Input::Connect(Some("Vanilla Server".to_string())))
        );
        assert_eq!(parse_input("/bogus"), None);
    }

    #[test]
    fn test_packet_lines() {
        assert_eq!(
            parse_input("CT#Phoenix#Objection!"),
            Some(Input::Send(Packet::new("CT", ["Phoenix", "Objection!"])))
        );
        assert_eq!(
            parse_input("CH#%"),
            Some(Input::Send(Packet::with_header("CH")))
        );
    }

    #[test]
    fn test_blank_line_is_ignored() {
        assert_eq!(parse_input("   "), None);
    }

    #[test]
    fn test_describe_events() {
        assert_eq!(
            describe(&ConnectionEvent::StateChanged(ConnectionState::Connected)),
            "-- connected"
        );
        assert_eq!(
            describe(&ConnectionEvent::PacketReceived(Packet::new("ID", ["1"]))),
            "<< ID#1"
        );
    }
}
