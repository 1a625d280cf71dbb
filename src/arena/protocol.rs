//! Line protocol for the arena server
//!
//! Newline-delimited ASCII; a line is the unit of meaning. The command word
//! is case-insensitive. Malformed input is answered with `UNKNOWN` on the
//! same connection and never terminates it.

use crate::arena::state::MatchPhase;

/// Upper bound on a requested match duration (24h).
pub const MAX_MATCH_SECONDS: f64 = 86_400.0;

/// Reply sent for anything the server does not understand.
pub const UNKNOWN_REPLY: &str = "UNKNOWN";

/// A parsed client command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    GetState,
    GetRunningLength,
    /// Validated duration in seconds, 0 < s <= [`MAX_MATCH_SECONDS`]
    RequestMatch(f64),
    Unknown,
}

/// Parse one input line. Out-of-range or malformed durations parse to
/// [`Command::Unknown`], matching the reply the client gets.
pub fn parse_line(line: &str) -> Command {
    let mut parts = line.trim().split_whitespace();
    let Some(verb) = parts.next() else {
        return Command::Unknown;
    };

    match verb.to_ascii_uppercase().as_str() {
        "GET_STATE" if parts.next().is_none() => Command::GetState,
        "GET_RUNNING_LENGTH" if parts.next().is_none() => Command::GetRunningLength,
        "REQUEST_MATCH" => {
            let Some(arg) = parts.next() else {
                return Command::Unknown;
            };
            if parts.next().is_some() {
                return Command::Unknown;
            }
            match arg.parse::<f64>() {
                Ok(seconds) if seconds > 0.0 && seconds <= MAX_MATCH_SECONDS => {
                    Command::RequestMatch(seconds)
                }
                _ => Command::Unknown,
            }
        }
        _ => Command::Unknown,
    }
}

pub fn state_line(phase: MatchPhase) -> String {
    format!("STATE {phase}")
}

pub fn running_length_line(seconds: u64) -> String {
    format!("RUNNING_LENGTH {seconds}")
}
