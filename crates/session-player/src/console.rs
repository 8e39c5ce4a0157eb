//! Line-oriented control console.
//!
//! Each stdin line maps to one [`ConsoleAction`]; transport lines become session
//! [`Command`]s.

use session_types::{Command, FocusState};

#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleAction {
    Send(Command),
    /// Inject a platform focus change.
    Focus(FocusState),
    List,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "commands: play | pause | stop | next | prev | seek <secs> | goto <n> | \
id <track id> | focus <gain|loss|transient|duck> | list | status | help | quit";

/// Parse one console line. `Ok(None)` for blank input.
pub fn parse_line(line: &str) -> Result<Option<ConsoleAction>, String> {
    let line = line.trim();
    let Some((word, rest)) = split_word(line) else {
        return Ok(None);
    };
    let action = match word.to_ascii_lowercase().as_str() {
        "play" | "p" => ConsoleAction::Send(Command::Play),
        "pause" => ConsoleAction::Send(Command::Pause),
        "stop" => ConsoleAction::Send(Command::Stop),
        "next" | "n" => ConsoleAction::Send(Command::SkipNext),
        "prev" | "previous" => ConsoleAction::Send(Command::SkipPrevious),
        "seek" => {
            let secs: f64 = rest
                .parse()
                .map_err(|_| format!("seek expects seconds, got {rest:?}"))?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(format!("seek expects a non-negative offset, got {rest:?}"));
            }
            ConsoleAction::Send(Command::SeekTo {
                position_ms: (secs * 1000.0).round() as u64,
            })
        }
        "goto" => {
            let position: usize = rest
                .parse()
                .map_err(|_| format!("goto expects a queue position, got {rest:?}"))?;
            ConsoleAction::Send(Command::SkipToQueueItem { position })
        }
        "id" => {
            if rest.is_empty() {
                return Err("id expects a track id".to_string());
            }
            ConsoleAction::Send(Command::PlayFromId {
                id: rest.to_string(),
            })
        }
        "focus" => ConsoleAction::Focus(parse_focus(rest)?),
        "list" | "ls" => ConsoleAction::List,
        "status" | "st" => ConsoleAction::Status,
        "help" | "?" => ConsoleAction::Help,
        "quit" | "q" | "exit" => ConsoleAction::Quit,
        other => return Err(format!("unknown command {other:?}; {HELP}")),
    };
    Ok(Some(action))
}

fn split_word(line: &str) -> Option<(&str, &str)> {
    if line.is_empty() {
        return None;
    }
    Some(match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    })
}

fn parse_focus(value: &str) -> Result<FocusState, String> {
    match value.to_ascii_lowercase().as_str() {
        "gain" | "gained" => Ok(FocusState::Gained),
        "loss" | "lost" => Ok(FocusState::LostPermanently),
        "transient" => Ok(FocusState::LostTransient),
        "duck" => Ok(FocusState::LostTransientCanDuck),
        other => Err(format!("unknown focus state {other:?}")),
    }
}
