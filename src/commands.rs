//! Line commands standing in for menu presses on the touch screen.

use std::fmt;
use std::str::FromStr;

use crate::alarm_schedule::AlarmSlot;
use crate::alarm_time::AlarmTime;

/// Commands accepted on the control channel (stdin)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Silence a ringing alarm: `ack`
    Acknowledge,
    /// Master toggle: `on`, `off`, `toggle`
    Enable(bool),
    Toggle,
    /// Set an alarm: `set <slot> <HH:MM>`
    Set(AlarmSlot, AlarmTime),
    /// Clear an alarm: `clear <slot>`
    Clear(AlarmSlot),
    /// Turn the next-midnight re-enable on or off: `auto on|off`
    AutoReenable(bool),
    /// Dim the backlight when dark: `dim on|off`
    DimWhenDark(bool),
    /// Print the next fire time: `next`
    QueryNext,
    /// Print the whole schedule: `status`
    QueryStatus,
    /// Stop the clock: `quit`
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandError(pub String);

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseCommandError {}

fn parse_switch(word: Option<&str>, command: &str) -> Result<bool, ParseCommandError> {
    match word.map(str::to_ascii_lowercase).as_deref() {
        Some("on") | Some("1") | Some("yes") => Ok(true),
        Some("off") | Some("0") | Some("no") => Ok(false),
        _ => Err(ParseCommandError(format!("usage: {} on|off", command))),
    }
}

fn parse_slot(word: Option<&str>, usage: &str) -> Result<AlarmSlot, ParseCommandError> {
    let word = word.ok_or_else(|| ParseCommandError(format!("usage: {}", usage)))?;
    word.parse::<AlarmSlot>().map_err(ParseCommandError)
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(ParseCommandError("empty command".into()));
        };

        let command = match head.to_ascii_lowercase().as_str() {
            "ack" | "stop" => Command::Acknowledge,
            "on" | "enable" => Command::Enable(true),
            "off" | "disable" => Command::Enable(false),
            "toggle" => Command::Toggle,
            "set" => {
                const USAGE: &str = "set <once|daily|sun..sat> <HH:MM>";
                let slot = parse_slot(words.next(), USAGE)?;
                let time = words
                    .next()
                    .ok_or_else(|| ParseCommandError(format!("usage: {}", USAGE)))?
                    .parse::<AlarmTime>()
                    .map_err(ParseCommandError)?;
                Command::Set(slot, time)
            }
            "clear" => Command::Clear(parse_slot(words.next(), "clear <once|daily|sun..sat>")?),
            "auto" => Command::AutoReenable(parse_switch(words.next(), "auto")?),
            "dim" => Command::DimWhenDark(parse_switch(words.next(), "dim")?),
            "next" => Command::QueryNext,
            "status" | "?" => Command::QueryStatus,
            "quit" | "exit" => Command::Quit,
            other => return Err(ParseCommandError(format!("unknown command '{}'", other))),
        };

        if let Some(extra) = words.next() {
            return Err(ParseCommandError(format!("unexpected '{}'", extra)));
        }
        Ok(command)
    }
}
