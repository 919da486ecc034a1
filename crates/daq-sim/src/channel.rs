use crate::error::DaqError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Logical direction of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Sensed by the device; readable, never user-writable.
    Input,
    /// Driven by the device; writable, never readable.
    Output,
    #[default]
    Unset,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Input => "input",
            Direction::Output => "output",
            Direction::Unset => "unset",
        })
    }
}

impl FromStr for Direction {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "input" | "in" => Ok(Direction::Input),
            "output" | "out" => Ok(Direction::Output),
            _ => Err(DaqError::InvalidDirection(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelState {
    pub direction: Direction,
    pub value: bool,
}

/// Name-keyed channel table. Channels are added by `configure` and never removed.
#[derive(Debug, Default)]
pub(crate) struct ChannelTable {
    channels: BTreeMap<String, ChannelState>,
}

impl ChannelTable {
    pub(crate) fn configure(&mut self, name: &str, direction: Direction) -> Result<(), DaqError> {
        if direction == Direction::Unset {
            return Err(DaqError::InvalidDirection(direction.to_string()));
        }
        match self.channels.get_mut(name) {
            Some(channel) => channel.direction = direction,
            None => {
                self.channels.insert(
                    name.to_string(),
                    ChannelState {
                        direction,
                        value: false,
                    },
                );
            }
        }
        Ok(())
    }

    pub(crate) fn direction(&self, name: &str) -> Direction {
        self.channels
            .get(name)
            .map(|c| c.direction)
            .unwrap_or_default()
    }

    pub(crate) fn require(&self, name: &str, expected: Direction) -> Result<(), DaqError> {
        let actual = self.direction(name);
        if actual == expected {
            Ok(())
        } else {
            Err(DaqError::mismatch(name, expected, actual))
        }
    }

    pub(crate) fn write(&mut self, name: &str, value: bool) -> Result<(), DaqError> {
        self.require(name, Direction::Output)?;
        self.poke(name, value)
    }

    pub(crate) fn read(&self, name: &str) -> Result<bool, DaqError> {
        self.require(name, Direction::Input)?;
        self.peek(name)
            .ok_or_else(|| DaqError::UnknownChannel(name.to_string()))
    }

    pub(crate) fn peek(&self, name: &str) -> Option<bool> {
        self.channels.get(name).map(|c| c.value)
    }

    pub(crate) fn poke(&mut self, name: &str, value: bool) -> Result<(), DaqError> {
        let channel = self
            .channels
            .get_mut(name)
            .ok_or_else(|| DaqError::UnknownChannel(name.to_string()))?;
        channel.value = value;
        Ok(())
    }

    /// Flip `input` and drive `output` to its negation. Returns the new input value.
    pub(crate) fn toggle_pair(&mut self, input: &str, output: &str) -> Option<bool> {
        let next = !self.peek(input)?;
        self.channels.get_mut(input)?.value = next;
        self.channels.get_mut(output)?.value = !next;
        Some(next)
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, ChannelState> {
        self.channels.clone()
    }
}
