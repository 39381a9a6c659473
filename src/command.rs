//! Serialized draw commands
//!
//! A captured device session is a stream of JSON objects, one per line:
//!
//! ```text
//! {"op":"hardware_revision","value":3}
//! {"op":"rect","x":0,"y":0,"w":480,"h":320,"color":{"r":0,"g":0,"b":32}}
//! {"op":"text","ch":65,"x":16,"y":28,"color":{"r":255,"g":255,"b":255}}
//! {"op":"wave","color":{"r":0,"g":255,"b":0},"samples":[3,5,8]}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::BufRead;

use crate::compositor::Compositor;
use crate::error::{CompositorError, Result};
use crate::primitives::Rgb;

/// One compositor operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    HardwareRevision { value: u8 },
    Font { value: u8 },
    Rect { x: u16, y: u16, w: u16, h: u16, color: Rgb },
    Text { ch: u8, x: u16, y: u16, color: Rgb },
    Wave {
        color: Rgb,
        #[serde(default)]
        samples: Vec<u8>,
    },
    Clear,
}

impl DrawCommand {
    /// Runs the command against a compositor.
    pub fn apply(&self, compositor: &mut dyn Compositor) -> Result<()> {
        match self {
            DrawCommand::HardwareRevision { value } => compositor.set_hardware_revision(*value)?,
            DrawCommand::Font { value } => compositor.set_font(*value)?,
            DrawCommand::Rect { x, y, w, h, color } => compositor.draw_rect(*x, *y, *w, *h, *color)?,
            DrawCommand::Text { ch, x, y, color } => compositor.draw_text(*ch, *x, *y, *color),
            DrawCommand::Wave { color, samples } => compositor.draw_wave(*color, samples),
            DrawCommand::Clear => compositor.clear(),
        }
        Ok(())
    }

    /// Parses one line of a command stream. Returns `None` for blank and
    /// comment lines.
    pub fn parse_line(line: &str) -> serde_json::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Reads every command of a stream.
pub fn read_commands<R: BufRead>(reader: R) -> Result<Vec<DrawCommand>> {
    let mut commands = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let parsed = DrawCommand::parse_line(&line).map_err(|source| CompositorError::CommandParse {
            line: index + 1,
            source,
        })?;
        commands.extend(parsed);
    }
    debug!("Read {} draw commands", commands.len());
    Ok(commands)
}

/// Feeds a recorded stream to a compositor a fixed number of commands at a
/// time, so a burst spreads over several refreshes.
#[derive(Debug, Clone)]
pub struct Replay {
    pending: VecDeque<DrawCommand>,
    per_frame: usize,
    applied: usize,
}

impl Replay {
    pub fn new(commands: Vec<DrawCommand>, per_frame: usize) -> Self {
        Self {
            pending: commands.into(),
            per_frame: per_frame.max(1),
            applied: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Applies the next batch, returning how many commands ran.
    pub fn step(&mut self, compositor: &mut dyn Compositor) -> Result<usize> {
        let count = self.per_frame.min(self.pending.len());
        for command in self.pending.drain(..count) {
            command.apply(compositor)?;
        }
        self.applied += count;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rect_line() {
        let line = r#"{"op":"rect","x":1,"y":2,"w":3,"h":4,"color":{"r":9,"g":8,"b":7}}"#;
        let cmd = DrawCommand::parse_line(line).unwrap().unwrap();
        assert_eq!(
            cmd,
            DrawCommand::Rect {
                x: 1,
                y: 2,
                w: 3,
                h: 4,
                color: Rgb::new(9, 8, 7)
            }
        );
    }

    #[test]
    fn test_wave_samples_default_to_empty() {
        let cmd = DrawCommand::parse_line(r#"{"op":"wave","color":{"r":1,"g":1,"b":1}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            cmd,
            DrawCommand::Wave {
                color: Rgb::new(1, 1, 1),
                samples: vec![]
            }
        );
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        assert_eq!(DrawCommand::parse_line("   ").unwrap(), None);
        assert_eq!(DrawCommand::parse_line("# capture of song 3").unwrap(), None);
    }

    #[test]
    fn test_read_reports_line_number() {
        let input = "{\"op\":\"clear\"}\n\n{\"op\":\"bogus\"}\n";
        match read_commands(input.as_bytes()) {
            Err(CompositorError::CommandParse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {:?}", other.map(|c| c.len())),
        }
    }

    #[test]
    fn test_serialized_line_parses_back() {
        let cmd = DrawCommand::Text {
            ch: b'Z',
            x: 10,
            y: 20,
            color: Rgb::WHITE,
        };
        let line = cmd.to_line().unwrap();
        assert!(line.starts_with(r#"{"op":"text""#));
        assert_eq!(DrawCommand::parse_line(&line).unwrap(), Some(cmd));
    }
}
