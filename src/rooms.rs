//! Static conference room configuration.
//!
//! Rooms are declared in an INI-style file under a `[rooms]` section, one
//! line per conference:
//!
//! ```text
//! [rooms]
//! conf => 1001,1234,9999    ; confno, optional PIN, optional admin PIN
//! conf => 2000
//! ```
//!
//! Both `,` and `|` separate the fields. The file is re-read at admission
//! time so edits take effect without a reload step; a missing file is not an
//! error for dynamic conferences.

use std::{fs, io, path::Path};
use tracing::debug;

/// One statically configured conference room.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Room {
    /// Conference number (the registry key).
    pub confno: String,
    /// Entry PIN; empty when the room is open.
    pub pin: String,
    /// Admin PIN; empty when no admin credential is configured.
    pub admin_pin: String,
}

impl Room {
    /// Whether joining this room requires no PIN at all.
    #[must_use]
    pub fn is_pinless(&self) -> bool {
        self.pin.is_empty()
    }
}

/// The parsed `[rooms]` table.
#[derive(Clone, Debug, Default)]
pub struct Rooms {
    rooms: Vec<Room>,
}

impl Rooms {
    /// Loads and parses the rooms file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Parses rooms from file text. Unknown sections and malformed lines are
    /// skipped, not fatal: a typo in one room must not take down the rest.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut rooms = Vec::new();
        let mut in_rooms = false;

        for raw in text.lines() {
            let line = match raw.find(';') {
                Some(at) => &raw[..at],
                None => raw,
            }
            .trim();

            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                in_rooms = line[1..line.len() - 1].eq_ignore_ascii_case("rooms");
                continue;
            }
            if !in_rooms {
                continue;
            }

            let (name, value) = match line.split_once("=>").or_else(|| line.split_once('=')) {
                Some(pair) => pair,
                None => continue,
            };
            if !name.trim().eq_ignore_ascii_case("conf") {
                continue;
            }

            let mut fields = value.trim().split(|c| c == ',' || c == '|');
            let confno = match fields.next() {
                Some(c) if !c.trim().is_empty() => c.trim().to_string(),
                _ => {
                    debug!("skipping rooms line with empty conference number");
                    continue;
                }
            };
            let pin = fields.next().unwrap_or("").trim().to_string();
            let admin_pin = fields.next().unwrap_or("").trim().to_string();

            rooms.push(Room {
                confno,
                pin,
                admin_pin,
            });
        }

        Self { rooms }
    }

    /// Finds a room by conference number (case-insensitive, like extensions).
    #[must_use]
    pub fn lookup(&self, confno: &str) -> Option<&Room> {
        self.rooms
            .iter()
            .find(|r| r.confno.eq_ignore_ascii_case(confno))
    }

    /// Iterates all configured rooms in file order.
    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter()
    }

    /// Number of configured rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no rooms are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
