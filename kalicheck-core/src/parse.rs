//! Recognizer for the fixed line grammar the generator prints.
//!
//! Unrecognized lines are not errors: the generator interleaves its
//! structured records with free-form progress output.

use crate::error::Result;
use regex::Regex;

/// Which pair of tokens marks per-event records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum TagStyle {
    /// `Snd(..)` / `Rcv(..)`.
    #[default]
    SndRcv,
    /// `Out(..)` / `In(..)`, printed by older generator builds.
    OutIn,
}

impl TagStyle {
    pub fn tag(self, kind: EventKind) -> &'static str {
        match (self, kind) {
            (Self::SndRcv, EventKind::Write) => "Snd",
            (Self::SndRcv, EventKind::Read) => "Rcv",
            (Self::OutIn, EventKind::Write) => "Out",
            (Self::OutIn, EventKind::Read) => "In",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Write,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum SocketBuffer {
    #[strum(serialize = "snd")]
    Send,
    #[strum(serialize = "rcv")]
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoEvent<'a> {
    pub conn_id: u64,
    pub length: u64,
    pub payload: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedEvent<'a> {
    Write(IoEvent<'a>),
    Read(IoEvent<'a>),
    Bandwidth { down_mbps: f64, up_mbps: f64 },
    ByteTotal { direction: Direction, bytes: u64 },
    CapabilityWarning { buffer: SocketBuffer },
}

impl<'a> ParsedEvent<'a> {
    /// The per-event record of the given kind, if this is one.
    pub fn io(&self, kind: EventKind) -> Option<&IoEvent<'a>> {
        match (self, kind) {
            (Self::Write(ev), EventKind::Write) | (Self::Read(ev), EventKind::Read) => Some(ev),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineParser {
    style: TagStyle,
    io: Regex,
    bandwidth: Regex,
    total: Regex,
    sockopt: Regex,
}

impl LineParser {
    pub fn new(style: TagStyle) -> Result<Self> {
        let write = regex::escape(style.tag(EventKind::Write));
        let read = regex::escape(style.tag(EventKind::Read));
        Ok(Self {
            style,
            io: Regex::new(&format!(r"^({write}|{read})\((\d+), (\d+)\): \[(.*)\]$"))?,
            bandwidth: Regex::new(r"^Aggregate bandwidth: ([\d.]+)[^\d]+, ([\d.]+)[^\d]+ Mbps")?,
            total: Regex::new(r"^Total data (sent|received):.*\(([\d.]+) bytes\)")?,
            sockopt: Regex::new(r"^WARNING: --(snd|rcv)buf option makes no effect\.")?,
        })
    }

    pub fn parse<'a>(&self, line: &'a str) -> Option<ParsedEvent<'a>> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(caps) = self.io.captures(line) {
            let ev = IoEvent {
                conn_id: caps[2].parse().ok()?,
                length: caps[3].parse().ok()?,
                payload: caps.get(4).map_or("", |m| m.as_str()),
            };
            return Some(if &caps[1] == self.style.tag(EventKind::Write) {
                ParsedEvent::Write(ev)
            } else {
                ParsedEvent::Read(ev)
            });
        }

        if let Some(caps) = self.bandwidth.captures(line) {
            return Some(ParsedEvent::Bandwidth {
                down_mbps: caps[1].parse().ok()?,
                up_mbps: caps[2].parse().ok()?,
            });
        }

        if let Some(caps) = self.total.captures(line) {
            let bytes: f64 = caps[2].parse().ok()?;
            return Some(ParsedEvent::ByteTotal {
                direction: caps[1].parse().ok()?,
                bytes: bytes as u64,
            });
        }

        if let Some(caps) = self.sockopt.captures(line) {
            return Some(ParsedEvent::CapabilityWarning {
                buffer: caps[1].parse().ok()?,
            });
        }

        None
    }

    /// Parses every line, dropping the ones that match nothing.
    pub fn events<'a, I>(&'a self, lines: I) -> impl Iterator<Item = ParsedEvent<'a>>
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: 'a,
    {
        lines.into_iter().filter_map(move |line| self.parse(line))
    }
}
