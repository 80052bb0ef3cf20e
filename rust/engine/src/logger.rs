use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::MatchConfig;
use crate::round::RoundEndReason;
use crate::tile::Tile;
use crate::train::TrainRef;
use crate::PlayerId;

/// What a player did on one step of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundAction {
    Play { tile: Tile, train: TrainRef },
    Draw { tile: Tile },
    /// Tried to draw from an empty boneyard; the turn passed.
    DrawEmpty,
    Pass,
}

/// Records a single action within a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Turn counter at the time of the action (starts at 1)
    pub turn: u64,
    pub player_id: PlayerId,
    pub action: RoundAction,
}

/// Outcome and action log of a finished round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based position of the round within its match
    pub game_number: u32,
    pub engine_value: u8,
    pub winner: Option<PlayerId>,
    pub reason: RoundEndReason,
    pub scores: BTreeMap<PlayerId, u32>,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
}

/// Complete record of a finished match, one JSONL line per match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Identifier in `YYYYMMDD-NNNNNN` form
    pub match_id: String,
    pub players: Vec<PlayerId>,
    pub config: MatchConfig,
    pub rounds: Vec<RoundRecord>,
    pub cumulative_scores: BTreeMap<PlayerId, u32>,
    pub round_wins: BTreeMap<PlayerId, u32>,
    pub winner: PlayerId,
    /// Completion time (RFC3339)
    #[serde(default)]
    pub ts: Option<String>,
    /// Free-form extras (AI levels per seat, source, ...)
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

pub fn format_match_id(yyyymmdd: &str, seq: u32) -> String {
    format!("{}-{:06}", yyyymmdd, seq)
}

use chrono::{SecondsFormat, Utc};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Appends match records to a JSONL file.
pub struct MatchLogger {
    writer: Option<BufWriter<File>>,
    date: String,
    seq: u32,
}

impl MatchLogger {
    /// Truncates `path` and writes from the start.
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        ensure_parent(path.as_ref());
        let f = File::create(path)?;
        Ok(Self::with_writer(f))
    }

    /// Opens `path` for appending, creating it if needed.
    pub fn append<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        ensure_parent(path.as_ref());
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with_writer(f))
    }

    /// Logger that only hands out ids; `write` is a no-op.
    pub fn detached(date: &str) -> Self {
        Self {
            writer: None,
            date: date.to_string(),
            seq: 0,
        }
    }

    fn with_writer(f: File) -> Self {
        Self {
            writer: Some(BufWriter::new(f)),
            date: Utc::now().format("%Y%m%d").to_string(),
            seq: 0,
        }
    }

    pub fn next_id(&mut self) -> String {
        self.seq += 1;
        format_match_id(&self.date, self.seq)
    }

    pub fn write(&mut self, record: &MatchRecord) -> std::io::Result<()> {
        let mut rec = record.clone();
        if rec.ts.is_none() {
            rec.ts = Some(now_rfc3339());
        }
        let line = serde_json::to_string(&rec).map_err(std::io::Error::other)?;
        if let Some(w) = &mut self.writer {
            w.write_all(line.as_bytes())?;
            w.write_all(b"\n")?;
            w.flush()?;
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = create_dir_all(parent);
        }
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Reads every non-blank line of a JSONL file as a [`MatchRecord`].
///
/// The error names the 1-based line that failed to parse.
pub fn read_match_records<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<MatchRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let rec: MatchRecord = serde_json::from_str(&line).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("line {}: {e}", idx + 1),
            )
        })?;
        out.push(rec);
    }
    Ok(out)
}
