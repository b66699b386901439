use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    models::bar::{
        decode_collection, encode_collection, format_instant, BarRecord,
        DEFAULT_BACKGROUND_COLOR, DEFAULT_TEXT_COLOR,
    },
    services::{
        ids::IdGenerator,
        metafields::{BarStore, GatewayError},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("unknown direction '{other}', expected 'up' or 'down'")),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditError {
    #[error("announcement text must not be empty")]
    EmptyText,
    #[error("no announcement with id {0}")]
    NotFound(String),
}

/// A blank bar ready to be filled in by the editor. It only joins the
/// collection through [`EditSession::upsert_draft`].
pub fn create_draft(ids: &impl IdGenerator, now: DateTime<Utc>) -> BarRecord {
    BarRecord {
        id: ids.next_id(),
        text: String::new(),
        background_color: DEFAULT_BACKGROUND_COLOR.into(),
        text_color: DEFAULT_TEXT_COLOR.into(),
        start_date: None,
        end_date: None,
        enabled: true,
        dismissible: true,
        updated_at: Some(format_instant(now)),
    }
}

/// In-memory editing session over one shop's bar collection.
///
/// `baseline` is the last collection known to be stored; `dirty` is set by
/// every applied mutation and cleared only by [`EditSession::mark_saved`].
#[derive(Debug, Clone)]
pub struct EditSession {
    bars: Vec<BarRecord>,
    baseline: Vec<BarRecord>,
    dirty: bool,
    version: Option<String>,
}

impl EditSession {
    pub fn new(bars: Vec<BarRecord>, version: Option<String>) -> Self {
        Self {
            baseline: bars.clone(),
            bars,
            dirty: false,
            version,
        }
    }

    /// Load and decode the stored collection for `shop`.
    pub async fn open<S: BarStore>(
        store: &S,
        shop: &str,
        ids: &impl IdGenerator,
    ) -> Result<Self, GatewayError> {
        let stored = store.load(shop).await?;
        let bars = decode_collection(stored.value.as_deref(), ids);
        Ok(Self::new(bars, stored.version))
    }

    pub fn bars(&self) -> &[BarRecord] {
        &self.bars
    }

    pub fn baseline(&self) -> &[BarRecord] {
        &self.baseline
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the collection differs from the baseline. Unlike the dirty
    /// flag this is false again after e.g. moving a bar down and back up.
    pub fn has_changes(&self) -> bool {
        self.bars != self.baseline
    }

    /// Copy of a bar for editing.
    pub fn find(&self, id: &str) -> Option<BarRecord> {
        self.bars.iter().find(|bar| bar.id == id).cloned()
    }

    /// Insert or replace `draft` by id, stamping `updated_at`. Returns the
    /// index the bar ended up at.
    pub fn upsert_draft(
        &mut self,
        mut draft: BarRecord,
        now: DateTime<Utc>,
    ) -> Result<usize, EditError> {
        if !draft.has_text() {
            return Err(EditError::EmptyText);
        }
        draft.updated_at = Some(format_instant(now));

        let index = match self.bars.iter().position(|bar| bar.id == draft.id) {
            Some(index) => {
                self.bars[index] = draft;
                index
            }
            None => {
                self.bars.push(draft);
                self.bars.len() - 1
            }
        };
        self.dirty = true;
        Ok(index)
    }

    /// Drop the bar with `id`. Returns whether a bar was removed; the session
    /// is marked dirty either way.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.bars.len();
        self.bars.retain(|bar| bar.id != id);
        self.dirty = true;
        self.bars.len() != before
    }

    /// Swap the bar at `index` with its neighbour. Moving past either end is
    /// a no-op and leaves the dirty flag alone.
    pub fn move_bar(&mut self, index: usize, direction: Direction) -> bool {
        let target = match direction {
            Direction::Up => index.checked_sub(1),
            Direction::Down => index.checked_add(1),
        };
        let Some(target) = target.filter(|t| *t < self.bars.len() && index < self.bars.len())
        else {
            return false;
        };

        self.bars.swap(index, target);
        self.dirty = true;
        true
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        encode_collection(&self.bars)
    }

    /// Record a successful save: the baseline becomes the current collection.
    pub fn mark_saved(&mut self, version: Option<String>) {
        self.baseline = self.bars.clone();
        self.dirty = false;
        self.version = version;
    }

    /// Write the whole collection back, guarded by the version it was loaded at.
    pub async fn save_to<S: BarStore>(&mut self, store: &S, shop: &str) -> Result<(), GatewayError> {
        let value = self.encode()?;
        let version = store.save(shop, &value, self.version.as_deref()).await?;
        self.mark_saved(version);
        Ok(())
    }
}
