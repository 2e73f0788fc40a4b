use crate::error::ValidationError;
use crate::plan::{CapturePlan, ShotType, parse_count, parse_interval};
use crate::store::{KeyValueStore, PRESETS_KEY};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A named, reusable capture plan. Counts are kept as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub shot_type: ShotType,
    pub horizontal_count: String,
    pub vertical_count: String,
    pub frequency: String,
}

impl Preset {
    pub fn to_plan(&self) -> CapturePlan {
        CapturePlan {
            shot_type: self.shot_type,
            horizontal_count: parse_count(&self.horizontal_count),
            vertical_count: parse_count(&self.vertical_count),
            interval: parse_interval(&self.frequency),
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} • {}H / {}V • {}s",
            self.shot_type, self.horizontal_count, self.vertical_count, self.frequency
        )
    }
}

/// Editor form input. `id` is set when editing an existing preset.
#[derive(Debug, Clone, Default)]
pub struct PresetDraft {
    pub id: Option<String>,
    pub name: String,
    pub shot_type: ShotType,
    pub horizontal_count: String,
    pub vertical_count: String,
    pub frequency: String,
}

impl PresetDraft {
    pub fn from_preset(preset: &Preset) -> Self {
        Self {
            id: Some(preset.id.clone()),
            name: preset.name.clone(),
            shot_type: preset.shot_type,
            horizontal_count: preset.horizontal_count.clone(),
            vertical_count: preset.vertical_count.clone(),
            frequency: preset.frequency.clone(),
        }
    }

    /// Non-emptiness only; numeric ranges are not checked.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("name", &self.name),
            ("horizontal count", &self.horizontal_count),
            ("vertical count", &self.vertical_count),
            ("frequency", &self.frequency),
        ];
        for (label, value) in fields {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(label));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PresetStore {
    store: Arc<dyn KeyValueStore>,
}

impl PresetStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// All presets in stored order. Unreadable or malformed data reads as empty.
    pub fn list(&self) -> Vec<Preset> {
        match self.load() {
            Ok(presets) => presets,
            Err(err) => {
                tracing::warn!("treating preset store as empty: {err:#}");
                Vec::new()
            }
        }
    }

    pub fn find(&self, id: &str) -> Option<Preset> {
        self.list().into_iter().find(|preset| preset.id == id)
    }

    /// Insert a new preset or replace the one with the same id in place.
    /// Fails without writing when the stored list cannot be read.
    pub fn upsert(&self, draft: PresetDraft) -> Result<Preset> {
        draft.validate()?;

        let mut presets = self.load()?;
        let id = match draft.id {
            Some(id) => id,
            None => next_id(&presets),
        };
        let preset = Preset {
            id,
            name: draft.name,
            shot_type: draft.shot_type,
            horizontal_count: draft.horizontal_count,
            vertical_count: draft.vertical_count,
            frequency: draft.frequency,
        };

        match presets.iter_mut().find(|existing| existing.id == preset.id) {
            Some(existing) => *existing = preset.clone(),
            None => presets.push(preset.clone()),
        }

        self.save(&presets)?;
        tracing::debug!(id = %preset.id, "saved preset");
        Ok(preset)
    }

    /// Remove a preset, keeping the order of the rest. Returns whether it existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut presets = self.load()?;
        let before = presets.len();
        presets.retain(|preset| preset.id != id);
        if presets.len() == before {
            return Ok(false);
        }
        self.save(&presets)?;
        Ok(true)
    }

    fn load(&self) -> Result<Vec<Preset>> {
        let Some(raw) = self.store.get(PRESETS_KEY)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).context("stored presets are not valid JSON")
    }

    fn save(&self, presets: &[Preset]) -> Result<()> {
        let encoded = serde_json::to_string(presets).context("failed to encode presets")?;
        self.store
            .set(PRESETS_KEY, &encoded)
            .context("failed to write presets")
    }
}

fn next_id(existing: &[Preset]) -> String {
    let mut candidate = Utc::now().timestamp_millis();
    while existing
        .iter()
        .any(|preset| preset.id == candidate.to_string())
    {
        candidate += 1;
    }
    candidate.to_string()
}
