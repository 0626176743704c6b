//! # Mood Tables
//!
//! Maps symbolic mood tags to voice parameters for the primary provider and
//! the local synthesizer, and to generic canned-clip tags. Unknown tags are
//! treated as `neutral`.

use crate::constants::defaults;
use crate::types::{LocalVoiceParams, VoiceParams};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const NEUTRAL: &str = defaults::DEFAULT_MOOD;

/// (mood, stability, similarity_boost, style)
const PRIMARY_MOODS: [(&str, f64, f64, f64); 9] = [
    ("confident", 0.7, 0.8, 0.2),
    ("neutral", 0.5, 0.75, 0.0),
    ("uncertain", 0.3, 0.6, 0.1),
    ("frustrated", 0.4, 0.65, 0.3),
    ("confused", 0.35, 0.6, 0.15),
    ("excited", 0.6, 0.85, 0.4),
    ("focused", 0.65, 0.8, 0.1),
    ("curious", 0.55, 0.7, 0.25),
    ("overwhelmed", 0.3, 0.55, 0.2),
];

/// (mood, rate, pitch, volume)
const LOCAL_MOODS: [(&str, f64, f64, f64); 11] = [
    ("confident", 1.1, 1.05, 0.9),
    ("neutral", 1.0, 1.0, 0.8),
    ("uncertain", 0.9, 0.95, 0.7),
    ("frustrated", 0.85, 0.9, 0.75),
    ("confused", 0.9, 0.95, 0.7),
    ("excited", 1.2, 1.1, 1.0),
    ("focused", 1.05, 1.0, 0.85),
    ("curious", 1.0, 1.02, 0.8),
    ("overwhelmed", 0.8, 0.9, 0.6),
    ("helpful", 1.0, 1.0, 0.85),
    ("professional", 1.05, 0.98, 0.9),
];

/// Partial update for a mood's primary voice parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodSettingsUpdate {
    pub stability: Option<f64>,
    pub similarity_boost: Option<f64>,
    pub style: Option<f64>,
    pub use_speaker_boost: Option<bool>,
}

impl MoodSettingsUpdate {
    fn apply(&self, params: &mut VoiceParams) {
        if let Some(stability) = self.stability {
            params.stability = stability.clamp(0.0, 1.0);
        }
        if let Some(similarity_boost) = self.similarity_boost {
            params.similarity_boost = similarity_boost.clamp(0.0, 1.0);
        }
        if let Some(style) = self.style {
            params.style = style.clamp(0.0, 1.0);
        }
        if let Some(use_speaker_boost) = self.use_speaker_boost {
            params.use_speaker_boost = use_speaker_boost;
        }
    }
}

#[derive(Debug, Clone)]
pub struct MoodTable {
    primary: HashMap<String, VoiceParams>,
    local: HashMap<String, LocalVoiceParams>,
}

impl Default for MoodTable {
    fn default() -> Self {
        let primary = PRIMARY_MOODS
            .iter()
            .map(|&(mood, stability, similarity_boost, style)| {
                (
                    mood.to_string(),
                    VoiceParams {
                        stability,
                        similarity_boost,
                        style,
                        use_speaker_boost: true,
                    },
                )
            })
            .collect();
        let local = LOCAL_MOODS
            .iter()
            .map(|&(mood, rate, pitch, volume)| {
                (mood.to_string(), LocalVoiceParams { rate, pitch, volume })
            })
            .collect();
        Self { primary, local }
    }
}

impl MoodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_known(&self, mood: &str) -> bool {
        let mood = normalize(mood);
        self.primary.contains_key(&mood) || self.local.contains_key(&mood)
    }

    /// Canonical tag for `mood`; anything unrecognised becomes `neutral`
    pub fn resolve(&self, mood: &str) -> String {
        let mood = normalize(mood);
        if self.primary.contains_key(&mood) || self.local.contains_key(&mood) {
            mood
        } else {
            NEUTRAL.to_string()
        }
    }

    pub fn voice_params(&self, mood: &str) -> VoiceParams {
        let mood = self.resolve(mood);
        self.primary
            .get(&mood)
            .or_else(|| self.primary.get(NEUTRAL))
            .copied()
            .unwrap_or_default()
    }

    pub fn local_params(&self, mood: &str) -> LocalVoiceParams {
        let mood = self.resolve(mood);
        self.local
            .get(&mood)
            .or_else(|| self.local.get(NEUTRAL))
            .copied()
            .unwrap_or_default()
    }

    /// Apply a partial update to a known mood. Returns `false` for unknown moods.
    pub fn update(&mut self, mood: &str, update: &MoodSettingsUpdate) -> bool {
        let mood = normalize(mood);
        if !self.is_known(&mood) {
            return false;
        }
        let params = self
            .primary
            .entry(mood)
            .or_insert_with(VoiceParams::default);
        update.apply(params);
        true
    }

    /// Known mood tags, sorted
    pub fn moods(&self) -> Vec<String> {
        let mut moods: Vec<String> = self
            .primary
            .keys()
            .chain(self.local.keys())
            .cloned()
            .collect();
        moods.sort();
        moods.dedup();
        moods
    }
}

/// Clip tag used when no keyword in the text selects a dedicated clip
pub fn generic_clip_tag(mood: &str) -> &'static str {
    match normalize(mood).as_str() {
        "confident" => "affirmative",
        "frustrated" => "understanding",
        "uncertain" => "thinking",
        "excited" => "positive",
        "focused" => "acknowledgment",
        _ => "acknowledgment",
    }
}

fn normalize(mood: &str) -> String {
    mood.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_mood_resolves_to_neutral() {
        let table = MoodTable::new();
        assert_eq!(table.resolve("ecstatic"), "neutral");
        assert_eq!(table.resolve(""), "neutral");
        assert_eq!(table.resolve(" Confident "), "confident");
        assert_eq!(table.voice_params("ecstatic"), table.voice_params("neutral"));
    }

    #[test]
    fn test_primary_params() {
        let table = MoodTable::new();
        let confident = table.voice_params("confident");
        assert_eq!(confident.stability, 0.7);
        assert_eq!(confident.similarity_boost, 0.8);
        assert_eq!(confident.style, 0.2);
        assert!(confident.use_speaker_boost);
    }

    #[test]
    fn test_local_only_moods_fall_back_to_neutral_primary_params() {
        let table = MoodTable::new();
        assert!(table.is_known("professional"));
        assert_eq!(table.local_params("professional").rate, 1.05);
        assert_eq!(table.voice_params("professional"), table.voice_params("neutral"));
    }

    #[test]
    fn test_update_known_mood() {
        let mut table = MoodTable::new();
        let update = MoodSettingsUpdate {
            stability: Some(0.9),
            style: Some(1.5),
            ..Default::default()
        };
        assert!(table.update("focused", &update));

        let focused = table.voice_params("focused");
        assert_eq!(focused.stability, 0.9);
        assert_eq!(focused.similarity_boost, 0.8);
        assert_eq!(focused.style, 1.0);
    }

    #[test]
    fn test_update_unknown_mood_is_rejected() {
        let mut table = MoodTable::new();
        assert!(!table.update("sleepy", &MoodSettingsUpdate::default()));
        assert!(!table.is_known("sleepy"));
    }

    #[test]
    fn test_generic_clip_tags() {
        assert_eq!(generic_clip_tag("confident"), "affirmative");
        assert_eq!(generic_clip_tag("frustrated"), "understanding");
        assert_eq!(generic_clip_tag("uncertain"), "thinking");
        assert_eq!(generic_clip_tag("excited"), "positive");
        assert_eq!(generic_clip_tag("curious"), "acknowledgment");
    }

    #[test]
    fn test_mood_listing() {
        let moods = MoodTable::new().moods();
        assert_eq!(moods.len(), 11);
        assert!(moods.contains(&"overwhelmed".to_string()));
    }
}
