//! The Consumer Profile: the per-tour input that steers Worker parameters and
//! Selection Policy weights (§4.6).

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::content_kind::ContentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgeBracket {
    Child,
    Teen,
    YoungAdult,
    Adult,
    Senior,
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
    NonBinary,
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TravelMode {
    Driving,
    Walking,
    Cycling,
    PublicTransit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripPurpose {
    Leisure,
    Business,
    Family,
    Educational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentPreferenceBias {
    Balanced,
    PrefersVisual,
    PrefersAudio,
    PrefersReading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessibilityNeed {
    Visual,
    Hearing,
    Cognitive,
    Mobility,
}

/// The consumer profile for one tour. Immutable once constructed; the
/// derived weight map is computed once and cached via [`Profile::weights`].
#[derive(Debug)]
pub struct Profile {
    pub age_bracket: AgeBracket,
    pub exact_age: Option<u8>,
    pub gender: Gender,
    pub is_driver: bool,
    pub travel_mode: TravelMode,
    pub trip_purpose: TripPurpose,
    pub content_bias: ContentPreferenceBias,
    pub accessibility_needs: HashSet<AccessibilityNeed>,
    pub subtitles_required: bool,
    pub audio_description_required: bool,
    pub interest_tags: Vec<String>,
    pub exclude_topics: Vec<String>,
    pub content_rating: String,
    weights: OnceLock<HashMap<ContentKindKey, f64>>,
}

/// Hashable stand-in for `ContentKind` as a weight-map key, canonical per §9
/// open-question resolution (the map is keyed by the enum, never a raw string).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKindKey {
    Video,
    Music,
    Text,
    Other(String),
}

impl From<&ContentKind> for ContentKindKey {
    fn from(k: &ContentKind) -> Self {
        match k {
            ContentKind::Video => ContentKindKey::Video,
            ContentKind::Music => ContentKindKey::Music,
            ContentKind::Text => ContentKindKey::Text,
            ContentKind::Other(s) => ContentKindKey::Other(s.to_uppercase()),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            age_bracket: AgeBracket::Adult,
            exact_age: None,
            gender: Gender::Unspecified,
            is_driver: false,
            travel_mode: TravelMode::Driving,
            trip_purpose: TripPurpose::Leisure,
            content_bias: ContentPreferenceBias::Balanced,
            accessibility_needs: HashSet::new(),
            subtitles_required: false,
            audio_description_required: false,
            interest_tags: Vec::new(),
            exclude_topics: Vec::new(),
            content_rating: "family".to_string(),
            weights: OnceLock::new(),
        }
    }
}

impl Clone for Profile {
    fn clone(&self) -> Self {
        Self {
            age_bracket: self.age_bracket,
            exact_age: self.exact_age,
            gender: self.gender,
            is_driver: self.is_driver,
            travel_mode: self.travel_mode,
            trip_purpose: self.trip_purpose,
            content_bias: self.content_bias,
            accessibility_needs: self.accessibility_needs.clone(),
            subtitles_required: self.subtitles_required,
            audio_description_required: self.audio_description_required,
            interest_tags: self.interest_tags.clone(),
            exclude_topics: self.exclude_topics.clone(),
            content_rating: self.content_rating.clone(),
            weights: OnceLock::new(),
        }
    }
}

impl Profile {
    /// Content-kind weight, accepting either an enum-typed lookup or a raw
    /// (case-insensitive) string, per §9's resolved open question.
    pub fn weight(&self, kind: &ContentKind) -> f64 {
        let map = self.weights();
        *map.get(&ContentKindKey::from(kind)).unwrap_or(&1.0)
    }

    pub fn weight_str(&self, kind: &str) -> f64 {
        let parsed: ContentKind = kind.parse().unwrap_or(ContentKind::Other(kind.to_string()));
        self.weight(&parsed)
    }

    /// Computed once per tour and cached (§4.6).
    pub fn weights(&self) -> &HashMap<ContentKindKey, f64> {
        self.weights.get_or_init(|| self.derive_weights())
    }

    fn derive_weights(&self) -> HashMap<ContentKindKey, f64> {
        let mut video = 1.0_f64;
        let mut music = 1.0_f64;
        let mut text = 1.0_f64;

        if self.is_driver {
            video = 0.0;
            music *= 1.2;
        }

        match self.age_bracket {
            AgeBracket::Child => {
                video *= 1.3;
                text *= 0.7;
            }
            AgeBracket::Senior => {
                text *= 1.2;
                video *= 0.9;
            }
            _ => {}
        }

        for need in &self.accessibility_needs {
            match need {
                AccessibilityNeed::Visual => {
                    video *= 0.4;
                    music *= 1.3;
                    text *= 1.1;
                }
                AccessibilityNeed::Hearing => {
                    music *= 0.4;
                    video *= 1.1;
                    text *= 1.2;
                }
                AccessibilityNeed::Cognitive | AccessibilityNeed::Mobility => {}
            }
        }

        // `is_driver` is a hard override: it must win even if another
        // multiplier above nudged VIDEO off of zero.
        if self.is_driver {
            video = 0.0;
        }

        let mut map = HashMap::new();
        map.insert(ContentKindKey::Video, video.max(0.0));
        map.insert(ContentKindKey::Music, music.max(0.0));
        map.insert(ContentKindKey::Text, text.max(0.0));
        map
    }

    /// Human-readable description of the profile, used as a prompt fragment
    /// in Selection Policy reasoning and by Workers generating search queries.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        parts.push(format!("{:?} traveler", self.age_bracket));
        if self.is_driver {
            parts.push("currently driving (no video content)".to_string());
        }
        if !self.accessibility_needs.is_empty() {
            let needs: Vec<String> =
                self.accessibility_needs.iter().map(|n| format!("{:?}", n)).collect();
            parts.push(format!("accessibility needs: {}", needs.join(", ")));
        }
        if !self.interest_tags.is_empty() {
            parts.push(format!("interested in: {}", self.interest_tags.join(", ")));
        }
        parts.join("; ")
    }

    /// Ranked criteria list used as a second prompt fragment (e.g. for LLM
    /// tie-break adjudication).
    pub fn ranked_criteria(&self) -> Vec<String> {
        let mut criteria = vec![format!("content rating: {}", self.content_rating)];
        if self.is_driver {
            criteria.push("safety: never select VIDEO content".to_string());
        }
        for tag in &self.exclude_topics {
            criteria.push(format!("exclude topic: {}", tag));
        }
        criteria
    }
}
