//! The Selection Policy (Judge, §4.5): turns a Waypoint's candidate set plus
//! a consumer Profile into one [`Decision`], under hard, non-overridable
//! safety rules.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use regex::Regex;

use crate::artifact::Artifact;
use crate::content_kind::ContentKind;
use crate::profile::{AccessibilityNeed, AgeBracket, Profile};
use crate::waypoint::{Waypoint, WaypointId};

const HISTORICAL_PATTERNS: &[&str] = &["museum", "memorial", "ancient", "old"];
const SCENIC_PATTERNS: &[&str] = &["view", "park", "beach", "mountain"];
const CULTURAL_PATTERNS: &[&str] = &["theatre", "concert", "festival"];
const CHILD_TOKENS: &[&str] = &["fun", "kids"];
const SENIOR_TOKENS: &[&str] = &["classic", "history"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let haystack = haystack.to_lowercase();
    needles.iter().any(|n| haystack.contains(n))
}

/// One Artifact plus the priority of the Worker that produced it (lower
/// priority value sorts earlier), needed for the Selection Policy's
/// tie-break rule (2) (§4.5).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub artifact: Artifact,
    pub worker_priority: u32,
}

impl Candidate {
    pub fn new(artifact: Artifact, worker_priority: u32) -> Self {
        Self { artifact, worker_priority }
    }
}

/// The Selection Policy's output (§4.5, GLOSSARY "Decision").
#[derive(Debug, Clone)]
pub struct Decision {
    pub waypoint_id: WaypointId,
    /// `None` only in the hard-safety "no safe content" case.
    pub selected: Option<Artifact>,
    pub candidates: Vec<Artifact>,
    pub reasoning: String,
    pub scores: HashMap<String, f64>,
    pub confidence: f64,
    pub timestamp: SystemTime,
}

/// Errors from the Selection Policy. Per §8, these indicate a programming
/// error (e.g. calling with zero candidates) and are not retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("selection policy invoked with zero candidates")]
    NoCandidates,
}

/// The optional language-model tie-break collaborator (§4.5). The policy
/// depends only on this trait object, never on a concrete model client, so
/// the parse/fallback contract is testable without any network dependency.
#[async_trait::async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate(&self, prompt: String) -> String;
}

struct ParsedVerdict {
    winner_index: usize,
    winner_score: f64,
    reasoning: String,
}

fn verdict_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)WINNER:\s*(\d+)\s*.*WINNER_SCORE:\s*([\d.]+)\s*.*REASONING:\s*(.+)").unwrap()
    })
}

fn parse_verdict(response: &str) -> Option<ParsedVerdict> {
    let caps = verdict_regex().captures(response)?;
    let winner_index: usize = caps.get(1)?.as_str().parse().ok()?;
    let winner_score: f64 = caps.get(2)?.as_str().parse().ok()?;
    let reasoning = caps.get(3)?.as_str().trim().to_string();
    Some(ParsedVerdict { winner_index, winner_score, reasoning })
}

/// Scored candidate, retained internally between the scoring pass and the
/// final winner selection so tie-break fields survive alongside the score.
struct Scored<'a> {
    candidate: &'a Candidate,
    score: f64,
}

/// Stateless with respect to the Profile and candidate set (§5 "Reentrancy").
/// The only state carried across calls is an optional injected [`Judge`].
#[derive(Clone, Default)]
pub struct SelectionPolicy {
    judge: Option<Arc<dyn Judge>>,
}

impl SelectionPolicy {
    pub fn new() -> Self {
        Self { judge: None }
    }

    pub fn with_judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Produce one [`Decision`] for `waypoint` given `candidates` and `profile`.
    pub async fn decide(
        &self,
        waypoint: &Waypoint,
        candidates: Vec<Candidate>,
        profile: &Profile,
    ) -> Result<Decision, SelectionError> {
        if candidates.is_empty() {
            return Err(SelectionError::NoCandidates);
        }
        let original_artifacts: Vec<Artifact> = candidates.iter().map(|c| c.artifact.clone()).collect();

        let (survivors, safety_note) = self.apply_hard_safety_rules(&candidates, profile);

        if survivors.is_empty() {
            return Ok(Decision {
                waypoint_id: waypoint.id().clone(),
                selected: None,
                candidates: original_artifacts,
                reasoning: safety_note.unwrap_or_else(|| "no candidates survived safety filtering".to_string()),
                scores: HashMap::new(),
                confidence: 0.0,
                timestamp: SystemTime::now(),
            });
        }

        let scored: Vec<Scored> = survivors
            .iter()
            .map(|c| Scored { candidate: c, score: self.score(waypoint, c, profile) })
            .collect();

        let scores: HashMap<String, f64> =
            scored.iter().map(|s| (s.candidate.artifact.kind().to_string(), s.score)).collect();

        if scored.len() == 1 {
            let only = &scored[0];
            let weight = profile.weight(only.candidate.artifact.kind());
            let match_quality = if weight > 1.2 {
                "excellent match"
            } else if weight > 1.0 {
                "good match"
            } else if weight < 0.8 {
                "acceptable, not ideal for this profile"
            } else {
                "acceptable"
            };
            return Ok(Decision {
                waypoint_id: waypoint.id().clone(),
                selected: Some(only.candidate.artifact.clone()),
                candidates: original_artifacts,
                reasoning: format!(
                    "only surviving candidate ({}); {}",
                    only.candidate.artifact.kind(),
                    match_quality
                ),
                scores,
                confidence: 1.0,
                timestamp: SystemTime::now(),
            });
        }

        let (winner_idx, runner_up_score, deterministic_reasoning) = Self::rank(&scored);

        let mut selected = scored[winner_idx].candidate.artifact.clone();
        let mut winner_score = scored[winner_idx].score;
        let mut reasoning = deterministic_reasoning;
        let mut confidence = ((winner_score - runner_up_score) / 10.0).clamp(0.0, 1.0);

        if let Some(judge) = &self.judge {
            let prompt = Self::build_prompt(waypoint, &scored, profile);
            let response = judge.evaluate(prompt).await;
            if let Some(verdict) = parse_verdict(&response) {
                if verdict.winner_index < scored.len() {
                    selected = scored[verdict.winner_index].candidate.artifact.clone();
                    winner_score = verdict.winner_score.clamp(0.0, 10.0);
                    reasoning = verdict.reasoning;
                    let runner_up = scored
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != verdict.winner_index)
                        .map(|(_, s)| s.score)
                        .fold(f64::MIN, f64::max);
                    confidence = ((winner_score - runner_up) / 10.0).clamp(0.0, 1.0);
                }
            }
        }

        Ok(Decision {
            waypoint_id: waypoint.id().clone(),
            selected: Some(selected),
            candidates: original_artifacts,
            reasoning,
            scores,
            confidence,
            timestamp: SystemTime::now(),
        })
    }

    fn apply_hard_safety_rules<'a>(
        &self,
        candidates: &'a [Candidate],
        profile: &Profile,
    ) -> (Vec<&'a Candidate>, Option<String>) {
        let mut note = None;

        let after_driver: Vec<&Candidate> = if profile.is_driver {
            let filtered: Vec<&Candidate> =
                candidates.iter().filter(|c| !matches!(c.artifact.kind(), ContentKind::Video)).collect();
            if filtered.is_empty() {
                note = Some(
                    "driver safety rule excludes VIDEO and no non-VIDEO candidate was available"
                        .to_string(),
                );
            }
            filtered
        } else {
            candidates.iter().collect()
        };

        let after_topics: Vec<&Candidate> = after_driver
            .into_iter()
            .filter(|c| !self.matches_excluded_topic(&c.artifact, profile))
            .collect();

        if after_topics.is_empty() && note.is_none() && !profile.exclude_topics.is_empty() {
            note = Some("all candidates matched an excluded topic".to_string());
        }

        (after_topics, note)
    }

    fn matches_excluded_topic(&self, artifact: &Artifact, profile: &Profile) -> bool {
        profile.exclude_topics.iter().any(|topic| {
            let topic = topic.to_lowercase();
            if topic.is_empty() {
                return false;
            }
            artifact.title().to_lowercase().contains(&topic)
                || artifact.metadata().values().any(|v| v.to_lowercase().contains(&topic))
        })
    }

    fn score(&self, waypoint: &Waypoint, candidate: &Candidate, profile: &Profile) -> f64 {
        let artifact = &candidate.artifact;
        let kind = artifact.kind();
        let mut score = artifact.relevance_score() * profile.weight(kind);

        let location_name = waypoint.matchable_name();
        let title = artifact.title();

        if contains_any(title, &[location_name.to_lowercase().as_str()]) {
            score += 2.0;
        }
        if matches!(kind, ContentKind::Text) && contains_any(location_name, HISTORICAL_PATTERNS) {
            score += 1.5;
        }
        if matches!(kind, ContentKind::Video) && contains_any(location_name, SCENIC_PATTERNS) {
            score += 1.0;
        }
        if matches!(kind, ContentKind::Music) && contains_any(location_name, CULTURAL_PATTERNS) {
            score += 1.0;
        }
        if profile.age_bracket == AgeBracket::Child && contains_any(title, CHILD_TOKENS) {
            score += 1.5;
        }
        if profile.age_bracket == AgeBracket::Senior && contains_any(title, SENIOR_TOKENS) {
            score += 1.5;
        }

        if profile.accessibility_needs.contains(&AccessibilityNeed::Cognitive) {
            if let Some(duration) = artifact.duration_seconds() {
                if duration > 180 {
                    score *= 0.7;
                }
            }
        }

        score.clamp(0.0, 10.0)
    }

    /// Deterministic winner selection: highest final score; ties broken by
    /// (1) higher base relevance, (2) lower Worker priority, (3) kind order.
    fn rank(scored: &[Scored]) -> (usize, f64, String) {
        let mut order: Vec<usize> = (0..scored.len()).collect();
        order.sort_by(|&a, &b| {
            let sa = &scored[a];
            let sb = &scored[b];
            sb.score
                .partial_cmp(&sa.score)
                .unwrap()
                .then_with(|| {
                    sb.candidate
                        .artifact
                        .relevance_score()
                        .partial_cmp(&sa.candidate.artifact.relevance_score())
                        .unwrap()
                })
                .then_with(|| sa.candidate.worker_priority.cmp(&sb.candidate.worker_priority))
                .then_with(|| {
                    sa.candidate.artifact.kind().tie_break_rank().cmp(&sb.candidate.artifact.kind().tie_break_rank())
                })
        });
        let winner_idx = order[0];
        let runner_up_score = order.get(1).map(|&i| scored[i].score).unwrap_or(0.0);
        let reasoning = format!(
            "selected {} (score {:.2}) over {} other candidate(s)",
            scored[winner_idx].candidate.artifact.kind(),
            scored[winner_idx].score,
            scored.len() - 1
        );
        (winner_idx, runner_up_score, reasoning)
    }

    fn build_prompt(waypoint: &Waypoint, scored: &[Scored], profile: &Profile) -> String {
        let mut prompt = format!(
            "Waypoint: {}\nProfile: {}\nCriteria: {}\nCandidates:\n",
            waypoint.matchable_name(),
            profile.describe(),
            profile.ranked_criteria().join(", ")
        );
        for (i, s) in scored.iter().enumerate() {
            prompt.push_str(&format!(
                "{i}. [{}] \"{}\" (deterministic score {:.2})\n",
                s.candidate.artifact.kind(),
                s.candidate.artifact.title(),
                s.score
            ));
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waypoint(name: &str) -> Waypoint {
        Waypoint::new(WaypointId::new("wp-1"), 0, "123 Main St", 0.0, 0.0).with_location_name(name)
    }

    fn candidate(kind: ContentKind, title: &str, score: f64, priority: u32) -> Candidate {
        Candidate::new(
            Artifact::builder(WaypointId::new("wp-1"), kind, title, "source")
                .relevance_score(score)
                .build()
                .unwrap(),
            priority,
        )
    }

    #[tokio::test]
    async fn single_candidate_short_circuits() {
        let policy = SelectionPolicy::new();
        let wp = waypoint("Grand Museum");
        let decision = policy
            .decide(&wp, vec![candidate(ContentKind::Text, "History of the Museum", 6.0, 100)], &Profile::default())
            .await
            .unwrap();
        assert_eq!(decision.selected.unwrap().title(), "History of the Museum");
        assert_eq!(decision.confidence, 1.0);
    }

    #[tokio::test]
    async fn driver_profile_excludes_video_even_if_highest_scored() {
        let policy = SelectionPolicy::new();
        let wp = waypoint("Overlook Park");
        let mut profile = Profile::default();
        profile.is_driver = true;
        let decision = policy
            .decide(
                &wp,
                vec![
                    candidate(ContentKind::Video, "Scenic Overlook Park Drone Tour", 9.0, 100),
                    candidate(ContentKind::Music, "Local Radio Mix", 5.0, 100),
                ],
                &profile,
            )
            .await
            .unwrap();
        assert_eq!(decision.selected.unwrap().kind(), &ContentKind::Music);
    }

    #[tokio::test]
    async fn driver_with_only_video_candidates_yields_no_safe_content() {
        let policy = SelectionPolicy::new();
        let wp = waypoint("Overlook Park");
        let mut profile = Profile::default();
        profile.is_driver = true;
        let decision = policy
            .decide(&wp, vec![candidate(ContentKind::Video, "Scenic Drive", 9.0, 100)], &profile)
            .await
            .unwrap();
        assert!(decision.selected.is_none());
        assert_eq!(decision.candidates.len(), 1);
    }

    #[tokio::test]
    async fn excluded_topic_removes_matching_candidate() {
        let policy = SelectionPolicy::new();
        let wp = waypoint("Old Battlefield");
        let mut profile = Profile::default();
        profile.exclude_topics = vec!["battle".to_string()];
        let decision = policy
            .decide(
                &wp,
                vec![
                    candidate(ContentKind::Text, "The Old Battle of 1862", 8.0, 100),
                    candidate(ContentKind::Music, "Folk Songs", 5.0, 100),
                ],
                &profile,
            )
            .await
            .unwrap();
        assert_eq!(decision.selected.unwrap().kind(), &ContentKind::Music);
    }

    #[tokio::test]
    async fn location_name_title_match_bumps_score() {
        let policy = SelectionPolicy::new();
        let wp = waypoint("Ancient Memorial");
        let profile = Profile::default();
        let decision = policy
            .decide(
                &wp,
                vec![
                    candidate(ContentKind::Text, "The Ancient Memorial Story", 5.0, 100),
                    candidate(ContentKind::Music, "Unrelated Track", 5.0, 100),
                ],
                &profile,
            )
            .await
            .unwrap();
        assert_eq!(decision.selected.unwrap().kind(), &ContentKind::Text);
    }

    #[tokio::test]
    async fn ties_break_by_relevance_then_priority_then_kind() {
        let policy = SelectionPolicy::new();
        let wp = waypoint("Plainville");
        let profile = Profile::default();
        let decision = policy
            .decide(
                &wp,
                vec![
                    candidate(ContentKind::Music, "Plain Track", 5.0, 50),
                    candidate(ContentKind::Text, "Plain Story", 5.0, 10),
                ],
                &profile,
            )
            .await
            .unwrap();
        assert_eq!(decision.selected.unwrap().kind(), &ContentKind::Text);
    }

    struct FakeJudge(String);

    #[async_trait::async_trait]
    impl Judge for FakeJudge {
        async fn evaluate(&self, _prompt: String) -> String {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn llm_tie_break_overrides_deterministic_winner_when_parse_succeeds() {
        let judge = Arc::new(FakeJudge(
            "WINNER: 1\nWINNER_SCORE: 9.0\nREASONING: the music fits the mood better".to_string(),
        ));
        let policy = SelectionPolicy::new().with_judge(judge);
        let wp = waypoint("Plainville");
        let profile = Profile::default();
        let decision = policy
            .decide(
                &wp,
                vec![
                    candidate(ContentKind::Text, "Plain Story", 5.0, 100),
                    candidate(ContentKind::Music, "Plain Track", 5.0, 100),
                ],
                &profile,
            )
            .await
            .unwrap();
        assert_eq!(decision.selected.unwrap().kind(), &ContentKind::Music);
        assert!(decision.reasoning.contains("mood"));
    }

    #[tokio::test]
    async fn llm_tie_break_falls_back_to_deterministic_on_parse_failure() {
        let judge = Arc::new(FakeJudge("not a structured response".to_string()));
        let policy = SelectionPolicy::new().with_judge(judge);
        let wp = waypoint("Plainville");
        let profile = Profile::default();
        let decision = policy
            .decide(
                &wp,
                vec![
                    candidate(ContentKind::Text, "Plain Story", 6.0, 100),
                    candidate(ContentKind::Music, "Plain Track", 5.0, 100),
                ],
                &profile,
            )
            .await
            .unwrap();
        assert_eq!(decision.selected.unwrap().kind(), &ContentKind::Text);
    }

    #[tokio::test]
    async fn empty_candidates_is_an_error() {
        let policy = SelectionPolicy::new();
        let wp = waypoint("Nowhere");
        let err = policy.decide(&wp, vec![], &Profile::default()).await.unwrap_err();
        assert_eq!(err, SelectionError::NoCandidates);
    }

    #[test]
    fn age_bracket_eq_compiles() {
        assert_eq!(AgeBracket::Child, AgeBracket::Child);
    }
}
