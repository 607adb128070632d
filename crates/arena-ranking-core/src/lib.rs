use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, UtcOffset};
use ulid::Ulid;

/// Number of records the arena keeps across all challenges combined.
pub const DEFAULT_MAX_ENTRIES: usize = 20;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RankingError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("challenge not found: {0}")]
    ChallengeNotFound(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct SubmissionId(pub Ulid);

impl SubmissionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubmissionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Challenge {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub description: String,
}

impl Challenge {
    #[must_use]
    pub fn to_summary(&self) -> ChallengeSummary {
        ChallengeSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            difficulty: self.difficulty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ChallengeSummary {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
}

/// Graded result handed over by the submission source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionInput {
    pub handle: String,
    pub score: f64,
    pub tests_passed: u32,
    pub total_tests: u32,
    pub runtime_ms: f64,
}

impl SubmissionInput {
    /// Checks the input against the stricter arena submission policy.
    ///
    /// The ranking store itself accepts any value; this is only consulted by
    /// validating adapters in front of it.
    ///
    /// # Errors
    /// Returns [`RankingError::Validation`] when a field is out of range.
    pub fn validate(&self) -> Result<(), RankingError> {
        if self.handle.trim().is_empty() {
            return Err(RankingError::Validation(
                "handle MUST be provided for every submission".to_string(),
            ));
        }

        if !self.score.is_finite() || self.score < 0.0 {
            return Err(RankingError::Validation(
                "score MUST be a finite value >= 0".to_string(),
            ));
        }

        if !self.runtime_ms.is_finite() || self.runtime_ms < 0.0 {
            return Err(RankingError::Validation(
                "runtime_ms MUST be a finite value >= 0".to_string(),
            ));
        }

        if self.tests_passed > self.total_tests {
            return Err(RankingError::Validation(
                "tests_passed MUST be <= total_tests".to_string(),
            ));
        }

        Ok(())
    }
}

/// A ranked submission as stored and reported.
///
/// `score` and `runtime_ms` are stored as given when input is not validated.
/// JSON has no NaN or infinity, so non-finite values serialize as `null` and
/// do not survive a round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub challenge_id: String,
    pub challenge_title: String,
    pub handle: String,
    pub score: f64,
    pub tests_passed: u32,
    pub total_tests: u32,
    pub runtime_ms: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

impl SubmissionRecord {
    /// Builds a record, snapshotting the challenge title as it is right now.
    #[must_use]
    pub fn new(
        id: SubmissionId,
        challenge: &Challenge,
        input: SubmissionInput,
        submitted_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            challenge_id: challenge.id.clone(),
            challenge_title: challenge.title.clone(),
            handle: input.handle,
            score: input.score,
            tests_passed: input.tests_passed,
            total_tests: input.total_tests,
            runtime_ms: input.runtime_ms,
            submitted_at,
        }
    }
}

/// Canonical leaderboard order: score descending, then runtime ascending,
/// then submission time ascending. `Less` means `lhs` ranks above `rhs`.
///
/// NaN in either numeric key ranks below every real value, so the order stays
/// total for unvalidated input.
#[must_use]
pub fn compare_ranked(lhs: &SubmissionRecord, rhs: &SubmissionRecord) -> Ordering {
    higher_first(lhs.score, rhs.score)
        .then_with(|| lower_first(lhs.runtime_ms, rhs.runtime_ms))
        .then_with(|| lhs.submitted_at.cmp(&rhs.submitted_at))
}

fn higher_first(lhs: f64, rhs: f64) -> Ordering {
    match (lhs.is_nan(), rhs.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => rhs.partial_cmp(&lhs).unwrap_or(Ordering::Equal),
    }
}

fn lower_first(lhs: f64, rhs: f64) -> Ordering {
    match (lhs.is_nan(), rhs.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RankingConfig {
    pub max_entries: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl RankingConfig {
    /// Validates the retention bound.
    ///
    /// # Errors
    /// Returns [`RankingError::Configuration`] when `max_entries` is zero.
    pub fn validate(&self) -> Result<(), RankingError> {
        if self.max_entries == 0 {
            return Err(RankingError::Configuration(
                "max_entries MUST be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Decodes and validates a ranking config from JSON.
    ///
    /// # Errors
    /// Returns [`RankingError::Configuration`] when JSON decoding fails
    /// or decoded values violate config constraints.
    pub fn from_json(value: &Value) -> Result<Self, RankingError> {
        let config: Self = serde_json::from_value(value.clone()).map_err(|err| {
            RankingError::Configuration(format!("invalid ranking config JSON payload: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Read-only lookup of the challenges submissions can be ranked against.
pub trait ChallengeCatalog: Send + Sync {
    fn get_challenge_by_id(&self, id: &str) -> Option<Challenge>;

    fn challenge_summaries(&self) -> Vec<ChallengeSummary>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticChallengeCatalog {
    challenges: BTreeMap<String, Challenge>,
}

impl StaticChallengeCatalog {
    /// Builds a catalog from a list of challenges.
    ///
    /// # Errors
    /// Returns [`RankingError::Configuration`] when an id is blank or
    /// appears more than once.
    pub fn new(challenges: impl IntoIterator<Item = Challenge>) -> Result<Self, RankingError> {
        let mut map = BTreeMap::new();
        for challenge in challenges {
            if challenge.id.trim().is_empty() {
                return Err(RankingError::Configuration(
                    "challenge id MUST NOT be blank".to_string(),
                ));
            }
            if map.contains_key(&challenge.id) {
                return Err(RankingError::Configuration(format!(
                    "duplicate challenge id: {}",
                    challenge.id
                )));
            }
            map.insert(challenge.id.clone(), challenge);
        }
        Ok(Self { challenges: map })
    }

    /// Decodes a JSON array of challenges.
    ///
    /// # Errors
    /// Returns [`RankingError::Configuration`] when decoding fails or the
    /// decoded challenges are rejected by [`StaticChallengeCatalog::new`].
    pub fn from_json(value: &Value) -> Result<Self, RankingError> {
        let challenges: Vec<Challenge> = serde_json::from_value(value.clone()).map_err(|err| {
            RankingError::Configuration(format!("invalid challenge catalog JSON payload: {err}"))
        })?;
        Self::new(challenges)
    }

    /// Challenges the arena ships with.
    #[must_use]
    pub fn builtin() -> Self {
        let challenges = [
            (
                "two-sum",
                "Two Sum",
                Difficulty::Easy,
                "Return the indices of the two numbers that add up to the target.",
            ),
            (
                "fizz-buzz",
                "FizzBuzz",
                Difficulty::Easy,
                "Print the numbers 1..=n replacing multiples of 3 and 5.",
            ),
            (
                "valid-parentheses",
                "Valid Parentheses",
                Difficulty::Easy,
                "Decide whether a bracket string is balanced.",
            ),
            (
                "longest-substring",
                "Longest Substring Without Repeating Characters",
                Difficulty::Medium,
                "Find the length of the longest substring with unique characters.",
            ),
            (
                "merge-intervals",
                "Merge Intervals",
                Difficulty::Medium,
                "Merge all overlapping intervals.",
            ),
            (
                "trapping-rain-water",
                "Trapping Rain Water",
                Difficulty::Hard,
                "Compute how much water an elevation map traps after rain.",
            ),
        ];

        let challenges = challenges
            .into_iter()
            .map(|(id, title, difficulty, description)| {
                (
                    id.to_string(),
                    Challenge {
                        id: id.to_string(),
                        title: title.to_string(),
                        difficulty,
                        description: description.to_string(),
                    },
                )
            })
            .collect();

        Self { challenges }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

impl ChallengeCatalog for StaticChallengeCatalog {
    fn get_challenge_by_id(&self, id: &str) -> Option<Challenge> {
        self.challenges.get(id).cloned()
    }

    fn challenge_summaries(&self) -> Vec<ChallengeSummary> {
        self.challenges.values().map(Challenge::to_summary).collect()
    }
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`RankingError::Validation`] when parsing fails or an input
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, RankingError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| RankingError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(RankingError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`RankingError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, RankingError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            RankingError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn must_some<T>(value: Option<T>) -> T {
        match value {
            Some(inner) => inner,
            None => panic!("expected Some(..), got None"),
        }
    }

    fn must_utc(value: &str) -> OffsetDateTime {
        must_ok(parse_rfc3339_utc(value))
    }

    fn fixture_challenge() -> Challenge {
        Challenge {
            id: "two-sum".to_string(),
            title: "Two Sum".to_string(),
            difficulty: Difficulty::Easy,
            description: String::new(),
        }
    }

    fn fixture_input(score: f64, runtime_ms: f64) -> SubmissionInput {
        SubmissionInput {
            handle: "ada".to_string(),
            score,
            tests_passed: 8,
            total_tests: 10,
            runtime_ms,
        }
    }

    fn fixture_record(score: f64, runtime_ms: f64, submitted_at: &str) -> SubmissionRecord {
        SubmissionRecord::new(
            SubmissionId::new(),
            &fixture_challenge(),
            fixture_input(score, runtime_ms),
            must_utc(submitted_at),
        )
    }

    #[test]
    fn higher_score_ranks_first() {
        let low = fixture_record(90.0, 10.0, "2026-02-07T12:00:00Z");
        let high = fixture_record(100.0, 50.0, "2026-02-07T12:00:01Z");

        assert_eq!(compare_ranked(&high, &low), Ordering::Less);
        assert_eq!(compare_ranked(&low, &high), Ordering::Greater);
    }

    #[test]
    fn equal_scores_fall_back_to_runtime() {
        let slow = fixture_record(100.0, 50.0, "2026-02-07T12:00:00Z");
        let fast = fixture_record(100.0, 30.0, "2026-02-07T12:00:01Z");

        assert_eq!(compare_ranked(&fast, &slow), Ordering::Less);
    }

    #[test]
    fn full_tie_on_numbers_prefers_earlier_submission() {
        let earlier = fixture_record(100.0, 30.0, "2026-02-07T12:00:00Z");
        let later = fixture_record(100.0, 30.0, "2026-02-07T12:00:00.5Z");

        assert_eq!(compare_ranked(&earlier, &later), Ordering::Less);
        assert_eq!(compare_ranked(&earlier, &earlier), Ordering::Equal);
    }

    #[test]
    fn nan_values_rank_last() {
        let nan_score = fixture_record(f64::NAN, 1.0, "2026-02-07T12:00:00Z");
        let negative = fixture_record(-5.0, 1.0, "2026-02-07T12:00:01Z");
        assert_eq!(compare_ranked(&negative, &nan_score), Ordering::Less);

        let nan_runtime = fixture_record(10.0, f64::NAN, "2026-02-07T12:00:00Z");
        let slow = fixture_record(10.0, 9_999.0, "2026-02-07T12:00:01Z");
        assert_eq!(compare_ranked(&slow, &nan_runtime), Ordering::Less);
    }

    #[test]
    fn non_finite_values_serialize_as_null() {
        let record = fixture_record(f64::NAN, f64::INFINITY, "2026-02-07T12:00:00Z");
        let value = must_ok(serde_json::to_value(&record));

        assert_eq!(value["score"], Value::Null);
        assert_eq!(value["runtimeMs"], Value::Null);
    }

    #[test]
    fn signed_zero_scores_compare_equal() {
        let negative_zero = fixture_record(-0.0, 5.0, "2026-02-07T12:00:00Z");
        let positive_zero = fixture_record(0.0, 5.0, "2026-02-07T12:00:01Z");

        assert_eq!(compare_ranked(&negative_zero, &positive_zero), Ordering::Less);
    }

    #[test]
    fn record_snapshots_challenge_title() {
        let mut challenge = fixture_challenge();
        let record = SubmissionRecord::new(
            SubmissionId::new(),
            &challenge,
            fixture_input(1.0, 1.0),
            must_utc("2026-02-07T12:00:00Z"),
        );
        challenge.title = "Renamed".to_string();

        assert_eq!(record.challenge_title, "Two Sum");
        assert_eq!(record.challenge_id, "two-sum");
    }

    #[test]
    fn record_json_uses_camel_case_and_rfc3339() {
        let id = SubmissionId(must_ok(Ulid::from_string("01J0SQQP7M70P6Y3R4T8D8G8M2")));
        let record = SubmissionRecord::new(
            id,
            &fixture_challenge(),
            fixture_input(100.0, 30.0),
            must_utc("2026-02-07T12:00:00Z"),
        );

        let value = must_ok(serde_json::to_value(&record));
        assert_eq!(
            value,
            json!({
                "id": "01J0SQQP7M70P6Y3R4T8D8G8M2",
                "challengeId": "two-sum",
                "challengeTitle": "Two Sum",
                "handle": "ada",
                "score": 100.0,
                "testsPassed": 8,
                "totalTests": 10,
                "runtimeMs": 30.0,
                "submittedAt": "2026-02-07T12:00:00Z"
            })
        );
    }

    #[test]
    fn input_validation_rejects_out_of_range_values() {
        assert!(fixture_input(100.0, 30.0).validate().is_ok());
        assert!(fixture_input(-1.0, 30.0).validate().is_err());
        assert!(fixture_input(f64::INFINITY, 30.0).validate().is_err());
        assert!(fixture_input(1.0, -0.5).validate().is_err());
        assert!(fixture_input(1.0, f64::NAN).validate().is_err());

        let mut too_many_passed = fixture_input(1.0, 1.0);
        too_many_passed.tests_passed = 11;
        assert!(too_many_passed.validate().is_err());

        let mut blank = fixture_input(1.0, 1.0);
        blank.handle = "   ".to_string();
        assert!(matches!(
            blank.validate(),
            Err(RankingError::Validation(message)) if message.contains("handle")
        ));
    }

    #[test]
    fn config_defaults_to_twenty_and_rejects_zero() {
        assert_eq!(RankingConfig::default().max_entries, 20);
        assert!(RankingConfig::default().validate().is_ok());

        let zero = RankingConfig::from_json(&json!({ "max_entries": 0 }));
        assert!(matches!(zero, Err(RankingError::Configuration(_))));

        let decoded = must_ok(RankingConfig::from_json(&json!({ "max_entries": 5 })));
        assert_eq!(decoded.max_entries, 5);
    }

    #[test]
    fn builtin_catalog_resolves_known_ids() {
        let catalog = StaticChallengeCatalog::builtin();
        let challenge = must_some(catalog.get_challenge_by_id("two-sum"));
        assert_eq!(challenge.title, "Two Sum");
        assert!(catalog.get_challenge_by_id("does-not-exist").is_none());

        let summaries = catalog.challenge_summaries();
        assert_eq!(summaries.len(), catalog.len());
        let ids = summaries.iter().map(|item| item.id.as_str()).collect::<Vec<_>>();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn catalog_json_rejects_duplicates_and_blank_ids() {
        let duplicate = StaticChallengeCatalog::from_json(&json!([
            { "id": "a", "title": "A", "difficulty": "easy" },
            { "id": "a", "title": "A again", "difficulty": "hard" }
        ]));
        assert!(matches!(duplicate, Err(RankingError::Configuration(_))));

        let blank = StaticChallengeCatalog::from_json(&json!([
            { "id": " ", "title": "Blank", "difficulty": "easy" }
        ]));
        assert!(matches!(blank, Err(RankingError::Configuration(_))));

        let catalog = must_ok(StaticChallengeCatalog::from_json(&json!([
            { "id": "a", "title": "A", "difficulty": "medium" }
        ])));
        let challenge = must_some(catalog.get_challenge_by_id("a"));
        assert_eq!(challenge.difficulty, Difficulty::Medium);
        assert!(challenge.description.is_empty());
    }

    #[test]
    fn difficulty_round_trips_through_str() {
        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            assert_eq!(Difficulty::parse(difficulty.as_str()), Some(difficulty));
        }
        assert_eq!(Difficulty::parse("extreme"), None);
    }

    #[test]
    fn parse_rfc3339_rejects_non_utc() {
        assert!(parse_rfc3339_utc("2026-02-07T12:00:00+02:00").is_err());
        let formatted = must_ok(format_rfc3339(must_utc("2026-02-07T12:00:00Z")));
        assert_eq!(formatted, "2026-02-07T12:00:00Z");
    }
}
