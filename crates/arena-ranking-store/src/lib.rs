//! In-memory ranking store backing the coding arena leaderboard.
//!
//! The store keeps one globally ranked collection across every challenge,
//! bounded by [`RankingConfig::max_entries`]. Inserts place the new record at
//! its canonical position under a single mutex and then drop whatever falls
//! past the bound, whichever challenge it belongs to. Queries only clone or
//! filter; the collection is never left unsorted.
//!
//! Callers normally construct a [`RankingStore`] and share it through an
//! `Arc`. [`RankingStore::global`] exists for hosts that want one store per
//! process without threading it through.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use anyhow::{anyhow, Result};
use arena_ranking_core::{
    compare_ranked, format_rfc3339, now_utc, Challenge, ChallengeCatalog, ChallengeSummary,
    RankingConfig, RankingError, StaticChallengeCatalog, SubmissionId, SubmissionInput,
    SubmissionRecord,
};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info, warn};

static GLOBAL_STORE: OnceLock<Arc<RankingStore>> = OnceLock::new();

/// Source of submission instants.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        now_utc()
    }
}

/// Clock that advances by a fixed step on every read. Useful for replaying
/// a batch of submissions with distinct, reproducible instants.
#[derive(Debug)]
pub struct SteppingClock {
    origin: OffsetDateTime,
    step: Duration,
    ticks: AtomicI64,
}

impl SteppingClock {
    #[must_use]
    pub fn new(origin: OffsetDateTime, step: Duration) -> Self {
        Self {
            origin,
            step,
            ticks: AtomicI64::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> OffsetDateTime {
        let tick = self.ticks.fetch_add(1, AtomicOrdering::SeqCst);
        // Saturates at the last representable instant.
        i32::try_from(tick)
            .ok()
            .and_then(|tick| self.step.checked_mul(tick))
            .and_then(|offset| self.origin.checked_add(offset))
            .unwrap_or_else(latest_instant)
    }
}

fn latest_instant() -> OffsetDateTime {
    PrimitiveDateTime::MAX.assume_utc()
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StoreStats {
    pub retained: usize,
    pub capacity: usize,
    pub inserted_total: u64,
    pub evicted_total: u64,
    pub per_challenge: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct RankingState {
    entries: Vec<SubmissionRecord>,
    last_submitted_at: Option<OffsetDateTime>,
    inserted_total: u64,
    evicted_total: u64,
}

#[derive(Debug)]
pub struct RankingStore {
    config: RankingConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<RankingState>,
}

impl Default for RankingStore {
    fn default() -> Self {
        Self::from_parts(RankingConfig::default(), Arc::new(SystemClock))
    }
}

impl RankingStore {
    /// Creates a store reading submission instants from the system clock.
    ///
    /// # Errors
    /// Returns [`RankingError::Configuration`] when the config is invalid.
    pub fn new(config: RankingConfig) -> Result<Self, RankingError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a store with an explicit clock.
    ///
    /// # Errors
    /// Returns [`RankingError::Configuration`] when the config is invalid.
    pub fn with_clock(config: RankingConfig, clock: Arc<dyn Clock>) -> Result<Self, RankingError> {
        config.validate()?;
        Ok(Self::from_parts(config, clock))
    }

    fn from_parts(config: RankingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(RankingState::default()),
        }
    }

    /// Process-wide store with the default bound, created on first use.
    #[must_use]
    pub fn global() -> Arc<Self> {
        GLOBAL_STORE
            .get_or_init(|| {
                debug!(
                    max_entries = RankingConfig::default().max_entries,
                    "initializing process-wide ranking store"
                );
                Arc::new(Self::default())
            })
            .clone()
    }

    #[must_use]
    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.max_entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Ranks a new submission and returns the whole leaderboard afterwards.
    ///
    /// Input values are stored as given. The challenge is trusted as
    /// resolved; its title is copied into the record.
    pub fn insert(&self, challenge: &Challenge, input: SubmissionInput) -> Vec<SubmissionRecord> {
        let mut state = self.lock();

        let submitted_at = self.next_submitted_at(&mut state);
        let record = SubmissionRecord::new(SubmissionId::new(), challenge, input, submitted_at);
        let submission_id = record.id;

        // Ties on every key go after existing records, matching a stable sort
        // of the appended collection.
        let position = state
            .entries
            .partition_point(|existing| compare_ranked(existing, &record) != Ordering::Greater);
        state.entries.insert(position, record);
        state.inserted_total += 1;

        let max_entries = self.config.max_entries;
        if state.entries.len() > max_entries {
            let evicted = state.entries.split_off(max_entries);
            state.evicted_total += evicted.len() as u64;
            for item in &evicted {
                info!(
                    submission_id = %item.id,
                    challenge_id = %item.challenge_id,
                    score = item.score,
                    "evicted submission past leaderboard bound"
                );
            }
        }

        debug!(
            %submission_id,
            challenge_id = %challenge.id,
            rank = position + 1,
            retained = state.entries.len(),
            "ranked submission"
        );

        state.entries.clone()
    }

    /// Returns the global leaderboard, or the part of it that belongs to one
    /// challenge. Relative order is preserved either way.
    #[must_use]
    pub fn query(&self, challenge_id: Option<&str>) -> Vec<SubmissionRecord> {
        let state = self.lock();
        match challenge_id {
            None => state.entries.clone(),
            Some(challenge_id) => state
                .entries
                .iter()
                .filter(|record| record.challenge_id == challenge_id)
                .cloned()
                .collect(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let state = self.lock();
        let mut per_challenge = BTreeMap::new();
        for record in &state.entries {
            *per_challenge.entry(record.challenge_id.clone()).or_insert(0) += 1;
        }

        StoreStats {
            retained: state.entries.len(),
            capacity: self.config.max_entries,
            inserted_total: state.inserted_total,
            evicted_total: state.evicted_total,
            per_challenge,
        }
    }

    /// Drops every record and counter.
    pub fn reset(&self) {
        let mut state = self.lock();
        debug!(retained = state.entries.len(), "resetting ranking store");
        *state = RankingState::default();
    }

    fn next_submitted_at(&self, state: &mut RankingState) -> OffsetDateTime {
        let now = self.clock.now();
        let assigned = match state.last_submitted_at {
            Some(last) if now <= last => {
                if now < last {
                    warn!(%now, %last, "clock moved backwards; holding submission order");
                }
                // At the end of the calendar range the floor holds at `last`.
                last.checked_add(Duration::microseconds(1)).unwrap_or(last)
            }
            _ => now,
        };
        state.last_submitted_at = Some(assigned);
        assigned
    }

    fn lock(&self) -> MutexGuard<'_, RankingState> {
        // Mutations finish before anything that can panic, so a poisoned
        // guard still holds a sorted, bounded collection.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Validating front for [`RankingStore::insert`].
#[derive(Debug, Clone, Copy)]
pub struct StrictRankingStore<'a> {
    store: &'a RankingStore,
}

impl<'a> StrictRankingStore<'a> {
    #[must_use]
    pub fn new(store: &'a RankingStore) -> Self {
        Self { store }
    }

    /// Validates the input, then ranks it.
    ///
    /// # Errors
    /// Returns [`RankingError::Validation`] when the input fails
    /// [`SubmissionInput::validate`]; nothing is stored in that case.
    pub fn insert(
        &self,
        challenge: &Challenge,
        input: SubmissionInput,
    ) -> Result<Vec<SubmissionRecord>, RankingError> {
        input.validate()?;
        Ok(self.store.insert(challenge, input))
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum SubmissionPolicy {
    #[default]
    Permissive,
    Strict,
}

/// Catalog plus store: the surface request handlers talk to.
pub struct Arena<C: ChallengeCatalog> {
    catalog: C,
    store: Arc<RankingStore>,
    policy: SubmissionPolicy,
}

impl<C: ChallengeCatalog> Arena<C> {
    #[must_use]
    pub fn new(catalog: C, store: Arc<RankingStore>) -> Self {
        Self {
            catalog,
            store,
            policy: SubmissionPolicy::Permissive,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SubmissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<RankingStore> {
        &self.store
    }

    #[must_use]
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Resolves the challenge and ranks the submission against it.
    ///
    /// # Errors
    /// Returns [`RankingError::ChallengeNotFound`] for an unknown challenge id
    /// and [`RankingError::Validation`] when the strict policy rejects input.
    pub fn submit(
        &self,
        challenge_id: &str,
        input: SubmissionInput,
    ) -> Result<Vec<SubmissionRecord>, RankingError> {
        let challenge = self
            .lookup_challenge_summary(challenge_id)
            .ok_or_else(|| RankingError::ChallengeNotFound(challenge_id.to_string()))?;

        match self.policy {
            SubmissionPolicy::Permissive => Ok(self.store.insert(&challenge, input)),
            SubmissionPolicy::Strict => StrictRankingStore::new(&self.store).insert(&challenge, input),
        }
    }

    #[must_use]
    pub fn leaderboard(&self, challenge_id: Option<&str>) -> Vec<SubmissionRecord> {
        self.store.query(challenge_id)
    }

    #[must_use]
    pub fn lookup_challenge_summary(&self, challenge_id: &str) -> Option<Challenge> {
        self.catalog.get_challenge_by_id(challenge_id)
    }

    #[must_use]
    pub fn challenge_summaries(&self) -> Vec<ChallengeSummary> {
        self.catalog.challenge_summaries()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct BenchmarkThresholds {
    pub insert_p95_ms_max: f64,
    pub query_p95_ms_max: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct BenchmarkConfig {
    pub volumes: Vec<usize>,
    pub repetitions: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct BenchmarkVolumeResult {
    pub submission_count: usize,
    pub insert_p50_ms: f64,
    pub insert_p95_ms: f64,
    pub query_p50_ms: f64,
    pub query_p95_ms: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct BenchmarkReport {
    pub contract_version: String,
    pub generated_at: String,
    pub max_entries: usize,
    pub repetitions: usize,
    pub volumes: Vec<BenchmarkVolumeResult>,
    pub thresholds: Option<BenchmarkThresholds>,
    pub within_thresholds: bool,
    pub violations: Vec<String>,
}

/// Measures insert and query latency on fresh stores.
///
/// # Errors
/// Returns an error when the benchmark config is empty or the ranking
/// config is invalid.
#[allow(clippy::cast_precision_loss)]
pub fn run_benchmark(
    config: &BenchmarkConfig,
    ranking: &RankingConfig,
    thresholds: Option<BenchmarkThresholds>,
) -> Result<BenchmarkReport> {
    if config.volumes.is_empty() {
        return Err(anyhow!(
            "benchmark config must include at least one volume value"
        ));
    }
    if config.repetitions == 0 {
        return Err(anyhow!("benchmark repetitions must be >= 1"));
    }

    let catalog = StaticChallengeCatalog::builtin();
    let challenges = catalog
        .challenge_summaries()
        .iter()
        .filter_map(|summary| catalog.get_challenge_by_id(&summary.id))
        .collect::<Vec<_>>();
    if challenges.is_empty() {
        return Err(anyhow!("benchmark requires at least one challenge"));
    }

    let mut volume_results = Vec::new();

    for &submission_count in &config.volumes {
        let mut insert_samples_ms = Vec::new();
        let mut query_samples_ms = Vec::new();

        for _ in 0..config.repetitions {
            let store = RankingStore::new(ranking.clone())?;

            for index in 0..submission_count {
                let challenge = &challenges[index % challenges.len()];
                let input = SubmissionInput {
                    handle: format!("bench-{index}"),
                    score: ((index * 7_919) % 1_000) as f64 / 10.0,
                    tests_passed: u32::try_from(index % 11).unwrap_or(0),
                    total_tests: 10,
                    runtime_ms: ((index * 31) % 500) as f64,
                };

                let start = Instant::now();
                let _ = store.insert(challenge, input);
                insert_samples_ms.push(start.elapsed().as_secs_f64() * 1_000.0);
            }

            let start = Instant::now();
            let _ = store.query(None);
            query_samples_ms.push(start.elapsed().as_secs_f64() * 1_000.0);

            for challenge in &challenges {
                let start = Instant::now();
                let _ = store.query(Some(&challenge.id));
                query_samples_ms.push(start.elapsed().as_secs_f64() * 1_000.0);
            }
        }

        volume_results.push(BenchmarkVolumeResult {
            submission_count,
            insert_p50_ms: percentile(&insert_samples_ms, 0.50),
            insert_p95_ms: percentile(&insert_samples_ms, 0.95),
            query_p50_ms: percentile(&query_samples_ms, 0.50),
            query_p95_ms: percentile(&query_samples_ms, 0.95),
        });
    }

    let mut violations = Vec::new();
    if let Some(limit) = &thresholds {
        for volume in &volume_results {
            if volume.insert_p95_ms > limit.insert_p95_ms_max {
                violations.push(format!(
                    "volume={} insert_p95_ms={} exceeds max={}",
                    volume.submission_count, volume.insert_p95_ms, limit.insert_p95_ms_max
                ));
            }
            if volume.query_p95_ms > limit.query_p95_ms_max {
                violations.push(format!(
                    "volume={} query_p95_ms={} exceeds max={}",
                    volume.submission_count, volume.query_p95_ms, limit.query_p95_ms_max
                ));
            }
        }
    }

    Ok(BenchmarkReport {
        contract_version: "benchmark_report.v1".to_string(),
        generated_at: format_rfc3339(now_utc())?,
        max_entries: ranking.max_entries,
        repetitions: config.repetitions,
        volumes: volume_results,
        thresholds,
        within_thresholds: violations.is_empty(),
        violations,
    })
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn percentile(values: &[f64], percentile_rank: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = (percentile_rank * sorted.len() as f64).ceil() as usize;
    let index = position.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}
