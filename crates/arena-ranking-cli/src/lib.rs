//! Command surface for the arena leaderboard.
//!
//! Hosts can embed the same behavior through:
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_arena`] for executing a [`Command`] against an existing [`Arena`].
//! - [`run_benchmark`] for the benchmark command group.
//!
//! Leaderboard JSON output follows `contracts/leaderboard/v1`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arena_ranking_core::{
    format_rfc3339, parse_rfc3339_utc, ChallengeCatalog, ChallengeSummary, Difficulty,
    RankingConfig, StaticChallengeCatalog, SubmissionInput, SubmissionRecord,
    DEFAULT_MAX_ENTRIES,
};
use arena_ranking_store::{
    Arena, BenchmarkConfig, BenchmarkReport, BenchmarkThresholds, RankingStore, SteppingClock,
    StoreStats, SubmissionPolicy,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const LEADERBOARD_CONTRACT_VERSION: &str = "leaderboard.v1";

#[derive(Debug, Parser)]
#[command(name = "arena")]
#[command(about = "Coding arena leaderboard CLI")]
pub struct Cli {
    /// JSON array of challenges; the built-in catalog is used when omitted.
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[arg(long, env = "ARENA_MAX_ENTRIES", default_value_t = DEFAULT_MAX_ENTRIES)]
    max_entries: usize,

    /// Reject out-of-range submissions instead of ranking them as given.
    #[arg(long)]
    strict: bool,

    /// Stamp submissions one second apart starting at this RFC3339 instant.
    #[arg(long)]
    clock_origin: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Challenges {
        #[command(subcommand)]
        command: ChallengesCommand,
    },
    /// Submit one result and print the challenge board. Without `--strict`,
    /// non-finite scores or runtimes print as `null` in JSON output.
    Submit(SubmitArgs),
    /// Apply a JSON array of submissions in order and print the board.
    /// Non-finite values print as `null` in JSON output.
    Replay(ReplayArgs),
    Benchmark {
        #[command(subcommand)]
        command: BenchmarkCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ChallengesCommand {
    List(ChallengesListArgs),
    Show(ChallengesShowArgs),
}

#[derive(Debug, Args)]
pub struct ChallengesListArgs {
    #[arg(long)]
    difficulty: Option<DifficultyArg>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct ChallengesShowArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    #[arg(long)]
    challenge_id: String,
    #[arg(long)]
    handle: String,
    #[arg(long, allow_negative_numbers = true)]
    score: f64,
    #[arg(long)]
    tests_passed: u32,
    #[arg(long)]
    total_tests: u32,
    #[arg(long, allow_negative_numbers = true)]
    runtime_ms: f64,
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// JSON array of submissions, applied in order.
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    challenge_id: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum BenchmarkCommand {
    Run(BenchmarkRunArgs),
}

#[derive(Debug, Args)]
pub struct BenchmarkRunArgs {
    #[arg(long = "volume")]
    volumes: Vec<usize>,
    #[arg(long, default_value_t = 3)]
    repetitions: usize,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    json: bool,
    #[arg(long, allow_negative_numbers = true)]
    insert_p95_max_ms: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    query_p95_max_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DifficultyArg {
    Easy,
    Medium,
    Hard,
}

/// One line of a replay file: a graded submission and the challenge it targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySubmission {
    pub challenge_id: String,
    #[serde(flatten)]
    pub input: SubmissionInput,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardJsonPayload {
    contract_version: String,
    challenge_id: Option<String>,
    entries: Vec<SubmissionRecord>,
    stats: StoreStats,
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when configuration or catalog loading fails, or when the
/// requested command fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let config = RankingConfig {
        max_entries: cli.max_entries,
    };
    config.validate()?;

    match cli.command {
        Command::Benchmark { command } => run_benchmark(command, &config),
        command => {
            let catalog = load_catalog(cli.catalog.as_deref())?;
            let store = match cli.clock_origin.as_deref() {
                Some(raw) => {
                    let origin = parse_rfc3339_utc(raw)
                        .map_err(|err| anyhow!("invalid --clock-origin value: {err}"))?;
                    RankingStore::with_clock(
                        config,
                        Arc::new(SteppingClock::new(origin, time::Duration::seconds(1))),
                    )?
                }
                None => RankingStore::new(config)?,
            };
            let policy = if cli.strict {
                SubmissionPolicy::Strict
            } else {
                SubmissionPolicy::Permissive
            };
            let arena = Arena::new(catalog, Arc::new(store)).with_policy(policy);
            run_arena(command, &arena)
        }
    }
}

/// Executes a parsed command against an existing arena.
///
/// # Errors
/// Returns an error when a challenge cannot be resolved, a submission is
/// rejected, or input files cannot be read.
pub fn run_arena<C: ChallengeCatalog>(command: Command, arena: &Arena<C>) -> Result<()> {
    match command {
        Command::Challenges { command } => run_challenges(command, arena),
        Command::Submit(args) => {
            let input = SubmissionInput {
                handle: args.handle,
                score: args.score,
                tests_passed: args.tests_passed,
                total_tests: args.total_tests,
                runtime_ms: args.runtime_ms,
            };
            let entries = arena.submit(&args.challenge_id, input)?;
            let payload = build_leaderboard_json_payload(None, entries, arena.store().stats());
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Command::Replay(args) => {
            let submissions = read_replay_file(&args.input)?;
            for (index, submission) in submissions.into_iter().enumerate() {
                let challenge_id = submission.challenge_id;
                arena
                    .submit(&challenge_id, submission.input)
                    .with_context(|| {
                        format!("replay entry {index} for challenge {challenge_id} rejected")
                    })?;
            }

            let stats = arena.store().stats();
            info!(
                inserted = stats.inserted_total,
                evicted = stats.evicted_total,
                retained = stats.retained,
                "replay finished"
            );

            let entries = arena.leaderboard(args.challenge_id.as_deref());
            if args.json {
                let payload = build_leaderboard_json_payload(args.challenge_id, entries, stats);
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_leaderboard_table(args.challenge_id.as_deref(), &entries, &stats)?;
            }
            Ok(())
        }
        Command::Benchmark { .. } => Err(anyhow!(
            "internal dispatch error: benchmark should be handled before arena initialization"
        )),
    }
}

fn run_challenges<C: ChallengeCatalog>(command: ChallengesCommand, arena: &Arena<C>) -> Result<()> {
    match command {
        ChallengesCommand::List(args) => {
            let wanted = args.difficulty.map(map_difficulty);
            let summaries = arena
                .challenge_summaries()
                .into_iter()
                .filter(|summary| wanted.is_none() || wanted == Some(summary.difficulty))
                .collect::<Vec<_>>();

            if args.json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                print_challenge_table(&summaries);
            }
            Ok(())
        }
        ChallengesCommand::Show(args) => {
            let Some(challenge) = arena.lookup_challenge_summary(&args.id) else {
                return Err(anyhow!("challenge not found: {}", args.id));
            };
            println!("{}", serde_json::to_string_pretty(&challenge)?);
            Ok(())
        }
    }
}

/// Runs the benchmark command group and optional threshold enforcement.
///
/// # Errors
/// Returns an error when argument combinations are invalid, benchmark execution
/// fails, artifact write fails, or thresholds are violated.
pub fn run_benchmark(command: BenchmarkCommand, config: &RankingConfig) -> Result<()> {
    match command {
        BenchmarkCommand::Run(args) => {
            let volumes = if args.volumes.is_empty() {
                vec![100, 1_000, 10_000]
            } else {
                args.volumes
            };

            let thresholds = match (args.insert_p95_max_ms, args.query_p95_max_ms) {
                (Some(insert), Some(query)) => Some(BenchmarkThresholds {
                    insert_p95_ms_max: insert,
                    query_p95_ms_max: query,
                }),
                (None, None) => None,
                _ => {
                    return Err(anyhow!(
                        "benchmark thresholds require both --insert-p95-max-ms and --query-p95-max-ms"
                    ))
                }
            };

            let report = arena_ranking_store::run_benchmark(
                &BenchmarkConfig {
                    volumes,
                    repetitions: args.repetitions,
                },
                config,
                thresholds,
            )?;

            if let Some(path) = args.output {
                let serialized = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, serialized).with_context(|| {
                    format!("failed writing benchmark report to {}", path.display())
                })?;
            }

            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_benchmark_report(&report);
            }

            if !report.within_thresholds {
                return Err(anyhow!(
                    "benchmark thresholds violated: {}",
                    report.violations.join("; ")
                ));
            }
            Ok(())
        }
    }
}

fn load_catalog(path: Option<&Path>) -> Result<StaticChallengeCatalog> {
    let Some(path) = path else {
        return Ok(StaticChallengeCatalog::builtin());
    };

    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading catalog {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&body)
        .with_context(|| format!("catalog {} must be valid JSON", path.display()))?;
    Ok(StaticChallengeCatalog::from_json(&value)?)
}

fn read_replay_file(path: &Path) -> Result<Vec<ReplaySubmission>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading replay input {}", path.display()))?;
    parse_replay_json(&body).with_context(|| format!("invalid replay input {}", path.display()))
}

fn parse_replay_json(raw: &str) -> Result<Vec<ReplaySubmission>> {
    serde_json::from_str(raw).context("replay input must be a JSON array of submissions")
}

fn map_difficulty(value: DifficultyArg) -> Difficulty {
    match value {
        DifficultyArg::Easy => Difficulty::Easy,
        DifficultyArg::Medium => Difficulty::Medium,
        DifficultyArg::Hard => Difficulty::Hard,
    }
}

fn build_leaderboard_json_payload(
    challenge_id: Option<String>,
    entries: Vec<SubmissionRecord>,
    stats: StoreStats,
) -> LeaderboardJsonPayload {
    LeaderboardJsonPayload {
        contract_version: LEADERBOARD_CONTRACT_VERSION.to_string(),
        challenge_id,
        entries,
        stats,
    }
}

fn print_challenge_table(summaries: &[ChallengeSummary]) {
    println!("{:<24} {:<8} title", "id", "level");
    println!("{}", "-".repeat(80));
    for summary in summaries {
        println!(
            "{:<24} {:<8} {}",
            summary.id,
            summary.difficulty.as_str(),
            summary.title
        );
    }
}

fn print_leaderboard_table(
    challenge_id: Option<&str>,
    entries: &[SubmissionRecord],
    stats: &StoreStats,
) -> Result<()> {
    println!(
        "leaderboard={} retained={}/{} inserted_total={} evicted_total={}",
        challenge_id.unwrap_or("global"),
        stats.retained,
        stats.capacity,
        stats.inserted_total,
        stats.evicted_total
    );
    println!(
        "{:<5} {:<16} {:<20} {:<10} {:<12} {:<7} submitted_at",
        "rank", "handle", "challenge", "score", "runtime_ms", "tests"
    );
    println!("{}", "-".repeat(100));

    for (index, record) in entries.iter().enumerate() {
        let tests = format!("{}/{}", record.tests_passed, record.total_tests);
        println!(
            "{:<5} {:<16} {:<20} {:<10.2} {:<12.2} {:<7} {}",
            index + 1,
            record.handle,
            record.challenge_id,
            record.score,
            record.runtime_ms,
            tests,
            format_rfc3339(record.submitted_at)?
        );
    }
    Ok(())
}

fn print_benchmark_report(report: &BenchmarkReport) {
    println!(
        "contract={} generated_at={} max_entries={} repetitions={} within_thresholds={}",
        report.contract_version,
        report.generated_at,
        report.max_entries,
        report.repetitions,
        if report.within_thresholds {
            "yes"
        } else {
            "no"
        }
    );
    println!(
        "{:<12} {:<12} {:<12} {:<12} {:<12}",
        "submissions", "insert_p50", "insert_p95", "query_p50", "query_p95"
    );
    println!("{}", "-".repeat(64));
    for item in &report.volumes {
        println!(
            "{:<12} {:<12.4} {:<12.4} {:<12.4} {:<12.4}",
            item.submission_count,
            item.insert_p50_ms,
            item.insert_p95_ms,
            item.query_p50_ms,
            item.query_p95_ms
        );
    }

    if !report.violations.is_empty() {
        println!("violations={}", report.violations.join(" | "));
    }
}
