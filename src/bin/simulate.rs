use clap::Parser;
use log::{Level, LevelFilter};
use sector_quest_core::constants::{DEFAULT_TURN_LIMIT, HERO_ID};
use sector_quest_core::demo_map::{generate_demo_map, DemoMapOptions};
use sector_quest_core::graph::SectorGraph;
use sector_quest_core::map::{MapDescription, MapError};
use sector_quest_core::pathfinder::PathFinder;
use sector_quest_core::session::{Session, SessionOptions};
use sector_quest_core::structured_log::{self, emit_event, LogContext};
use sector_quest_core::types::{SectorId, SessionEvent, SessionSnapshot};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run headless hero-vs-enemies sessions on sector maps")]
struct Cli {
    /// Map description JSON; a seeded demo map is generated when omitted.
    #[arg(long)]
    map: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    /// Number of demo maps to play, with consecutive seeds.
    #[arg(long, default_value_t = 1)]
    runs: u32,
    #[arg(long)]
    side: Option<usize>,
    #[arg(long)]
    enemies: Option<usize>,
    /// Hero destination; defaults to the sector farthest from the start.
    #[arg(long)]
    goal: Option<SectorId>,
    #[arg(long)]
    turns: Option<u64>,
    #[arg(long)]
    vision: Option<u32>,
    #[arg(long)]
    slots: Option<usize>,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, Default)]
struct ScenarioOptions {
    goal: Option<SectorId>,
    turns: Option<u64>,
    vision: Option<u32>,
    slots: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Reached,
    Stuck,
    TurnLimit,
}

impl Outcome {
    fn key(self) -> &'static str {
        match self {
            Outcome::Reached => "reached",
            Outcome::Stuck => "stuck",
            Outcome::TurnLimit => "turn_limit",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    seed: u32,
    sectors: usize,
    start: SectorId,
    goal: SectorId,
    outcome: Outcome,
    turns: u64,
    #[serde(rename = "heroSteps")]
    hero_steps: usize,
    #[serde(rename = "keysPicked")]
    keys_picked: usize,
    #[serde(rename = "edgesUnlocked")]
    edges_unlocked: usize,
    #[serde(rename = "enemySpotted")]
    enemy_spotted: usize,
    #[serde(rename = "routeBlocked")]
    route_blocked: usize,
    #[serde(rename = "lockedEdgesStart")]
    locked_edges_start: usize,
    #[serde(rename = "lockedEdgesEnd")]
    locked_edges_end: usize,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    turn: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: i64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: i64,
    #[serde(rename = "runCount")]
    run_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageTurns")]
    average_turns: u64,
    #[serde(rename = "outcomeCounts")]
    outcome_counts: BTreeMap<String, usize>,
    runs: Vec<ScenarioResultLine>,
}

fn main() {
    let cli = Cli::parse();
    let level = structured_log::parse_level(&cli.log_level).unwrap_or(LevelFilter::Info);
    if let Err(error) = structured_log::init(level) {
        eprintln!("failed to install logger: {error}");
    }

    let base_seed = normalize_seed(cli.seed.unwrap_or_else(|| rand::random::<u32>() as u64));
    let run_started_at_ms = now_ms();
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(base_seed, run_started_at_ms));
    let run_count = if cli.map.is_some() { 1 } else { cli.runs.max(1) };
    let scenario_options = ScenarioOptions {
        goal: cli.goal,
        turns: cli.turns,
        vision: cli.vision,
        slots: cli.slots,
    };

    let mut has_anomaly = false;
    let mut results = Vec::new();
    let mut outcome_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_turns = 0u64;
    let mut total_anomalies = 0usize;

    for index in 0..run_count {
        let seed = base_seed.wrapping_add(index);
        let context = LogContext {
            run_id: Some(run_id.clone()),
            seed: Some(seed),
            turn: None,
        };
        let map = match load_or_generate(&cli, seed) {
            Ok(map) => map,
            Err(error) => fail(&context, "map_load_failed", &error.to_string()),
        };
        emit_event(
            Level::Info,
            "run_started",
            &context,
            json!({
                "sectors": map.sectors.len(),
                "keys": map.keys.len(),
                "enemies": map.enemies.len(),
                "source": cli.map.as_ref().map(|path| path.to_string_lossy().to_string()),
            }),
        );

        let run = match run_scenario(&map, seed, scenario_options) {
            Ok(run) => run,
            Err(error) => fail(&context, "map_invalid", &error.to_string()),
        };

        for anomaly in &run.anomaly_records {
            emit_event(
                Level::Warn,
                "anomaly_detected",
                &LogContext {
                    turn: Some(anomaly.turn),
                    ..context.clone()
                },
                json!({ "message": anomaly.message }),
            );
        }

        if !run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += run.anomaly_records.len();
        total_turns += run.result.turns;
        *outcome_counts
            .entry(run.result.outcome.key().to_string())
            .or_insert(0) += 1;

        emit_event(
            Level::Info,
            "run_finished",
            &LogContext {
                turn: Some(run.result.turns),
                ..context.clone()
            },
            json!({
                "outcome": run.result.outcome,
                "heroSteps": run.result.hero_steps,
                "keysPicked": run.result.keys_picked,
                "anomalyCount": run.anomaly_records.len(),
            }),
        );

        match serde_json::to_string(&run.result) {
            Ok(line) => println!("{line}"),
            Err(error) => fail(&context, "result_write_failed", &error.to_string()),
        }
        results.push(run.result);
    }

    let summary = build_run_summary(
        run_id.clone(),
        run_started_at_ms,
        now_ms(),
        results,
        outcome_counts,
        total_anomalies,
        total_turns,
    );
    let context = LogContext {
        run_id: Some(run_id),
        ..LogContext::default()
    };

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_event(
                Level::Error,
                "summary_write_failed",
                &context,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_event(
        Level::Info,
        "simulation_finished",
        &context,
        json!({
            "runCount": summary.run_count,
            "anomalyCount": summary.anomaly_count,
            "averageTurns": summary.average_turns,
            "outcomeCounts": summary.outcome_counts,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn fail(context: &LogContext, event: &str, error: &str) -> ! {
    emit_event(Level::Error, event, context, json!({ "error": error }));
    std::process::exit(2);
}

fn load_or_generate(cli: &Cli, seed: u32) -> Result<MapDescription, MapError> {
    if let Some(path) = cli.map.as_ref() {
        return MapDescription::load(path);
    }
    let defaults = DemoMapOptions::default();
    let options = DemoMapOptions {
        enemy_count: cli.enemies.unwrap_or(defaults.enemy_count),
        side: cli.side,
        ..defaults
    };
    Ok(generate_demo_map(&options, seed))
}

fn run_scenario(
    map: &MapDescription,
    seed: u32,
    options: ScenarioOptions,
) -> Result<ScenarioRunResult, MapError> {
    let defaults = SessionOptions::default();
    let mut session_options = SessionOptions {
        vision_range: options.vision.unwrap_or(defaults.vision_range),
        ..defaults
    };
    if let Some(slots) = options.slots {
        session_options.slots.slots_per_sector = slots;
    }
    let mut session = Session::from_map(map, session_options)?;
    session.drain_events();

    let start = map.hero_start;
    let goal = options
        .goal
        .unwrap_or_else(|| farthest_sector(session.graph(), start));
    let turn_limit = options.turns.unwrap_or(DEFAULT_TURN_LIMIT);
    let locked_edges_start = session.graph().locked_edge_count();

    let mut hero_steps = 0;
    let mut keys_picked = 0;
    let mut edges_unlocked = 0;
    let mut enemy_spotted = 0;
    let mut route_blocked = 0;
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();

    let outcome = loop {
        if session.unit_sector(HERO_ID) == Some(goal) {
            break Outcome::Reached;
        }
        if session.turn() >= turn_limit {
            break Outcome::TurnLimit;
        }
        if plan_hero(&mut session, goal).is_none() {
            break Outcome::Stuck;
        }

        session.advance_turn();
        let snapshot = session.snapshot(true);
        for message in collect_snapshot_anomalies(&session, &snapshot) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.turn,
                message,
            );
        }

        for event in &snapshot.events {
            match event {
                SessionEvent::UnitArrived { unit_id, .. } if *unit_id == HERO_ID => {
                    hero_steps += 1
                }
                SessionEvent::KeyPickedUp { .. } => keys_picked += 1,
                SessionEvent::EdgesRebuilt { changed } => edges_unlocked += changed.len(),
                SessionEvent::EnemySpotted { .. } => enemy_spotted += 1,
                SessionEvent::RouteBlocked { .. } => route_blocked += 1,
                _ => {}
            }
        }
    };

    Ok(ScenarioRunResult {
        result: ScenarioResultLine {
            seed,
            sectors: session.graph().len(),
            start,
            goal,
            outcome,
            turns: session.turn(),
            hero_steps,
            keys_picked,
            edges_unlocked,
            enemy_spotted,
            route_blocked,
            locked_edges_start,
            locked_edges_end: session.graph().locked_edge_count(),
            anomalies,
        },
        anomaly_records,
    })
}

/// Orders the hero toward `goal`, or toward the closest reachable key when the
/// goal is behind a locked gate. Returns the sector ordered.
fn plan_hero(session: &mut Session, goal: SectorId) -> Option<SectorId> {
    let from = session.unit_sector(HERO_ID)?;
    if session.find_path(from, goal).is_some() {
        session.order_hero_move(goal)?;
        return Some(goal);
    }
    let (_, target) = session
        .keys_on_map()
        .iter()
        .filter_map(|key| {
            session
                .find_path(from, key.sector_id)
                .map(|path| (path.len(), key.sector_id))
        })
        .min()?;
    session.order_hero_move(target)?;
    Some(target)
}

/// Sector with the largest hop distance from `start` ignoring locks; ties go
/// to the higher id.
fn farthest_sector(graph: &SectorGraph, start: SectorId) -> SectorId {
    let isochrone = PathFinder::new(graph).build_isochrone_with(
        start,
        u32::MAX,
        |id| !graph.is_blocked(id),
        |_, _| true,
    );
    isochrone
        .sectors()
        .into_iter()
        .max_by_key(|&id| (isochrone.distance(id).unwrap_or(0), id))
        .unwrap_or(start)
}

fn collect_snapshot_anomalies(session: &Session, snapshot: &SessionSnapshot) -> Vec<String> {
    let mut anomalies = session.slot_anomalies();
    if !snapshot.units.iter().any(|unit| unit.id == HERO_ID) {
        anomalies.push("hero missing from session".to_string());
    }
    for unit in &snapshot.units {
        if !session.graph().contains(unit.sector_id) {
            anomalies.push(format!(
                "unit {} stands on unknown sector {}",
                unit.id, unit.sector_id
            ));
        }
        if !unit.position.x.is_finite() || !unit.position.y.is_finite() {
            anomalies.push(format!("unit {} has non-finite position", unit.id));
        }
    }
    anomalies
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    turn: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        turn,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_run_id(seed: u32, timestamp_ms: i64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    run_id: String,
    started_at_ms: i64,
    finished_at_ms: i64,
    runs: Vec<ScenarioResultLine>,
    outcome_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_turns: u64,
) -> RunSummary {
    let run_count = runs.len();
    let average_turns = if run_count == 0 {
        0
    } else {
        total_turns / run_count as u64
    };
    RunSummary {
        run_id,
        started_at_ms,
        finished_at_ms,
        run_count,
        anomaly_count,
        average_turns,
        outcome_counts,
        runs,
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}
