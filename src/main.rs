use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate};
use tracing::info;

use draw_kit::config::EngineConfig;
use draw_kit::export;
use draw_kit::games::Session;
use draw_kit::history::FeatureSnapshot;
use draw_kit::history_store;
use draw_kit::logging;
use draw_kit::overlay::OverlayTables;
use draw_kit::pipeline::{DrawRequest, Engine, requests_for};
use draw_kit::subscriber::SubscriberProfile;

const HISTORY_ENV: &str = "DRAWKIT_HISTORY";
const DEFAULT_OUT: &str = "plays.json";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    logging::init(has_flag("--verbose"));

    let date = match arg_value("--date") {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .with_context(|| format!("bad --date {raw:?}"))?,
        None => Local::now().date_naive(),
    };

    let subscribers_path = arg_value("--subscribers")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("--subscribers <file.json> is required"))?;
    let profiles: Vec<SubscriberProfile> = read_json(&subscribers_path)?;

    let requests: Vec<DrawRequest> = match arg_value("--requests") {
        Some(path) => read_json(Path::new(&path))?,
        None => requests_for(&profiles, date, &parse_sessions()),
    };

    let config = EngineConfig::resolve(arg_value("--config").map(PathBuf::from))?;
    let snapshot = load_snapshot(date)?;
    let engine = Engine::new(config, snapshot).context("engine configuration rejected")?;
    info!(covered = ?engine.covered_games(), "history coverage");

    let batch = engine.run_batch(&profiles, &requests)?;
    let rows = export::batch_rows(&batch);

    let out = arg_value("--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT));
    export::write_json(&out, &rows)?;
    if let Some(xlsx) = arg_value("--xlsx") {
        export::write_xlsx(Path::new(&xlsx), &batch)?;
        println!("Workbook: {xlsx}");
    }

    println!("Draw kit run complete");
    println!("Date: {date}");
    println!("Units: {} -> rows: {}", batch.units.len(), rows.len());
    let surfaced = batch.units.iter().map(|u| u.surfaced().count()).sum::<usize>();
    println!("Surfaced plays: {surfaced}");
    println!("Output: {}", out.display());
    for report in batch.reports.values() {
        print!("{report}");
    }
    let with_issues = batch.units.iter().filter(|u| !u.issues.is_empty()).count();
    if with_issues > 0 {
        println!("Units with issues: {with_issues}");
    }
    Ok(())
}

/// `--history` JSON bundle, else `--db` / `DRAWKIT_DB` sqlite store, else empty.
fn load_snapshot(date: NaiveDate) -> Result<FeatureSnapshot> {
    let history = arg_value("--history").or_else(|| {
        std::env::var(HISTORY_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
    });
    if let Some(path) = history {
        return FeatureSnapshot::load(Path::new(&path), date);
    }

    let db = arg_value("--db")
        .map(PathBuf::from)
        .or_else(history_store::default_db_path);
    let Some(db) = db.filter(|p| p.exists()) else {
        info!("no history source found; running with an empty snapshot");
        return Ok(FeatureSnapshot::empty(date));
    };
    let overlays = match arg_value("--overlays") {
        Some(path) => read_json::<OverlayTables>(Path::new(&path))?,
        None => OverlayTables::default(),
    };
    let conn = history_store::open_db(&db)?;
    history_store::build_snapshot(&conn, date, overlays)
}

fn parse_sessions() -> Vec<Session> {
    let Some(raw) = arg_value("--sessions") else {
        return vec![Session::Midday, Session::Evening];
    };
    raw.split(',')
        .filter_map(|s| match s.trim().to_ascii_uppercase().as_str() {
            "MIDDAY" => Some(Session::Midday),
            "EVENING" => Some(Session::Evening),
            "NIGHT" => Some(Session::Night),
            _ => None,
        })
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|a| a == name)
}

fn arg_value(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
