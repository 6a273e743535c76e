use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use draw_kit::history_store;
use draw_kit::logging;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env");
    logging::init(false);

    let csv_path = std::env::args()
        .skip(1)
        .find(|a| !a.starts_with("--") && a.ends_with(".csv"))
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("usage: draw_ingest <draws.csv> [--db <path>]"))?;

    let db_path = parse_db_path_arg()
        .or_else(history_store::default_db_path)
        .context("unable to resolve sqlite path")?;

    let body = fs::read_to_string(&csv_path)
        .with_context(|| format!("read {}", csv_path.display()))?;
    let mut conn = history_store::open_db(&db_path)?;
    let summary = history_store::ingest_csv(&mut conn, db_path, &body)?;

    println!("Draw ingest complete");
    println!("DB: {}", summary.db_path.display());
    println!("Lines: {}", summary.lines);
    println!("Draws upserted: {}", summary.upserted);
    for (game, n) in &summary.per_game {
        println!("  {game}: {n}");
    }
    if !summary.errors.is_empty() {
        println!("Skipped: {}", summary.skipped);
        for err in summary.errors.iter().take(6) {
            println!("   - {err}");
        }
    }
    Ok(())
}

fn parse_db_path_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--db=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--db" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
