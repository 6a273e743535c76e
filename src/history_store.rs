use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, params};
use tracing::{info, warn};

use crate::candidate::{JackpotCandidate, PickCandidate};
use crate::games::{Game, GameKind, Session};
use crate::history::{BallTables, DigitTable, FeatureSnapshot, JackpotDraw};
use crate::overlay::OverlayTables;

pub const DB_ENV: &str = "DRAWKIT_DB";
const CACHE_DIR: &str = "draw_kit";
const DB_FILE: &str = "draws.sqlite";

/// One stored draw result. `value` is the digit string for pick games and the
/// dash-joined main numbers for jackpot games.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDraw {
    pub game: Game,
    pub date: NaiveDate,
    pub session: Option<Session>,
    pub value: String,
    pub bonus: Option<u8>,
}

impl StoredDraw {
    pub fn jackpot_draw(&self) -> Option<JackpotDraw> {
        let main = self
            .value
            .split('-')
            .map(|n| n.trim().parse::<u8>().ok())
            .collect::<Option<Vec<_>>>()?;
        Some(JackpotDraw {
            date: self.date,
            main,
            bonus: self.bonus,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub db_path: PathBuf,
    pub lines: usize,
    pub upserted: usize,
    pub skipped: usize,
    pub per_game: BTreeMap<String, usize>,
    pub errors: Vec<String>,
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

/// `DRAWKIT_DB`, else the cache directory.
pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(DB_ENV)
        && !raw.trim().is_empty()
    {
        return Some(PathBuf::from(raw));
    }
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS draws (
            game TEXT NOT NULL,
            draw_date TEXT NOT NULL,
            session TEXT NOT NULL DEFAULT '',
            value TEXT NOT NULL,
            bonus INTEGER NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (game, draw_date, session)
        );
        CREATE INDEX IF NOT EXISTS idx_draws_game_date ON draws(game, draw_date);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Parses `game,date,session,numbers[,bonus]`. Pick numbers are a digit
/// string; jackpot numbers are five dash-separated values.
pub fn parse_draw_line(line: &str) -> Result<StoredDraw> {
    let cols = line.split(',').map(str::trim).collect::<Vec<_>>();
    if cols.len() < 4 {
        return Err(anyhow!("expected at least 4 columns, got {}", cols.len()));
    }
    let game = Game::parse(cols[0]).ok_or_else(|| anyhow!("unknown game {:?}", cols[0]))?;
    let date = NaiveDate::parse_from_str(cols[1], "%Y-%m-%d")
        .with_context(|| format!("bad date {:?}", cols[1]))?;
    let session = match cols[2].to_ascii_uppercase().as_str() {
        "" | "-" => None,
        "MIDDAY" => Some(Session::Midday),
        "EVENING" => Some(Session::Evening),
        "NIGHT" => Some(Session::Night),
        other => return Err(anyhow!("unknown session {other:?}")),
    };
    let bonus = match cols.get(4).copied().filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<u8>().with_context(|| format!("bad bonus {raw:?}"))?),
        None => None,
    };

    let value = match (game.pick_arity(), game.jackpot_rules()) {
        (Some(arity), _) => PickCandidate::parse(cols[3], arity)?.value().to_string(),
        (None, Some(rules)) => {
            let main = cols[3]
                .split(['-', ' '])
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<u8>().with_context(|| format!("bad number {s:?}")))
                .collect::<Result<Vec<_>>>()?;
            let bonus_vec = bonus.into_iter().collect::<Vec<_>>();
            JackpotCandidate::new(&main, &bonus_vec, &rules)?
                .main_numbers()
                .iter()
                .map(|n| format!("{n:02}"))
                .collect::<Vec<_>>()
                .join("-")
        }
        (None, None) => return Err(anyhow!("unsupported game {game}")),
    };
    Ok(StoredDraw {
        game,
        date,
        session,
        value,
        bonus,
    })
}

pub fn upsert_draws(conn: &mut Connection, draws: &[StoredDraw]) -> Result<usize> {
    let updated_at = Utc::now().to_rfc3339();
    let tx = conn.transaction().context("begin ingest transaction")?;
    for d in draws {
        tx.execute(
            r#"
            INSERT INTO draws (game, draw_date, session, value, bonus, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(game, draw_date, session) DO UPDATE SET
                value = excluded.value,
                bonus = excluded.bonus,
                updated_at = excluded.updated_at
            "#,
            params![
                d.game.code(),
                d.date.format("%Y-%m-%d").to_string(),
                d.session.map(Session::label).unwrap_or(""),
                d.value,
                d.bonus.map(i64::from),
                updated_at
            ],
        )
        .context("upsert draw")?;
    }
    tx.commit().context("commit ingest transaction")?;
    Ok(draws.len())
}

/// Parses a CSV body (optional header) and stores every valid line.
pub fn ingest_csv(conn: &mut Connection, db_path: PathBuf, body: &str) -> Result<IngestSummary> {
    let mut summary = IngestSummary {
        db_path,
        ..IngestSummary::default()
    };
    let mut draws = Vec::new();
    for (idx, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || (idx == 0 && line.starts_with("game")) {
            continue;
        }
        summary.lines += 1;
        match parse_draw_line(line) {
            Ok(draw) => {
                *summary.per_game.entry(draw.game.code().to_string()).or_insert(0) += 1;
                draws.push(draw);
            }
            Err(err) => {
                summary.skipped += 1;
                summary.errors.push(format!("line {}: {err:#}", idx + 1));
            }
        }
    }
    summary.upserted = upsert_draws(conn, &draws)?;
    info!(
        upserted = summary.upserted,
        skipped = summary.skipped,
        "draw ingest complete"
    );
    Ok(summary)
}

/// Draws for one game on or before `until`, oldest first.
pub fn load_draws(conn: &Connection, game: Game, until: NaiveDate) -> Result<Vec<StoredDraw>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT draw_date, session, value, bonus
            FROM draws
            WHERE game = ?1 AND draw_date <= ?2
            ORDER BY draw_date ASC, session ASC
            "#,
        )
        .context("prepare load draws query")?;
    let rows = stmt
        .query_map(
            params![game.code(), until.format("%Y-%m-%d").to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            },
        )
        .context("query load draws")?;

    let mut out = Vec::new();
    for row in rows {
        let (date, session, value, bonus) = row.context("decode draw row")?;
        let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
            warn!(%date, game = %game, "skipping stored draw with bad date");
            continue;
        };
        let session = match session.as_str() {
            "MIDDAY" => Some(Session::Midday),
            "EVENING" => Some(Session::Evening),
            "NIGHT" => Some(Session::Night),
            _ => None,
        };
        out.push(StoredDraw {
            game,
            date,
            session,
            value,
            bonus: bonus.and_then(|b| u8::try_from(b).ok()),
        });
    }
    Ok(out)
}

/// Builds the feature snapshot as it stood on `as_of`.
pub fn build_snapshot(conn: &Connection, as_of: NaiveDate, overlays: OverlayTables) -> Result<FeatureSnapshot> {
    let mut snap = FeatureSnapshot::empty(as_of).with_overlays(overlays);
    for game in crate::games::SUPPORTED_GAMES {
        let draws = load_draws(conn, game, as_of)?;
        if draws.is_empty() {
            continue;
        }
        match game.kind() {
            GameKind::Pick => {
                let values = draws.iter().map(|d| d.value.as_str()).collect::<Vec<_>>();
                snap = snap.with_digit_table(game, DigitTable::from_draws(&values));
            }
            GameKind::Jackpot => {
                let Some(rules) = game.jackpot_rules() else {
                    continue;
                };
                let parsed = draws
                    .iter()
                    .filter_map(StoredDraw::jackpot_draw)
                    .collect::<Vec<_>>();
                snap = snap.with_ball_tables(game, BallTables::from_draws(&parsed, &rules, as_of));
            }
        }
    }
    Ok(snap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_pick_and_jackpot_lines() {
        let pick = parse_draw_line("Cash3,2025-03-14,evening,072").unwrap();
        assert_eq!(pick.value, "072");
        assert_eq!(pick.session, Some(Session::Evening));

        let mm = parse_draw_line("MM,2025-03-14,,50-5-23-12-45,10").unwrap();
        assert_eq!(mm.value, "05-12-23-45-50");
        assert_eq!(mm.bonus, Some(10));
        assert_eq!(mm.jackpot_draw().unwrap().main, vec![5, 12, 23, 45, 50]);

        assert!(parse_draw_line("Cash3,2025-03-14,,07").is_err());
        assert!(parse_draw_line("MM,2025-03-14,,5-5-23-12-45,10").is_err());
        assert!(parse_draw_line("Keno,2025-03-14,,1").is_err());
    }

    #[test]
    fn ingest_then_build_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draws.sqlite");
        let mut conn = open_db(&path).unwrap();
        let body = "game,date,session,numbers,bonus\n\
                    Cash3,2025-03-01,MIDDAY,123\n\
                    Cash3,2025-03-01,EVENING,456\n\
                    Cash3,2025-03-20,MIDDAY,999\n\
                    Powerball,2025-03-02,,1-2-3-4-5,6\n\
                    Powerball,2025-03-02,,bad\n";
        let summary = ingest_csv(&mut conn, path.clone(), body).unwrap();
        assert_eq!(summary.lines, 5);
        assert_eq!(summary.upserted, 4);
        assert_eq!(summary.skipped, 1);

        // re-ingesting the same rows updates in place
        ingest_csv(&mut conn, path, body).unwrap();
        assert_eq!(load_draws(&conn, Game::Cash3, d(2025, 12, 31)).unwrap().len(), 3);

        let snap = build_snapshot(&conn, d(2025, 3, 10), OverlayTables::default()).unwrap();
        let digits = snap.digit_table(Game::Cash3).unwrap();
        assert_eq!(digits.draws, 2);
        assert_eq!(digits.counts[9], 0);
        assert_eq!(snap.ball_tables(Game::Powerball).unwrap().draw_count, 1);
        assert!(snap.ball_tables(Game::MegaMillions).is_none());
    }
}
