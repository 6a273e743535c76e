use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::games::{Game, GameKind, JackpotRules};
use crate::overlay::OverlayTables;

const DUE_WEIGHT: f64 = 0.6;
const HEAT_WEIGHT: f64 = 0.4;

/// Digit occurrence counts across every position of every stored draw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitTable {
    pub draws: u32,
    pub counts: [u64; 10],
}

impl DigitTable {
    pub fn from_draws<S: AsRef<str>>(draws: &[S]) -> Self {
        let mut out = Self::default();
        for draw in draws {
            let digits = draw
                .as_ref()
                .bytes()
                .filter(u8::is_ascii_digit)
                .map(|b| usize::from(b - b'0'))
                .collect::<Vec<_>>();
            if digits.is_empty() {
                continue;
            }
            out.draws += 1;
            for d in digits {
                out.counts[d] += 1;
            }
        }
        out
    }

    /// Normalized occurrence rate of the candidate digits, capped at 1.
    pub fn frequency_score(&self, digits: &[u8]) -> f64 {
        if self.draws == 0 {
            return 0.0;
        }
        let hits = digits
            .iter()
            .map(|d| self.counts.get(usize::from(*d)).copied().unwrap_or(0))
            .sum::<u64>() as f64;
        (hits / (f64::from(self.draws) * 10.0)).min(1.0)
    }

    /// Digits ordered by count, most frequent first; ties by digit.
    pub fn hottest(&self) -> Vec<u8> {
        let mut digits = (0u8..10).collect::<Vec<_>>();
        digits.sort_by(|a, b| {
            self.counts[usize::from(*b)]
                .cmp(&self.counts[usize::from(*a)])
                .then(a.cmp(b))
        });
        digits
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallStat {
    #[serde(default)]
    pub frequency: u32,
    #[serde(default)]
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BallScore {
    pub ball: u8,
    pub frequency: u32,
    pub last_seen: Option<NaiveDate>,
    pub heat: f64,
    pub due: f64,
    pub composite: f64,
}

/// Per-ball composite scores for one jackpot game.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BallTables {
    pub draw_count: u32,
    pub main: Vec<BallScore>,
    pub bonus: Vec<BallScore>,
}

fn parse_day(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Heat/due/composite for balls `1..=max`, with recency measured from `as_of`.
fn score_balls(stats: &BTreeMap<u8, (u32, Option<NaiveDate>)>, max: u8, as_of: NaiveDate) -> Vec<BallScore> {
    let max_freq = stats.values().map(|(f, _)| *f).max().unwrap_or(0);
    let max_days = stats
        .values()
        .filter_map(|(_, seen)| *seen)
        .map(|seen| (as_of - seen).num_days().max(0))
        .max()
        .unwrap_or(0);

    (1..=max)
        .map(|ball| {
            let (frequency, last_seen) = stats.get(&ball).copied().unwrap_or((0, None));
            let heat = if max_freq > 0 {
                f64::from(frequency) / f64::from(max_freq)
            } else {
                0.0
            };
            let due = match last_seen {
                None => 1.0,
                Some(_) if max_days == 0 => 0.0,
                Some(seen) => (as_of - seen).num_days().max(0) as f64 / max_days as f64,
            };
            BallScore {
                ball,
                frequency,
                last_seen,
                heat,
                due,
                composite: DUE_WEIGHT * due + HEAT_WEIGHT * heat,
            }
        })
        .collect()
}

/// One historical jackpot draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JackpotDraw {
    pub date: NaiveDate,
    pub main: Vec<u8>,
    pub bonus: Option<u8>,
}

impl BallTables {
    pub fn from_stats(file: &StatsFile, rules: &JackpotRules, as_of: NaiveDate) -> Self {
        let convert = |raw: &BTreeMap<String, BallStat>| {
            raw.iter()
                .filter_map(|(k, v)| {
                    let ball = k.trim().parse::<u8>().ok()?;
                    Some((ball, (v.frequency, v.last_seen.as_deref().and_then(parse_day))))
                })
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            draw_count: file.draw_count,
            main: score_balls(&convert(&file.main_balls), rules.main_max, as_of),
            bonus: score_balls(&convert(&file.bonus_balls), rules.bonus_max, as_of),
        }
    }

    /// Draws after `as_of` are ignored.
    pub fn from_draws(draws: &[JackpotDraw], rules: &JackpotRules, as_of: NaiveDate) -> Self {
        let mut main = BTreeMap::<u8, (u32, Option<NaiveDate>)>::new();
        let mut bonus = BTreeMap::<u8, (u32, Option<NaiveDate>)>::new();
        let mut draw_count = 0;
        let bump = |map: &mut BTreeMap<u8, (u32, Option<NaiveDate>)>, ball: u8, date: NaiveDate| {
            let entry = map.entry(ball).or_insert((0, None));
            entry.0 += 1;
            entry.1 = Some(entry.1.map_or(date, |d| d.max(date)));
        };
        for draw in draws.iter().filter(|d| d.date <= as_of) {
            draw_count += 1;
            for ball in &draw.main {
                bump(&mut main, *ball, draw.date);
            }
            if let Some(b) = draw.bonus {
                bump(&mut bonus, b, draw.date);
            }
        }
        Self {
            draw_count,
            main: score_balls(&main, rules.main_max, as_of),
            bonus: score_balls(&bonus, rules.bonus_max, as_of),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.draw_count == 0
    }

    fn ranked(scores: &[BallScore]) -> Vec<u8> {
        let mut sorted = scores.iter().collect::<Vec<_>>();
        sorted.sort_by(|a, b| b.composite.total_cmp(&a.composite).then(a.ball.cmp(&b.ball)));
        sorted.into_iter().map(|s| s.ball).collect()
    }

    /// Main balls by composite score, best first.
    pub fn ranked_main(&self) -> Vec<u8> {
        Self::ranked(&self.main)
    }

    pub fn ranked_bonus(&self) -> Vec<u8> {
        Self::ranked(&self.bonus)
    }

    /// Upper median of the ascending composite list.
    fn median_composite(scores: &[BallScore]) -> f64 {
        let mut values = scores.iter().map(|s| s.composite).collect::<Vec<_>>();
        if values.is_empty() {
            return 0.0;
        }
        values.sort_by(f64::total_cmp);
        values[values.len() / 2]
    }

    pub fn median_main_composite(&self) -> f64 {
        Self::median_composite(&self.main)
    }

    pub fn median_bonus_composite(&self) -> f64 {
        Self::median_composite(&self.bonus)
    }
}

/// On-disk aggregate statistics for one jackpot game.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsFile {
    pub game: String,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub draw_count: u32,
    #[serde(default)]
    pub main_balls: BTreeMap<String, BallStat>,
    #[serde(default)]
    pub bonus_balls: BTreeMap<String, BallStat>,
}

/// History bundle consumed by [`FeatureSnapshot::load`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotFile {
    pub as_of: Option<NaiveDate>,
    pub pick_draws: BTreeMap<String, Vec<String>>,
    pub jackpot_stats: Vec<StatsFile>,
    pub overlays: OverlayTables,
}

/// Read-only feature context shared by every unit of a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSnapshot {
    pub as_of: Option<NaiveDate>,
    digits: BTreeMap<Game, DigitTable>,
    balls: BTreeMap<Game, BallTables>,
    overlays: OverlayTables,
}

impl FeatureSnapshot {
    pub fn empty(as_of: NaiveDate) -> Self {
        Self {
            as_of: Some(as_of),
            ..Self::default()
        }
    }

    pub fn with_digit_table(mut self, game: Game, table: DigitTable) -> Self {
        if game.kind() == GameKind::Pick {
            self.digits.insert(game, table);
        }
        self
    }

    pub fn with_ball_tables(mut self, game: Game, tables: BallTables) -> Self {
        if game.kind() == GameKind::Jackpot {
            self.balls.insert(game, tables);
        }
        self
    }

    pub fn with_overlays(mut self, overlays: OverlayTables) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn digit_table(&self, game: Game) -> Option<&DigitTable> {
        self.digits.get(&game).filter(|t| t.draws > 0)
    }

    pub fn ball_tables(&self, game: Game) -> Option<&BallTables> {
        self.balls.get(&game).filter(|t| !t.is_empty())
    }

    pub fn overlays(&self) -> &OverlayTables {
        &self.overlays
    }

    pub fn from_file(file: SnapshotFile, fallback_as_of: NaiveDate) -> Self {
        let as_of = file.as_of.unwrap_or(fallback_as_of);
        let mut snap = Self::empty(as_of).with_overlays(file.overlays);
        for (code, draws) in &file.pick_draws {
            let Some(game) = Game::parse(code) else {
                warn!(game = %code, "skipping pick history for unknown game");
                continue;
            };
            snap = snap.with_digit_table(game, DigitTable::from_draws(draws));
        }
        for stats in &file.jackpot_stats {
            let Some(game) = Game::parse(&stats.game) else {
                warn!(game = %stats.game, "skipping jackpot stats for unknown game");
                continue;
            };
            let Some(rules) = game.jackpot_rules() else {
                continue;
            };
            snap = snap.with_ball_tables(game, BallTables::from_stats(stats, &rules, as_of));
        }
        debug!(
            pick_games = snap.digits.len(),
            jackpot_games = snap.balls.len(),
            %as_of,
            "feature snapshot built"
        );
        snap
    }

    pub fn load(path: &Path, fallback_as_of: NaiveDate) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read history {}", path.display()))?;
        let file: SnapshotFile = serde_json::from_str(&raw)
            .with_context(|| format!("parse history {}", path.display()))?;
        Ok(Self::from_file(file, fallback_as_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn digit_frequency_score_normalizes_by_draws() {
        let table = DigitTable::from_draws(&["123", "345", "399", "", "x"]);
        assert_eq!(table.draws, 3);
        assert_eq!(table.counts[3], 3);
        // digit 3 appears 3 times: (3 * 3) / (3 * 10)
        assert!((table.frequency_score(&[3, 3, 3]) - 0.3).abs() < 1e-9);
        assert_eq!(table.hottest()[0], 3);
        assert_eq!(DigitTable::default().frequency_score(&[1, 2, 3]), 0.0);
    }

    #[test]
    fn never_seen_balls_are_fully_due() {
        let rules = Game::Cash4Life.jackpot_rules().unwrap();
        let draws = vec![
            JackpotDraw {
                date: d(2025, 1, 1),
                main: vec![1, 2, 3, 4, 5],
                bonus: Some(1),
            },
            JackpotDraw {
                date: d(2025, 1, 11),
                main: vec![1, 6, 7, 8, 9],
                bonus: Some(2),
            },
            JackpotDraw {
                date: d(2025, 2, 1),
                main: vec![10, 11, 12, 13, 14],
                bonus: None,
            },
        ];
        let tables = BallTables::from_draws(&draws, &rules, d(2025, 1, 21));
        assert_eq!(tables.draw_count, 2);
        assert_eq!(tables.main.len(), 60);

        let ball = |n: u8| tables.main.iter().find(|s| s.ball == n).unwrap();
        assert_eq!(ball(1).heat, 1.0);
        // ball 1 last seen 10 days before as_of; oldest seen ball is 20 days.
        assert!((ball(1).due - 0.5).abs() < 1e-9);
        assert!((ball(2).due - 1.0).abs() < 1e-9);
        assert_eq!(ball(10).due, 1.0);
        assert_eq!(ball(10).heat, 0.0);
        assert!((ball(1).composite - (0.6 * 0.5 + 0.4)).abs() < 1e-9);
    }

    #[test]
    fn loads_stats_schema() {
        let raw = r#"{
            "asOf": "2025-03-01",
            "pickDraws": {"Cash3": ["123", "456"], "Bogus": ["1"]},
            "jackpotStats": [{
                "game": "MegaMillions",
                "last_updated": "2025-02-28T10:00:00",
                "draw_count": 12,
                "main_balls": {"7": {"frequency": 4, "last_seen": "2025-02-25"}},
                "bonus_balls": {"3": {"frequency": 2, "last_seen": null}}
            }]
        }"#;
        let file: SnapshotFile = serde_json::from_str(raw).unwrap();
        let snap = FeatureSnapshot::from_file(file, d(2030, 1, 1));
        assert_eq!(snap.as_of, Some(d(2025, 3, 1)));
        assert!(snap.digit_table(Game::Cash3).is_some());
        assert!(snap.digit_table(Game::Cash4).is_none());
        let mm = snap.ball_tables(Game::MegaMillions).unwrap();
        assert_eq!(mm.ranked_main()[0], 7);
        assert_eq!(mm.bonus.len(), 25);
    }
}
