use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::FilterSettings;
use crate::games::Game;
use crate::scoring::ScoredCandidate;

const BASE_BONUS: f64 = 0.20;
const ENVIRONMENT_BONUS: f64 = 0.10;
const QUALITY_THRESHOLD: f64 = 0.65;
const MAX_CONFIDENCE_TERM: f64 = 0.9;
const REPORT_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WinnerEnvironment {
    Favorable,
    Neutral,
    Unfavorable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SilenceReason {
    LowConfidence,
    UnfavorableEnvironment,
    QualityControl,
    SelectivityRank,
    Play,
}

impl SilenceReason {
    pub fn label(self) -> &'static str {
        match self {
            SilenceReason::LowConfidence => "lowConfidence",
            SilenceReason::UnfavorableEnvironment => "unfavorableEnvironment",
            SilenceReason::QualityControl => "qualityControl",
            SilenceReason::SelectivityRank => "selectivityRank",
            SilenceReason::Play => "play",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDecision {
    pub scored: ScoredCandidate,
    pub silence_score: f64,
    pub winner_environment: WinnerEnvironment,
    pub play_flag: bool,
    pub silence_reason: SilenceReason,
    pub strength_flags: Vec<&'static str>,
}

/// Placeholder winner-density signal in `[0, 1]`: weekend and month-end
/// lift plus a stable hash jitter of (date, game).
pub fn winner_density(date: NaiveDate, game: Game) -> f64 {
    let mut density = match date.weekday() {
        Weekday::Sat | Weekday::Sun => 0.6,
        _ => 0.4,
    };
    if date.day() >= 25 {
        density += 0.2;
    }
    let digest = Sha256::digest(format!("{}|{}", date.format("%Y-%m-%d"), game.code()).as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let bucket = (u64::from_be_bytes(head) % 100) as f64;
    (density + (bucket - 50.0) * 0.004).clamp(0.0, 1.0)
}

pub fn winner_environment(date: NaiveDate, game: Game) -> WinnerEnvironment {
    let density = winner_density(date, game);
    if density > 0.7 {
        WinnerEnvironment::Favorable
    } else if density < 0.3 {
        WinnerEnvironment::Unfavorable
    } else {
        WinnerEnvironment::Neutral
    }
}

pub fn strength_flags(scored: &ScoredCandidate, overlay_favorable: bool) -> Vec<&'static str> {
    let mut flags = Vec::new();
    if scored.tags.any_repeat() {
        flags.push("repeatPattern");
    }
    if scored.tags.sequential || scored.tags.near_sequential {
        flags.push("sequential");
    }
    let sum_hit = scored
        .component_breakdown
        .get("sumBand")
        .is_some_and(|v| *v >= 1.0);
    if sum_hit {
        flags.push("sumBand");
    }
    if overlay_favorable {
        flags.push("overlay");
    }
    if scored.lane_sources.len() > 1 {
        flags.push("multiLane");
    }
    flags
}

fn flag_bonus(flag: &str) -> f64 {
    match flag {
        "repeatPattern" | "sequential" => 0.02,
        _ => 0.01,
    }
}

/// Higher means more likely to be surfaced. `confidence_pct` already includes
/// any per-game boost.
pub fn silence_score(confidence_pct: f64, flags: &[&str], environment: WinnerEnvironment) -> f64 {
    let mut term = confidence_pct.max(0.0) / 100.0;
    if confidence_pct < 40.0 {
        term *= 1.5;
    } else if confidence_pct < 60.0 {
        term *= 1.2;
    }
    let mut score = term.min(MAX_CONFIDENCE_TERM);
    score += flags.iter().map(|f| flag_bonus(f)).sum::<f64>();
    score += BASE_BONUS;
    let mut score = score.clamp(0.1, 1.0);
    if environment == WinnerEnvironment::Favorable {
        score = (score + ENVIRONMENT_BONUS).min(1.0);
    }
    score
}

/// Surfaced count before floor adjustments.
pub fn surface_count(batch: usize, target_silence_rate: f64) -> usize {
    match batch {
        0 => 0,
        1 => 1,
        n => ((n as f64) * (1.0 - target_silence_rate) + 1e-9).floor().max(0.0) as usize,
    }
}

/// Marks each candidate play or silence. Output keeps the input order.
pub fn apply_filter(
    pool: &[ScoredCandidate],
    game: Game,
    date: NaiveDate,
    settings: &FilterSettings,
    overlay_favorable: bool,
) -> Vec<FilterDecision> {
    let environment = winner_environment(date, game);
    let boost_pct = settings.confidence_boost * 100.0;

    let mut decisions = pool
        .iter()
        .map(|scored| {
            let flags = strength_flags(scored, overlay_favorable);
            FilterDecision {
                silence_score: silence_score(scored.confidence_percent() + boost_pct, &flags, environment),
                scored: scored.clone(),
                winner_environment: environment,
                play_flag: false,
                silence_reason: SilenceReason::SelectivityRank,
                strength_flags: flags,
            }
        })
        .collect::<Vec<_>>();

    let mut order = (0..decisions.len()).collect::<Vec<_>>();
    order.sort_by(|a, b| {
        decisions[*b]
            .silence_score
            .total_cmp(&decisions[*a].silence_score)
            .then(a.cmp(b))
    });
    let keep = surface_count(decisions.len(), settings.target_silence_rate);
    for idx in order.into_iter().take(keep) {
        decisions[idx].play_flag = true;
    }

    for decision in &mut decisions {
        let below_floor = decision.scored.confidence_percent() < settings.min_confidence_pct;
        if below_floor {
            decision.play_flag = false;
        }
        decision.silence_reason = if decision.play_flag {
            SilenceReason::Play
        } else if below_floor {
            SilenceReason::LowConfidence
        } else if decision.winner_environment == WinnerEnvironment::Unfavorable {
            SilenceReason::UnfavorableEnvironment
        } else if decision.silence_score < QUALITY_THRESHOLD {
            SilenceReason::QualityControl
        } else {
            SilenceReason::SelectivityRank
        };
    }
    decisions
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SilenceReport {
    pub game: String,
    pub total: usize,
    pub surfaced: usize,
    pub silenced: usize,
    pub target_rate: f64,
    pub realized_rate: f64,
    pub within_tolerance: bool,
    pub reasons: BTreeMap<SilenceReason, usize>,
}

impl SilenceReport {
    pub fn from_decisions(game: &str, decisions: &[FilterDecision], target_rate: f64) -> Self {
        let total = decisions.len();
        let surfaced = decisions.iter().filter(|d| d.play_flag).count();
        let silenced = total - surfaced;
        let realized_rate = if total == 0 {
            0.0
        } else {
            silenced as f64 / total as f64
        };
        let mut reasons = BTreeMap::new();
        for d in decisions {
            *reasons.entry(d.silence_reason).or_insert(0) += 1;
        }
        Self {
            game: game.to_string(),
            total,
            surfaced,
            silenced,
            target_rate,
            realized_rate,
            within_tolerance: (realized_rate - target_rate).abs() <= REPORT_TOLERANCE,
            reasons,
        }
    }

    /// Folds another report into this one (same game).
    pub fn merge(&mut self, other: &SilenceReport) {
        self.total += other.total;
        self.surfaced += other.surfaced;
        self.silenced += other.silenced;
        for (reason, n) in &other.reasons {
            *self.reasons.entry(*reason).or_insert(0) += n;
        }
        self.realized_rate = if self.total == 0 {
            0.0
        } else {
            self.silenced as f64 / self.total as f64
        };
        self.within_tolerance = (self.realized_rate - self.target_rate).abs() <= REPORT_TOLERANCE;
    }
}

impl fmt::Display for SilenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} candidates, {} surfaced, {} silenced ({:.1}% vs target {:.1}%{})",
            self.game,
            self.total,
            self.surfaced,
            self.silenced,
            self.realized_rate * 100.0,
            self.target_rate * 100.0,
            if self.within_tolerance { "" } else { ", off target" }
        )?;
        for (reason, n) in &self.reasons {
            writeln!(f, "  {:<24} {n}", reason.label())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn surface_count_floors() {
        assert_eq!(surface_count(0, 0.25), 0);
        assert_eq!(surface_count(1, 0.70), 1);
        assert_eq!(surface_count(11, 0.25), 8);
        assert_eq!(surface_count(20, 0.70), 6);
        assert_eq!(surface_count(20, 0.65), 7);
        assert_eq!(surface_count(100, 0.25), 75);
    }

    #[test]
    fn winner_environment_is_pure() {
        for day in 1..=28 {
            let date = d(2025, 2, day);
            for game in crate::games::SUPPORTED_GAMES {
                assert_eq!(winner_environment(date, game), winner_environment(date, game));
                let density = winner_density(date, game);
                assert!((0.0..=1.0).contains(&density));
            }
        }
    }

    #[test]
    fn silence_score_is_bounded_and_monotone_in_confidence() {
        let mut last = 0.0;
        for pct in 0..=100 {
            let s = silence_score(f64::from(pct), &[], WinnerEnvironment::Neutral);
            assert!((0.1..=1.0).contains(&s));
            assert!(s + 1e-12 >= last || pct == 40 || pct == 60, "{pct}");
            last = s;
        }
        let fav = silence_score(95.0, &["repeatPattern"], WinnerEnvironment::Favorable);
        assert_eq!(fav, 1.0);
    }
}
