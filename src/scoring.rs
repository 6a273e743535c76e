use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, JackpotCandidate, PatternTags, PickCandidate};
use crate::config::{EngineConfig, OddsBands};
use crate::error::{UnitIssue, ValidationError};
use crate::games::Game;
use crate::history::FeatureSnapshot;
use crate::lanes::LaneOutput;
use crate::overlay::{OverlayContext, OverlayEffect};

const JACKPOT_BASE_POINTS: f64 = 2.0;
/// Validated lines always carry distinct main numbers.
const DISTINCT_MAIN_POINTS: f64 = 0.8;
const NEAR_SUM_SPREAD: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Band {
    Green,
    Yellow,
    Tan,
    Red,
}

impl Band {
    pub fn label(self) -> &'static str {
        match self {
            Band::Green => "GREEN",
            Band::Yellow => "YELLOW",
            Band::Tan => "TAN",
            Band::Red => "RED",
        }
    }
}

/// `round(1 / confidence)`, or the sentinel when confidence is not positive.
pub fn odds_one_in_n(confidence: f64, sentinel: u64) -> u64 {
    if confidence.is_nan() || confidence <= 0.0 || confidence.is_infinite() {
        return sentinel;
    }
    let odds = (1.0 / confidence.min(1.0)).round();
    if odds >= sentinel as f64 {
        sentinel
    } else {
        (odds as u64).max(1)
    }
}

pub fn band_for_odds(odds: u64, bands: &OddsBands) -> Band {
    if odds <= bands.green_max {
        Band::Green
    } else if odds <= bands.yellow_max {
        Band::Yellow
    } else if odds <= bands.tan_max {
        Band::Tan
    } else {
        Band::Red
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub game: Game,
    pub lane_id: String,
    pub lane_index: usize,
    pub position: usize,
    pub confidence: f64,
    pub odds_one_in_n: u64,
    pub band: Band,
    pub component_breakdown: BTreeMap<String, f64>,
    pub debug_meta: BTreeMap<String, String>,
    pub tags: PatternTags,
    /// Lanes that proposed this value; filled in by pool aggregation.
    pub lane_sources: Vec<String>,
}

impl ScoredCandidate {
    pub fn value_key(&self) -> String {
        self.candidate.value_key()
    }

    pub fn confidence_percent(&self) -> f64 {
        self.confidence * 100.0
    }
}

/// Read-only inputs for scoring every candidate of one unit.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub config: &'a EngineConfig,
    pub snapshot: &'a FeatureSnapshot,
    pub overlay: &'a OverlayContext,
}

struct Scored {
    confidence: f64,
    breakdown: BTreeMap<String, f64>,
    meta: BTreeMap<String, String>,
}

fn low_digit_boost(digits: &[u8]) -> f64 {
    match digits.iter().filter(|d| **d <= 3).count() {
        0 => 0.0,
        1 => 0.05,
        2 => 0.12,
        _ => 0.20,
    }
}

fn sequence_boost(tags: &PatternTags) -> f64 {
    if tags.sequential {
        0.25
    } else if tags.near_sequential {
        0.15
    } else {
        0.0
    }
}

fn overlay_meta(meta: &mut BTreeMap<String, String>, effect: &OverlayEffect) {
    for (name, factor) in &effect.factors {
        if (*factor - 1.0).abs() > f64::EPSILON {
            meta.insert(format!("overlay.{name}"), format!("{factor:.3}"));
        }
    }
    meta.insert("overlayProduct".to_string(), format!("{:.4}", effect.raw_product));
}

fn score_pick(c: &PickCandidate, game: Game, ctx: &ScoringContext<'_>) -> Option<Scored> {
    let cfg = ctx.config;
    let rules = cfg.pick_games.get(&game)?;
    let w = &cfg.pick_weights;
    let tags = c.tags();

    let frequency = ctx
        .snapshot
        .digit_table(game)
        .map(|t| t.frequency_score(c.digits()))
        .unwrap_or(0.0);
    let sum_band = if rules.strong_sum.contains(c.digit_sum()) {
        1.0
    } else {
        rules.off_band_score
    };
    let repeat = rules
        .repeat_scores
        .get(c.unique_count().saturating_sub(1))
        .copied()
        .unwrap_or(0.0);
    let pressure = w.near_miss_pressure;
    let boost = match c.digits().len() {
        3 => low_digit_boost(c.digits()),
        4 => sequence_boost(&tags),
        _ => 0.0,
    };

    let weighted =
        w.frequency * frequency + w.sum_band * sum_band + w.repeat * repeat + w.pressure * pressure;
    let raw = (weighted + boost).min(1.0);
    let effect = ctx
        .snapshot
        .overlays()
        .effect(ctx.overlay, cfg.overlay_clamp.0, cfg.overlay_clamp.1);
    let confidence = (raw * effect.applied * w.confidence_scale).clamp(0.0, 1.0);

    let mut breakdown = BTreeMap::new();
    breakdown.insert("frequency".to_string(), frequency);
    breakdown.insert("sumBand".to_string(), sum_band);
    breakdown.insert("repeat".to_string(), repeat);
    breakdown.insert("pressure".to_string(), pressure);
    breakdown.insert("patternBoost".to_string(), boost);
    breakdown.insert("raw".to_string(), raw);
    breakdown.insert("overlay".to_string(), effect.applied);

    let mut meta = BTreeMap::new();
    meta.insert("pattern".to_string(), c.pattern().label().to_string());
    let labels = tags.labels();
    if !labels.is_empty() {
        meta.insert("patternTags".to_string(), labels.join(","));
    }
    meta.insert("digitSum".to_string(), c.digit_sum().to_string());
    overlay_meta(&mut meta, &effect);
    Some(Scored {
        confidence,
        breakdown,
        meta,
    })
}

fn bonus_points(bonus: Option<u8>, bonus_max: u8) -> f64 {
    let Some(b) = bonus else {
        return 0.0;
    };
    let ratio = f64::from(b) / f64::from(bonus_max.max(1));
    if ratio <= 0.2 {
        1.2
    } else if ratio <= 0.4 {
        0.8
    } else if ratio <= 0.6 {
        0.4
    } else {
        0.0
    }
}

fn score_jackpot(c: &JackpotCandidate, game: Game, ctx: &ScoringContext<'_>) -> Option<Scored> {
    let cfg = ctx.config;
    let tuning = cfg.jackpot_games.get(&game)?;
    let rules = game.jackpot_rules()?;
    let main = c.main_numbers();
    let sum = c.main_sum();

    let sum_points = match tuning.good_sum.distance(sum) {
        0 => 1.5,
        d if d <= NEAR_SUM_SPREAD => 0.75,
        _ => 0.0,
    };
    let bonus = bonus_points(c.bonus(), rules.bonus_max);
    let evens = main.iter().filter(|n| *n % 2 == 0).count();
    let balance = if (2..=3).contains(&evens) { 0.6 } else { 0.0 };
    let consecutive = if main.windows(2).any(|p| p[1] - p[0] == 1) {
        0.4
    } else {
        0.0
    };
    let proximity = match c.bonus() {
        Some(b) if main.iter().any(|n| n.abs_diff(b) <= 3) => 0.3,
        _ => 0.0,
    };
    let points = JACKPOT_BASE_POINTS
        + sum_points
        + bonus
        + DISTINCT_MAIN_POINTS
        + balance
        + consecutive
        + proximity
        + tuning.game_constant;

    let band = tuning.calibration;
    let pct = (points * cfg.jackpot_scale * band.multiplier).clamp(band.min_pct, band.max_pct);

    let mut breakdown = BTreeMap::new();
    breakdown.insert("base".to_string(), JACKPOT_BASE_POINTS);
    breakdown.insert("sumBand".to_string(), sum_points);
    breakdown.insert("bonusRange".to_string(), bonus);
    breakdown.insert("distinctMain".to_string(), DISTINCT_MAIN_POINTS);
    breakdown.insert("evenOdd".to_string(), balance);
    breakdown.insert("consecutive".to_string(), consecutive);
    breakdown.insert("bonusProximity".to_string(), proximity);
    breakdown.insert("gameConstant".to_string(), tuning.game_constant);
    breakdown.insert("points".to_string(), points);

    let mut meta = BTreeMap::new();
    meta.insert("mainSum".to_string(), sum.to_string());
    meta.insert(
        "calibration".to_string(),
        format!("[{:.1},{:.1}]", band.min_pct, band.max_pct),
    );
    Some(Scored {
        confidence: (pct / 100.0).clamp(0.0, 1.0),
        breakdown,
        meta,
    })
}

/// Scores one candidate; malformed candidates are rejected before any scoring.
pub fn score_candidate(
    candidate: &Candidate,
    game: Game,
    ctx: &ScoringContext<'_>,
) -> Result<(f64, BTreeMap<String, f64>, BTreeMap<String, String>), ValidationError> {
    candidate.validate_for(game)?;
    let scored = match candidate {
        Candidate::Pick(p) => score_pick(p, game, ctx),
        Candidate::Jackpot(j) => score_jackpot(j, game, ctx),
    };
    let Some(scored) = scored else {
        return Err(ValidationError::KindMismatch(game.code().to_string()));
    };
    Ok((scored.confidence, scored.breakdown, scored.meta))
}

pub fn score_lane(lane: &LaneOutput, ctx: &ScoringContext<'_>) -> (Vec<ScoredCandidate>, Vec<UnitIssue>) {
    let mut scored = Vec::with_capacity(lane.candidates.len());
    let mut issues = Vec::new();
    for (position, candidate) in lane.candidates.iter().enumerate() {
        match score_candidate(candidate, lane.game, ctx) {
            Ok((confidence, component_breakdown, mut debug_meta)) => {
                let odds = odds_one_in_n(confidence, ctx.config.odds.sentinel);
                debug_meta.insert("baseLaneScore".to_string(), format!("{:.2}", lane.base_lane_score));
                scored.push(ScoredCandidate {
                    candidate: candidate.clone(),
                    game: lane.game,
                    lane_id: lane.lane_id.clone(),
                    lane_index: lane.lane_index,
                    position,
                    confidence,
                    odds_one_in_n: odds,
                    band: band_for_odds(odds, &ctx.config.odds),
                    component_breakdown,
                    debug_meta,
                    tags: candidate.tags(),
                    lane_sources: vec![lane.lane_id.clone()],
                });
            }
            Err(err) => issues.push(UnitIssue::Validation(format!(
                "{} {}: {err}",
                lane.lane_id,
                candidate.value_key()
            ))),
        }
    }
    (scored, issues)
}
