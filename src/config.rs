use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;
use crate::games::{Game, GameKind, SUPPORTED_GAMES};

pub const CONFIG_ENV: &str = "DRAWKIT_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SumBand {
    pub low: u32,
    pub high: u32,
}

impl SumBand {
    pub fn contains(&self, sum: u32) -> bool {
        (self.low..=self.high).contains(&sum)
    }

    /// Distance outside the band, zero inside.
    pub fn distance(&self, sum: u32) -> u32 {
        if sum < self.low {
            self.low - sum
        } else {
            sum.saturating_sub(self.high)
        }
    }
}

/// Selectivity settings for one game. Confidence floors are in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSettings {
    pub target_silence_rate: f64,
    pub min_confidence_pct: f64,
    #[serde(default)]
    pub confidence_boost: f64,
}

/// Realistic percentage band a jackpot game's confidence is mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationBand {
    pub min_pct: f64,
    pub max_pct: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickGameScoring {
    pub strong_sum: SumBand,
    pub off_band_score: f64,
    /// Repeat-pattern score indexed by unique digit count minus one.
    pub repeat_scores: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickWeights {
    pub frequency: f64,
    pub sum_band: f64,
    pub repeat: f64,
    pub pressure: f64,
    pub near_miss_pressure: f64,
    pub confidence_scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JackpotGameScoring {
    pub calibration: CalibrationBand,
    pub good_sum: SumBand,
    pub game_constant: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsBands {
    pub green_max: u64,
    pub yellow_max: u64,
    pub tan_max: u64,
    pub sentinel: u64,
}

/// Percent/odds cut-offs for the coarse play flag and play-type rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayThresholds {
    pub core_confidence: f64,
    pub core_odds: u64,
    pub light_confidence: f64,
    pub light_odds: u64,
    pub fun_confidence: f64,
    pub fun_odds: u64,
    pub strong_triple_confidence: f64,
    pub high_confidence: f64,
    pub medium_confidence: f64,
    pub default_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub filters: BTreeMap<Game, FilterSettings>,
    pub pick_weights: PickWeights,
    pub pick_games: BTreeMap<Game, PickGameScoring>,
    pub jackpot_games: BTreeMap<Game, JackpotGameScoring>,
    pub jackpot_scale: f64,
    pub overlay_clamp: (f64, f64),
    pub odds: OddsBands,
    pub play: PlayThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

impl EngineConfig {
    pub fn defaults() -> Self {
        let filter = |target, floor, boost| FilterSettings {
            target_silence_rate: target,
            min_confidence_pct: floor,
            confidence_boost: boost,
        };
        let mut filters = BTreeMap::new();
        filters.insert(Game::Cash3, filter(0.25, 4.0, 0.0));
        filters.insert(Game::Cash4, filter(0.25, 4.0, 0.0));
        filters.insert(Game::MegaMillions, filter(0.70, 2.5, 0.20));
        filters.insert(Game::Powerball, filter(0.70, 2.5, 0.20));
        filters.insert(Game::Cash4Life, filter(0.65, 10.5, 0.15));

        let mut pick_games = BTreeMap::new();
        pick_games.insert(
            Game::Cash3,
            PickGameScoring {
                strong_sum: SumBand { low: 9, high: 13 },
                off_band_score: 0.65,
                repeat_scores: vec![0.85, 0.92, 0.70],
            },
        );
        pick_games.insert(
            Game::Cash4,
            PickGameScoring {
                strong_sum: SumBand { low: 12, high: 20 },
                off_band_score: 0.55,
                repeat_scores: vec![0.85, 0.93, 0.78, 0.65],
            },
        );

        let jackpot = |min_pct, max_pct, multiplier, low, high, game_constant| JackpotGameScoring {
            calibration: CalibrationBand {
                min_pct,
                max_pct,
                multiplier,
            },
            good_sum: SumBand { low, high },
            game_constant,
        };
        let mut jackpot_games = BTreeMap::new();
        jackpot_games.insert(Game::MegaMillions, jackpot(2.0, 5.0, 0.5, 140, 200, 0.5));
        jackpot_games.insert(Game::Powerball, jackpot(2.0, 4.0, 0.4, 140, 200, 0.4));
        jackpot_games.insert(Game::Cash4Life, jackpot(10.0, 13.0, 1.0, 120, 180, 0.3));

        Self {
            filters,
            pick_weights: PickWeights {
                frequency: 0.38,
                sum_band: 0.32,
                repeat: 0.18,
                pressure: 0.12,
                near_miss_pressure: 0.35,
                confidence_scale: 0.14,
            },
            pick_games,
            jackpot_games,
            jackpot_scale: 1.5,
            overlay_clamp: (0.95, 1.05),
            odds: OddsBands {
                green_max: 50,
                yellow_max: 150,
                tan_max: 300,
                sentinel: 9999,
            },
            play: PlayThresholds {
                core_confidence: 80.0,
                core_odds: 120,
                light_confidence: 65.0,
                light_odds: 250,
                fun_confidence: 50.0,
                fun_odds: 500,
                strong_triple_confidence: 75.0,
                high_confidence: 80.0,
                medium_confidence: 65.0,
                default_confidence: 50.0,
            },
        }
    }

    /// Every supported game must carry its thresholds and bands.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut missing = Vec::new();
        for game in SUPPORTED_GAMES {
            match self.filters.get(&game) {
                None => missing.push(format!("{game}: filter settings")),
                Some(f) if !(0.0..1.0).contains(&f.target_silence_rate) => {
                    missing.push(format!("{game}: target silence rate outside [0,1)"));
                }
                Some(_) => {}
            }
            match game.kind() {
                GameKind::Pick => match self.pick_games.get(&game) {
                    None => missing.push(format!("{game}: pick scoring")),
                    Some(p) if p.repeat_scores.len() < game.pick_arity().unwrap_or(0) => {
                        missing.push(format!("{game}: repeat scores"));
                    }
                    Some(p) if p.strong_sum.low > p.strong_sum.high => {
                        missing.push(format!("{game}: inverted sum band"));
                    }
                    Some(_) => {}
                },
                GameKind::Jackpot => match self.jackpot_games.get(&game) {
                    None => missing.push(format!("{game}: calibration band")),
                    Some(j) if j.calibration.min_pct > j.calibration.max_pct => {
                        missing.push(format!("{game}: inverted calibration band"));
                    }
                    Some(j) if j.good_sum.low > j.good_sum.high => {
                        missing.push(format!("{game}: inverted sum band"));
                    }
                    Some(_) => {}
                },
            }
        }
        if self.overlay_clamp.0 > self.overlay_clamp.1 {
            missing.push("overlay clamp inverted".to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Configuration(missing.join("; ")))
        }
    }

    pub fn filter(&self, game: Game) -> Result<&FilterSettings, EngineError> {
        self.filters
            .get(&game)
            .ok_or_else(|| EngineError::Configuration(format!("{game}: filter settings")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        info!(path = %path.display(), "engine config loaded");
        Ok(cfg)
    }

    /// Explicit path, else `DRAWKIT_CONFIG`, else built-in defaults.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        match explicit.or(from_env) {
            Some(path) => Self::load(&path),
            None => Ok(Self::defaults()),
        }
    }
}
