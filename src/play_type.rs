use serde::{Serialize, Serializer};

use crate::candidate::PatternTags;
use crate::config::PlayThresholds;
use crate::games::{Game, GameCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayFlag {
    Core,
    Light,
    Fun,
    Skip,
}

impl PlayFlag {
    pub fn label(self) -> &'static str {
        match self {
            PlayFlag::Core => "CORE",
            PlayFlag::Light => "LIGHT",
            PlayFlag::Fun => "FUN",
            PlayFlag::Skip => "SKIP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PlayType {
    #[serde(rename = "STRAIGHT")]
    Straight,
    #[serde(rename = "BOX")]
    Box,
    #[serde(rename = "STRAIGHT+BOX")]
    StraightBox,
    #[serde(rename = "STANDARD")]
    Standard,
}

impl PlayType {
    pub fn label(self) -> &'static str {
        match self {
            PlayType::Straight => "STRAIGHT",
            PlayType::Box => "BOX",
            PlayType::StraightBox => "STRAIGHT+BOX",
            PlayType::Standard => "STANDARD",
        }
    }
}

/// Backup bet layered on the primary play type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BobSuggestion {
    None,
    AddBox,
    AddBackPair,
    AddOneOff,
    StrongCombo,
    BonusBallFocus,
}

impl BobSuggestion {
    pub fn label(self) -> &'static str {
        match self {
            BobSuggestion::None => "NONE",
            BobSuggestion::AddBox => "ADD_BOX",
            BobSuggestion::AddBackPair => "ADD_BACK_PAIR",
            BobSuggestion::AddOneOff => "ADD_ONE_OFF",
            BobSuggestion::StrongCombo => "STRONG_COMBO",
            BobSuggestion::BonusBallFocus => "BONUS_BALL_FOCUS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegendCode {
    PickBox(Game),
    PickStraightBox(Game),
    PickStraightOneOff(Game),
    PickStraightBoxBob(Game),
    PickBackPair(Game),
    JackpotStandard(Game),
    JackpotBonusFocus(Game),
    Generic,
}

impl LegendCode {
    pub fn code(self) -> String {
        match self {
            LegendCode::PickBox(g) => format!("{}_BX", g.short_code()),
            LegendCode::PickStraightBox(g) => format!("{}_STBX", g.short_code()),
            LegendCode::PickStraightOneOff(g) => format!("{}_ST_1OFF", g.short_code()),
            LegendCode::PickStraightBoxBob(g) => format!("{}_ST_BX_BOB", g.short_code()),
            LegendCode::PickBackPair(g) => format!("{}_PAIR_BACK", g.short_code()),
            LegendCode::JackpotStandard(g) => format!("{}_STD", g.short_code()),
            LegendCode::JackpotBonusFocus(Game::Powerball) => "PB_STD_PB".to_string(),
            LegendCode::JackpotBonusFocus(g) => format!("{}_STD_MB", g.short_code()),
            LegendCode::Generic => "GEN_STD".to_string(),
        }
    }

    pub fn description(self) -> String {
        match self {
            LegendCode::PickBox(g) => format!("{g} Box only"),
            LegendCode::PickStraightBox(g) => format!("{g} Straight + Box"),
            LegendCode::PickStraightOneOff(g) => format!("{g} Straight + 1-Off safety"),
            LegendCode::PickStraightBoxBob(g) => format!("{g} Straight + Box + BOB safety"),
            LegendCode::PickBackPair(g) => format!("{g} Back Pair focus"),
            LegendCode::JackpotStandard(g) => format!("{g} standard ticket"),
            LegendCode::JackpotBonusFocus(g) => {
                let label = g.jackpot_rules().map(|r| r.bonus_label).unwrap_or("bonus");
                format!("{g} standard + {label}-only safety")
            }
            LegendCode::Generic => "Generic standard play".to_string(),
        }
    }
}

impl Serialize for LegendCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayDecision {
    pub primary_play_type: PlayType,
    pub bob_suggestion: BobSuggestion,
    pub play_flag: PlayFlag,
    pub legend_code: LegendCode,
    pub rationale: String,
}

/// Possibly partial inputs; missing values fall back to configured defaults.
#[derive(Debug, Clone, Default)]
pub struct DecisionInput<'a> {
    pub lane_id: Option<&'a str>,
    pub confidence_pct: Option<f64>,
    pub odds_one_in_n: Option<u64>,
    pub tags: PatternTags,
}

struct Resolved {
    confidence: f64,
    odds: u64,
    lane_bc: bool,
    tags: PatternTags,
}

pub fn choose_flag(confidence: f64, odds: u64, t: &PlayThresholds) -> PlayFlag {
    if confidence >= t.core_confidence || odds <= t.core_odds {
        PlayFlag::Core
    } else if confidence >= t.light_confidence || odds <= t.light_odds {
        PlayFlag::Light
    } else if confidence >= t.fun_confidence || odds <= t.fun_odds {
        PlayFlag::Fun
    } else {
        PlayFlag::Skip
    }
}

fn decision(
    primary: PlayType,
    bob: BobSuggestion,
    flag: PlayFlag,
    legend: LegendCode,
    rationale: String,
) -> PlayDecision {
    PlayDecision {
        primary_play_type: primary,
        bob_suggestion: bob,
        play_flag: flag,
        legend_code: legend,
        rationale,
    }
}

fn decide_pick(game: Game, r: &Resolved, flag: PlayFlag, t: &PlayThresholds) -> PlayDecision {
    if flag == PlayFlag::Skip {
        return decision(
            PlayType::Box,
            BobSuggestion::None,
            flag,
            LegendCode::PickBox(game),
            format!("{game} low signal, box shown as reference only"),
        );
    }
    let all_same = match game {
        Game::Cash4 => r.tags.quad,
        _ => r.tags.triple,
    };
    if all_same {
        let label = if game == Game::Cash4 { "quad" } else { "triple" };
        return if r.confidence >= t.strong_triple_confidence {
            decision(
                PlayType::StraightBox,
                BobSuggestion::StrongCombo,
                flag,
                LegendCode::PickStraightBoxBob(game),
                format!("{game} {label}, straight+box with combo backup"),
            )
        } else {
            decision(
                PlayType::Box,
                BobSuggestion::AddBox,
                flag,
                LegendCode::PickBox(game),
                format!("{game} {label}, box first"),
            )
        };
    }
    if r.tags.repeater || r.tags.back_pair {
        return decision(
            PlayType::Straight,
            BobSuggestion::AddBackPair,
            flag,
            LegendCode::PickBackPair(game),
            format!("{game} repeater, straight with back pair backup"),
        );
    }
    if r.confidence >= t.high_confidence {
        return decision(
            PlayType::StraightBox,
            BobSuggestion::AddOneOff,
            flag,
            LegendCode::PickStraightOneOff(game),
            format!("{game} high confidence, straight+box with 1-off"),
        );
    }
    if r.confidence >= t.medium_confidence {
        return if r.lane_bc {
            decision(
                PlayType::StraightBox,
                BobSuggestion::AddBox,
                flag,
                LegendCode::PickStraightBox(game),
                format!("{game} medium confidence from lane B/C, straight+box"),
            )
        } else {
            decision(
                PlayType::Box,
                BobSuggestion::AddOneOff,
                flag,
                LegendCode::PickBox(game),
                format!("{game} medium confidence, box with 1-off"),
            )
        };
    }
    decision(
        PlayType::Box,
        BobSuggestion::None,
        flag,
        LegendCode::PickBox(game),
        format!("{game} modest signal, box only"),
    )
}

fn decide_jackpot(game: Game, r: &Resolved, flag: PlayFlag, t: &PlayThresholds) -> PlayDecision {
    if flag == PlayFlag::Skip {
        return decision(
            PlayType::Standard,
            BobSuggestion::None,
            flag,
            LegendCode::JackpotStandard(game),
            format!("{game} low signal, standard line shown as reference only"),
        );
    }
    if r.confidence >= t.high_confidence || r.lane_bc {
        return decision(
            PlayType::Standard,
            BobSuggestion::BonusBallFocus,
            flag,
            LegendCode::JackpotBonusFocus(game),
            format!("{game} standard ticket with bonus-ball focus"),
        );
    }
    decision(
        PlayType::Standard,
        BobSuggestion::None,
        flag,
        LegendCode::JackpotStandard(game),
        format!("{game} standard ticket"),
    )
}

fn decide_fallback(code: &GameCode, flag: PlayFlag) -> PlayDecision {
    decision(
        PlayType::Standard,
        BobSuggestion::None,
        flag,
        LegendCode::Generic,
        format!("generic standard play for game {}", code.label()),
    )
}

/// Never fails: every game code, including unknown ones, gets a complete decision.
pub fn decide(code: &GameCode, input: &DecisionInput<'_>, t: &PlayThresholds, odds_sentinel: u64) -> PlayDecision {
    let confidence = input
        .confidence_pct
        .filter(|c| c.is_finite())
        .unwrap_or(t.default_confidence);
    let odds = input.odds_one_in_n.unwrap_or(odds_sentinel);
    let lane_bc = input
        .lane_id
        .and_then(|id| id.chars().last())
        .is_some_and(|c| matches!(c, 'B' | 'C'));
    let resolved = Resolved {
        confidence,
        odds,
        lane_bc,
        tags: input.tags,
    };
    let flag = choose_flag(resolved.confidence, resolved.odds, t);
    match code {
        GameCode::Known(game @ (Game::Cash3 | Game::Cash4)) => decide_pick(*game, &resolved, flag, t),
        GameCode::Known(game @ (Game::MegaMillions | Game::Powerball | Game::Cash4Life)) => {
            decide_jackpot(*game, &resolved, flag, t)
        }
        GameCode::Unknown(_) => decide_fallback(code, flag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn thresholds() -> PlayThresholds {
        EngineConfig::defaults().play
    }

    #[test]
    fn flag_tiers_follow_confidence_or_odds() {
        let t = thresholds();
        assert_eq!(choose_flag(85.0, 9999, &t), PlayFlag::Core);
        assert_eq!(choose_flag(10.0, 10, &t), PlayFlag::Core);
        assert_eq!(choose_flag(70.0, 9999, &t), PlayFlag::Light);
        assert_eq!(choose_flag(1.0, 400, &t), PlayFlag::Fun);
        assert_eq!(choose_flag(1.0, 501, &t), PlayFlag::Skip);
    }

    #[test]
    fn missing_fields_default_to_mid_confidence_and_sentinel_odds() {
        let t = thresholds();
        let d = decide(&GameCode::Known(Game::Cash3), &DecisionInput::default(), &t, 9999);
        assert_eq!(d.play_flag, PlayFlag::Fun);
        assert_eq!(d.primary_play_type, PlayType::Box);
        assert_eq!(d.legend_code.code(), "C3_BX");
    }

    #[test]
    fn triple_and_repeater_rules() {
        let t = thresholds();
        let triple = PatternTags {
            triple: true,
            all_low: true,
            ..PatternTags::default()
        };
        let strong = decide(
            &GameCode::Known(Game::Cash3),
            &DecisionInput {
                lane_id: Some("P_A"),
                confidence_pct: Some(90.0),
                odds_one_in_n: Some(1),
                tags: triple,
            },
            &t,
            9999,
        );
        assert_eq!(strong.legend_code.code(), "C3_ST_BX_BOB");
        assert_eq!(strong.bob_suggestion, BobSuggestion::StrongCombo);

        let repeat = PatternTags {
            repeater: true,
            back_pair: true,
            ..PatternTags::default()
        };
        let d = decide(
            &GameCode::Known(Game::Cash4),
            &DecisionInput {
                lane_id: Some("P_C"),
                confidence_pct: Some(7.0),
                odds_one_in_n: Some(14),
                tags: repeat,
            },
            &t,
            9999,
        );
        assert_eq!(d.primary_play_type, PlayType::Straight);
        assert_eq!(d.legend_code.code(), "C4_PAIR_BACK");
    }

    #[test]
    fn jackpot_lane_bc_gets_bonus_focus() {
        let t = thresholds();
        let d = decide(
            &GameCode::Known(Game::Powerball),
            &DecisionInput {
                lane_id: Some("J_B"),
                confidence_pct: Some(3.0),
                odds_one_in_n: Some(33),
                tags: PatternTags::default(),
            },
            &t,
            9999,
        );
        assert_eq!(d.legend_code.code(), "PB_STD_PB");
        assert_eq!(d.legend_code.description(), "Powerball standard + PB-only safety");
    }

    #[test]
    fn unknown_game_gets_generic_decision() {
        let t = thresholds();
        let d = decide(
            &GameCode::Unknown("Fantasy5".to_string()),
            &DecisionInput {
                confidence_pct: Some(f64::NAN),
                ..DecisionInput::default()
            },
            &t,
            9999,
        );
        assert_eq!(d.legend_code, LegendCode::Generic);
        assert_eq!(d.primary_play_type, PlayType::Standard);
        assert!(d.rationale.contains("Fantasy5"));
    }
}
