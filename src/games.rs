use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Game {
    Cash3,
    Cash4,
    MegaMillions,
    Powerball,
    Cash4Life,
}

pub const SUPPORTED_GAMES: [Game; 5] = [
    Game::Cash3,
    Game::Cash4,
    Game::MegaMillions,
    Game::Powerball,
    Game::Cash4Life,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Pick,
    Jackpot,
}

/// Number ranges for a main-plus-bonus game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JackpotRules {
    pub main_count: usize,
    pub main_max: u8,
    pub bonus_count: usize,
    pub bonus_max: u8,
    pub bonus_label: &'static str,
}

impl Game {
    pub fn code(self) -> &'static str {
        match self {
            Game::Cash3 => "Cash3",
            Game::Cash4 => "Cash4",
            Game::MegaMillions => "MegaMillions",
            Game::Powerball => "Powerball",
            Game::Cash4Life => "Cash4Life",
        }
    }

    /// Prefix used by legend codes.
    pub fn short_code(self) -> &'static str {
        match self {
            Game::Cash3 => "C3",
            Game::Cash4 => "C4",
            Game::MegaMillions => "MM",
            Game::Powerball => "PB",
            Game::Cash4Life => "C4L",
        }
    }

    pub fn parse(raw: &str) -> Option<Game> {
        let norm = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match norm.as_str() {
            "CASH3" | "C3" | "PICK3" => Some(Game::Cash3),
            "CASH4" | "C4" | "PICK4" => Some(Game::Cash4),
            "MEGAMILLIONS" | "MEGA" | "MM" => Some(Game::MegaMillions),
            "POWERBALL" | "PB" => Some(Game::Powerball),
            "CASH4LIFE" | "C4L" => Some(Game::Cash4Life),
            _ => None,
        }
    }

    pub fn kind(self) -> GameKind {
        match self {
            Game::Cash3 | Game::Cash4 => GameKind::Pick,
            Game::MegaMillions | Game::Powerball | Game::Cash4Life => GameKind::Jackpot,
        }
    }

    pub fn pick_arity(self) -> Option<usize> {
        match self {
            Game::Cash3 => Some(3),
            Game::Cash4 => Some(4),
            _ => None,
        }
    }

    pub fn jackpot_rules(self) -> Option<JackpotRules> {
        let (main_max, bonus_max, bonus_label) = match self {
            Game::MegaMillions => (70, 25, "Mega"),
            Game::Powerball => (69, 26, "PB"),
            Game::Cash4Life => (60, 4, "CB"),
            Game::Cash3 | Game::Cash4 => return None,
        };
        Some(JackpotRules {
            main_count: 5,
            main_max,
            bonus_count: 1,
            bonus_max,
            bonus_label,
        })
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A requested game code. Codes outside the supported set are kept verbatim so
/// downstream stages can degrade instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GameCode {
    Known(Game),
    Unknown(String),
}

impl GameCode {
    pub fn parse(raw: &str) -> Self {
        match Game::parse(raw) {
            Some(game) => GameCode::Known(game),
            None => GameCode::Unknown(raw.trim().to_string()),
        }
    }

    pub fn game(&self) -> Option<Game> {
        match self {
            GameCode::Known(game) => Some(*game),
            GameCode::Unknown(_) => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            GameCode::Known(game) => game.code(),
            GameCode::Unknown(raw) if raw.is_empty() => "UNKNOWN",
            GameCode::Unknown(raw) => raw,
        }
    }
}

impl From<String> for GameCode {
    fn from(raw: String) -> Self {
        GameCode::parse(&raw)
    }
}

impl From<GameCode> for String {
    fn from(code: GameCode) -> Self {
        code.label().to_string()
    }
}

impl From<Game> for GameCode {
    fn from(game: Game) -> Self {
        GameCode::Known(game)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Session {
    #[serde(alias = "Midday", alias = "midday")]
    Midday,
    #[serde(alias = "Evening", alias = "evening")]
    Evening,
    #[serde(alias = "Night", alias = "night")]
    Night,
}

impl Session {
    pub fn label(self) -> &'static str {
        match self {
            Session::Midday => "MIDDAY",
            Session::Evening => "EVENING",
            Session::Night => "NIGHT",
        }
    }

    /// Digit offset applied by the temporal lane.
    pub fn offset(self) -> u32 {
        match self {
            Session::Midday => 0,
            Session::Evening => 3,
            Session::Night => 6,
        }
    }

    pub fn index(self) -> u64 {
        match self {
            Session::Midday => 1,
            Session::Evening => 2,
            Session::Night => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KitTier {
    #[serde(alias = "BOSK")]
    Basic,
    #[serde(alias = "BOOK")]
    Standard,
    #[serde(alias = "BOOK3")]
    Premium,
}

impl KitTier {
    pub fn label(self) -> &'static str {
        match self {
            KitTier::Basic => "BASIC",
            KitTier::Standard => "STANDARD",
            KitTier::Premium => "PREMIUM",
        }
    }

    pub fn allows(self, game: Game) -> bool {
        match game.kind() {
            GameKind::Pick => true,
            GameKind::Jackpot => self != KitTier::Basic,
        }
    }

    /// Number of lane strategies active for a game kind.
    pub fn lane_count(self, kind: GameKind) -> usize {
        match (self, kind) {
            (KitTier::Basic, GameKind::Pick) => 3,
            (KitTier::Basic, GameKind::Jackpot) => 0,
            (KitTier::Standard, GameKind::Pick) => 4,
            (KitTier::Standard, GameKind::Jackpot) => 3,
            (KitTier::Premium, _) => 4,
        }
    }
}
