use chrono::{Datelike, NaiveDate};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::games::{Game, KitTier, Session};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberProfile {
    pub subscriber_id: String,
    pub kit_tier: KitTier,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub preferred_games: Vec<String>,
    #[serde(default, alias = "optionalFreeformSeedValues")]
    pub seed_values: Vec<String>,
}

impl SubscriberProfile {
    pub fn new(subscriber_id: impl Into<String>, kit_tier: KitTier) -> Self {
        Self {
            subscriber_id: subscriber_id.into(),
            kit_tier,
            birth_date: None,
            preferred_games: Vec::new(),
            seed_values: Vec::new(),
        }
    }

    pub fn has_identity(&self) -> bool {
        !self.subscriber_id.trim().is_empty()
    }

    /// Empty preference list means every game in the kit.
    pub fn prefers(&self, game: Game) -> bool {
        self.preferred_games.is_empty()
            || self
                .preferred_games
                .iter()
                .any(|raw| Game::parse(raw) == Some(game))
    }

    /// All digits found in the freeform seed values, in order.
    pub fn seed_digits(&self) -> Vec<u8> {
        self.seed_values
            .iter()
            .flat_map(|s| s.bytes())
            .filter(u8::is_ascii_digit)
            .map(|b| b - b'0')
            .collect()
    }
}

pub fn date_digits(date: NaiveDate) -> Vec<u8> {
    date.format("%Y%m%d")
        .to_string()
        .bytes()
        .map(|b| b - b'0')
        .collect()
}

fn digit_sum(mut n: u32) -> u32 {
    let mut total = 0;
    while n > 0 {
        total += n % 10;
        n /= 10;
    }
    total
}

/// Repeated digit-sum reduction that stops on master numbers.
pub fn reduce_number(mut n: u32) -> u32 {
    while n > 9 && !matches!(n, 11 | 22 | 33) {
        n = digit_sum(n);
    }
    n
}

pub fn life_path(birth: NaiveDate) -> u32 {
    let total = date_digits(birth).iter().map(|d| u32::from(*d)).sum();
    reduce_number(total)
}

pub fn personal_year(birth: NaiveDate, year: i32) -> u32 {
    reduce_number(birth.month() + birth.day() + digit_sum(year.unsigned_abs()))
}

pub fn personal_month(birth: NaiveDate, on: NaiveDate) -> u32 {
    reduce_number(personal_year(birth, on.year()) + on.month())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Numerology {
    pub life_path: u32,
    pub personal_year: u32,
    pub personal_month: u32,
}

impl Numerology {
    pub fn for_draw(birth: NaiveDate, draw_date: NaiveDate) -> Self {
        Self {
            life_path: life_path(birth),
            personal_year: personal_year(birth, draw_date.year()),
            personal_month: personal_month(birth, draw_date),
        }
    }

    pub fn values(&self) -> [u32; 3] {
        [self.life_path, self.personal_year, self.personal_month]
    }

    pub fn digits(&self) -> Vec<u8> {
        self.values()
            .iter()
            .flat_map(|v| v.to_string().into_bytes())
            .map(|b| b - b'0')
            .collect()
    }
}

/// Fixed-width seed over the stable identity fields and the draw date.
///
/// Hashes `v1|<subscriberId>|<birthDate>|<drawDate>`; a missing profile or
/// blank id falls back to a date-only seed.
pub fn derive_seed(profile: Option<&SubscriberProfile>, draw_date: NaiveDate) -> u64 {
    let draw = draw_date.format("%Y%m%d");
    let material = match profile.filter(|p| p.has_identity()) {
        Some(p) => {
            let birth = p
                .birth_date
                .map(|d| d.format("%Y%m%d").to_string())
                .unwrap_or_else(|| "-".to_string());
            format!("v1|{}|{birth}|{draw}", p.subscriber_id.trim())
        }
        None => format!("v1|-|-|{draw}"),
    };
    let digest = Sha256::digest(material.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Generator for one lane; the stream id keeps lanes independent of each
/// other and of evaluation order.
pub fn lane_rng(seed: u64, game: Game, session: Option<Session>, lane_idx: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let session_idx = session.map(Session::index).unwrap_or(0);
    let stream = ((game as u64 + 1) << 16) | (session_idx << 8) | lane_idx as u64;
    rng.set_stream(stream);
    rng
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn numerology_keeps_master_numbers() {
        // 1+9+8+5+0+2+2+8 = 35 -> 8
        assert_eq!(life_path(d(1985, 2, 28)), 8);
        assert_eq!(reduce_number(29), 11);
        assert_eq!(reduce_number(38), 11);
        assert_eq!(reduce_number(22), 22);
        assert_eq!(reduce_number(47), 11);
        assert_eq!(reduce_number(48), 3);
    }

    #[test]
    fn seed_depends_on_identity_fields_only() {
        let date = d(2025, 3, 14);
        let mut a = SubscriberProfile::new("SUB-1", KitTier::Standard);
        let base = derive_seed(Some(&a), date);
        a.preferred_games.push("Cash3".to_string());
        a.seed_values.push("777".to_string());
        assert_eq!(derive_seed(Some(&a), date), base);

        a.birth_date = Some(d(1990, 7, 4));
        assert_ne!(derive_seed(Some(&a), date), base);
        assert_ne!(derive_seed(Some(&a), d(2025, 3, 15)), derive_seed(Some(&a), date));
    }

    #[test]
    fn blank_identity_falls_back_to_date_seed() {
        let date = d(2025, 3, 14);
        let blank = SubscriberProfile::new("  ", KitTier::Basic);
        assert_eq!(derive_seed(Some(&blank), date), derive_seed(None, date));
    }

    #[test]
    fn lane_streams_are_independent() {
        let mut a = lane_rng(42, Game::Cash3, None, 0);
        let mut b = lane_rng(42, Game::Cash3, None, 1);
        let mut a2 = lane_rng(42, Game::Cash3, None, 0);
        let x: u64 = a.r#gen();
        assert_eq!(x, a2.r#gen::<u64>());
        assert_ne!(x, b.r#gen::<u64>());
    }
}
