use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::games::Session;

pub const DEFAULT_KEY: &str = "DEFAULT";

const SYNODIC_MONTH: f64 = 29.530_588;

const MOON_PHASES: [&str; 8] = [
    "NEW",
    "WAXING_CRESCENT",
    "FIRST_QUARTER",
    "WAXING_GIBBOUS",
    "FULL",
    "WANING_GIBBOUS",
    "LAST_QUARTER",
    "WANING_CRESCENT",
];

// Chaldean order of the classical planets.
const CHALDEAN: [&str; 7] = [
    "SATURN", "JUPITER", "MARS", "SUN", "VENUS", "MERCURY", "MOON",
];

/// Multiplier tables keyed by categorical overlay value. Each table may carry a
/// `DEFAULT` entry used for keys it does not list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlayTables {
    pub moon_phase: BTreeMap<String, f64>,
    pub day_of_week: BTreeMap<String, f64>,
    pub weather: BTreeMap<String, f64>,
    pub bias_pattern: BTreeMap<String, f64>,
    pub planetary_hour: BTreeMap<String, f64>,
}

/// Overlay keys for one draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayContext {
    pub moon_phase: String,
    pub day_of_week: String,
    pub weather: Option<String>,
    pub bias_pattern: Option<String>,
    pub planetary_hour: Option<String>,
}

impl OverlayContext {
    pub fn for_draw(
        date: NaiveDate,
        session: Option<Session>,
        weather: Option<&str>,
        bias_pattern: Option<&str>,
    ) -> Self {
        Self {
            moon_phase: moon_phase(date).to_string(),
            day_of_week: weekday_name(date.weekday()).to_string(),
            weather: weather.map(normalize_key),
            bias_pattern: bias_pattern.map(normalize_key),
            planetary_hour: session.map(|s| planetary_hour(date, s).to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayEffect {
    pub factors: BTreeMap<&'static str, f64>,
    pub raw_product: f64,
    pub applied: f64,
}

impl OverlayEffect {
    pub fn is_favorable(&self) -> bool {
        self.raw_product > 1.0
    }
}

impl OverlayTables {
    fn lookup(table: &BTreeMap<String, f64>, key: Option<&str>) -> f64 {
        let hit = key.and_then(|k| table.get(&normalize_key(k)));
        hit.or_else(|| table.get(DEFAULT_KEY))
            .copied()
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(1.0)
    }

    /// Product of the five overlay multipliers, clamped to `[lo, hi]`.
    pub fn effect(&self, ctx: &OverlayContext, lo: f64, hi: f64) -> OverlayEffect {
        let mut factors = BTreeMap::new();
        factors.insert("moonPhase", Self::lookup(&self.moon_phase, Some(&ctx.moon_phase)));
        factors.insert("dayOfWeek", Self::lookup(&self.day_of_week, Some(&ctx.day_of_week)));
        factors.insert("weather", Self::lookup(&self.weather, ctx.weather.as_deref()));
        factors.insert(
            "biasPattern",
            Self::lookup(&self.bias_pattern, ctx.bias_pattern.as_deref()),
        );
        factors.insert(
            "planetaryHour",
            Self::lookup(&self.planetary_hour, ctx.planetary_hour.as_deref()),
        );
        let raw_product = factors.values().product::<f64>();
        OverlayEffect {
            factors,
            raw_product,
            applied: raw_product.clamp(lo, hi),
        }
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_uppercase().replace([' ', '-'], "_")
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MONDAY",
        Weekday::Tue => "TUESDAY",
        Weekday::Wed => "WEDNESDAY",
        Weekday::Thu => "THURSDAY",
        Weekday::Fri => "FRIDAY",
        Weekday::Sat => "SATURDAY",
        Weekday::Sun => "SUNDAY",
    }
}

/// Eight-phase moon name, counted from the 2000-01-06 new moon.
pub fn moon_phase(date: NaiveDate) -> &'static str {
    let Some(epoch) = NaiveDate::from_ymd_opt(2000, 1, 6) else {
        return MOON_PHASES[0];
    };
    let days = (date - epoch).num_days() as f64;
    let age = days.rem_euclid(SYNODIC_MONTH);
    let idx = ((age / SYNODIC_MONTH) * 8.0 + 0.5).floor() as usize % 8;
    MOON_PHASES[idx]
}

/// Planet ruling the draw hour. Draw times are fixed per session (roughly the
/// 7th, 14th and 18th hour after a 6am sunrise).
pub fn planetary_hour(date: NaiveDate, session: Session) -> &'static str {
    let day_ruler = match date.weekday() {
        Weekday::Sat => 0,
        Weekday::Thu => 1,
        Weekday::Tue => 2,
        Weekday::Sun => 3,
        Weekday::Fri => 4,
        Weekday::Wed => 5,
        Weekday::Mon => 6,
    };
    let hour = match session {
        Session::Midday => 6,
        Session::Evening => 13,
        Session::Night => 17,
    };
    CHALDEAN[(day_ruler + hour) % 7]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn moon_phase_tracks_known_dates() {
        assert_eq!(moon_phase(d(2000, 1, 6)), "NEW");
        assert_eq!(moon_phase(d(2000, 1, 21)), "FULL");
        assert_eq!(moon_phase(d(2024, 4, 8)), "NEW");
    }

    #[test]
    fn planetary_hour_starts_from_day_ruler() {
        // 2025-03-16 is a Sunday: hour 0 is the Sun.
        assert_eq!(planetary_hour(d(2025, 3, 16), Session::Midday), "MARS");
        assert_eq!(planetary_hour(d(2025, 3, 16), Session::Night), "MOON");
    }

    #[test]
    fn overlay_product_is_clamped() {
        let mut tables = OverlayTables::default();
        tables.day_of_week.insert("FRIDAY".to_string(), 1.2);
        tables.moon_phase.insert(DEFAULT_KEY.to_string(), 1.1);
        let ctx = OverlayContext::for_draw(d(2025, 3, 14), None, Some("rain"), None);
        let effect = tables.effect(&ctx, 0.95, 1.05);
        assert!((effect.raw_product - 1.32).abs() < 1e-9);
        assert_eq!(effect.applied, 1.05);
        assert!(effect.is_favorable());

        let neutral = OverlayTables::default().effect(&ctx, 0.95, 1.05);
        assert_eq!(neutral.applied, 1.0);
        assert!(!neutral.is_favorable());
    }
}
