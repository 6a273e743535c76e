use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDate};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

use crate::candidate::{Candidate, JackpotCandidate, PickCandidate};
use crate::games::{Game, GameKind, JackpotRules, KitTier, Session};
use crate::history::{BallTables, FeatureSnapshot};
use crate::subscriber::{Numerology, SubscriberProfile, date_digits, lane_rng};

pub const TAG_MISSING_CONTEXT: &str = "missingContext";
pub const TAG_FALLBACK: &str = "fallback";
pub const TAG_REJECTED: &str = "rejected";

const JACKPOT_EXTRA: usize = 3;
const IDENTITY_POOL: usize = 7;
const COMPRESSED_POOL: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LaneKey {
    A,
    B,
    C,
    D,
}

impl LaneKey {
    pub fn letter(self) -> char {
        match self {
            LaneKey::A => 'A',
            LaneKey::B => 'B',
            LaneKey::C => 'C',
            LaneKey::D => 'D',
        }
    }

    /// `P_A`, `J_C`, ...
    pub fn lane_id(self, kind: GameKind) -> String {
        let prefix = match kind {
            GameKind::Pick => 'P',
            GameKind::Jackpot => 'J',
        };
        format!("{prefix}_{}", self.letter())
    }
}

/// Inputs shared by every lane of one generation request.
#[derive(Debug, Clone, Copy)]
pub struct LaneRequest<'a> {
    pub profile: Option<&'a SubscriberProfile>,
    pub game: Game,
    pub date: NaiveDate,
    pub session: Option<Session>,
    pub snapshot: &'a FeatureSnapshot,
    pub seed: u64,
}

impl LaneRequest<'_> {
    fn numerology(&self) -> Option<Numerology> {
        let birth = self.profile.and_then(|p| p.birth_date)?;
        Some(Numerology::for_draw(birth, self.date))
    }

    fn identity_digits(&self) -> (Vec<u8>, &'static str) {
        match self.profile.and_then(|p| p.birth_date) {
            Some(birth) => (date_digits(birth), "birthDate"),
            None => (date_digits(self.date), "drawDate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneOutput {
    pub kit_tier: KitTier,
    pub game: Game,
    pub kind: GameKind,
    pub lane_id: String,
    pub lane_index: usize,
    pub draw_date: NaiveDate,
    pub session: Option<Session>,
    pub candidates: Vec<Candidate>,
    pub base_lane_score: f64,
    pub tags: BTreeMap<String, String>,
}

impl LaneOutput {
    pub fn is_missing_context(&self) -> bool {
        self.tags.contains_key(TAG_MISSING_CONTEXT)
    }
}

pub type JackpotLine = (Vec<u8>, Vec<u8>);

/// One candidate-generation strategy. Implementations only propose raw
/// digit sequences or number lines; dedupe, validation and fallback are shared.
pub trait LaneStrategy: Send + Sync {
    fn key(&self) -> LaneKey;
    fn name(&self) -> &'static str;
    fn base_score(&self) -> f64;

    /// Whether pick proposals depend on the game's digit history.
    fn needs_pick_history(&self) -> bool {
        false
    }

    fn pick(&self, req: &LaneRequest<'_>, arity: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<u8>>;

    /// `tables` is `None` when the snapshot has no history for the game.
    fn jackpot(
        &self,
        req: &LaneRequest<'_>,
        rules: &JackpotRules,
        tables: Option<&BallTables>,
        rng: &mut ChaCha8Rng,
    ) -> Option<Vec<JackpotLine>>;
}

/// Last `n` digits; short input is padded with its final digit.
fn tail_padded(digits: &[u8], n: usize) -> Vec<u8> {
    if digits.len() >= n {
        return digits[digits.len() - n..].to_vec();
    }
    let pad = digits.last().copied().unwrap_or(0);
    let mut out = digits.to_vec();
    out.resize(n, pad);
    out
}

/// Last `n` digits; short input is left-padded with zeros.
fn tail_zero_padded(digits: &[u8], n: usize) -> Vec<u8> {
    if digits.len() >= n {
        return digits[digits.len() - n..].to_vec();
    }
    let mut out = vec![0; n - digits.len()];
    out.extend_from_slice(digits);
    out
}

fn windows_of(pool: &[u8], size: usize) -> Vec<Vec<u8>> {
    if pool.len() < size {
        return Vec::new();
    }
    pool.windows(size).map(<[u8]>::to_vec).collect()
}

/// Maps any integer onto `1..=max`.
fn wrap_ball(value: u32, max: u8) -> u8 {
    let max = u32::from(max.max(1));
    ((value.saturating_sub(1)) % max + 1) as u8
}

pub struct FrequencyLane;
pub struct IdentityLane;
pub struct TemporalLane;
pub struct SparseLane;

impl LaneStrategy for FrequencyLane {
    fn key(&self) -> LaneKey {
        LaneKey::A
    }

    fn name(&self) -> &'static str {
        "frequency"
    }

    fn base_score(&self) -> f64 {
        0.6
    }

    fn needs_pick_history(&self) -> bool {
        true
    }

    fn pick(&self, req: &LaneRequest<'_>, arity: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<u8>> {
        let (base, _) = req.identity_digits();
        let mut out = vec![tail_padded(&base, arity)];

        let mut rotated = base.clone();
        if !rotated.is_empty() {
            rotated.rotate_left(1);
        }
        out.push(tail_padded(&rotated, arity));

        let dom = req.date.day();
        let year = req.date.year().unsigned_abs();
        let mut mixed = vec![(dom % 10) as u8, (year % 10) as u8, ((dom + year) % 10) as u8];
        if arity == 4 {
            mixed.push(0);
        }
        out.push(mixed);

        if let Some(table) = req.snapshot.digit_table(req.game) {
            let hot = table.hottest();
            out.push(hot.iter().take(arity).copied().collect());
            let offset = rng.gen_range(0..hot.len());
            out.push((0..arity).map(|i| hot[(offset + i) % hot.len()]).collect());
        }
        out
    }

    fn jackpot(
        &self,
        _req: &LaneRequest<'_>,
        rules: &JackpotRules,
        tables: Option<&BallTables>,
        _rng: &mut ChaCha8Rng,
    ) -> Option<Vec<JackpotLine>> {
        let tables = tables?;
        let main = tables
            .ranked_main()
            .into_iter()
            .take(rules.main_count + JACKPOT_EXTRA)
            .collect::<Vec<_>>();
        let bonus = tables.ranked_bonus().into_iter().take(1).collect::<Vec<_>>();
        Some(
            windows_of(&main, rules.main_count)
                .into_iter()
                .map(|w| (w, bonus.clone()))
                .collect(),
        )
    }
}

impl LaneStrategy for IdentityLane {
    fn key(&self) -> LaneKey {
        LaneKey::B
    }

    fn name(&self) -> &'static str {
        "identity"
    }

    fn base_score(&self) -> f64 {
        0.5
    }

    fn pick(&self, req: &LaneRequest<'_>, arity: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<u8>> {
        let seeds = match req.numerology() {
            Some(num) => num.digits(),
            None => vec![(req.date.day() % 10) as u8, (req.date.month() % 10) as u8],
        };
        let forward = tail_padded(&seeds, arity);
        let mut reversed = forward.clone();
        reversed.reverse();
        let shift = rng.gen_range(1..10u8);
        let shifted = forward.iter().map(|d| (d + shift) % 10).collect();
        vec![forward, reversed, shifted]
    }

    fn jackpot(
        &self,
        req: &LaneRequest<'_>,
        rules: &JackpotRules,
        _tables: Option<&BallTables>,
        rng: &mut ChaCha8Rng,
    ) -> Option<Vec<JackpotLine>> {
        let mut seeds = match req.numerology() {
            Some(num) => num.values().to_vec(),
            None => vec![req.date.day(), req.date.month()],
        };
        if let Some(profile) = req.profile {
            seeds.extend(
                profile
                    .seed_values
                    .iter()
                    .filter_map(|raw| raw.trim().parse::<u32>().ok()),
            );
        }

        let mut pool = Vec::new();
        for seed in &seeds {
            let ball = wrap_ball(*seed, rules.main_max);
            if !pool.contains(&ball) {
                pool.push(ball);
            }
        }
        let mut last = pool.last().copied().map(u32::from).unwrap_or(1);
        let mut guard = 0;
        while pool.len() < IDENTITY_POOL && guard < usize::from(rules.main_max) {
            last = u32::from(wrap_ball(last + 7, rules.main_max));
            let ball = last as u8;
            if !pool.contains(&ball) {
                pool.push(ball);
            }
            guard += 1;
        }
        pool.truncate(IDENTITY_POOL);

        let bonus_seed = seeds.first().copied().unwrap_or(1) + rng.gen_range(0..u32::from(rules.bonus_max));
        let bonus = vec![wrap_ball(bonus_seed, rules.bonus_max)];
        Some(
            windows_of(&pool, rules.main_count)
                .into_iter()
                .map(|w| (w, bonus.clone()))
                .collect(),
        )
    }
}

impl LaneStrategy for TemporalLane {
    fn key(&self) -> LaneKey {
        LaneKey::C
    }

    fn name(&self) -> &'static str {
        "temporal"
    }

    fn base_score(&self) -> f64 {
        0.4
    }

    fn pick(&self, req: &LaneRequest<'_>, arity: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<u8>> {
        let weekday = req.date.weekday().num_days_from_monday();
        let offset = req.session.map(Session::offset).unwrap_or(0);
        let base = (weekday + offset) % 10;
        let step = rng.gen_range(3..=7u32);
        [1, 2, step]
            .iter()
            .map(|k| (0..arity as u32).map(|i| ((base + k * i) % 10) as u8).collect())
            .collect()
    }

    fn jackpot(
        &self,
        req: &LaneRequest<'_>,
        rules: &JackpotRules,
        _tables: Option<&BallTables>,
        rng: &mut ChaCha8Rng,
    ) -> Option<Vec<JackpotLine>> {
        let dow = req.date.weekday().num_days_from_monday();
        let month = req.date.month();
        let max = u32::from(rules.main_max);
        let span = max.saturating_sub(rules.main_count as u32).max(1);
        let start = (dow * 7 + month * 3) % span;
        let line = |from: u32| {
            (0..rules.main_count as u32)
                .map(|i| ((from + i) % max + 1) as u8)
                .collect::<Vec<_>>()
        };
        let bonus = vec![((dow + month * 2) % u32::from(rules.bonus_max) + 1) as u8];
        let shifted = (start + rng.gen_range(1..max)) % max;
        Some(vec![(line(start), bonus.clone()), (line(shifted), bonus)])
    }
}

impl LaneStrategy for SparseLane {
    fn key(&self) -> LaneKey {
        LaneKey::D
    }

    fn name(&self) -> &'static str {
        "sparse"
    }

    fn base_score(&self) -> f64 {
        0.3
    }

    fn pick(&self, req: &LaneRequest<'_>, arity: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<u8>> {
        let Some(profile) = req.profile else {
            return Vec::new();
        };
        let mut out = profile
            .seed_values
            .iter()
            .map(|raw| {
                raw.bytes()
                    .filter(u8::is_ascii_digit)
                    .map(|b| b - b'0')
                    .collect::<Vec<_>>()
            })
            .filter(|digits| !digits.is_empty())
            .map(|digits| tail_zero_padded(&digits, arity))
            .collect::<Vec<_>>();

        let pool = profile.seed_digits();
        if !pool.is_empty() {
            out.push(
                (0..arity)
                    .map(|_| pool[rng.gen_range(0..pool.len())])
                    .collect(),
            );
        }
        out
    }

    fn jackpot(
        &self,
        _req: &LaneRequest<'_>,
        rules: &JackpotRules,
        tables: Option<&BallTables>,
        _rng: &mut ChaCha8Rng,
    ) -> Option<Vec<JackpotLine>> {
        let tables = tables?;
        let median = tables.median_main_composite();
        let mut kept = tables
            .main
            .iter()
            .filter(|s| s.composite >= median)
            .collect::<Vec<_>>();
        kept.sort_by(|a, b| b.composite.total_cmp(&a.composite).then(a.ball.cmp(&b.ball)));
        let pool = kept
            .iter()
            .take(COMPRESSED_POOL)
            .map(|s| s.ball)
            .collect::<Vec<_>>();
        let bonus_median = tables.median_bonus_composite();
        let mut bonus = tables
            .bonus
            .iter()
            .filter(|s| s.composite >= bonus_median)
            .collect::<Vec<_>>();
        bonus.sort_by(|a, b| b.composite.total_cmp(&a.composite).then(a.ball.cmp(&b.ball)));
        let mut bonus = bonus.into_iter().map(|s| s.ball).collect::<Vec<_>>();
        if bonus.is_empty() {
            bonus = tables.ranked_bonus();
        }
        Some(
            windows_of(&pool, rules.main_count)
                .into_iter()
                .enumerate()
                .map(|(i, w)| {
                    let b = if bonus.is_empty() {
                        Vec::new()
                    } else {
                        vec![bonus[i % bonus.len()]]
                    };
                    (w, b)
                })
                .collect(),
        )
    }
}

pub fn default_strategies() -> Vec<Box<dyn LaneStrategy>> {
    vec![
        Box::new(FrequencyLane),
        Box::new(IdentityLane),
        Box::new(TemporalLane),
        Box::new(SparseLane),
    ]
}

fn run_pick_lane(
    strategy: &dyn LaneStrategy,
    req: &LaneRequest<'_>,
    arity: usize,
    rng: &mut ChaCha8Rng,
    tags: &mut BTreeMap<String, String>,
) -> Vec<Candidate> {
    if strategy.needs_pick_history() && req.snapshot.digit_table(req.game).is_none() {
        tags.insert(
            TAG_MISSING_CONTEXT.to_string(),
            format!("no digit history for {}", req.game),
        );
    }
    let mut seen = HashSet::new();
    let mut rejected = 0usize;
    let mut out = Vec::new();
    for digits in strategy.pick(req, arity, rng) {
        match PickCandidate::from_digits(&digits, arity) {
            Ok(c) => {
                if seen.insert(c.value().to_string()) {
                    out.push(Candidate::Pick(c));
                }
            }
            Err(_) => rejected += 1,
        }
    }
    if rejected > 0 {
        tags.insert(TAG_REJECTED.to_string(), rejected.to_string());
    }
    if out.is_empty() {
        let fallback = tail_padded(&date_digits(req.date), arity);
        if let Ok(c) = PickCandidate::from_digits(&fallback, arity) {
            out.push(Candidate::Pick(c));
            tags.insert(TAG_FALLBACK.to_string(), "dateDigits".to_string());
        }
    }
    out
}

fn run_jackpot_lane(
    strategy: &dyn LaneStrategy,
    req: &LaneRequest<'_>,
    rules: &JackpotRules,
    rng: &mut ChaCha8Rng,
    tags: &mut BTreeMap<String, String>,
) -> Vec<Candidate> {
    let tables = req.snapshot.ball_tables(req.game);
    let Some(lines) = strategy.jackpot(req, rules, tables, rng) else {
        tags.insert(
            TAG_MISSING_CONTEXT.to_string(),
            format!("no ball history for {}", req.game),
        );
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut rejected = 0usize;
    let mut out = Vec::new();
    for (main, bonus) in lines {
        match JackpotCandidate::new(&main, &bonus, rules) {
            Ok(c) => {
                if seen.insert(c.key()) {
                    out.push(Candidate::Jackpot(c));
                }
            }
            Err(_) => rejected += 1,
        }
    }
    if rejected > 0 {
        tags.insert(TAG_REJECTED.to_string(), rejected.to_string());
    }
    out
}

/// Runs one strategy for a request. Pick lanes never come back empty.
pub fn run_lane(
    strategy: &dyn LaneStrategy,
    lane_index: usize,
    kit_tier: KitTier,
    req: &LaneRequest<'_>,
) -> LaneOutput {
    let kind = req.game.kind();
    let mut rng = lane_rng(req.seed, req.game, req.session, lane_index);
    let mut tags = BTreeMap::new();
    tags.insert("strategy".to_string(), strategy.name().to_string());
    tags.insert("seedSource".to_string(), req.identity_digits().1.to_string());

    let candidates = match (req.game.pick_arity(), req.game.jackpot_rules()) {
        (Some(arity), _) => run_pick_lane(strategy, req, arity, &mut rng, &mut tags),
        (None, Some(rules)) => run_jackpot_lane(strategy, req, &rules, &mut rng, &mut tags),
        (None, None) => Vec::new(),
    };

    LaneOutput {
        kit_tier,
        game: req.game,
        kind,
        lane_id: strategy.key().lane_id(kind),
        lane_index,
        draw_date: req.date,
        session: req.session,
        candidates,
        base_lane_score: strategy.base_score(),
        tags,
    }
}

/// All lanes a kit tier is entitled to for the requested game, in lane order.
pub fn generate_lanes(
    strategies: &[Box<dyn LaneStrategy>],
    kit_tier: KitTier,
    req: &LaneRequest<'_>,
) -> Vec<LaneOutput> {
    if !kit_tier.allows(req.game) {
        return Vec::new();
    }
    let count = kit_tier.lane_count(req.game.kind());
    let lanes = strategies
        .iter()
        .take(count)
        .enumerate()
        .map(|(idx, s)| run_lane(s.as_ref(), idx, kit_tier, req))
        .collect::<Vec<_>>();
    debug!(
        game = %req.game,
        date = %req.date,
        lanes = lanes.len(),
        candidates = lanes.iter().map(|l| l.candidates.len()).sum::<usize>(),
        "lanes generated"
    );
    lanes
}
