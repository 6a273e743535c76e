use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, UnitIssue};
use crate::games::{Game, GameCode, GameKind, KitTier, SUPPORTED_GAMES, Session};
use crate::history::FeatureSnapshot;
use crate::lanes::{LaneRequest, LaneStrategy, TAG_MISSING_CONTEXT, default_strategies, generate_lanes};
use crate::overlay::OverlayContext;
use crate::play_type::{DecisionInput, PlayDecision, PlayFlag, decide};
use crate::pool::aggregate;
use crate::scoring::{ScoringContext, score_lane};
use crate::selectivity::{FilterDecision, SilenceReport, apply_filter};
use crate::subscriber::{SubscriberProfile, derive_seed};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawRequest {
    pub subscriber_id: String,
    pub game: GameCode,
    pub date: NaiveDate,
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub bias_pattern: Option<String>,
}

impl DrawRequest {
    pub fn new(subscriber_id: impl Into<String>, game: impl Into<GameCode>, date: NaiveDate) -> Self {
        Self {
            subscriber_id: subscriber_id.into(),
            game: game.into(),
            date,
            session: None,
            weather: None,
            bias_pattern: None,
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }
}

/// Requests for every game each subscriber's kit and preferences allow.
/// Pick games get one request per listed session.
pub fn requests_for(profiles: &[SubscriberProfile], date: NaiveDate, sessions: &[Session]) -> Vec<DrawRequest> {
    let mut out = Vec::new();
    for profile in profiles {
        for game in SUPPORTED_GAMES {
            if !profile.kit_tier.allows(game) || !profile.prefers(game) {
                continue;
            }
            let base = DrawRequest::new(profile.subscriber_id.clone(), game, date);
            if game.kind() == GameKind::Pick && !sessions.is_empty() {
                out.extend(sessions.iter().map(|s| base.clone().with_session(*s)));
            } else {
                out.push(base);
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRow {
    pub rank: usize,
    pub filter: FilterDecision,
    pub play: PlayDecision,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitResult {
    pub request: DrawRequest,
    pub kit_tier: Option<KitTier>,
    pub rows: Vec<UnitRow>,
    /// Set when the unit produced no rankable candidates.
    pub placeholder: Option<PlayDecision>,
    pub issues: Vec<UnitIssue>,
    pub report: Option<SilenceReport>,
}

impl UnitResult {
    fn placeholder(
        request: &DrawRequest,
        kit_tier: Option<KitTier>,
        issues: Vec<UnitIssue>,
        config: &EngineConfig,
    ) -> Self {
        let mut play = decide(
            &request.game,
            &DecisionInput::default(),
            &config.play,
            config.odds.sentinel,
        );
        play.play_flag = PlayFlag::Skip;
        Self {
            request: request.clone(),
            kit_tier,
            rows: Vec::new(),
            placeholder: Some(play),
            issues,
            report: None,
        }
    }

    pub fn surfaced(&self) -> impl Iterator<Item = &UnitRow> {
        self.rows.iter().filter(|r| r.filter.play_flag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub snapshot_as_of: Option<NaiveDate>,
    pub units: Vec<UnitResult>,
    pub reports: BTreeMap<String, SilenceReport>,
}

/// Runs one unit of work against a fixed snapshot. Pure: same inputs, same output.
pub fn run_unit_with(
    config: &EngineConfig,
    strategies: &[Box<dyn LaneStrategy>],
    snapshot: &FeatureSnapshot,
    profile: Option<&SubscriberProfile>,
    request: &DrawRequest,
) -> UnitResult {
    let mut issues = Vec::new();
    let kit_tier = profile.map(|p| p.kit_tier);

    let Some(game) = request.game.game() else {
        issues.push(UnitIssue::UnknownGame(request.game.label().to_string()));
        return UnitResult::placeholder(request, kit_tier, issues, config);
    };
    if profile.is_none() {
        issues.push(UnitIssue::MissingProfile(request.subscriber_id.clone()));
    }
    let tier = kit_tier.unwrap_or(KitTier::Basic);
    if !tier.allows(game) {
        issues.push(UnitIssue::NotInKit(format!("{} excludes {game}", tier.label())));
        return UnitResult::placeholder(request, kit_tier, issues, config);
    }

    let lane_req = LaneRequest {
        profile,
        game,
        date: request.date,
        session: request.session,
        snapshot,
        seed: derive_seed(profile, request.date),
    };
    let lanes = generate_lanes(strategies, tier, &lane_req);
    for lane in &lanes {
        if let Some(detail) = lane.tags.get(TAG_MISSING_CONTEXT) {
            issues.push(UnitIssue::MissingContext(format!("{}: {detail}", lane.lane_id)));
        }
    }

    let overlay = OverlayContext::for_draw(
        request.date,
        request.session,
        request.weather.as_deref(),
        request.bias_pattern.as_deref(),
    );
    let ctx = ScoringContext {
        config,
        snapshot,
        overlay: &overlay,
    };
    let mut scored = Vec::new();
    for lane in &lanes {
        let (items, lane_issues) = score_lane(lane, &ctx);
        scored.extend(items);
        issues.extend(lane_issues);
    }
    let pool = aggregate(scored);

    let Some(settings) = config.filters.get(&game) else {
        issues.push(UnitIssue::MissingContext(format!("no filter settings for {game}")));
        return UnitResult::placeholder(request, kit_tier, issues, config);
    };
    if pool.is_empty() {
        return UnitResult::placeholder(request, kit_tier, issues, config);
    }

    let overlay_favorable = snapshot
        .overlays()
        .effect(&overlay, config.overlay_clamp.0, config.overlay_clamp.1)
        .is_favorable();
    let decisions = apply_filter(&pool, game, request.date, settings, overlay_favorable);
    let report = SilenceReport::from_decisions(game.code(), &decisions, settings.target_silence_rate);

    let rows = decisions
        .into_iter()
        .enumerate()
        .map(|(idx, filter)| {
            let input = DecisionInput {
                lane_id: Some(filter.scored.lane_id.as_str()),
                confidence_pct: Some(filter.scored.confidence_percent()),
                odds_one_in_n: Some(filter.scored.odds_one_in_n),
                tags: filter.scored.tags,
            };
            let mut play = decide(&request.game, &input, &config.play, config.odds.sentinel);
            if !filter.play_flag {
                play.play_flag = PlayFlag::Skip;
            }
            UnitRow {
                rank: idx + 1,
                filter,
                play,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        subscriber = %request.subscriber_id,
        game = %game,
        date = %request.date,
        candidates = rows.len(),
        surfaced = report.surfaced,
        "unit complete"
    );
    UnitResult {
        request: request.clone(),
        kit_tier,
        rows,
        placeholder: None,
        issues,
        report: Some(report),
    }
}

/// Holds the validated configuration and the current feature snapshot.
///
/// A batch reads the snapshot once at its start; [`Engine::refresh`] swaps
/// in a fully built replacement, so no unit ever sees a partial refresh.
pub struct Engine {
    config: Arc<EngineConfig>,
    strategies: Vec<Box<dyn LaneStrategy>>,
    snapshot: RwLock<Arc<FeatureSnapshot>>,
}

impl Engine {
    pub fn new(config: EngineConfig, snapshot: FeatureSnapshot) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            strategies: default_strategies(),
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Arc<FeatureSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn refresh(&self, snapshot: FeatureSnapshot) {
        let next = Arc::new(snapshot);
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        *guard = next;
        info!(as_of = ?guard.as_of, "feature snapshot swapped");
    }

    pub fn run_unit(&self, profile: Option<&SubscriberProfile>, request: &DrawRequest) -> UnitResult {
        let snapshot = self.snapshot();
        run_unit_with(&self.config, &self.strategies, &snapshot, profile, request)
    }

    /// One result per request, in request order.
    pub fn run_batch(
        &self,
        profiles: &[SubscriberProfile],
        requests: &[DrawRequest],
    ) -> Result<BatchResult, EngineError> {
        self.config.validate()?;
        let snapshot = self.snapshot();
        let by_id = profiles
            .iter()
            .map(|p| (p.subscriber_id.trim(), p))
            .collect::<HashMap<_, _>>();

        info!(units = requests.len(), subscribers = profiles.len(), "batch start");
        let units = requests
            .par_iter()
            .map(|req| {
                let profile = by_id.get(req.subscriber_id.trim()).copied();
                run_unit_with(&self.config, &self.strategies, &snapshot, profile, req)
            })
            .collect::<Vec<_>>();

        let mut reports: BTreeMap<String, SilenceReport> = BTreeMap::new();
        for unit in &units {
            for issue in &unit.issues {
                warn!(subscriber = %unit.request.subscriber_id, issue = %issue.short(), "unit issue");
            }
            let Some(report) = &unit.report else {
                continue;
            };
            match reports.get_mut(&report.game) {
                Some(total) => total.merge(report),
                None => {
                    reports.insert(report.game.clone(), report.clone());
                }
            }
        }
        for report in reports.values() {
            info!(
                game = %report.game,
                total = report.total,
                surfaced = report.surfaced,
                realized = report.realized_rate,
                target = report.target_rate,
                "silence report"
            );
        }
        Ok(BatchResult {
            snapshot_as_of: snapshot.as_of,
            units,
            reports,
        })
    }

    /// Games with history in the current snapshot.
    pub fn covered_games(&self) -> Vec<Game> {
        let snap = self.snapshot();
        SUPPORTED_GAMES
            .into_iter()
            .filter(|g| snap.digit_table(*g).is_some() || snap.ball_tables(*g).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn unknown_game_yields_single_skip_placeholder() {
        let engine = Engine::new(EngineConfig::defaults(), FeatureSnapshot::empty(d(2025, 3, 1))).unwrap();
        let profile = SubscriberProfile::new("S1", KitTier::Premium);
        let req = DrawRequest::new("S1", GameCode::parse("Keno"), d(2025, 3, 14));
        let unit = engine.run_unit(Some(&profile), &req);
        assert!(unit.rows.is_empty());
        let placeholder = unit.placeholder.unwrap();
        assert_eq!(placeholder.play_flag, PlayFlag::Skip);
        assert_eq!(unit.issues, vec![UnitIssue::UnknownGame("Keno".to_string())]);
    }

    #[test]
    fn pick_unit_without_digit_history_reports_missing_context() {
        let engine = Engine::new(EngineConfig::defaults(), FeatureSnapshot::empty(d(2025, 3, 1))).unwrap();
        let mut profile = SubscriberProfile::new("S1", KitTier::Premium);
        profile.birth_date = Some(d(1988, 6, 21));
        let req = DrawRequest::new("S1", Game::Cash3, d(2025, 3, 14)).with_session(Session::Evening);

        let unit = engine.run_unit(Some(&profile), &req);
        assert!(!unit.rows.is_empty());
        let missing = unit
            .issues
            .iter()
            .filter_map(|i| match i {
                UnitIssue::MissingContext(detail) => Some(detail.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(missing, vec!["P_A: no digit history for Cash3"]);
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut cfg = EngineConfig::defaults();
        cfg.filters.remove(&Game::Cash4);
        assert!(matches!(
            Engine::new(cfg, FeatureSnapshot::default()),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn refresh_swaps_whole_snapshot() {
        let engine = Engine::new(EngineConfig::defaults(), FeatureSnapshot::empty(d(2025, 3, 1))).unwrap();
        let before = engine.snapshot();
        engine.refresh(FeatureSnapshot::empty(d(2025, 3, 8)));
        assert_eq!(before.as_of, Some(d(2025, 3, 1)));
        assert_eq!(engine.snapshot().as_of, Some(d(2025, 3, 8)));
    }

    #[test]
    fn requests_follow_kit_and_preferences() {
        let mut basic = SubscriberProfile::new("B", KitTier::Basic);
        basic.preferred_games = vec!["Cash3".to_string(), "Powerball".to_string()];
        let premium = SubscriberProfile::new("P", KitTier::Premium);
        let reqs = requests_for(&[basic, premium], d(2025, 3, 14), &[Session::Midday, Session::Evening]);
        let basic_games = reqs
            .iter()
            .filter(|r| r.subscriber_id == "B")
            .map(|r| r.game.label().to_string())
            .collect::<Vec<_>>();
        assert_eq!(basic_games, vec!["Cash3", "Cash3"]);
        // 2 pick games x 2 sessions + 3 jackpot games
        assert_eq!(reqs.iter().filter(|r| r.subscriber_id == "P").count(), 7);
    }
}
