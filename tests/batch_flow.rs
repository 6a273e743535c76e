use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use draw_kit::config::EngineConfig;
use draw_kit::error::UnitIssue;
use draw_kit::export::{self, COLUMNS, ExportRow, SheetCell};
use draw_kit::games::{Game, GameCode, KitTier, Session};
use draw_kit::history::FeatureSnapshot;
use draw_kit::pipeline::{DrawRequest, Engine, requests_for};
use draw_kit::play_type::PlayFlag;
use draw_kit::subscriber::SubscriberProfile;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn profiles() -> Vec<SubscriberProfile> {
    let raw = fs::read_to_string(fixture_path("subscribers.json")).expect("fixture file should be readable");
    serde_json::from_str(&raw).expect("fixture should parse")
}

fn engine() -> Engine {
    let snapshot = FeatureSnapshot::load(&fixture_path("history.json"), d(2025, 3, 13)).expect("history fixture");
    Engine::new(EngineConfig::defaults(), snapshot).expect("default config is valid")
}

#[test]
fn fixture_history_covers_every_game() {
    let engine = engine();
    assert_eq!(engine.covered_games().len(), 5);
    assert_eq!(engine.snapshot().as_of, Some(d(2025, 3, 13)));
}

#[test]
fn same_inputs_give_identical_rows() {
    let profiles = profiles();
    let requests = requests_for(&profiles, d(2025, 3, 14), &[Session::Midday, Session::Evening]);

    let first = engine().run_batch(&profiles, &requests).unwrap();
    let second = engine().run_batch(&profiles, &requests).unwrap();
    assert_eq!(export::batch_rows(&first), export::batch_rows(&second));
    assert_eq!(first.units.len(), requests.len());
    for (unit, req) in first.units.iter().zip(&requests) {
        assert_eq!(&unit.request, req);
    }
}

#[test]
fn every_unit_yields_at_least_one_row() {
    let profiles = profiles();
    let mut requests = requests_for(&profiles, d(2025, 3, 14), &[Session::Evening]);
    requests.push(DrawRequest::new("P-100", GameCode::parse("Keno"), d(2025, 3, 14)));
    requests.push(DrawRequest::new("ghost", Game::Cash4, d(2025, 3, 14)));

    let batch = engine().run_batch(&profiles, &requests).unwrap();
    for unit in &batch.units {
        assert!(!export::unit_rows(unit).is_empty(), "{:?}", unit.request);
    }

    let keno = &batch.units[requests.len() - 2];
    let placeholder = keno.placeholder.as_ref().unwrap();
    assert_eq!(placeholder.play_flag, PlayFlag::Skip);
    assert_eq!(placeholder.legend_code.code(), "GEN_STD");

    let ghost = &batch.units[requests.len() - 1];
    assert!(ghost.issues.contains(&UnitIssue::MissingProfile("ghost".to_string())));
    assert!(!ghost.rows.is_empty());
}

#[test]
fn basic_kit_never_reaches_jackpot_games() {
    let profiles = profiles();
    let basic = profiles.iter().find(|p| p.kit_tier == KitTier::Basic).unwrap();
    let req = DrawRequest::new(basic.subscriber_id.clone(), Game::Powerball, d(2025, 3, 14));

    let unit = engine().run_unit(Some(basic), &req);
    assert!(unit.rows.is_empty());
    assert!(matches!(unit.issues.as_slice(), [UnitIssue::NotInKit(_)]));

    let pick = DrawRequest::new(basic.subscriber_id.clone(), Game::Cash3, d(2025, 3, 14)).with_session(Session::Midday);
    let unit = engine().run_unit(Some(basic), &pick);
    let lanes = unit
        .rows
        .iter()
        .flat_map(|r| r.filter.scored.lane_sources.iter().cloned())
        .collect::<BTreeSet<_>>();
    assert!(!lanes.contains("P_D"));
}

#[test]
fn jackpot_without_history_degrades_to_context_free_lanes() {
    let engine = Engine::new(EngineConfig::defaults(), FeatureSnapshot::empty(d(2025, 3, 13))).unwrap();
    let profile = profiles().into_iter().find(|p| p.kit_tier == KitTier::Premium).unwrap();
    let req = DrawRequest::new(profile.subscriber_id.clone(), Game::MegaMillions, d(2025, 3, 14));

    let unit = engine.run_unit(Some(&profile), &req);
    let missing = unit
        .issues
        .iter()
        .filter(|i| matches!(i, UnitIssue::MissingContext(_)))
        .count();
    assert_eq!(missing, 2);
    assert!(!unit.rows.is_empty());
    for row in &unit.rows {
        for lane in &row.filter.scored.lane_sources {
            assert!(lane == "J_B" || lane == "J_C", "{lane}");
        }
        let pct = row.filter.scored.confidence_percent();
        assert!((2.0..=5.0).contains(&pct), "{pct}");
    }
}

#[test]
fn silenced_rows_are_flagged_skip() {
    let profiles = profiles();
    let requests = requests_for(&profiles, d(2025, 3, 14), &[Session::Evening]);
    let batch = engine().run_batch(&profiles, &requests).unwrap();
    for unit in &batch.units {
        for row in &unit.rows {
            if !row.filter.play_flag {
                assert_eq!(row.play.play_flag, PlayFlag::Skip);
            }
        }
    }
    assert!(!batch.reports.is_empty());
    for report in batch.reports.values() {
        assert_eq!(report.surfaced + report.silenced, report.total);
        assert!(report.silenced > 0);
    }

    let surfaced_rows = batch.units.iter().map(|u| u.surfaced().count()).sum::<usize>();
    let surfaced_reported = batch.reports.values().map(|r| r.surfaced).sum::<usize>();
    assert_eq!(surfaced_rows, surfaced_reported);
    for unit in &batch.units {
        assert!(unit.surfaced().all(|row| row.play.play_flag != PlayFlag::Skip));
    }
}

#[test]
fn export_rows_share_one_column_set() {
    let profiles = profiles();
    let mut requests = requests_for(&profiles, d(2025, 3, 14), &[Session::Midday]);
    requests.push(DrawRequest::new("P-100", GameCode::parse(""), d(2025, 3, 14)));
    let batch = engine().run_batch(&profiles, &requests).unwrap();
    let rows = export::batch_rows(&batch);

    let expected = COLUMNS.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>();
    for row in &rows {
        let value = serde_json::to_value(row).unwrap();
        let keys = value.as_object().unwrap().keys().cloned().collect::<BTreeSet<_>>();
        assert_eq!(keys, expected);
        let cells = row.sheet_cells();
        assert_eq!(cells.len(), COLUMNS.len());
        if row.rank.is_some() {
            let rank_col = COLUMNS.iter().position(|c| *c == "rank").unwrap();
            let conf_col = COLUMNS.iter().position(|c| *c == "confidencePercent").unwrap();
            assert!(matches!(cells[rank_col], SheetCell::Number(_)));
            assert!(matches!(cells[conf_col], SheetCell::Number(_)));
        }
    }
    let unknown = rows.last().unwrap();
    assert_eq!(unknown.game, "UNKNOWN");
    assert_eq!(unknown.candidate_value, None);
    assert_eq!(unknown.play_flag, "SKIP");
    assert_eq!(unknown.sheet_cells()[5], SheetCell::Blank);
}

#[test]
fn writers_produce_json_and_workbook() {
    let profiles = profiles();
    let requests = requests_for(&profiles, d(2025, 3, 14), &[Session::Evening]);
    let batch = engine().run_batch(&profiles, &requests).unwrap();
    let rows = export::batch_rows(&batch);

    let dir = tempfile::tempdir().unwrap();
    let json_path = dir.path().join("out").join("plays.json");
    export::write_json(&json_path, &rows).unwrap();
    let back: Vec<ExportRow> = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(back.len(), rows.len());
    assert!(!json_path.with_extension("json.tmp").exists());

    let xlsx_path = dir.path().join("plays.xlsx");
    let written = export::write_xlsx(&xlsx_path, &batch).unwrap();
    assert_eq!(written, rows.len());
    assert!(fs::metadata(&xlsx_path).unwrap().len() > 0);
}
