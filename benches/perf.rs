use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::NaiveDate;

use draw_kit::config::EngineConfig;
use draw_kit::games::{Game, KitTier, Session};
use draw_kit::history::{DigitTable, FeatureSnapshot, SnapshotFile};
use draw_kit::pipeline::{DrawRequest, Engine, requests_for};
use draw_kit::subscriber::SubscriberProfile;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn snapshot() -> FeatureSnapshot {
    let file: SnapshotFile = serde_json::from_str(HISTORY_JSON).expect("valid fixture json");
    FeatureSnapshot::from_file(file, d(2025, 3, 13))
}

fn profiles(n: usize) -> Vec<SubscriberProfile> {
    (0..n)
        .map(|i| {
            let tier = match i % 3 {
                0 => KitTier::Basic,
                1 => KitTier::Standard,
                _ => KitTier::Premium,
            };
            let mut p = SubscriberProfile::new(format!("S-{i:04}"), tier);
            p.birth_date = NaiveDate::from_ymd_opt(1960 + (i % 40) as i32, 1 + (i % 12) as u32, 1 + (i % 28) as u32);
            p.seed_values = vec![format!("{}", 100 + i * 7)];
            p
        })
        .collect()
}

fn bench_digit_table(c: &mut Criterion) {
    let draws = (0..2000).map(|i| format!("{:03}", (i * 37) % 1000)).collect::<Vec<_>>();
    c.bench_function("digit_table_build", |b| {
        b.iter(|| {
            let table = DigitTable::from_draws(black_box(&draws));
            black_box(table.hottest());
        })
    });
}

fn bench_run_unit(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::defaults(), snapshot()).unwrap();
    let profile = profiles(3).pop().unwrap();
    let pick = DrawRequest::new(profile.subscriber_id.clone(), Game::Cash4, d(2025, 3, 14)).with_session(Session::Evening);
    let jackpot = DrawRequest::new(profile.subscriber_id.clone(), Game::MegaMillions, d(2025, 3, 14));

    c.bench_function("run_unit_pick", |b| {
        b.iter(|| black_box(engine.run_unit(Some(&profile), black_box(&pick))))
    });
    c.bench_function("run_unit_jackpot", |b| {
        b.iter(|| black_box(engine.run_unit(Some(&profile), black_box(&jackpot))))
    });
}

fn bench_run_batch(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::defaults(), snapshot()).unwrap();
    let profiles = profiles(200);
    let requests = requests_for(&profiles, d(2025, 3, 14), &[Session::Midday, Session::Evening]);

    c.bench_function("run_batch_200_subscribers", |b| {
        b.iter(|| {
            let batch = engine.run_batch(&profiles, black_box(&requests)).unwrap();
            black_box(batch.units.len());
        })
    });
}

criterion_group!(benches, bench_digit_table, bench_run_unit, bench_run_batch);
criterion_main!(benches);

const HISTORY_JSON: &str = r#"{
  "asOf": "2025-03-13",
  "pickDraws": {
    "Cash3": ["331", "970", "154", "404", "666", "049", "074", "840", "548", "096", "374", "596"],
    "Cash4": ["3657", "9551", "1013", "9455", "9593", "6499", "0812", "3622", "0763", "4410"]
  },
  "jackpotStats": [
    {
      "game": "MegaMillions",
      "draw_count": 52,
      "main_balls": {
        "3": {"frequency": 9, "last_seen": "2025-03-11"},
        "10": {"frequency": 4, "last_seen": "2025-01-02"},
        "17": {"frequency": 12, "last_seen": "2025-03-07"},
        "24": {"frequency": 6, "last_seen": "2024-12-20"},
        "31": {"frequency": 7, "last_seen": "2025-02-14"},
        "38": {"frequency": 2, "last_seen": "2024-11-30"},
        "45": {"frequency": 11, "last_seen": "2025-03-04"},
        "52": {"frequency": 5, "last_seen": "2025-01-21"},
        "59": {"frequency": 8, "last_seen": "2025-02-25"},
        "66": {"frequency": 3, "last_seen": "2024-10-15"}
      },
      "bonus_balls": {
        "4": {"frequency": 5, "last_seen": "2025-03-07"},
        "12": {"frequency": 3, "last_seen": "2025-01-10"},
        "22": {"frequency": 2, "last_seen": "2024-12-03"}
      }
    }
  ]
}"#;
