use std::cmp::Ordering;
use std::collections::HashMap;

use crate::scoring::ScoredCandidate;

/// Ranking order: confidence descending, then earliest lane and position,
/// then the smaller value.
pub fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then(a.lane_index.cmp(&b.lane_index))
        .then(a.position.cmp(&b.position))
        .then_with(|| a.value_key().cmp(&b.value_key()))
}

/// Merges lane output into one pool keeping the best occurrence of each value.
/// Lane sources of dropped duplicates are merged onto the survivor.
pub fn aggregate<I>(scored: I) -> Vec<ScoredCandidate>
where
    I: IntoIterator<Item = ScoredCandidate>,
{
    let mut best: HashMap<String, ScoredCandidate> = HashMap::new();
    for item in scored {
        let key = item.value_key();
        match best.get_mut(&key) {
            None => {
                best.insert(key, item);
            }
            Some(current) => {
                let mut sources = current.lane_sources.clone();
                for src in &item.lane_sources {
                    if !sources.contains(src) {
                        sources.push(src.clone());
                    }
                }
                if rank_order(&item, current) == Ordering::Less {
                    *current = item;
                }
                current.lane_sources = sources;
            }
        }
    }
    let mut pool = best.into_values().collect::<Vec<_>>();
    for item in &mut pool {
        item.lane_sources.sort();
    }
    pool.sort_by(rank_order);
    pool
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::candidate::{Candidate, PickCandidate};
    use crate::games::Game;
    use crate::scoring::Band;

    fn item(value: &str, confidence: f64, lane_index: usize, position: usize) -> ScoredCandidate {
        let c = PickCandidate::parse(value, 3).unwrap();
        ScoredCandidate {
            tags: c.tags(),
            candidate: Candidate::Pick(c),
            game: Game::Cash3,
            lane_id: format!("P_{lane_index}"),
            lane_index,
            position,
            confidence,
            odds_one_in_n: 10,
            band: Band::Green,
            component_breakdown: BTreeMap::new(),
            debug_meta: BTreeMap::new(),
            lane_sources: vec![format!("P_{lane_index}")],
        }
    }

    #[test]
    fn keeps_highest_confidence_occurrence() {
        let pool = aggregate(vec![
            item("123", 0.05, 0, 0),
            item("456", 0.07, 0, 1),
            item("123", 0.09, 2, 0),
        ]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[0].value_key(), "123");
        assert_eq!(pool[0].lane_index, 2);
        assert_eq!(pool[0].lane_sources, vec!["P_0".to_string(), "P_2".to_string()]);
    }

    #[test]
    fn ties_prefer_earliest_lane_then_smaller_value() {
        let pool = aggregate(vec![
            item("999", 0.05, 1, 0),
            item("555", 0.05, 0, 3),
            item("111", 0.05, 1, 0),
            item("555", 0.05, 2, 0),
        ]);
        let keys = pool.iter().map(ScoredCandidate::value_key).collect::<Vec<_>>();
        assert_eq!(keys, vec!["555", "111", "999"]);
        assert_eq!(pool[0].lane_index, 0);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let once = aggregate(vec![
            item("321", 0.04, 0, 0),
            item("321", 0.06, 1, 2),
            item("777", 0.06, 1, 1),
            item("010", 0.02, 3, 0),
        ]);
        let twice = aggregate(once.clone());
        assert_eq!(once, twice);
    }
}
