use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::games::{Game, JackpotRules};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PickCandidate {
    value: String,
    digits: Vec<u8>,
}

impl PickCandidate {
    pub fn parse(value: &str, arity: usize) -> Result<Self, ValidationError> {
        let value = value.trim();
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_digit()) {
            return Err(ValidationError::NonDigit(format!("{value} ({bad})")));
        }
        let digits = value.bytes().map(|b| b - b'0').collect::<Vec<_>>();
        if digits.len() != arity {
            return Err(ValidationError::WrongArity {
                expected: arity,
                actual: digits.len(),
            });
        }
        Ok(Self {
            value: value.to_string(),
            digits,
        })
    }

    pub fn from_digits(digits: &[u8], arity: usize) -> Result<Self, ValidationError> {
        if let Some(bad) = digits.iter().find(|d| **d > 9) {
            return Err(ValidationError::NonDigit(bad.to_string()));
        }
        if digits.len() != arity {
            return Err(ValidationError::WrongArity {
                expected: arity,
                actual: digits.len(),
            });
        }
        Ok(Self {
            value: digits.iter().map(|d| char::from(b'0' + d)).collect(),
            digits: digits.to_vec(),
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn digits(&self) -> &[u8] {
        &self.digits
    }

    pub fn digit_sum(&self) -> u32 {
        self.digits.iter().map(|d| u32::from(*d)).sum()
    }

    pub fn unique_count(&self) -> usize {
        self.digits.iter().collect::<BTreeSet<_>>().len()
    }

    pub fn pattern(&self) -> PatternClass {
        let unique = self.unique_count();
        let n = self.digits.len();
        match (unique, n) {
            (1, 3) => PatternClass::Triple,
            (1, 4) => PatternClass::Quad,
            (u, n) if u < n => PatternClass::Double,
            _ => PatternClass::AllUnique,
        }
    }

    pub fn tags(&self) -> PatternTags {
        let d = &self.digits;
        let n = d.len();
        let pattern = self.pattern();
        PatternTags {
            triple: pattern == PatternClass::Triple,
            quad: pattern == PatternClass::Quad,
            repeater: pattern == PatternClass::Double,
            back_pair: n >= 2 && d[n - 1] == d[n - 2] && pattern != PatternClass::Triple,
            sequential: is_full_run(d),
            near_sequential: longest_run(d) >= 3,
            all_low: n > 0 && d.iter().all(|x| *x <= 3),
        }
    }
}

fn step_run(d: &[u8], step: i16) -> usize {
    let mut best = usize::from(!d.is_empty());
    let mut cur = best;
    for pair in d.windows(2) {
        if i16::from(pair[1]) - i16::from(pair[0]) == step {
            cur += 1;
            best = best.max(cur);
        } else {
            cur = 1;
        }
    }
    best
}

fn longest_run(d: &[u8]) -> usize {
    step_run(d, 1).max(step_run(d, -1))
}

fn is_full_run(d: &[u8]) -> bool {
    d.len() >= 3 && longest_run(d) == d.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum PatternClass {
    Triple,
    Quad,
    Double,
    AllUnique,
}

impl PatternClass {
    pub fn label(self) -> &'static str {
        match self {
            PatternClass::Triple => "TRIPLE",
            PatternClass::Quad => "QUAD",
            PatternClass::Double => "DOUBLE",
            PatternClass::AllUnique => "ALL-UNIQUE",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternTags {
    pub triple: bool,
    pub quad: bool,
    pub repeater: bool,
    pub back_pair: bool,
    pub sequential: bool,
    pub near_sequential: bool,
    pub all_low: bool,
}

impl PatternTags {
    pub fn labels(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        for (on, label) in [
            (self.triple, "TRIPLE"),
            (self.quad, "QUAD"),
            (self.repeater, "REPEATER"),
            (self.back_pair, "BACKPAIR"),
            (self.sequential, "SEQUENTIAL"),
            (self.near_sequential, "NEAR_SEQUENTIAL"),
            (self.all_low, "ALL_LOW"),
        ] {
            if on {
                out.push(label);
            }
        }
        out
    }

    pub fn any_repeat(&self) -> bool {
        self.triple || self.quad || self.repeater || self.back_pair
    }
}

/// Five distinct main numbers (kept ascending) plus an optional bonus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JackpotCandidate {
    main_numbers: Vec<u8>,
    bonus_numbers: Vec<u8>,
}

impl JackpotCandidate {
    pub fn new(main: &[u8], bonus: &[u8], rules: &JackpotRules) -> Result<Self, ValidationError> {
        if main.len() != rules.main_count {
            return Err(ValidationError::WrongCount {
                field: "main",
                expected: rules.main_count,
                actual: main.len(),
            });
        }
        if bonus.len() > rules.bonus_count {
            return Err(ValidationError::WrongCount {
                field: "bonus",
                expected: rules.bonus_count,
                actual: bonus.len(),
            });
        }
        let mut seen = BTreeSet::new();
        for n in main {
            if *n == 0 || *n > rules.main_max {
                return Err(ValidationError::OutOfRange {
                    field: "main",
                    value: *n,
                    max: rules.main_max,
                });
            }
            if !seen.insert(*n) {
                return Err(ValidationError::Duplicate(*n));
            }
        }
        for b in bonus {
            if *b == 0 || *b > rules.bonus_max {
                return Err(ValidationError::OutOfRange {
                    field: "bonus",
                    value: *b,
                    max: rules.bonus_max,
                });
            }
        }
        Ok(Self {
            main_numbers: seen.into_iter().collect(),
            bonus_numbers: bonus.to_vec(),
        })
    }

    pub fn main_numbers(&self) -> &[u8] {
        &self.main_numbers
    }

    pub fn bonus(&self) -> Option<u8> {
        self.bonus_numbers.first().copied()
    }

    pub fn main_sum(&self) -> u32 {
        self.main_numbers.iter().map(|n| u32::from(*n)).sum()
    }

    pub fn key(&self) -> String {
        let main = self
            .main_numbers
            .iter()
            .map(|n| format!("{n:02}"))
            .collect::<Vec<_>>()
            .join("-");
        match self.bonus() {
            Some(b) => format!("{main}+{b:02}"),
            None => main,
        }
    }

    /// Printed ticket line, e.g. `05-12-23-45-50 | Mega 10`.
    pub fn ticket(&self, bonus_label: &str) -> String {
        let main = self
            .main_numbers
            .iter()
            .map(|n| format!("{n:02}"))
            .collect::<Vec<_>>()
            .join("-");
        match self.bonus() {
            Some(b) => format!("{main} | {bonus_label} {b:02}"),
            None => main,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Candidate {
    Pick(PickCandidate),
    Jackpot(JackpotCandidate),
}

impl Candidate {
    /// Canonical dedupe key.
    pub fn value_key(&self) -> String {
        match self {
            Candidate::Pick(p) => p.value().to_string(),
            Candidate::Jackpot(j) => j.key(),
        }
    }

    pub fn display(&self, game: Game) -> String {
        match self {
            Candidate::Pick(p) => p.value().to_string(),
            Candidate::Jackpot(j) => {
                let label = game.jackpot_rules().map(|r| r.bonus_label).unwrap_or("Bonus");
                j.ticket(label)
            }
        }
    }

    pub fn tags(&self) -> PatternTags {
        match self {
            Candidate::Pick(p) => p.tags(),
            Candidate::Jackpot(_) => PatternTags::default(),
        }
    }

    /// Re-checks a candidate against the rules of the game it will be scored for.
    pub fn validate_for(&self, game: Game) -> Result<(), ValidationError> {
        match (self, game.pick_arity(), game.jackpot_rules()) {
            (Candidate::Pick(p), Some(arity), _) => {
                PickCandidate::from_digits(p.digits(), arity).map(|_| ())
            }
            (Candidate::Jackpot(j), _, Some(rules)) => {
                let bonus = j.bonus().into_iter().collect::<Vec<_>>();
                JackpotCandidate::new(j.main_numbers(), &bonus, &rules).map(|_| ())
            }
            _ => Err(ValidationError::KindMismatch(game.code().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_parse_rejects_malformed() {
        assert!(PickCandidate::parse("12a", 3).is_err());
        assert_eq!(
            PickCandidate::parse("1234", 3),
            Err(ValidationError::WrongArity {
                expected: 3,
                actual: 4
            })
        );
        let ok = PickCandidate::parse("072", 3).unwrap();
        assert_eq!(ok.digits(), &[0, 7, 2]);
        assert_eq!(ok.digit_sum(), 9);
    }

    #[test]
    fn pick_tags() {
        let triple = PickCandidate::parse("333", 3).unwrap().tags();
        assert!(triple.triple && !triple.back_pair && triple.all_low);

        let back = PickCandidate::parse("8155", 4).unwrap().tags();
        assert!(back.repeater && back.back_pair && !back.quad);

        let seq = PickCandidate::parse("6543", 4).unwrap().tags();
        assert!(seq.sequential && seq.near_sequential);

        let near = PickCandidate::parse("1239", 4).unwrap().tags();
        assert!(!near.sequential && near.near_sequential);

        assert_eq!(triple.labels(), vec!["TRIPLE", "ALL_LOW"]);
        assert_eq!(back.labels(), vec!["REPEATER", "BACKPAIR"]);
        assert!(PatternTags::default().labels().is_empty());
    }

    #[test]
    fn jackpot_validation_and_key() {
        let rules = Game::MegaMillions.jackpot_rules().unwrap();
        let c = JackpotCandidate::new(&[50, 5, 23, 12, 45], &[10], &rules).unwrap();
        assert_eq!(c.key(), "05-12-23-45-50+10");
        assert_eq!(c.ticket("Mega"), "05-12-23-45-50 | Mega 10");

        assert_eq!(
            JackpotCandidate::new(&[5, 5, 23, 12, 45], &[10], &rules),
            Err(ValidationError::Duplicate(5))
        );
        assert!(JackpotCandidate::new(&[5, 6, 23, 12, 71], &[10], &rules).is_err());
        assert!(JackpotCandidate::new(&[5, 6, 23, 12], &[10], &rules).is_err());
        assert!(JackpotCandidate::new(&[5, 6, 23, 12, 40], &[26], &rules).is_err());
    }

    #[test]
    fn validate_for_rejects_kind_mismatch() {
        let pick = Candidate::Pick(PickCandidate::parse("123", 3).unwrap());
        assert!(pick.validate_for(Game::Cash3).is_ok());
        assert!(pick.validate_for(Game::Cash4).is_err());
        assert!(pick.validate_for(Game::Powerball).is_err());
    }
}
