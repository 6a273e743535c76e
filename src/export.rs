use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::{Deserialize, Serialize};

use crate::pipeline::{BatchResult, UnitResult};
use crate::play_type::PlayDecision;

/// Column order of the flat export. Identical for every game.
pub const COLUMNS: [&str; 19] = [
    "subscriberId",
    "game",
    "drawDate",
    "session",
    "kitTier",
    "rank",
    "candidateValue",
    "confidencePercent",
    "oddsText",
    "band",
    "playFlag",
    "primaryPlayType",
    "bobSuggestion",
    "legendCode",
    "legendText",
    "silenceReason",
    "silenceScore",
    "laneSources",
    "issues",
];

/// One flat output row. Placeholder rows carry `null` in every
/// candidate-derived column; no key is ever omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub subscriber_id: String,
    pub game: String,
    pub draw_date: String,
    pub session: Option<String>,
    pub kit_tier: Option<String>,
    pub rank: Option<usize>,
    pub candidate_value: Option<String>,
    pub confidence_percent: Option<f64>,
    pub odds_text: Option<String>,
    pub band: Option<String>,
    pub play_flag: String,
    pub primary_play_type: String,
    pub bob_suggestion: String,
    pub legend_code: String,
    pub legend_text: String,
    pub silence_reason: Option<String>,
    pub silence_score: Option<f64>,
    pub lane_sources: String,
    pub issues: String,
}

pub fn odds_text(odds: u64) -> String {
    format!("1-in-{odds}")
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn base_row(unit: &UnitResult, play: &PlayDecision) -> ExportRow {
    ExportRow {
        subscriber_id: unit.request.subscriber_id.clone(),
        game: unit.request.game.label().to_string(),
        draw_date: unit.request.date.format("%Y-%m-%d").to_string(),
        session: unit.request.session.map(|s| s.label().to_string()),
        kit_tier: unit.kit_tier.map(|k| k.label().to_string()),
        rank: None,
        candidate_value: None,
        confidence_percent: None,
        odds_text: None,
        band: None,
        play_flag: play.play_flag.label().to_string(),
        primary_play_type: play.primary_play_type.label().to_string(),
        bob_suggestion: play.bob_suggestion.label().to_string(),
        legend_code: play.legend_code.code(),
        legend_text: play.legend_code.description(),
        silence_reason: None,
        silence_score: None,
        lane_sources: String::new(),
        issues: unit.issues.iter().map(|i| i.short()).collect::<Vec<_>>().join("; "),
    }
}

/// Always at least one row per unit.
pub fn unit_rows(unit: &UnitResult) -> Vec<ExportRow> {
    if let Some(play) = &unit.placeholder {
        return vec![base_row(unit, play)];
    }
    unit.rows
        .iter()
        .map(|row| {
            let scored = &row.filter.scored;
            let mut out = base_row(unit, &row.play);
            out.rank = Some(row.rank);
            out.candidate_value = Some(scored.candidate.display(scored.game));
            out.confidence_percent = Some(round_to(scored.confidence_percent(), 2));
            out.odds_text = Some(odds_text(scored.odds_one_in_n));
            out.band = Some(scored.band.label().to_string());
            out.silence_reason = Some(row.filter.silence_reason.label().to_string());
            out.silence_score = Some(round_to(row.filter.silence_score, 4));
            out.lane_sources = scored.lane_sources.join(",");
            out
        })
        .collect()
}

pub fn batch_rows(batch: &BatchResult) -> Vec<ExportRow> {
    batch.units.iter().flat_map(unit_rows).collect()
}

pub fn write_json(path: &Path, rows: &[ExportRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(rows).context("serialize export rows")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

/// A workbook cell; numeric columns stay numeric in the sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetCell {
    Text(String),
    Number(f64),
    Blank,
}

impl From<String> for SheetCell {
    fn from(value: String) -> Self {
        SheetCell::Text(value)
    }
}

impl From<&str> for SheetCell {
    fn from(value: &str) -> Self {
        SheetCell::Text(value.to_string())
    }
}

fn text_or_blank(value: &Option<String>) -> SheetCell {
    value.clone().map_or(SheetCell::Blank, SheetCell::Text)
}

fn number_or_blank(value: Option<f64>) -> SheetCell {
    value.map_or(SheetCell::Blank, SheetCell::Number)
}

impl ExportRow {
    /// Typed cells in [`COLUMNS`] order for the `Plays` sheet.
    pub fn sheet_cells(&self) -> Vec<SheetCell> {
        vec![
            self.subscriber_id.as_str().into(),
            self.game.as_str().into(),
            self.draw_date.as_str().into(),
            text_or_blank(&self.session),
            text_or_blank(&self.kit_tier),
            number_or_blank(self.rank.map(|r| r as f64)),
            text_or_blank(&self.candidate_value),
            number_or_blank(self.confidence_percent),
            text_or_blank(&self.odds_text),
            text_or_blank(&self.band),
            self.play_flag.as_str().into(),
            self.primary_play_type.as_str().into(),
            self.bob_suggestion.as_str().into(),
            self.legend_code.as_str().into(),
            self.legend_text.as_str().into(),
            text_or_blank(&self.silence_reason),
            number_or_blank(self.silence_score),
            self.lane_sources.as_str().into(),
            self.issues.as_str().into(),
        ]
    }
}

fn header(names: &[&str]) -> Vec<SheetCell> {
    names.iter().map(|n| SheetCell::from(*n)).collect()
}

pub fn write_xlsx(path: &Path, batch: &BatchResult) -> Result<usize> {
    let rows = batch_rows(batch);

    let mut plays = vec![header(&COLUMNS)];
    plays.extend(rows.iter().map(ExportRow::sheet_cells));

    let mut legend = BTreeMap::new();
    for row in &rows {
        legend
            .entry(row.legend_code.clone())
            .or_insert_with(|| row.legend_text.clone());
    }
    let mut legend_rows = vec![header(&["Code", "Meaning"])];
    legend_rows.extend(
        legend
            .into_iter()
            .map(|(code, text)| vec![SheetCell::Text(code), SheetCell::Text(text)]),
    );

    let mut report_rows = vec![header(&[
        "Game",
        "Total",
        "Surfaced",
        "Silenced",
        "Realized %",
        "Target %",
        "Within Tolerance",
    ])];
    for report in batch.reports.values() {
        report_rows.push(vec![
            report.game.as_str().into(),
            SheetCell::Number(report.total as f64),
            SheetCell::Number(report.surfaced as f64),
            SheetCell::Number(report.silenced as f64),
            SheetCell::Number(round_to(report.realized_rate * 100.0, 1)),
            SheetCell::Number(round_to(report.target_rate * 100.0, 1)),
            SheetCell::from(if report.within_tolerance { "yes" } else { "no" }),
        ]);
    }

    let mut workbook = Workbook::new();
    for (name, sheet_rows) in [
        ("Plays", &plays),
        ("Legend", &legend_rows),
        ("SilenceReport", &report_rows),
    ] {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        write_sheet(sheet, sheet_rows).with_context(|| format!("fill sheet {name}"))?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(rows.len())
}

fn write_sheet(sheet: &mut Worksheet, rows: &[Vec<SheetCell>]) -> Result<()> {
    for (r, cells) in rows.iter().enumerate() {
        let row = u32::try_from(r).context("too many rows for one sheet")?;
        for (c, cell) in cells.iter().enumerate() {
            let col = u16::try_from(c).context("too many columns for one sheet")?;
            match cell {
                SheetCell::Text(value) => {
                    sheet.write_string(row, col, value)?;
                }
                SheetCell::Number(value) => {
                    sheet.write_number(row, col, *value)?;
                }
                SheetCell::Blank => {}
            }
        }
    }
    Ok(())
}
