//! Per-chromosome grouping and headline selection.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::AggregationError;
use crate::results::table::{ResultsTable, ScoreColumn};
use crate::types::Chromosome;

/// Base URL of the UCSC genome browser track view.
pub const GENOME_BROWSER_BASE: &str = "http://genome.ucsc.edu/cgi-bin/hgTracks";

/// Column names the grouping reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub chromosome: String,
    pub start: String,
    pub end: String,
    pub score: ScoreColumn,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            chromosome: "Chr".to_string(),
            start: "Start".to_string(),
            end: "End".to_string(),
            score: ScoreColumn::default(),
        }
    }
}

impl TableLayout {
    pub fn with_score(score: ScoreColumn) -> Self {
        Self {
            score,
            ..Self::default()
        }
    }
}

/// Rows sharing one chromosome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChromosomeGroup {
    pub chromosome: Chromosome,
    /// Indices into the table's rows, in file order.
    pub rows: Vec<usize>,
    pub count: usize,
    /// Index of the first row carrying the group's maximum score.
    pub max_score_row: usize,
    pub max_score: f64,
    /// Workspace-relative path of the correlated image, if any.
    pub image: Option<String>,
    /// Workspace-relative path of the image's thumbnail, if any.
    pub thumbnail: Option<String>,
}

/// The row with the globally highest score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadlineRegion {
    pub chromosome: Chromosome,
    pub start: String,
    pub end: String,
    pub row: usize,
    pub score: f64,
}

impl HeadlineRegion {
    /// `start-end`, e.g. `150-250`.
    pub fn coordinates(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }

    /// `chr<c>:start-end`, e.g. `chr2:150-250`.
    pub fn locus(&self) -> String {
        format!("chr{}:{}", self.chromosome, self.coordinates())
    }

    /// Link to the region in the UCSC browser, optionally with a custom track.
    pub fn genome_browser_url(&self, build: &str, track_url: Option<&str>) -> String {
        let mut url = format!(
            "{GENOME_BROWSER_BASE}?db={build}&position={}&org=human",
            self.locus()
        );
        if let Some(track) = track_url {
            url.push_str("&hgt.customText=");
            url.push_str(track);
        }
        url
    }
}

/// Grouping result: groups keyed by chromosome plus the headline row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grouping {
    pub groups: BTreeMap<Chromosome, ChromosomeGroup>,
    pub headline: Option<HeadlineRegion>,
}

/// Group the table's rows by chromosome and locate per-group and global maxima.
///
/// Ties keep the first row in file order. An empty table yields an empty
/// grouping without resolving any column.
pub fn group_rows(
    table: &ResultsTable,
    layout: &TableLayout,
) -> Result<Grouping, AggregationError> {
    if table.rows.is_empty() {
        return Ok(Grouping::default());
    }

    let chr_idx = table.require_column(&layout.chromosome)?;
    let start_idx = table.require_column(&layout.start)?;
    let end_idx = table.require_column(&layout.end)?;
    let score_idx = layout.score.resolve(table)?;

    let mut groups: BTreeMap<Chromosome, ChromosomeGroup> = BTreeMap::new();
    let mut best: Option<(usize, f64, Chromosome)> = None;

    for (index, row) in table.rows.iter().enumerate() {
        let raw_chr = row.get_index(chr_idx).unwrap_or_default();
        let chromosome: Chromosome =
            raw_chr
                .parse()
                .map_err(|_| AggregationError::InvalidChromosomeValue {
                    line: row.line,
                    value: raw_chr.to_string(),
                })?;

        let raw_score = row.get_index(score_idx).unwrap_or_default();
        let score = raw_score
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite())
            .ok_or_else(|| AggregationError::InvalidScoreValue {
                line: row.line,
                value: raw_score.to_string(),
            })?;

        let group = groups
            .entry(chromosome)
            .or_insert_with(|| ChromosomeGroup {
                chromosome,
                rows: Vec::new(),
                count: 0,
                max_score_row: index,
                max_score: score,
                image: None,
                thumbnail: None,
            });
        group.rows.push(index);
        group.count += 1;
        if score > group.max_score {
            group.max_score = score;
            group.max_score_row = index;
        }

        if best.is_none_or(|(_, top, _)| score > top) {
            best = Some((index, score, chromosome));
        }
    }

    let headline = best.map(|(index, score, chromosome)| {
        let row = &table.rows[index];
        HeadlineRegion {
            chromosome,
            start: row.get_index(start_idx).unwrap_or_default().to_string(),
            end: row.get_index(end_idx).unwrap_or_default().to_string(),
            row: index,
            score,
        }
    });

    Ok(Grouping { groups, headline })
}
