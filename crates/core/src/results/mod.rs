//! Result aggregation over a finished job workspace.
//!
//! [`ResultAggregator::aggregate`] classifies the workspace files, parses the
//! results table, groups rows per chromosome, correlates plots to groups and
//! makes sure every plot has a thumbnail. It must only run once the job has
//! reached a terminal state; the workspace is then no longer being written.

pub mod classify;
pub mod groups;
pub mod images;
pub mod table;
pub mod thumbnail;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::AggregationError;
use crate::redact::PathRedactor;
use crate::types::Chromosome;

use classify::scan_workspace;
use groups::{group_rows, ChromosomeGroup, HeadlineRegion, TableLayout};
use table::{parse_table, Row};
use thumbnail::{ensure_thumbnail, thumbnail_name, ThumbnailMode};

/// Everything derived from one workspace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub chromosome_groups: BTreeMap<Chromosome, ChromosomeGroup>,
    pub headline: Option<HeadlineRegion>,
    /// Source plots, sorted, relative to the workspace.
    pub images: Vec<String>,
    /// Thumbnails present after aggregation, sorted.
    pub thumbnails: Vec<String>,
    pub table_file: String,
    pub region_file: Option<String>,
}

/// Builds a [`ResultSet`] from a workspace directory.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    layout: TableLayout,
    thumbnail_mode: ThumbnailMode,
    redactor: PathRedactor,
}

impl ResultAggregator {
    /// Aggregator for `config`; server paths are stripped from table fields.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            layout: TableLayout::with_score(config.score_column.clone()),
            thumbnail_mode: config.thumbnail_mode,
            redactor: config.path_redactor(),
        }
    }

    pub fn with_layout(layout: TableLayout, thumbnail_mode: ThumbnailMode) -> Self {
        Self {
            layout,
            thumbnail_mode,
            redactor: PathRedactor::default(),
        }
    }

    pub fn aggregate(&self, workspace: &Path) -> Result<ResultSet, AggregationError> {
        let files = scan_workspace(workspace)?;
        let table_file = files.results_table()?.to_string();

        let table_path = workspace.join(&table_file);
        let bytes = std::fs::read(&table_path).map_err(|e| AggregationError::io(&table_path, e))?;
        let text = self.redactor.redact(&String::from_utf8_lossy(&bytes));
        let table = parse_table(&text)?;
        let grouping = group_rows(&table, &self.layout)?;

        let thumbnails = self.ensure_thumbnails(workspace, &files);

        let mut chromosome_groups = grouping.groups;
        for group in chromosome_groups.values_mut() {
            group.image = images::find_image(&files.images, group.chromosome).map(str::to_string);
            group.thumbnail = group
                .image
                .as_deref()
                .map(thumbnail_name)
                .filter(|t| thumbnails.binary_search(t).is_ok());
        }

        tracing::info!(
            workspace = %workspace.display(),
            table = %table_file,
            rows = table.rows.len(),
            groups = chromosome_groups.len(),
            images = files.images.len(),
            "Workspace aggregated",
        );

        Ok(ResultSet {
            columns: table.columns,
            rows: table.rows,
            chromosome_groups,
            headline: grouping.headline,
            region_file: files.region_file().map(str::to_string),
            images: files.images,
            thumbnails,
            table_file,
        })
    }

    /// Generate missing or unreadable thumbnails. A plot that cannot be
    /// decoded is logged and left without a thumbnail; it does not fail the
    /// aggregation.
    fn ensure_thumbnails(&self, workspace: &Path, files: &classify::WorkspaceFiles) -> Vec<String> {
        let mut thumbnails = files.thumbnails.clone();
        for image in &files.images {
            match ensure_thumbnail(workspace, image, self.thumbnail_mode) {
                Ok((thumb, _)) => thumbnails.push(thumb),
                Err(e) => {
                    tracing::warn!(image = %image, error = %e, "Thumbnail generation failed");
                    let thumb = thumbnail_name(image);
                    thumbnails.retain(|t| *t != thumb);
                }
            }
        }
        thumbnails.sort();
        thumbnails.dedup();
        thumbnails
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
