//! One user session: a shared snapshot plus the current filter selection.

use chrono::NaiveDate;
use color_eyre::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::dashboard::{build_report, DashboardReport, ReportSettings};
use crate::filter::{apply, DateInterval, FilterSelection, FilteredView};
use crate::schema::{CandidateTable, SchemaPolicy};
use crate::snapshot::Snapshot;
use crate::LoadOptions;

/// Owns the loaded snapshot and the selection. Views and reports are recomputed from
/// both on every call; nothing derived is cached between filter changes.
#[derive(Debug, Clone)]
pub struct Session {
    path: PathBuf,
    options: LoadOptions,
    candidates: CandidateTable,
    policy: SchemaPolicy,
    snapshot: Arc<Snapshot>,
    selection: FilterSelection,
}

impl Session {
    /// Load `path` and reset the selection to everything observed.
    pub fn open(
        path: &Path,
        options: LoadOptions,
        candidates: CandidateTable,
        policy: SchemaPolicy,
    ) -> Result<Self> {
        let snapshot = Arc::new(Snapshot::load(path, &options, &candidates, &policy)?);
        let selection = FilterSelection::reset(&snapshot);
        Ok(Self {
            path: path.to_path_buf(),
            options,
            candidates,
            policy,
            snapshot,
            selection,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn select_categories<I, S>(&mut self, categories: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = std::mem::take(&mut self.selection).with_categories(categories);
    }

    pub fn select_dates(&mut self, dates: Option<DateInterval>) {
        self.selection.dates = dates;
    }

    /// Open-ended bounds fall back to the observed date span.
    pub fn select_date_bounds(&mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) {
        let span = self.snapshot.date_span();
        self.selection = std::mem::take(&mut self.selection).with_date_bounds(from, to, span);
    }

    /// Back to all categories and the full date span.
    pub fn reset_selection(&mut self) {
        self.selection = FilterSelection::reset(&self.snapshot);
    }

    pub fn view(&self) -> Result<FilteredView> {
        apply(&self.snapshot, &self.selection)
    }

    pub fn report(&self, settings: &ReportSettings) -> Result<DashboardReport> {
        let view = self.view()?;
        build_report(&self.snapshot, &self.selection, &view, settings)
    }

    /// Re-read the file and replace the snapshot wholesale. The selection is reset.
    /// On failure the current snapshot stays in place.
    pub fn reload(&mut self) -> Result<()> {
        let snapshot = Snapshot::load(&self.path, &self.options, &self.candidates, &self.policy)?;
        info!(path = %self.path.display(), rows = snapshot.height(), "reloaded snapshot");
        self.snapshot = Arc::new(snapshot);
        self.reset_selection();
        Ok(())
    }
}
