//! Query executor: estimate, paginate, fall back
//!
//! Cursor pagination is tried first only when the configuration prefers it
//! and the key is a subscriber key. A cursor that the service rejects, or
//! that yields nothing while the estimate is positive, falls back to
//! year-sliced offset pagination. Nothing is persisted here.

use anyhow::Result;
use bibline_core::{PipelineError, ProgressContext, Record, RecordTable, fmt_num};
use rustc_hash::FxHashSet;

use crate::api::{ApiError, PageRequest, SearchClient, View};
use crate::config::{SearchConfig, Strategy};

/// Offset pagination stops here; the service rejects larger `start` values.
pub const OFFSET_LIMIT: u64 = 5000;

/// Default `count` per page (the COMPLETE view maximum).
pub const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    pub view: Option<View>,
    pub page_size: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            view: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Strategy decided before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionPlan {
    pub strategy: Strategy,
    /// Present whenever the configuration has both years.
    pub year_range: Option<(i32, i32)>,
}

impl ExtractionPlan {
    /// Plan the strategy. Slicing without a year range is a configuration error.
    pub fn new(config: &SearchConfig, force_slicing: bool) -> Result<Self, PipelineError> {
        let strategy = config.planned_strategy(force_slicing);
        let year_range = match strategy {
            Strategy::Slicing => Some(config.year_range()?),
            Strategy::Cursor => config.year_range().ok(),
        };
        Ok(Self {
            strategy,
            year_range,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub table: RecordTable,
    pub estimated: u64,
    pub downloaded: usize,
    pub strategy_planned: Strategy,
    pub strategy_used: Strategy,
    /// Years with at least one result (slicing only).
    pub years_covered: Option<Vec<i32>>,
    pub dry_run: bool,
}

impl ExtractionOutcome {
    /// Outcome of a dry run: nothing fetched, planned strategy recorded.
    pub fn dry_run(plan: &ExtractionPlan) -> Self {
        Self {
            table: RecordTable::default(),
            estimated: 0,
            downloaded: 0,
            strategy_planned: plan.strategy,
            strategy_used: plan.strategy,
            years_covered: None,
            dry_run: true,
        }
    }
}

pub struct QueryExecutor<'a> {
    client: &'a mut dyn SearchClient,
    options: ExecuteOptions,
    progress: &'a ProgressContext,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(
        client: &'a mut dyn SearchClient,
        options: ExecuteOptions,
        progress: &'a ProgressContext,
    ) -> Self {
        Self {
            client,
            options,
            progress,
        }
    }

    pub fn execute(&mut self, config: &SearchConfig, plan: &ExtractionPlan) -> Result<ExtractionOutcome> {
        let query = config.query.as_str();
        let estimated = self.client.count(query, self.options.view)?;
        log::info!("Estimated {} results ({} planned)", fmt_num(estimated as usize), plan.strategy);

        if plan.strategy == Strategy::Cursor {
            if let Some(records) = self.run_cursor(query, estimated)? {
                let table = RecordTable::from_records(records);
                return Ok(ExtractionOutcome {
                    downloaded: table.len(),
                    table,
                    estimated,
                    strategy_planned: Strategy::Cursor,
                    strategy_used: Strategy::Cursor,
                    years_covered: None,
                    dry_run: false,
                });
            }
            log::warn!("Cursor pagination unavailable, falling back to year slicing");
        }

        // Reached after planning slicing (range checked) or a cursor fallback.
        let range = match plan.year_range {
            Some(range) => range,
            None => config.year_range()?,
        };
        let (records, years) = self.run_slicing(query, range)?;
        let table = dedup_on_identifier(RecordTable::from_records(records));
        Ok(ExtractionOutcome {
            downloaded: table.len(),
            table,
            estimated,
            strategy_planned: plan.strategy,
            strategy_used: Strategy::Slicing,
            years_covered: Some(years),
            dry_run: false,
        })
    }

    /// Follow `cursor.@next` from `*`. `None` means the cursor is unsupported.
    fn run_cursor(&mut self, query: &str, estimated: u64) -> Result<Option<Vec<Record>>> {
        let pb = self.progress.count_bar("cursor", estimated);
        let mut records = Vec::new();
        let mut cursor = "*".to_string();

        loop {
            let request = PageRequest {
                query,
                view: self.options.view,
                count: self.options.page_size,
                start: None,
                cursor: Some(cursor.as_str()),
            };
            let page = match self.client.page(&request) {
                Ok(page) => page,
                Err(e) => {
                    if let Some(ApiError::CursorUnsupported(reason)) = e.downcast_ref::<ApiError>() {
                        log::warn!("Cursor request rejected: {reason}");
                        pb.finish_and_clear();
                        return Ok(None);
                    }
                    return Err(e);
                }
            };

            if page.entries.is_empty() {
                break;
            }
            records.extend(page.entries);
            pb.set_position(records.len() as u64);
            log::debug!("cursor: {} records", records.len());

            if records.len() as u64 >= page.total_results {
                break;
            }
            match page.next_cursor {
                Some(next) if next != cursor => cursor = next,
                _ => break,
            }
        }
        pb.finish_and_clear();

        if records.is_empty() && estimated > 0 {
            log::warn!(
                "Cursor search returned no records although {} were estimated",
                fmt_num(estimated as usize)
            );
            return Ok(None);
        }
        Ok(Some(records))
    }

    /// One `<query> AND PUBYEAR = <year>` search per year, offset-paged.
    fn run_slicing(&mut self, query: &str, (start, end): (i32, i32)) -> Result<(Vec<Record>, Vec<i32>)> {
        let years = (end - start + 1).max(0) as u64;
        let pb = self.progress.count_bar("slicing", years);
        let mut records = Vec::new();
        let mut covered = Vec::new();

        for year in start..=end {
            let year_query = format!("{query} AND PUBYEAR = {year}");
            let n = self.client.count(&year_query, self.options.view)?;
            pb.inc(1);
            if n == 0 {
                log::debug!("{year}: no results");
                continue;
            }
            covered.push(year);
            pb.set_message(format!("{year}: {} results", fmt_num(n as usize)));

            let limit = if n > OFFSET_LIMIT {
                log::warn!(
                    "{year}: {} results exceed the offset limit; only the first {OFFSET_LIMIT} are reachable",
                    fmt_num(n as usize)
                );
                OFFSET_LIMIT
            } else {
                n
            };

            let mut offset = 0usize;
            while (offset as u64) < limit {
                let request = PageRequest {
                    query: &year_query,
                    view: self.options.view,
                    count: self.options.page_size,
                    start: Some(offset),
                    cursor: None,
                };
                let page = self.client.page(&request)?;
                if page.entries.is_empty() {
                    break;
                }
                offset += page.entries.len();
                records.extend(page.entries);
            }
            log::info!("{year}: {} records", fmt_num(offset));
        }
        pb.finish_and_clear();
        Ok((records, covered))
    }
}

/// Drop rows whose `eid` was already seen; rows without one are kept.
pub fn dedup_on_identifier(table: RecordTable) -> RecordTable {
    let Some(col) = table.identifier_column() else {
        return table;
    };
    let mut seen = FxHashSet::default();
    let keep: Vec<usize> = table
        .rows()
        .filter(|row| match row.at(col).map(str::trim).filter(|v| !v.is_empty()) {
            Some(id) => seen.insert(id.to_string()),
            None => true,
        })
        .map(|row| row.index())
        .collect();
    if keep.len() == table.len() {
        return table;
    }
    log::info!("Removed {} duplicate records across slices", table.len() - keep.len());
    table.select_rows(&keep)
}
