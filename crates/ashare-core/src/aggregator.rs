//! Limit-up "concept strength" heatmap.
//!
//! [`TemporalAggregator`] fetches one roster per business day of a trailing
//! window, tallies securities per category and assembles a date by category
//! [`ActivityMatrix`]. A day that fails or times out is recorded in
//! [`AggregationReport::failed_dates`] and the rest of the window still
//! contributes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use time::Date;
use tracing::{debug, info, warn};

use crate::calendar::trailing_business_days;
use crate::feed::SourceError;
use crate::provider_policy::ProviderPolicy;
use crate::retry::RetryConfig;
use crate::roster::{Roster, RosterSource, INDUSTRY_COLUMN};
use crate::throttling::Throttle;

pub const DEFAULT_DAYS: usize = 20;
pub const DEFAULT_EXTRA_LOOKBACK: usize = 10;
pub const DEFAULT_ACTIVITY_THRESHOLD: u32 = 5;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on `days`, roughly one trading year.
pub const MAX_DAYS: usize = 250;
/// Upper bound on `extra_lookback`.
pub const MAX_EXTRA_LOOKBACK: usize = 366;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Business days kept in the window.
    pub days: usize,
    /// Extra calendar days scanned so weekends do not shrink the window.
    pub extra_lookback: usize,
    /// Categories whose window total is at or below this are dropped.
    pub activity_threshold: u32,
    pub category_column: String,
    pub max_concurrency: usize,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            days: DEFAULT_DAYS,
            extra_lookback: DEFAULT_EXTRA_LOOKBACK,
            activity_threshold: DEFAULT_ACTIVITY_THRESHOLD,
            category_column: String::from(INDUSTRY_COLUMN),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCategoryCount {
    pub date: Date,
    pub category: String,
    pub count: u32,
}

/// Date by category counts.
///
/// `cells[i][j]` is the count of `categories[j]` on `dates[i]`, 0 when the
/// category had no entry that day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityMatrix {
    pub dates: Vec<Date>,
    pub categories: Vec<String>,
    pub cells: Vec<Vec<u32>>,
    pub column_totals: Vec<u32>,
}

impl ActivityMatrix {
    /// Assembles the matrix for `dates` from sparse `rows`, keeping only the
    /// categories whose total over `dates` is strictly greater than
    /// `threshold`. Columns are ordered by total descending, then name.
    pub fn build(rows: &[DailyCategoryCount], dates: &[Date], threshold: u32) -> Self {
        let dates: Vec<Date> = dates
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let in_window: BTreeSet<Date> = dates.iter().copied().collect();

        let mut counts: BTreeMap<(&str, Date), u32> = BTreeMap::new();
        let mut totals: BTreeMap<&str, u32> = BTreeMap::new();
        for row in rows.iter().filter(|row| in_window.contains(&row.date)) {
            *counts.entry((row.category.as_str(), row.date)).or_default() += row.count;
            *totals.entry(row.category.as_str()).or_default() += row.count;
        }

        let mut retained: Vec<(&str, u32)> = totals
            .into_iter()
            .filter(|(_, total)| *total > threshold)
            .collect();
        retained.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(right.0)));

        let cells = dates
            .iter()
            .map(|date| {
                retained
                    .iter()
                    .map(|(category, _)| counts.get(&(*category, *date)).copied().unwrap_or(0))
                    .collect()
            })
            .collect();

        Self {
            dates,
            categories: retained.iter().map(|(category, _)| (*category).to_owned()).collect(),
            cells,
            column_totals: retained.iter().map(|(_, total)| *total).collect(),
        }
    }

    pub fn cell(&self, date: Date, category: &str) -> u32 {
        let row = self.dates.iter().position(|candidate| *candidate == date);
        let column = self.categories.iter().position(|name| name == category);
        match (row, column) {
            (Some(row), Some(column)) => self.cells[row][column],
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationReport {
    pub matrix: ActivityMatrix,
    pub failed_dates: Vec<Date>,
    pub skipped_dates: Vec<Date>,
    pub window: Vec<Date>,
}

/// Counts the non-empty values of `column` in `roster`.
///
/// `None` means the day carries no signal: the column is missing or every
/// cell of it is blank.
pub fn tally(date: Date, roster: &Roster, column: &str) -> Option<Vec<DailyCategoryCount>> {
    let index = roster.column_index(column)?;

    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for row in &roster.rows {
        let Some(category) = row.get(index).map(|value| value.trim()) else {
            continue;
        };
        if !category.is_empty() {
            *counts.entry(category).or_default() += 1;
        }
    }

    if counts.is_empty() {
        return None;
    }

    Some(
        counts
            .into_iter()
            .map(|(category, count)| DailyCategoryCount {
                date,
                category: category.to_owned(),
                count,
            })
            .collect(),
    )
}

enum DayOutcome {
    Counted(Vec<DailyCategoryCount>),
    Skipped,
    Failed(SourceError),
}

pub struct TemporalAggregator {
    source: Arc<dyn RosterSource>,
    config: AggregatorConfig,
    throttle: Throttle,
}

impl TemporalAggregator {
    pub fn new(source: Arc<dyn RosterSource>, config: AggregatorConfig) -> Self {
        let throttle = Throttle::from_policy(&ProviderPolicy::default_for(source.id()));
        Self {
            source,
            config,
            throttle,
        }
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub async fn aggregate(&self, end: Date) -> AggregationReport {
        let window = trailing_business_days(end, self.config.days, self.config.extra_lookback);
        let concurrency = self.config.max_concurrency.max(1);

        let outcomes: Vec<(Date, DayOutcome)> = stream::iter(window.iter().copied())
            .map(|date| async move { (date, self.fetch_day(date).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut rows = Vec::new();
        let mut counted = Vec::new();
        let mut failed_dates = Vec::new();
        let mut skipped_dates = Vec::new();
        for (date, outcome) in outcomes {
            match outcome {
                DayOutcome::Counted(day_rows) => {
                    counted.push(date);
                    rows.extend(day_rows);
                }
                DayOutcome::Skipped => skipped_dates.push(date),
                DayOutcome::Failed(error) => {
                    warn!(%date, code = error.code(), error = %error, "roster fetch failed; day left out");
                    failed_dates.push(date);
                }
            }
        }
        failed_dates.sort_unstable();
        skipped_dates.sort_unstable();

        let matrix = ActivityMatrix::build(&rows, &counted, self.config.activity_threshold);
        info!(
            window = window.len(),
            counted = matrix.dates.len(),
            failed = failed_dates.len(),
            skipped = skipped_dates.len(),
            categories = matrix.categories.len(),
            "limit-up aggregation finished"
        );

        AggregationReport {
            matrix,
            failed_dates,
            skipped_dates,
            window,
        }
    }

    async fn fetch_day(&self, date: Date) -> DayOutcome {
        let timeout = self.config.request_timeout;
        let fetched = self
            .config
            .retry
            .run(
                |_| async move {
                    let _permit = self.throttle.acquire().await;
                    match tokio::time::timeout(timeout, self.source.fetch_roster(date)).await {
                        Ok(result) => result,
                        Err(_) => Err(SourceError::timeout(format!(
                            "roster for {date} timed out after {}ms",
                            timeout.as_millis()
                        ))),
                    }
                },
                SourceError::retryable,
            )
            .await;

        match fetched {
            Ok(roster) => match tally(date, &roster, &self.config.category_column) {
                Some(rows) => DayOutcome::Counted(rows),
                None => {
                    debug!(%date, "roster has no category signal");
                    DayOutcome::Skipped
                }
            },
            Err(error) => DayOutcome::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    fn count(date: Date, category: &str, count: u32) -> DailyCategoryCount {
        DailyCategoryCount {
            date,
            category: category.to_owned(),
            count,
        }
    }

    fn roster(categories: &[&str]) -> Roster {
        Roster::new(
            vec![String::from("代码"), String::from(INDUSTRY_COLUMN)],
            categories
                .iter()
                .enumerate()
                .map(|(index, category)| vec![format!("{index:06}"), (*category).to_owned()])
                .collect(),
        )
    }

    #[test]
    fn tally_counts_non_empty_categories() {
        let day = date!(2024 - 03 - 29);
        let rows = tally(day, &roster(&["电池", "酿酒", "电池", "", "  "]), INDUSTRY_COLUMN)
            .expect("has signal");

        assert_eq!(rows, vec![count(day, "电池", 2), count(day, "酿酒", 1)]);
    }

    #[test]
    fn tally_without_signal_is_none() {
        let day = date!(2024 - 03 - 29);
        assert!(tally(day, &roster(&["", " "]), INDUSTRY_COLUMN).is_none());
        assert!(tally(day, &Roster::default(), INDUSTRY_COLUMN).is_none());
        assert!(tally(day, &roster(&["电池"]), "概念").is_none());
    }

    #[test]
    fn build_fills_absent_cells_with_zero() {
        let (d1, d2) = (date!(2024 - 03 - 28), date!(2024 - 03 - 29));
        let rows = vec![count(d2, "电池", 4), count(d1, "电池", 3), count(d1, "酿酒", 7)];

        let matrix = ActivityMatrix::build(&rows, &[d2, d1], 0);

        assert_eq!(matrix.dates, vec![d1, d2]);
        assert_eq!(matrix.categories, vec!["电池", "酿酒"]);
        assert_eq!(matrix.column_totals, vec![7, 7]);
        assert_eq!(matrix.cell(d2, "酿酒"), 0);
        assert_eq!(matrix.cells, vec![vec![3, 7], vec![4, 0]]);
    }

    #[test]
    fn threshold_is_strict() {
        let day = date!(2024 - 03 - 29);
        let rows = vec![count(day, "five", 5), count(day, "six", 6)];

        let matrix = ActivityMatrix::build(&rows, &[day], DEFAULT_ACTIVITY_THRESHOLD);

        assert_eq!(matrix.categories, vec!["six"]);
        assert_eq!(matrix.column_totals, vec![6]);
    }

    #[test]
    fn rows_outside_dates_are_ignored() {
        let rows = vec![count(date!(2024 - 03 - 01), "电池", 9)];
        let matrix = ActivityMatrix::build(&rows, &[date!(2024 - 03 - 29)], 0);

        assert!(matrix.is_empty());
        assert_eq!(matrix.dates, vec![date!(2024 - 03 - 29)]);
    }

    #[test]
    fn default_config_matches_heatmap_defaults() {
        let config = AggregatorConfig::default();
        assert_eq!(config.days, 20);
        assert_eq!(config.extra_lookback, 10);
        assert_eq!(config.activity_threshold, 5);
        assert_eq!(config.category_column, "所属行业");
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }
}
