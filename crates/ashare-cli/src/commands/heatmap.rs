use std::sync::Arc;
use std::time::Duration;

use ashare_core::aggregator::{MAX_DAYS, MAX_EXTRA_LOOKBACK};
use ashare_core::{
    shanghai_today, ActivityMatrix, AggregationReport, AggregatorConfig, EastmoneyRosterSource,
    ProviderId, TemporalAggregator, Upstream,
};
use serde::Serialize;
use serde_json::{Map, Value};
use time::macros::format_description;
use time::Date;

use crate::cli::HeatmapArgs;
use crate::error::CliError;

use super::{CommandResult, Context};

#[derive(Debug, Serialize)]
struct HeatmapResponseData {
    end: Date,
    threshold: u32,
    matrix: ActivityMatrix,
    /// One object per counted day, keyed by category, for table output.
    rows: Vec<Map<String, Value>>,
    failed_dates: Vec<Date>,
    skipped_dates: Vec<Date>,
    window: Vec<Date>,
}

pub async fn run(args: &HeatmapArgs, context: &Context) -> Result<CommandResult, CliError> {
    let end = match args.end.as_deref() {
        Some(raw) => parse_end(raw)?,
        None => shanghai_today(),
    };

    let mut config = context.config.aggregator_config();
    if let Some(days) = args.days {
        config.days = days;
    }
    if let Some(extra) = args.extra_lookback {
        config.extra_lookback = extra;
    }
    if let Some(threshold) = args.threshold {
        config.activity_threshold = threshold;
    }
    if let Some(concurrency) = args.concurrency {
        config.max_concurrency = concurrency;
    }
    check_window(&config)?;
    config.request_timeout = Duration::from_millis(context.config.timeout_ms);
    let threshold = config.activity_threshold;

    let upstream = Upstream::reqwest(ProviderId::Eastmoney).with_timeout_ms(context.config.timeout_ms);
    let source = Arc::new(EastmoneyRosterSource::with_upstream(upstream));
    let report = TemporalAggregator::new(source, config).aggregate(end).await;

    let mut result_warnings = Vec::new();
    if !report.failed_dates.is_empty() {
        result_warnings.push(format!(
            "{} of {} days could not be fetched and were left out",
            report.failed_dates.len(),
            report.window.len()
        ));
    }
    if report.matrix.is_empty() {
        result_warnings.push(format!("no category above the threshold of {threshold}"));
    }

    let data = serde_json::to_value(response_data(end, threshold, report))?;
    Ok(CommandResult::ok(data, vec![ProviderId::Eastmoney]).with_warnings(result_warnings))
}

fn check_window(config: &AggregatorConfig) -> Result<(), CliError> {
    if config.days == 0 || config.days > MAX_DAYS {
        return Err(CliError::Command(format!("--days must be between 1 and {MAX_DAYS}")));
    }
    if config.extra_lookback > MAX_EXTRA_LOOKBACK {
        return Err(CliError::Command(format!(
            "--extra-lookback must be at most {MAX_EXTRA_LOOKBACK}"
        )));
    }
    if config.max_concurrency == 0 {
        return Err(CliError::Command(String::from(
            "--concurrency must be greater than zero",
        )));
    }
    Ok(())
}

fn parse_end(raw: &str) -> Result<Date, CliError> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|error| CliError::Command(format!("invalid --end '{raw}': {error}")))
}

fn response_data(end: Date, threshold: u32, report: AggregationReport) -> HeatmapResponseData {
    let AggregationReport {
        matrix,
        failed_dates,
        skipped_dates,
        window,
    } = report;

    let rows = matrix
        .dates
        .iter()
        .zip(&matrix.cells)
        .map(|(date, counts)| {
            let mut row = Map::new();
            row.insert(String::from("date"), Value::String(date.to_string()));
            for (category, count) in matrix.categories.iter().zip(counts) {
                row.insert(category.clone(), Value::from(*count));
            }
            row
        })
        .collect();

    HeatmapResponseData {
        end,
        threshold,
        matrix,
        rows,
        failed_dates,
        skipped_dates,
        window,
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn end_date_parses_iso_form() {
        assert_eq!(parse_end("2024-03-29").expect("valid"), date!(2024 - 03 - 29));
        assert!(matches!(parse_end("20240329"), Err(CliError::Command(_))));
    }

    #[test]
    fn window_outside_bounds_is_a_command_error() {
        let config = |days, extra_lookback| AggregatorConfig {
            days,
            extra_lookback,
            ..AggregatorConfig::default()
        };

        assert!(check_window(&config(20, 10)).is_ok());
        assert!(check_window(&config(MAX_DAYS, MAX_EXTRA_LOOKBACK)).is_ok());
        for (days, extra) in [(0, 10), (usize::MAX, 10), (20, MAX_EXTRA_LOOKBACK + 1)] {
            let error = check_window(&config(days, extra)).expect_err("out of bounds");
            assert!(matches!(error, CliError::Command(_)));
            assert_eq!(error.exit_code(), 2);
        }
    }

    #[test]
    fn rows_follow_matrix_dates() {
        let matrix = ActivityMatrix {
            dates: vec![date!(2024 - 03 - 28), date!(2024 - 03 - 29)],
            categories: vec![String::from("半导体"), String::from("汽车零部件")],
            cells: vec![vec![4, 0], vec![3, 6]],
            column_totals: vec![7, 6],
        };
        let report = AggregationReport {
            matrix,
            failed_dates: vec![date!(2024 - 03 - 27)],
            skipped_dates: Vec::new(),
            window: vec![
                date!(2024 - 03 - 27),
                date!(2024 - 03 - 28),
                date!(2024 - 03 - 29),
            ],
        };

        let data = response_data(date!(2024 - 03 - 29), 5, report);

        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[0].get("date"), Some(&Value::from("2024-03-28")));
        assert_eq!(data.rows[0].get("汽车零部件"), Some(&Value::from(0)));
        assert_eq!(data.rows[1].get("半导体"), Some(&Value::from(3)));

        let json = serde_json::to_value(&data).expect("serializable");
        assert_eq!(json["failed_dates"], serde_json::json!(["2024-03-27"]));
        assert_eq!(json["end"], serde_json::json!("2024-03-29"));
    }
}
