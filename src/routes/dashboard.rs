use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::{roles, AccessRule};
use crate::errors::{AppError, AppResult};
use crate::models::complaint::Complaint;
use crate::models::dashboard::{DashboardQuery, DashboardResponse, MetricChange, Period, SeriesPoint, Totals};

const RECENT_COMPLAINTS: i64 = 5;
/// Longest custom range, in days. Longer ranges would build one series point per day.
pub const MAX_CUSTOM_DAYS: i64 = 366;

pub fn routes(state: &AppState) -> Router<AppState> {
    state.guard(
        AccessRule::roles([roles::SUPER_ADMIN]),
        Router::new().route("/", get(dashboard)),
    )
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: NaiveDate,
    end: NaiveDate,
}

impl Window {
    fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Same length, ending the day before this one starts.
    fn previous(&self) -> AppResult<Window> {
        let end = self.start.checked_sub_signed(Duration::days(1));
        let start = end.and_then(|end| end.checked_sub_signed(Duration::days(self.days() - 1)));
        match (start, end) {
            (Some(start), Some(end)) => Ok(Window { start, end }),
            _ => Err(AppError::bad_request("start_date is out of range")),
        }
    }

    fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.days()).map(move |offset| start + Duration::days(offset))
    }
}

fn parse_date(field: &str, raw: Option<&str>) -> AppResult<NaiveDate> {
    let raw = raw
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::bad_request(format!("{field} is required for a custom period")))?;
    let invalid = || AppError::bad_request(format!("{field} must be a date in YYYY-MM-DD format"));
    // chrono also accepts signed and longer years, which overflow range arithmetic
    let shaped = raw.len() == 10
        && raw.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())
}

fn window(period: Period, today: NaiveDate, query: &DashboardQuery) -> AppResult<Window> {
    let back = |days: i64| Window {
        start: today - Duration::days(days - 1),
        end: today,
    };

    match period {
        Period::Daily => Ok(back(1)),
        Period::Weekly => Ok(back(7)),
        Period::Monthly => Ok(back(30)),
        Period::Custom => {
            let start = parse_date("start_date", query.start_date.as_deref())?;
            let end = parse_date("end_date", query.end_date.as_deref())?;
            if start > end {
                return Err(AppError::bad_request("start_date must not be after end_date"));
            }
            let window = Window { start, end };
            if window.days() > MAX_CUSTOM_DAYS {
                return Err(AppError::bad_request(format!(
                    "a custom period may span at most {MAX_CUSTOM_DAYS} days"
                )));
            }
            Ok(window)
        }
    }
}

/// Percentage change rounded to two decimals; growth from zero counts as 100%.
fn percent_change(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        return if current == 0 { 0.0 } else { 100.0 };
    }
    let change = (current - previous) as f64 / previous as f64 * 100.0;
    (change * 100.0).round() / 100.0
}

async fn count_in(pool: &SqlitePool, table: &'static str, window: Window) -> AppResult<i64> {
    Ok(
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE date(created_at) BETWEEN ? AND ?"))
            .bind(window.start)
            .bind(window.end)
            .fetch_one(pool)
            .await?,
    )
}

async fn metric(pool: &SqlitePool, table: &'static str, window: Window) -> AppResult<MetricChange> {
    let current = count_in(pool, table, window).await?;
    let previous = count_in(pool, table, window.previous()?).await?;
    Ok(MetricChange {
        current,
        previous,
        change: percent_change(current, previous),
    })
}

async fn total(pool: &SqlitePool, table: &'static str) -> AppResult<i64> {
    Ok(sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?)
}

async fn daily_counts(pool: &SqlitePool, table: &'static str, window: Window) -> AppResult<HashMap<NaiveDate, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
        r#"
        SELECT date(created_at) AS day, COUNT(*)
        FROM {table}
        WHERE date(created_at) BETWEEN ? AND ?
        GROUP BY day
        "#
    ))
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(day, count)| NaiveDate::parse_from_str(&day, "%Y-%m-%d").ok().map(|d| (d, count)))
        .collect())
}

/// One point per day of the window, zero where nothing was created.
fn zero_filled(
    window: Window,
    requests: &HashMap<NaiveDate, i64>,
    complaints: &HashMap<NaiveDate, i64>,
    documents: &HashMap<NaiveDate, i64>,
) -> Vec<SeriesPoint> {
    let at = |counts: &HashMap<NaiveDate, i64>, date: &NaiveDate| counts.get(date).copied().unwrap_or(0);
    window
        .dates()
        .map(|date| SeriesPoint {
            date,
            requests: at(requests, &date),
            complaints: at(complaints, &date),
            documents: at(documents, &date),
        })
        .collect()
}

#[utoipa::path(
    get,
    path = "/api/dashboard",
    tag = "Dashboard",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Period metrics, totals, recent complaints and a daily series", body = DashboardResponse),
        (status = 400, description = "Invalid custom date range"),
        (status = 403, description = "Only super-admin can access the dashboard")
    ),
    security(("bearerAuth" = []))
)]
pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> AppResult<Json<DashboardResponse>> {
    let period = query
        .period
        .as_deref()
        .and_then(Period::from_filter)
        .unwrap_or_default();
    let window = window(period, Utc::now().date_naive(), &query)?;
    // fail before any query runs
    window.previous()?;
    let pool = &state.pool;

    let recent_complaints =
        sqlx::query_as::<_, Complaint>("SELECT * FROM complaints ORDER BY created_at DESC, id DESC LIMIT ?")
            .bind(RECENT_COMPLAINTS)
            .fetch_all(pool)
            .await?;

    let series = zero_filled(
        window,
        &daily_counts(pool, "requests", window).await?,
        &daily_counts(pool, "complaints", window).await?,
        &daily_counts(pool, "resources", window).await?,
    );

    Ok(Json(DashboardResponse {
        period,
        start_date: window.start,
        end_date: window.end,
        requests: metric(pool, "requests", window).await?,
        complaints: metric(pool, "complaints", window).await?,
        documents: metric(pool, "resources", window).await?,
        totals: Totals {
            requests: total(pool, "requests").await?,
            complaints: total(pool, "complaints").await?,
            documents: total(pool, "resources").await?,
        },
        recent_complaints,
        series,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn custom(start: Option<&str>, end: Option<&str>) -> DashboardQuery {
        DashboardQuery {
            period: Some("custom".into()),
            start_date: start.map(String::from),
            end_date: end.map(String::from),
        }
    }

    #[test]
    fn fixed_periods_end_today() {
        let today = date(2025, 3, 31);
        let q = DashboardQuery::default();

        assert_eq!(window(Period::Daily, today, &q).unwrap(), Window { start: today, end: today });
        assert_eq!(window(Period::Weekly, today, &q).unwrap().start, date(2025, 3, 25));
        let monthly = window(Period::Monthly, today, &q).unwrap();
        assert_eq!(monthly.start, date(2025, 3, 2));
        assert_eq!(monthly.days(), 30);
    }

    #[test]
    fn previous_window_has_the_same_length() {
        let w = Window { start: date(2025, 3, 25), end: date(2025, 3, 31) };
        assert_eq!(w.previous().unwrap(), Window { start: date(2025, 3, 18), end: date(2025, 3, 24) });
    }

    #[test]
    fn previous_window_before_the_calendar_is_rejected() {
        let w = Window { start: NaiveDate::MIN, end: NaiveDate::MIN };
        assert!(matches!(w.previous(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn custom_range_rejects_extreme_years_and_long_spans() {
        let today = date(2025, 3, 31);
        for query in [
            custom(Some("-262143-01-01"), Some("2025-01-10")),
            custom(Some("+12025-01-01"), Some("2025-01-10")),
            custom(Some("2025-1-1"), Some("2025-01-10")),
            custom(Some("0001-01-01"), Some("9999-12-31")),
            custom(Some("2024-01-01"), Some("2025-01-01")),
        ] {
            assert!(matches!(window(Period::Custom, today, &query), Err(AppError::BadRequest(_))), "{query:?}");
        }

        let leap_year = window(Period::Custom, today, &custom(Some("2024-01-01"), Some("2024-12-31"))).unwrap();
        assert_eq!(leap_year.days(), MAX_CUSTOM_DAYS);
        let first_year = window(Period::Custom, today, &custom(Some("0000-01-01"), Some("0000-01-31"))).unwrap();
        assert!(first_year.previous().is_ok());
    }

    #[test]
    fn custom_range_is_validated() {
        let today = date(2025, 3, 31);
        let ok = window(Period::Custom, today, &custom(Some("2025-01-01"), Some("2025-01-10"))).unwrap();
        assert_eq!(ok.days(), 10);

        for query in [
            custom(None, Some("2025-01-10")),
            custom(Some("01/01/2025"), Some("2025-01-10")),
            custom(Some("2025-02-01"), Some("2025-01-10")),
        ] {
            assert!(matches!(window(Period::Custom, today, &query), Err(AppError::BadRequest(_))));
        }
    }

    #[test]
    fn percent_change_handles_zero_baseline() {
        assert_eq!(percent_change(0, 0), 0.0);
        assert_eq!(percent_change(4, 0), 100.0);
        assert_eq!(percent_change(3, 2), 50.0);
        assert_eq!(percent_change(1, 3), -66.67);
    }

    #[test]
    fn series_is_zero_filled() {
        let w = Window { start: date(2025, 1, 1), end: date(2025, 1, 3) };
        let requests = HashMap::from([(date(2025, 1, 2), 4)]);
        let series = zero_filled(w, &requests, &HashMap::new(), &HashMap::new());

        assert_eq!(series.len(), 3);
        assert_eq!(series[0].requests, 0);
        assert_eq!(series[1].requests, 4);
        assert!(series.iter().all(|p| p.complaints == 0 && p.documents == 0));
    }
}
