use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::models::complaint::Complaint;

text_enum! {
    pub enum Period {
        Daily = "daily",
        Weekly = "weekly",
        Monthly = "monthly",
        Custom = "custom",
    }
}

impl Default for Period {
    fn default() -> Self {
        Period::Monthly
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DashboardQuery {
    pub period: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Count in the window, in the window before it, and the percentage change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct MetricChange {
    pub current: i64,
    pub previous: i64,
    pub change: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Totals {
    pub requests: i64,
    pub complaints: i64,
    pub documents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub requests: i64,
    pub complaints: i64,
    pub documents: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardResponse {
    pub period: Period,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub requests: MetricChange,
    pub complaints: MetricChange,
    pub documents: MetricChange,
    pub totals: Totals,
    pub recent_complaints: Vec<Complaint>,
    pub series: Vec<SeriesPoint>,
}
