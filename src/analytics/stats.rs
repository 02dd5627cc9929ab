//! Aggregate complaint statistics for the admin and agency dashboards.

use crate::domain::models::{Agency, ComplaintCategory, ComplaintStatus};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::collections::BTreeMap;

const MS_PER_DAY: f64 = 86_400_000.0;

/// The slice of a complaint the statistics need.
#[derive(Debug, Clone, FromRow)]
pub struct ComplaintSample {
    pub status: ComplaintStatus,
    pub category: ComplaintCategory,
    pub created_at: DateTime<Utc>,
    pub last_response_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: i64,
    pub in_review: i64,
    pub resolved: i64,
    pub rejected: i64,
}

impl StatusCounts {
    fn add(&mut self, status: ComplaintStatus) {
        match status {
            ComplaintStatus::Pending => self.pending += 1,
            ComplaintStatus::InReview => self.in_review += 1,
            ComplaintStatus::Resolved => self.resolved += 1,
            ComplaintStatus::Rejected => self.rejected += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintStats {
    pub total: i64,
    #[serde(flatten)]
    pub status: StatusCounts,
    pub recent_complaints: i64,
    pub category_distribution: BTreeMap<ComplaintCategory, i64>,
    pub weekly_trend: f64,
    /// Days, one decimal.
    pub average_resolution_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyStats {
    pub total: i64,
    #[serde(flatten)]
    pub status: StatusCounts,
}

pub fn compute_stats(samples: &[ComplaintSample], now: DateTime<Utc>) -> ComplaintStats {
    let week_ago = now - Duration::days(7);
    let two_weeks_ago = now - Duration::days(14);

    let mut status = StatusCounts::default();
    let mut category_distribution = BTreeMap::new();
    let mut recent = 0i64;
    let mut previous = 0i64;
    let mut resolution_days = Vec::new();

    for sample in samples {
        status.add(sample.status);
        *category_distribution.entry(sample.category).or_insert(0) += 1;

        if sample.created_at >= week_ago {
            recent += 1;
        } else if sample.created_at >= two_weeks_ago {
            previous += 1;
        }

        if sample.status == ComplaintStatus::Resolved {
            if let Some(responded_at) = sample.last_response_at {
                let elapsed = responded_at - sample.created_at;
                resolution_days.push(elapsed.num_milliseconds() as f64 / MS_PER_DAY);
            }
        }
    }

    let average_resolution_time = if resolution_days.is_empty() {
        0.0
    } else {
        round1(resolution_days.iter().sum::<f64>() / resolution_days.len() as f64)
    };

    ComplaintStats {
        total: samples.len() as i64,
        status,
        recent_complaints: recent,
        category_distribution,
        weekly_trend: weekly_trend(recent, previous),
        average_resolution_time,
    }
}

/// Percent change of this week's intake over last week's. An empty previous
/// week reports `100` whatever the current count, including zero.
pub fn weekly_trend(recent: i64, previous: i64) -> f64 {
    if previous == 0 {
        return 100.0;
    }
    round1((recent - previous) as f64 / previous as f64 * 100.0)
}

pub fn compute_agency_stats(samples: &[ComplaintSample], agency: &Agency) -> AgencyStats {
    let mut status = StatusCounts::default();
    let mut total = 0;
    for sample in samples.iter().filter(|s| agency.handles(s.category)) {
        status.add(sample.status);
        total += 1;
    }
    AgencyStats { total, status }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
