use std::sync::Arc;

use serde::Serialize;

use crate::models::{Report, ReportStatus};

pub const RECENT_LIMIT: usize = 3;

/// List view filter: free-text search plus an optional status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    pub query: String,
    pub status: Option<ReportStatus>,
}

impl ReportFilter {
    pub fn matches(&self, report: &Report) -> bool {
        let query = self.query.to_lowercase();
        let matches_search = report.title.to_lowercase().contains(&query)
            || report.location.to_lowercase().contains(&query)
            || report.description.to_lowercase().contains(&query);
        let matches_status = self.status.map_or(true, |s| report.status == s);
        matches_search && matches_status
    }
}

pub fn filter_reports(reports: &[Arc<Report>], filter: &ReportFilter) -> Vec<Arc<Report>> {
    reports.iter().filter(|r| filter.matches(r)).cloned().collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub open: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl StatusCounts {
    pub fn get(&self, status: ReportStatus) -> usize {
        match status {
            ReportStatus::Open => self.open,
            ReportStatus::InProgress => self.in_progress,
            ReportStatus::Completed => self.completed,
        }
    }
}

pub fn status_counts(reports: &[Arc<Report>]) -> StatusCounts {
    let mut counts = StatusCounts { total: reports.len(), ..Default::default() };
    for report in reports {
        match report.status {
            ReportStatus::Open => counts.open += 1,
            ReportStatus::InProgress => counts.in_progress += 1,
            ReportStatus::Completed => counts.completed += 1,
        }
    }
    counts
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub counts: StatusCounts,
    pub recent: Vec<Arc<Report>>,
}

/// Counts plus the first few reports in collection order, which is newest first.
pub fn dashboard(reports: &[Arc<Report>]) -> Dashboard {
    Dashboard {
        counts: status_counts(reports),
        recent: reports.iter().take(RECENT_LIMIT).cloned().collect(),
    }
}
