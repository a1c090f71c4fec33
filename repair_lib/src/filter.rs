use std::{fmt, str::FromStr};

use repair_data::{Job, JobStatus, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(JobStatus),
}

impl StatusFilter {
    pub fn matches(&self, status: JobStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

impl Default for StatusFilter {
    fn default() -> Self {
        StatusFilter::All
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => f.write_str("all"),
            StatusFilter::Only(status) => fmt::Display::fmt(status, f),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(StatusFilter::All),
            other => other.parse().map(StatusFilter::Only),
        }
    }
}

/// Search text and status predicate entered on one listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub query: String,
    pub status: StatusFilter,
}

impl FilterCriteria {
    pub fn new(query: &str, status: StatusFilter) -> Self {
        Self {
            query: query.to_string(),
            status,
        }
    }

    pub fn apply(&self, jobs: &[Job]) -> Vec<Job> {
        filter_and_sort(jobs, &self.query, self.status)
    }
}

/// Jobs passing both the status filter and the text search, newest id first.
///
/// The search is a case-insensitive substring match against customer name,
/// brand, model and issue, or a substring match against the decimal job id.
/// A blank search keeps every job.
pub fn filter_and_sort(jobs: &[Job], query: &str, status: StatusFilter) -> Vec<Job> {
    let query = query.trim().to_lowercase();
    let mut filtered: Vec<Job> = jobs
        .iter()
        .filter(|job| status.matches(job.status))
        .filter(|job| query.is_empty() || matches_text(job, &query))
        .cloned()
        .collect();
    filtered.sort_by(|a, b| b.job_id.cmp(&a.job_id));
    filtered
}

fn matches_text(job: &Job, query: &str) -> bool {
    [&job.customer_name, &job.brand, &job.model, &job.issue]
        .iter()
        .any(|field| field.to_lowercase().contains(query))
        || job.job_id.to_string().contains(query)
}

/// Counts shown above the job list, taken over the unfiltered collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl JobStats {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        jobs.iter().fold(Self::default(), |mut stats, job| {
            stats.total += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::InProgress => stats.in_progress += 1,
                JobStatus::Completed => stats.completed += 1,
            }
            stats
        })
    }

    pub fn count(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::InProgress => self.in_progress,
            JobStatus::Completed => self.completed,
        }
    }
}
