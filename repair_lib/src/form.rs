use repair_data::{Job, JobDetails, JobId, JobStatus};
use thiserror::Error;
use tracing::info;

use crate::{error::Result, store::RepairStore};

/// Whether the editor creates a new job or edits an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Create,
    Edit(JobId),
}

impl EditorMode {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            EditorMode::Create => None,
            EditorMode::Edit(job_id) => Some(*job_id),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Editable copy of a job's fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobForm {
    pub customer_name: String,
    pub brand: String,
    pub model: String,
    pub issue: String,
    pub status: JobStatus,
}

impl JobForm {
    pub fn from_job(job: &Job) -> Self {
        Self {
            customer_name: job.customer_name.clone(),
            brand: job.brand.clone(),
            model: job.model.clone(),
            issue: job.issue.clone(),
            status: job.status,
        }
    }

    /// every text field must hold something other than whitespace
    pub fn validate(&self) -> std::result::Result<JobDetails, FormError> {
        let fields = [
            ("customer name", &self.customer_name),
            ("brand", &self.brand),
            ("model", &self.model),
            ("problem description", &self.issue),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(FormError::Missing(*name));
        }
        Ok(JobDetails::new(
            &self.customer_name,
            &self.brand,
            &self.model,
            &self.issue,
        ))
    }

    /// Validates and sends the form; returns the id of the created or edited job.
    ///
    /// New jobs always start out pending, the status field only applies when editing.
    pub async fn submit(&self, store: &RepairStore, mode: EditorMode) -> Result<JobId> {
        let details = self.validate()?;
        match mode {
            EditorMode::Create => store.create_job(details).await,
            EditorMode::Edit(job_id) => {
                info!("submitting edit of job {}", job_id);
                store.update_job(job_id, details, self.status).await?;
                Ok(job_id)
            }
        }
    }
}
