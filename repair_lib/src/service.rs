use async_trait::async_trait;
use repair_data::{Job, JobDetails, JobId, JobStatus, Principal, UserProfile, UserRole};

use crate::error::RemoteError;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Request/response contract of the authoritative job service.
///
/// Every call is made on behalf of the caller the implementation was
/// authenticated as. Implementations own timeouts; callers never cancel a
/// request once it has been handed over.
#[async_trait]
pub trait JobService: Send + Sync {
    async fn list_jobs(&self) -> RemoteResult<Vec<Job>>;

    /// `None` if no job with this id exists
    async fn get_job(&self, job_id: JobId) -> RemoteResult<Option<Job>>;

    /// returns the id the service assigned to the new job
    async fn create_job(&self, details: JobDetails) -> RemoteResult<JobId>;

    /// replaces every mutable field of the job
    async fn update_job(
        &self,
        job_id: JobId,
        details: JobDetails,
        status: JobStatus,
    ) -> RemoteResult<()>;

    async fn delete_job(&self, job_id: JobId) -> RemoteResult<()>;

    async fn get_caller_user_profile(&self) -> RemoteResult<Option<UserProfile>>;

    async fn save_caller_user_profile(&self, profile: UserProfile) -> RemoteResult<()>;

    async fn get_user_profile(&self, user: Principal) -> RemoteResult<Option<UserProfile>>;

    async fn get_caller_user_role(&self) -> RemoteResult<UserRole>;

    async fn is_caller_admin(&self) -> RemoteResult<bool>;

    async fn assign_caller_user_role(&self, user: Principal, role: UserRole) -> RemoteResult<()>;
}
