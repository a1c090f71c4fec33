use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// identifier issued by the job service, never reused
pub type JobId = u64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: JobId,
    pub customer_name: String,
    pub brand: String,
    pub model: String,
    pub issue: String,
    pub status: JobStatus,
}

impl Job {
    pub fn details(&self) -> JobDetails {
        JobDetails {
            customer_name: self.customer_name.clone(),
            brand: self.brand.clone(),
            model: self.model.clone(),
            issue: self.issue.clone(),
        }
    }
}

/// the caller supplied fields of a job, sent in full on create and update
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    pub customer_name: String,
    pub brand: String,
    pub model: String,
    pub issue: String,
}

impl JobDetails {
    pub fn new(customer_name: &str, brand: &str, model: &str, issue: &str) -> Self {
        Self {
            customer_name: customer_name.to_string(),
            brand: brand.to_string(),
            model: model.to_string(),
            issue: issue.to_string(),
        }
    }

    pub fn into_job(self, job_id: JobId, status: JobStatus) -> Job {
        Job {
            job_id,
            customer_name: self.customer_name,
            brand: self.brand,
            model: self.model,
            issue: self.issue,
            status,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 3] = [
        JobStatus::Pending,
        JobStatus::InProgress,
        JobStatus::Completed,
    ];

    /// name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
        }
    }

    /// label shown to shop staff
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::InProgress => "Sent for Repair",
            JobStatus::Completed => "Completed",
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for JobStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
}

impl UserProfile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    User,
    Guest,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
            UserRole::Guest => "guest",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            "guest" => Ok(UserRole::Guest),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// textual identity of an authenticated caller
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(text: &str) -> Self {
        Self(text.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreatedResponse {
    pub job_id: JobId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobRequest {
    #[serde(flatten)]
    pub details: JobDetails,
    pub status: JobStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignRoleRequest {
    pub role: UserRole,
}

#[cfg(test)]
mod test {
    use super::{Job, JobCreatedResponse, JobDetails, JobStatus, UpdateJobRequest, UserRole};

    #[test]
    fn test_job_wire_names() {
        let job = JobDetails::new("Amy", "Canon", "R6", "shutter stuck").into_job(7, JobStatus::InProgress);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(7, value["jobId"]);
        assert_eq!("Amy", value["customerName"]);
        assert_eq!("in_progress", value["status"]);
    }

    // ids above 2^53 must not pass through a float
    #[test]
    fn test_large_job_id_round_trips() {
        let text = r#"{"jobId":18446744073709551615}"#;
        let created: JobCreatedResponse = serde_json::from_str(text).unwrap();
        assert_eq!(u64::MAX, created.job_id);
        assert_eq!(text, serde_json::to_string(&created).unwrap());
    }

    #[test]
    fn test_update_request_is_flat() {
        let request = UpdateJobRequest {
            details: JobDetails::new("Bo", "Nikon", "Z6", "sensor dust"),
            status: JobStatus::Completed,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!("Bo", value["customerName"]);
        assert_eq!("completed", value["status"]);
    }

    #[test]
    fn test_status_parse_and_labels() {
        for status in JobStatus::ALL.iter() {
            assert_eq!(*status, status.as_str().parse().unwrap());
        }
        assert!("done".parse::<JobStatus>().is_err());
        assert_eq!("Sent for Repair", JobStatus::InProgress.label());
        assert_eq!(JobStatus::Pending, JobStatus::default());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(UserRole::Admin, "admin".parse().unwrap());
        assert!("root".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_job_details_of_job() {
        let details = JobDetails::new("Amy", "Canon", "R6", "shutter stuck");
        let job: Job = details.clone().into_job(1, JobStatus::Pending);
        assert_eq!(details, job.details());
    }
}
