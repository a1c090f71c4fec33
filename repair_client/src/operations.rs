use repair_lib::{
    filter_and_sort, EditorMode, Error, Job, JobForm, JobId, JobStats, JobStatus, Principal,
    QueryState, RepairStore, StatusFilter, UserProfile, UserRole,
};

fn describe_failure<T>(state: QueryState<T>) -> String {
    match state.into_result() {
        Some(Err(Error::SessionUnavailable)) | None => "still waiting for a session".to_string(),
        Some(Err(e)) => format!("error executing request: {}", e),
        Some(Ok(_)) => "unexpected response".to_string(),
    }
}

fn job_line(job: &Job) -> String {
    format!(
        "#{}: {} {} {} ({}) [{}]",
        job.job_id,
        job.customer_name,
        job.brand,
        job.model,
        job.issue,
        job.status.label()
    )
}

pub async fn list(store: &RepairStore, search: &str, status: StatusFilter) -> String {
    let state = store.list_jobs().await;
    match state.data() {
        Some(jobs) if !state.is_error() => {
            let lines: Vec<String> = filter_and_sort(jobs, search, status)
                .iter()
                .map(job_line)
                .collect();
            if jobs.is_empty() {
                "No repair jobs yet".to_string()
            } else if lines.is_empty() {
                "No jobs match your search".to_string()
            } else {
                lines.join("\n")
            }
        }
        _ => describe_failure(state),
    }
}

pub async fn stats(store: &RepairStore) -> String {
    let state = store.list_jobs().await;
    match state.data() {
        Some(jobs) if !state.is_error() => {
            let stats = JobStats::from_jobs(jobs);
            let mut lines = vec![format!("Total: {}", stats.total)];
            lines.extend(
                JobStatus::ALL
                    .iter()
                    .map(|status| format!("{}: {}", status.label(), stats.count(*status))),
            );
            lines.join("\n")
        }
        _ => describe_failure(state),
    }
}

pub async fn show(store: &RepairStore, job_id: JobId) -> String {
    let state = store.get_job(Some(job_id)).await;
    match state.data() {
        Some(Some(job)) if !state.is_error() => job_line(job),
        Some(None) if !state.is_error() => "Job not found".to_string(),
        _ => describe_failure(state),
    }
}

pub async fn submit(store: &RepairStore, form: JobForm, mode: EditorMode) -> String {
    match form.submit(store, mode).await {
        Ok(job_id) => match mode {
            EditorMode::Create => format!("created job #{}", job_id),
            EditorMode::Edit(_) => format!("updated job #{}", job_id),
        },
        Err(Error::Form(e)) => format!("invalid job: {}", e),
        Err(e) => format!("error executing request: {}", e),
    }
}

/// Fields left out on the command line keep the job's current values.
pub async fn update(
    store: &RepairStore,
    job_id: JobId,
    changes: JobForm,
    status: Option<JobStatus>,
) -> String {
    let state = store.get_job(Some(job_id)).await;
    let current = match state.data() {
        Some(Some(job)) if !state.is_error() => job.clone(),
        Some(None) if !state.is_error() => return "Job not found".to_string(),
        _ => return describe_failure(state),
    };
    let mut form = JobForm::from_job(&current);
    let keep = |new: String, old: String| if new.trim().is_empty() { old } else { new };
    form.customer_name = keep(changes.customer_name, form.customer_name);
    form.brand = keep(changes.brand, form.brand);
    form.model = keep(changes.model, form.model);
    form.issue = keep(changes.issue, form.issue);
    if let Some(status) = status {
        form.status = status;
    }
    submit(store, form, EditorMode::Edit(job_id)).await
}

pub async fn delete(store: &RepairStore, job_id: JobId) -> String {
    match store.delete_job(job_id).await {
        Ok(()) => format!("deleted job #{}", job_id),
        Err(e) => format!("error executing request: {}", e),
    }
}

pub async fn profile(store: &RepairStore, user: Option<Principal>) -> String {
    let state = match user {
        Some(user) => store.get_user_profile(user).await,
        None => store.get_caller_user_profile().await,
    };
    match state.data() {
        Some(Some(profile)) if !state.is_error() => profile.name.clone(),
        Some(None) if !state.is_error() => "No profile saved".to_string(),
        _ => describe_failure(state),
    }
}

pub async fn set_name(store: &RepairStore, name: &str) -> String {
    if name.trim().is_empty() {
        return "invalid profile: name is required".to_string();
    }
    match store.save_caller_user_profile(UserProfile::new(name.trim())).await {
        Ok(()) => format!("saved profile {}", name.trim()),
        Err(e) => format!("error executing request: {}", e),
    }
}

pub async fn role(store: &RepairStore) -> String {
    let role = store.get_caller_user_role().await;
    if role.is_error() || role.data().is_none() {
        return describe_failure(role);
    }
    let admin = store.is_caller_admin().await;
    if admin.is_error() {
        return describe_failure(admin);
    }
    match (role.data(), admin.data()) {
        (Some(role), Some(is_admin)) => format!("{} (admin: {})", role, is_admin),
        _ => describe_failure(admin),
    }
}

pub async fn assign_role(store: &RepairStore, user: Principal, role: UserRole) -> String {
    match store.assign_caller_user_role(user.clone(), role).await {
        Ok(()) => format!("assigned {} to {}", role, user),
        Err(e) => format!("error executing request: {}", e),
    }
}
