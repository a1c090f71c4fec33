mod operations;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use repair_lib::{
    Config, EditorMode, HttpJobService, JobForm, JobId, JobStatus, Principal, RepairStore,
    Session, StatusFilter, UserRole,
};
use structopt::StructOpt;
use tracing::info;

/// Command line front desk for the camera repair tracker
#[derive(StructOpt, Debug)]
#[structopt(name = "repair-client")]
struct Opt {
    /// overrides REPAIR_CERTS_DIR
    #[structopt(long, parse(from_os_str))]
    certs_dir: Option<PathBuf>,

    /// overrides REPAIR_BASE_URL
    #[structopt(long)]
    url: Option<String>,

    /// identity presented by the client certificate
    #[structopt(long, default_value = "front-desk")]
    principal: String,

    #[structopt(subcommand)]
    operation: Operation,
}

#[derive(Debug, StructOpt)]
enum Operation {
    List(ListOperation),
    Stats,
    Show(JobOperation),
    Create(CreateOperation),
    Update(UpdateOperation),
    Delete(JobOperation),
    Profile(ProfileOperation),
    SetName(SetNameOperation),
    Role,
    AssignRole(AssignRoleOperation),
}

#[derive(Debug, StructOpt)]
struct ListOperation {
    /// matches customer, brand, model, problem or job id
    #[structopt(long, default_value = "")]
    search: String,
    /// all, pending, in_progress or completed
    #[structopt(long, default_value = "all")]
    status: StatusFilter,
}

#[derive(Debug, StructOpt)]
struct JobOperation {
    #[structopt(name = "JOB ID")]
    job_id: JobId,
}

#[derive(Debug, StructOpt)]
struct CreateOperation {
    #[structopt(name = "CUSTOMER")]
    customer_name: String,
    #[structopt(name = "BRAND")]
    brand: String,
    #[structopt(name = "MODEL")]
    model: String,
    #[structopt(name = "PROBLEM")]
    issue: String,
}

#[derive(Debug, StructOpt)]
struct UpdateOperation {
    #[structopt(name = "JOB ID")]
    job_id: JobId,
    #[structopt(long, default_value = "")]
    customer: String,
    #[structopt(long, default_value = "")]
    brand: String,
    #[structopt(long, default_value = "")]
    model: String,
    #[structopt(long, default_value = "")]
    problem: String,
    #[structopt(long)]
    status: Option<JobStatus>,
}

#[derive(Debug, StructOpt)]
struct ProfileOperation {
    /// someone else's principal, defaults to the caller
    #[structopt(name = "PRINCIPAL")]
    user: Option<String>,
}

#[derive(Debug, StructOpt)]
struct SetNameOperation {
    #[structopt(name = "NAME")]
    name: String,
}

#[derive(Debug, StructOpt)]
struct AssignRoleOperation {
    #[structopt(name = "PRINCIPAL")]
    user: String,
    /// admin, user or guest
    #[structopt(name = "ROLE")]
    role: UserRole,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = Opt::from_args();

    let mut config = Config::from_env().context("could not read configuration")?;
    if opt.url.is_some() {
        config.base_url = opt.url.clone();
    }
    if opt.certs_dir.is_some() {
        config.certs_dir = opt.certs_dir.clone();
    }

    let service = HttpJobService::from_config(&config).context("could not build job service")?;
    let session = Session::ready(Principal::new(&opt.principal), Arc::new(service));
    let store = RepairStore::from_config(Arc::new(session), &config);
    info!("talking to {}", config.require_base_url()?);

    let output = match opt.operation {
        Operation::List(list) => operations::list(&store, &list.search, list.status).await,
        Operation::Stats => operations::stats(&store).await,
        Operation::Show(show) => operations::show(&store, show.job_id).await,
        Operation::Create(create) => {
            let form = JobForm {
                customer_name: create.customer_name,
                brand: create.brand,
                model: create.model,
                issue: create.issue,
                status: JobStatus::Pending,
            };
            operations::submit(&store, form, EditorMode::Create).await
        }
        Operation::Update(update) => {
            let changes = JobForm {
                customer_name: update.customer,
                brand: update.brand,
                model: update.model,
                issue: update.problem,
                status: JobStatus::default(),
            };
            operations::update(&store, update.job_id, changes, update.status).await
        }
        Operation::Delete(delete) => operations::delete(&store, delete.job_id).await,
        Operation::Profile(profile) => {
            let user = profile.user.as_deref().map(Principal::new);
            operations::profile(&store, user).await
        }
        Operation::SetName(set_name) => operations::set_name(&store, &set_name.name).await,
        Operation::Role => operations::role(&store).await,
        Operation::AssignRole(assign) => {
            operations::assign_role(&store, Principal::new(&assign.user), assign.role).await
        }
    };
    println!("{}", output);
    Ok(())
}
