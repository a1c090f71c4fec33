use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use repair_data::{
    AssignRoleRequest, Job, JobCreatedResponse, JobDetails, JobId, JobStatus, Principal,
    UpdateJobRequest, UserProfile, UserRole,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

use crate::{
    config::Config,
    error::{Error, RemoteError, Result},
    service::{JobService, RemoteResult},
};

const CA_CERT_NAME: &str = "rootCA.crt";
const CLIENT_IDENTITY_NAME: &str = "clientKeyCert.pem";

/// Job service reached over HTTPS with JSON bodies.
#[derive(Clone)]
pub struct HttpJobService {
    base_url: Url,
    http_client: Client,
}

impl HttpJobService {
    pub fn new(base_url: &str, http_client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid base url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("base url {} cannot hold a path", base_url)));
        }
        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// client authenticated by the identity found in the configured certificate directory
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = config.require_base_url()?;
        let mut builder = Client::builder()
            .timeout(config.request_timeout)
            .use_rustls_tls();
        if let Some(certs_dir) = &config.certs_dir {
            let ca_cert = read_pem(certs_dir, CA_CERT_NAME)?;
            let ca_cert = reqwest::Certificate::from_pem(&ca_cert)
                .map_err(|e| Error::Config(format!("could not read CA certificate as PEM: {}", e)))?;
            let identity = read_pem(certs_dir, CLIENT_IDENTITY_NAME)?;
            let identity = reqwest::Identity::from_pem(&identity)
                .map_err(|e| Error::Config(format!("could not read client key/cert: {}", e)))?;
            builder = builder.add_root_certificate(ca_cert).identity(identity);
        }
        let http_client = builder
            .build()
            .map_err(|e| Error::Config(format!("could not build http client: {}", e)))?;
        Self::new(base_url, http_client)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("could not build http client: {}", e)))?;
        Self::new(base_url, http_client)
    }

    /// base url extended by `segments`, each one percent-encoded on its own
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        warn!("job service rejected request: status={} message={}", status, message);
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// 404 maps to `None`
    async fn fetch_optional<T: DeserializeOwned>(&self, path: &[&str]) -> RemoteResult<Option<T>> {
        let response = self.send(self.http_client.get(self.url(path))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &[&str]) -> RemoteResult<T> {
        let response = self.send(self.http_client.get(self.url(path))).await?;
        expect_found(&response)?;
        decode(response).await
    }

    async fn execute(&self, request: RequestBuilder) -> RemoteResult<()> {
        let response = self.send(request).await?;
        expect_found(&response)
    }
}

fn expect_found(response: &Response) -> RemoteResult<()> {
    if response.status() == StatusCode::NOT_FOUND {
        return Err(RemoteError::Rejected {
            status: StatusCode::NOT_FOUND.as_u16(),
            message: format!("{} not found", response.url().path()),
        });
    }
    Ok(())
}

async fn decode<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

fn read_pem(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let path: PathBuf = [dir, Path::new(name)].iter().collect();
    fs::read(&path).map_err(|e| Error::Config(format!("could not read {}: {}", path.display(), e)))
}

#[async_trait]
impl JobService for HttpJobService {
    #[instrument(skip(self))]
    async fn list_jobs(&self) -> RemoteResult<Vec<Job>> {
        self.fetch(&["jobs"]).await
    }

    #[instrument(skip(self))]
    async fn get_job(&self, job_id: JobId) -> RemoteResult<Option<Job>> {
        let job_id = job_id.to_string();
        self.fetch_optional(&["jobs", job_id.as_str()]).await
    }

    #[instrument(skip(self, details))]
    async fn create_job(&self, details: JobDetails) -> RemoteResult<JobId> {
        let request = self.http_client.post(self.url(&["jobs"])).json(&details);
        let response = self.send(request).await?;
        expect_found(&response)?;
        let created: JobCreatedResponse = decode(response).await?;
        info!("job service assigned id {}", created.job_id);
        Ok(created.job_id)
    }

    #[instrument(skip(self, details))]
    async fn update_job(
        &self,
        job_id: JobId,
        details: JobDetails,
        status: JobStatus,
    ) -> RemoteResult<()> {
        let body = UpdateJobRequest { details, status };
        let job_id = job_id.to_string();
        let request = self
            .http_client
            .put(self.url(&["jobs", job_id.as_str()]))
            .json(&body);
        self.execute(request).await
    }

    #[instrument(skip(self))]
    async fn delete_job(&self, job_id: JobId) -> RemoteResult<()> {
        let job_id = job_id.to_string();
        let request = self
            .http_client
            .delete(self.url(&["jobs", job_id.as_str()]));
        self.execute(request).await
    }

    #[instrument(skip(self))]
    async fn get_caller_user_profile(&self) -> RemoteResult<Option<UserProfile>> {
        self.fetch_optional(&["profile"]).await
    }

    #[instrument(skip(self))]
    async fn save_caller_user_profile(&self, profile: UserProfile) -> RemoteResult<()> {
        let request = self.http_client.put(self.url(&["profile"])).json(&profile);
        self.execute(request).await
    }

    #[instrument(skip(self))]
    async fn get_user_profile(&self, user: Principal) -> RemoteResult<Option<UserProfile>> {
        self.fetch_optional(&["users", user.as_str(), "profile"]).await
    }

    #[instrument(skip(self))]
    async fn get_caller_user_role(&self) -> RemoteResult<UserRole> {
        self.fetch(&["role"]).await
    }

    #[instrument(skip(self))]
    async fn is_caller_admin(&self) -> RemoteResult<bool> {
        self.fetch(&["admin"]).await
    }

    #[instrument(skip(self))]
    async fn assign_caller_user_role(&self, user: Principal, role: UserRole) -> RemoteResult<()> {
        let request = self
            .http_client
            .put(self.url(&["users", user.as_str(), "role"]))
            .json(&AssignRoleRequest { role });
        self.execute(request).await
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use repair_data::{JobDetails, JobStatus, Principal, UserRole};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    use super::HttpJobService;
    use crate::{
        config::Config,
        error::{Error, RemoteError},
        service::JobService,
        test_support::{setup, RUNTIME},
    };

    type Seen = Arc<Mutex<Vec<String>>>;

    // answers "METHOD /path" with a canned status and body, 501 for anything else
    async fn serve(routes: &[(&str, u16, &str)]) -> (HttpJobService, Seen) {
        let routes: HashMap<String, (u16, String)> = routes
            .iter()
            .map(|(route, status, body)| (route.to_string(), (*status, body.to_string())))
            .collect();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let route = read_request_line(&mut socket).await;
                recorded.lock().unwrap().push(route.clone());
                let (status, body) = routes
                    .get(&route)
                    .cloned()
                    .unwrap_or((501, "no route".to_string()));
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        let service =
            HttpJobService::with_timeout(&format!("http://{}/", addr), Duration::from_secs(5)).unwrap();
        (service, seen)
    }

    // reads headers and body, returns "METHOD /path"
    async fn read_request_line(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                let length = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        let head = String::from_utf8_lossy(&buf).to_string();
        let mut parts = head.split_whitespace();
        format!(
            "{} {}",
            parts.next().unwrap_or_default(),
            parts.next().unwrap_or_default()
        )
    }

    fn canon() -> JobDetails {
        JobDetails::new("Amy", "Canon", "R6", "shutter stuck")
    }

    #[test]
    fn test_base_url_is_normalized() {
        let service =
            HttpJobService::with_timeout("https://repairs.local:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!("https://repairs.local:8000/jobs/3", service.url(&["jobs", "3"]).as_str());
        let nested =
            HttpJobService::with_timeout("https://repairs.local/api", Duration::from_secs(1)).unwrap();
        assert_eq!("https://repairs.local/api/role", nested.url(&["role"]).as_str());
    }

    #[test]
    fn test_invalid_base_url() {
        match HttpJobService::with_timeout("repairs.local", Duration::from_secs(1)) {
            Err(Error::Config(_)) => {}
            _ => panic!("expected config error"),
        }
    }

    #[test]
    fn test_missing_base_url() {
        match HttpJobService::from_config(&Config::default()) {
            Err(Error::Config(_)) => {}
            _ => panic!("expected config error"),
        }
    }

    #[test]
    fn test_missing_certificates() {
        let config = Config {
            base_url: Some("https://repairs.local:8000".to_string()),
            certs_dir: Some("/nonexistent/certs".into()),
            ..Config::default()
        };
        match HttpJobService::from_config(&config) {
            Err(Error::Config(msg)) => assert!(msg.contains("rootCA.crt")),
            _ => panic!("expected config error"),
        }
    }

    // nothing listens on port 9 of localhost
    #[test]
    fn test_unreachable_service_is_transport_error() {
        setup();
        let service = HttpJobService::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        RUNTIME.block_on(async {
            match service.get_user_profile(Principal::new("amy")).await {
                Err(err @ RemoteError::Transport(_)) => assert!(err.is_retriable()),
                other => panic!("expected transport error, got: {:?}", other),
            }
        });
    }

    #[test]
    fn test_not_found_reads_are_none() {
        setup();
        RUNTIME.block_on(async {
            let (service, _) = serve(&[
                ("GET /jobs/7", 404, ""),
                ("GET /profile", 404, ""),
                ("GET /jobs/8", 200, r#"{"jobId":8,"customerName":"Amy","brand":"Canon","model":"R6","issue":"shutter stuck","status":"in_progress"}"#),
            ])
            .await;
            assert_eq!(Ok(None), service.get_job(7).await);
            assert_eq!(Ok(None), service.get_caller_user_profile().await);
            let job = service.get_job(8).await.unwrap().unwrap();
            assert_eq!(canon(), job.details());
            assert_eq!(JobStatus::InProgress, job.status);
        });
    }

    #[test]
    fn test_create_decodes_assigned_id() {
        setup();
        RUNTIME.block_on(async {
            let (service, seen) =
                serve(&[("POST /jobs", 201, r#"{"jobId":18446744073709551615}"#)]).await;
            assert_eq!(Ok(u64::MAX), service.create_job(canon()).await);
            assert_eq!(vec!["POST /jobs".to_string()], *seen.lock().unwrap());
        });
    }

    #[test]
    fn test_rejections_carry_status() {
        setup();
        RUNTIME.block_on(async {
            let (service, _) = serve(&[("GET /jobs", 503, "busy"), ("GET /role", 403, "no")]).await;
            let busy = service.list_jobs().await.unwrap_err();
            assert_eq!(
                RemoteError::Rejected {
                    status: 503,
                    message: "busy".to_string()
                },
                busy
            );
            assert!(busy.is_retriable());
            match service.get_caller_user_role().await {
                Err(err @ RemoteError::Rejected { status: 403, .. }) => assert!(!err.is_retriable()),
                other => panic!("expected rejection, got: {:?}", other),
            }
        });
    }

    #[test]
    fn test_mutating_missing_job_is_rejected() {
        setup();
        RUNTIME.block_on(async {
            let (service, _) = serve(&[("DELETE /jobs/4", 404, ""), ("PUT /jobs/4", 404, "")]).await;
            match service.delete_job(4).await {
                Err(RemoteError::Rejected { status: 404, .. }) => {}
                other => panic!("expected not found rejection, got: {:?}", other),
            }
            match service.update_job(4, canon(), JobStatus::Completed).await {
                Err(RemoteError::Rejected { status: 404, .. }) => {}
                other => panic!("expected not found rejection, got: {:?}", other),
            }
        });
    }

    #[test]
    fn test_malformed_body_is_decode_error() {
        setup();
        RUNTIME.block_on(async {
            let (service, _) = serve(&[("GET /admin", 200, "yes")]).await;
            match service.is_caller_admin().await {
                Err(err @ RemoteError::Decode(_)) => assert!(!err.is_retriable()),
                other => panic!("expected decode error, got: {:?}", other),
            }
        });
    }

    // reserved characters in a principal stay inside its path segment
    #[test]
    fn test_principal_is_escaped_in_path() {
        setup();
        RUNTIME.block_on(async {
            let (service, seen) = serve(&[
                ("GET /users/ana%2Fb%3Fx%23y/profile", 200, r#"{"name":"Ana"}"#),
                ("PUT /users/ana%2Fb%3Fx%23y/role", 204, ""),
            ])
            .await;
            let user = Principal::new("ana/b?x#y");
            let profile = service.get_user_profile(user.clone()).await.unwrap();
            assert_eq!(Some("Ana"), profile.as_ref().map(|p| p.name.as_str()));
            assert_eq!(Ok(()), service.assign_caller_user_role(user, UserRole::User).await);
            assert_eq!(
                vec![
                    "GET /users/ana%2Fb%3Fx%23y/profile".to_string(),
                    "PUT /users/ana%2Fb%3Fx%23y/role".to_string(),
                ],
                *seen.lock().unwrap()
            );
        });
    }
}
