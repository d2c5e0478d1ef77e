//! Service configuration.
//!
//! The service reads one TOML file at startup:
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//! public_url = "https://ci.example.com/"
//! webhook_secret = "s3cret"          # optional
//!
//! [status_api]
//! base_url = "https://bitbucket.org/api/2.0/repositories/"
//! timeout_secs = 60
//!
//! [status_api.proxy]                 # optional
//! host = "proxy.internal"
//! port = 3128
//!
//! [credentials.bitbucket]
//! username = "build-bot"
//! password = "app-password"
//!
//! [[jobs]]
//! name = "pr-builder"
//! destination_repository = "org/repo"
//! cancel_outdated_jobs = true
//! ci_key = "bbprb"
//! ci_name = "PR builder"
//! credentials_id = "bitbucket"
//! command = "make test"
//! max_concurrent_builds = 2
//!
//! [jobs.parameters]
//! DEPLOY = "false"
//! ```
//!
//! `BBPRB_WEBHOOK_SECRET` overrides `webhook_secret` when set.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::bitbucket::{
    BitbucketReporter, CiIdentity, ClientConfig, Credentials, DEFAULT_API_BASE, DEFAULT_TIMEOUT,
    ProxyConfig, StatusClient, StatusError,
};
use crate::runner::{LocalRunner, LocalRunnerConfig, ParameterSet};
use crate::server::JobTrigger;
use crate::trigger::{TriggerConfig, TriggerEngine};
use crate::types::{JobName, RepoFullName};

/// Environment variable overriding the configured webhook secret.
pub const WEBHOOK_SECRET_ENV: &str = "BBPRB_WEBHOOK_SECRET";

const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080/";
const DEFAULT_TIMEOUT_SECS: u64 = DEFAULT_TIMEOUT.as_secs();
const DEFAULT_CI_KEY: &str = "bbprb";
const DEFAULT_CI_NAME: &str = "Bitbucket PR Builder";

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("cannot create status client for job {job}: {source}")]
    StatusClient {
        job: String,
        #[source]
        source: StatusError,
    },
}

/// The whole configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Externally visible root of this service; job and build links hang
    /// off it.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default)]
    pub status_api: StatusApiConfig,

    /// Status API credentials by id.
    #[serde(default)]
    pub credentials: BTreeMap<String, Credentials>,

    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

impl Default for StatusApiConfig {
    fn default() -> Self {
        StatusApiConfig {
            base_url: default_api_base(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            proxy: None,
        }
    }
}

impl StatusApiConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_base: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            proxy: self.proxy.clone(),
        }
    }
}

/// One monitored job.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub name: String,

    pub destination_repository: String,

    #[serde(default)]
    pub cancel_outdated_jobs: bool,

    #[serde(default = "default_ci_key")]
    pub ci_key: String,

    #[serde(default = "default_ci_name")]
    pub ci_name: String,

    #[serde(default)]
    pub credentials_id: Option<String>,

    pub command: String,

    #[serde(default)]
    pub workdir: Option<PathBuf>,

    #[serde(default = "default_max_concurrent_builds")]
    pub max_concurrent_builds: usize,

    /// Default build parameters.
    #[serde(default)]
    pub parameters: ParameterSet,
}

impl JobConfig {
    pub fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig {
            job: JobName::new(&self.name),
            destination_repository: RepoFullName::new(&self.destination_repository),
            cancel_outdated_jobs: self.cancel_outdated_jobs,
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_public_url() -> String {
    DEFAULT_PUBLIC_URL.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_ci_key() -> String {
    DEFAULT_CI_KEY.to_string()
}

fn default_ci_name() -> String {
    DEFAULT_CI_NAME.to_string()
}

fn default_max_concurrent_builds() -> usize {
    1
}

impl AppConfig {
    /// Reads, parses and validates `path`, then applies environment
    /// overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        config.override_webhook_secret(std::env::var(WEBHOOK_SECRET_ENV).ok());
        Ok(config)
    }

    /// Parses and validates a configuration document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replaces the webhook secret with `secret` unless it is empty.
    pub fn override_webhook_secret(&mut self, secret: Option<String>) {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.webhook_secret = Some(secret);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs.is_empty() {
            return Err(ConfigError::Invalid("at least one [[jobs]] entry is required".into()));
        }

        let mut names = BTreeSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(ConfigError::Invalid("job name must not be empty".into()));
            }
            if !names.insert(job.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate job name `{}`",
                    job.name
                )));
            }
            if job.destination_repository.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "job `{}` has an empty destination_repository",
                    job.name
                )));
            }
            if job.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "job `{}` has an empty command",
                    job.name
                )));
            }
            if job.max_concurrent_builds == 0 {
                return Err(ConfigError::Invalid(format!(
                    "job `{}` needs at least one executor",
                    job.name
                )));
            }
        }

        Ok(())
    }

    /// Link to a job's page under `public_url`.
    pub fn job_url(&self, job: &str) -> String {
        format!("{}/job/{}/", self.public_url.trim_end_matches('/'), job)
    }

    /// Builds the status reporter for `job`.
    ///
    /// A job without credentials, or with credentials that do not exist,
    /// still builds; it just does not report statuses.
    pub fn reporter_for(&self, job: &JobConfig) -> Result<BitbucketReporter, ConfigError> {
        let Some(credentials_id) = job.credentials_id.as_deref() else {
            warn!(job = %job.name, "Missing Bitbucket API credentials");
            return Ok(BitbucketReporter::disabled());
        };

        let Some(credentials) = self.credentials.get(credentials_id) else {
            error!(job = %job.name, credentials_id, "Credentials not found");
            return Ok(BitbucketReporter::disabled());
        };

        info!(job = %job.name, credentials_id, "Creating Bitbucket API client");
        let client = StatusClient::new(
            &self.status_api.client_config(),
            credentials.clone(),
            CiIdentity {
                key: job.ci_key.clone(),
                name: job.ci_name.clone(),
            },
        )
        .map_err(|source| ConfigError::StatusClient {
            job: job.name.clone(),
            source,
        })?;

        Ok(BitbucketReporter::new(client))
    }

    /// Builds one trigger engine per configured job.
    pub fn build_jobs(&self) -> Result<Vec<JobTrigger>, ConfigError> {
        self.jobs
            .iter()
            .map(|job| {
                let runner = LocalRunner::new(LocalRunnerConfig {
                    job: JobName::new(&job.name),
                    job_url: self.job_url(&job.name),
                    command: job.command.clone(),
                    workdir: job.workdir.clone(),
                    max_concurrent_builds: job.max_concurrent_builds,
                    default_parameters: job.parameters.clone(),
                });
                let reporter = self.reporter_for(job)?;
                Ok(TriggerEngine::new(job.trigger_config(), runner, reporter))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [[jobs]]
        name = "pr-builder"
        destination_repository = "org/repo"
        command = "make test"
    "#;

    const FULL: &str = r#"
        listen = "127.0.0.1:9090"
        public_url = "https://ci.example.com/"
        webhook_secret = "from-file"

        [status_api]
        base_url = "https://bitbucket.example.com/api/2.0/repositories/"
        timeout_secs = 5

        [status_api.proxy]
        host = "proxy.internal"
        port = 3128
        username = "squid"
        password = "pw"

        [credentials.bitbucket]
        username = "build-bot"
        password = "app-password"

        [[jobs]]
        name = "pr-builder"
        destination_repository = "org/repo"
        cancel_outdated_jobs = true
        ci_key = "jenkins"
        ci_name = "Jenkins"
        credentials_id = "bitbucket"
        command = "make test"
        workdir = "/srv/build"
        max_concurrent_builds = 2

        [jobs.parameters]
        DEPLOY = "false"

        [[jobs]]
        name = "lint"
        destination_repository = "org/repo"
        credentials_id = "missing"
        command = "make lint"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.public_url, "http://localhost:8080/");
        assert_eq!(config.webhook_secret, None);
        assert_eq!(config.status_api.base_url, DEFAULT_API_BASE);
        assert_eq!(config.status_api.timeout_secs, 60);
        assert!(config.status_api.proxy.is_none());

        let job = &config.jobs[0];
        assert!(!job.cancel_outdated_jobs);
        assert_eq!(job.ci_key, "bbprb");
        assert_eq!(job.max_concurrent_builds, 1);
        assert!(job.credentials_id.is_none());
        assert!(job.parameters.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = AppConfig::from_toml(FULL).unwrap();

        assert_eq!(config.listen, "127.0.0.1:9090".parse().unwrap());
        assert_eq!(config.webhook_secret.as_deref(), Some("from-file"));
        assert_eq!(
            config.status_api.client_config().timeout,
            Duration::from_secs(5)
        );
        assert_eq!(config.status_api.proxy.as_ref().unwrap().port, 3128);
        assert_eq!(config.credentials["bitbucket"].username, "build-bot");

        let job = &config.jobs[0];
        assert!(job.cancel_outdated_jobs);
        assert_eq!(job.workdir.as_deref(), Some(Path::new("/srv/build")));
        assert_eq!(job.parameters.get("DEPLOY"), Some("false"));

        let trigger = job.trigger_config();
        assert_eq!(trigger.job, JobName::new("pr-builder"));
        assert_eq!(trigger.destination_repository, RepoFullName::new("org/repo"));
        assert!(trigger.cancel_outdated_jobs);
        assert_eq!(job.ci_name, "Jenkins");
    }

    #[test]
    fn job_urls_hang_off_public_url() {
        let config = AppConfig::from_toml(FULL).unwrap();
        assert_eq!(
            config.job_url("pr-builder"),
            "https://ci.example.com/job/pr-builder/"
        );
    }

    #[test]
    fn validation_rejects_bad_jobs() {
        let cases = [
            ("jobs = []", "at least one"),
            (
                r#"
                [[jobs]]
                name = "a"
                destination_repository = "org/repo"
                command = "true"
                [[jobs]]
                name = "a"
                destination_repository = "org/repo"
                command = "true"
                "#,
                "duplicate job name",
            ),
            (
                r#"
                [[jobs]]
                name = "a"
                destination_repository = "org/repo"
                command = "  "
                "#,
                "empty command",
            ),
            (
                r#"
                [[jobs]]
                name = "a"
                destination_repository = "org/repo"
                command = "true"
                max_concurrent_builds = 0
                "#,
                "at least one executor",
            ),
        ];

        for (toml, expected) in cases {
            match AppConfig::from_toml(toml) {
                Err(ConfigError::Invalid(message)) => {
                    assert!(message.contains(expected), "{message:?} vs {expected:?}")
                }
                other => panic!("expected Invalid({expected}), got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = format!("{MINIMAL}\n        colour = \"blue\"\n");
        assert!(matches!(
            AppConfig::from_toml(&toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn environment_secret_overrides_file() {
        let mut config = AppConfig::from_toml(FULL).unwrap();

        config.override_webhook_secret(Some(String::new()));
        assert_eq!(config.webhook_secret.as_deref(), Some("from-file"));

        config.override_webhook_secret(Some("from-env".to_string()));
        assert_eq!(config.webhook_secret.as_deref(), Some("from-env"));
    }

    #[test]
    fn credentials_resolution_never_blocks_a_job() {
        let config = AppConfig::from_toml(FULL).unwrap();

        assert!(config.reporter_for(&config.jobs[0]).unwrap().is_enabled());
        // `credentials_id = "missing"` is not defined.
        assert!(!config.reporter_for(&config.jobs[1]).unwrap().is_enabled());

        let minimal = AppConfig::from_toml(MINIMAL).unwrap();
        assert!(!minimal.reporter_for(&minimal.jobs[0]).unwrap().is_enabled());
    }

    #[tokio::test]
    async fn reporter_posts_under_the_job_ci_identity() {
        use crate::bitbucket::{StatusReporter, StatusUpdate};
        use crate::types::{BuildState, Sha};
        use httpmock::prelude::*;

        let server = MockServer::start_async().await;
        let status = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/org/src/commit/1a2b3c4d5e6f/statuses/build")
                    .form_urlencoded_tuple("key", "jenkins-pr-builder")
                    .form_urlencoded_tuple("name", "Jenkins");
                then.status(201);
            })
            .await;

        let mut config = AppConfig::from_toml(FULL).unwrap();
        config.status_api.base_url = server.url("/");
        config.status_api.proxy = None;

        config
            .reporter_for(&config.jobs[0])
            .unwrap()
            .report(StatusUpdate {
                repository: RepoFullName::new("org/src"),
                revision: Sha::new("1a2b3c4d5e6f"),
                state: BuildState::InProgress,
                build_url: config.job_url("pr-builder"),
                description: None,
                key_extension: "pr-builder".to_string(),
            })
            .await;

        status.assert_async().await;
    }

    #[test]
    fn build_jobs_creates_one_engine_per_job() {
        let config = AppConfig::from_toml(FULL).unwrap();
        let jobs = config.build_jobs().unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].config().job, JobName::new("lint"));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.jobs.len(), 1);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        match AppConfig::load(&path) {
            Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}
