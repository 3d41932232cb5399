//! Readiness probe strategies

use crate::error::{DockyardError, Result};
use crate::process::compose::{self, ComposeCommand, DOCKER};
use crate::process::{ProcessOptions, ProcessRunner};
use crate::project::ReadinessSpec;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// Host used by port checks without `config.host`
pub const DEFAULT_PROBE_HOST: &str = "localhost";

/// A parsed readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessCheck {
    /// GET `url`, ready on a 2xx response
    Http { url: String },
    /// TCP connect to `host:port`
    Port { host: String, port: u16 },
    /// Shell command exiting 0
    Command { command: String },
    /// Compose service running and healthy
    Docker { service: String },
    /// A kind this version does not know
    Unknown(String),
}

impl ReadinessCheck {
    /// Parse a spec; missing required fields are an error
    pub fn from_spec(spec: &ReadinessSpec) -> Result<Self> {
        let required = |key: &str| {
            spec.config_str(key).map(String::from).ok_or_else(|| {
                DockyardError::Readiness(format!("{} check requires config.{}", spec.kind, key))
            })
        };

        let check = match spec.kind.as_str() {
            "http" => Self::Http { url: required("url")? },
            "port" => Self::Port {
                host: spec
                    .config_str("host")
                    .unwrap_or(DEFAULT_PROBE_HOST)
                    .to_string(),
                port: parse_port(spec)?,
            },
            "command" => Self::Command {
                command: required("command")?,
            },
            "docker" => Self::Docker {
                service: required("service")?,
            },
            other => Self::Unknown(other.to_string()),
        };

        Ok(check)
    }
}

fn parse_port(spec: &ReadinessSpec) -> Result<u16> {
    let value = spec
        .config
        .get("port")
        .ok_or_else(|| DockyardError::Readiness("port check requires config.port".to_string()))?;

    let port = match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };

    port.ok_or_else(|| DockyardError::Readiness(format!("invalid port: {}", value)))
}

/// Evaluates a single readiness spec once
///
/// `Ok(false)` means "not ready"; `Err` means the probe itself broke and is
/// treated as "not ready" by the checker.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Probe once within `timeout`
    async fn probe(&self, spec: &ReadinessSpec, context: &Path, timeout: Duration) -> Result<bool>;
}

/// Probe implementing the `http`, `port`, `command` and `docker` kinds
pub struct Prober {
    /// Runner for command and docker checks
    runner: Arc<dyn ProcessRunner>,
    /// HTTP client
    client: reqwest::Client,
}

impl Prober {
    /// Create a new prober
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Result<Self> {
        // Probed services run next to the operator, not behind a proxy
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| DockyardError::Readiness(e.to_string()))?;

        Ok(Self { runner, client })
    }

    async fn http(&self, url: &str, timeout: Duration) -> bool {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => {
                let ready = response.status().is_success();
                tracing::debug!("GET {} -> {}", url, response.status());
                ready
            }
            Err(e) => {
                tracing::debug!("GET {} failed: {}", url, e);
                false
            }
        }
    }

    async fn port(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!("{}:{} refused: {}", host, port, e);
                false
            }
            Err(_) => {
                tracing::debug!("{}:{} timed out after {:?}", host, port, timeout);
                false
            }
        }
    }

    async fn command(&self, command: &str, context: &Path, timeout: Duration) -> Result<bool> {
        let args = vec!["-c".to_string(), command.to_string()];
        let options = ProcessOptions::new().cwd(context).timeout(timeout);
        let output = self.runner.run("sh", &args, &options).await?;

        if output.timed_out {
            tracing::debug!("Readiness command '{}' timed out", command);
        }
        Ok(output.success())
    }

    async fn docker(&self, service: &str, context: &Path, timeout: Duration) -> Result<bool> {
        let args = ComposeCommand::Ps {
            service: service.to_string(),
        }
        .args();
        let options = ProcessOptions::new().cwd(context).timeout(timeout);
        let output = self.runner.run(DOCKER, &args, &options).await?;

        if !output.success() {
            return Ok(false);
        }

        match compose::parse_ps_output(&output.stdout) {
            Ok(statuses) => Ok(!statuses.is_empty() && statuses.iter().all(|s| s.is_ready())),
            Err(e) => {
                tracing::debug!("Unreadable status for service {}: {}", service, e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl ReadinessProbe for Prober {
    async fn probe(&self, spec: &ReadinessSpec, context: &Path, timeout: Duration) -> Result<bool> {
        match ReadinessCheck::from_spec(spec)? {
            ReadinessCheck::Http { url } => Ok(self.http(&url, timeout).await),
            ReadinessCheck::Port { host, port } => Ok(self.port(&host, port, timeout).await),
            ReadinessCheck::Command { command } => self.command(&command, context, timeout).await,
            ReadinessCheck::Docker { service } => self.docker(&service, context, timeout).await,
            ReadinessCheck::Unknown(kind) => {
                tracing::warn!("Unknown readiness check type '{}', assuming ready", kind);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptedRunner;
    use crate::process::ProcessOutput;
    use std::path::PathBuf;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn prober(runner: ScriptedRunner) -> (Prober, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        (Prober::new(runner.clone()).unwrap(), runner)
    }

    /// A port that was just bound and released
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_parse_checks() {
        assert_eq!(
            ReadinessCheck::from_spec(&ReadinessSpec::new("port").with("port", "8080")).unwrap(),
            ReadinessCheck::Port {
                host: "localhost".to_string(),
                port: 8080
            }
        );
        assert!(ReadinessCheck::from_spec(&ReadinessSpec::new("http")).is_err());
        assert!(ReadinessCheck::from_spec(&ReadinessSpec::new("port").with("port", 70000)).is_err());
        assert_eq!(
            ReadinessCheck::from_spec(&ReadinessSpec::new("grpc")).unwrap(),
            ReadinessCheck::Unknown("grpc".to_string())
        );
    }

    #[tokio::test]
    async fn test_port_open_and_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let (prober, _) = prober(ScriptedRunner::succeeding());

        let spec = ReadinessSpec::port("127.0.0.1", open);
        assert!(prober.probe(&spec, Path::new("."), TIMEOUT).await.unwrap());

        drop(listener);
        let spec = ReadinessSpec::port("127.0.0.1", closed_port().await);
        assert!(!prober.probe(&spec, Path::new("."), TIMEOUT).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            for status in ["200 OK", "503 Service Unavailable"] {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 1024];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                socket.write_all(response.as_bytes()).await.unwrap();
            }
        });

        let (prober, _) = prober(ScriptedRunner::succeeding());
        let spec = ReadinessSpec::http(&format!("http://127.0.0.1:{}/health", port));
        assert!(prober.probe(&spec, Path::new("."), TIMEOUT).await.unwrap());
        assert!(!prober.probe(&spec, Path::new("."), TIMEOUT).await.unwrap());
    }

    #[tokio::test]
    async fn test_command_uses_context_and_timeout() {
        let (prober, runner) = prober(ScriptedRunner::new(|call| {
            if call.args[1] == "pg_isready" {
                Ok(ProcessOutput::exited(0, "", ""))
            } else {
                Ok(ProcessOutput::exited(1, "", ""))
            }
        }));

        let dir = PathBuf::from("/ws/db");
        assert!(prober
            .probe(&ReadinessSpec::command("pg_isready"), &dir, TIMEOUT)
            .await
            .unwrap());
        assert!(!prober
            .probe(&ReadinessSpec::command("false"), &dir, TIMEOUT)
            .await
            .unwrap());

        let calls = runner.calls();
        assert_eq!(calls[0].program, "sh");
        assert_eq!(calls[0].cwd, Some(dir));
    }

    #[tokio::test]
    async fn test_command_timeout_is_failure() {
        let (prober, _) = prober(ScriptedRunner::new(|_| {
            Ok(ProcessOutput {
                timed_out: true,
                ..Default::default()
            })
        }));
        assert!(!prober
            .probe(&ReadinessSpec::command("sleep 60"), Path::new("."), TIMEOUT)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_docker_health() {
        let (prober, runner) = prober(ScriptedRunner::new(|call| {
            let out = match call.args.last().map(String::as_str) {
                Some("db") => r#"{"Service":"db","State":"running","Health":"healthy"}"#,
                Some("cache") => r#"{"Service":"cache","State":"running","Health":""}"#,
                Some("api") => r#"{"Service":"api","State":"running","Health":"unhealthy"}"#,
                Some("worker") => r#"{"Service":"worker","State":"exited"}"#,
                _ => "not json",
            };
            Ok(ProcessOutput::exited(0, out, ""))
        }));

        let ctx = Path::new("/ws/db");
        for (service, ready) in [
            ("db", true),
            ("cache", true),
            ("api", false),
            ("worker", false),
            ("garbage", false),
        ] {
            let spec = ReadinessSpec::docker(service);
            assert_eq!(prober.probe(&spec, ctx, TIMEOUT).await.unwrap(), ready, "{}", service);
        }
        assert_eq!(runner.calls()[0].command_line(), "docker compose ps --format json db");
    }

    #[tokio::test]
    async fn test_unknown_kind_is_ready() {
        let (prober, runner) = prober(ScriptedRunner::succeeding());
        let spec = ReadinessSpec::new("carrier-pigeon");
        assert!(prober.probe(&spec, Path::new("."), TIMEOUT).await.unwrap());
        assert_eq!(runner.count(), 0);
    }
}
