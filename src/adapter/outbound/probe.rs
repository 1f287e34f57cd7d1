//! Readiness checks over the network and through the runtime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tokio::net::TcpStream;
use tracing::warn;

use crate::domain::id::ServiceId;
use crate::domain::service::HealthCheck;
use crate::port::outbound::probe::{ProbeOutcome, ReadinessCheck};
use crate::port::outbound::runtime::ContainerRuntime;

/// Upper bound for a single HTTP attempt; the prober's budget still applies.
const HTTP_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Performs `http`, `tcp` and `exec` checks.
pub struct NetworkCheck {
    http: HttpClient,
    runtime: Arc<dyn ContainerRuntime>,
}

impl NetworkCheck {
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        let http = HttpClient::builder()
            .timeout(HTTP_ATTEMPT_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });
        Self { http, runtime }
    }

    async fn http(&self, url: &str, expect_status: u16) -> ProbeOutcome {
        match self.http.get(url).send().await {
            Ok(response) if response.status().as_u16() == expect_status => ProbeOutcome::Ready,
            Ok(response) => ProbeOutcome::NotReady(format!(
                "GET {url} returned {}, expected {expect_status}",
                response.status().as_u16()
            )),
            Err(e) => ProbeOutcome::NotReady(format!("GET {url} failed: {e}")),
        }
    }

    async fn tcp(host: &str, port: u16) -> ProbeOutcome {
        match TcpStream::connect((host, port)).await {
            Ok(_) => ProbeOutcome::Ready,
            Err(e) => ProbeOutcome::NotReady(format!("connect {host}:{port} failed: {e}")),
        }
    }

    async fn exec(
        &self,
        project: &str,
        service: &ServiceId,
        command: &[String],
        expect_exit: i32,
    ) -> ProbeOutcome {
        match self.runtime.exec(project, service, command, None).await {
            Ok(output) if output.exit_code == expect_exit => ProbeOutcome::Ready,
            Ok(output) => ProbeOutcome::NotReady(format!(
                "`{}` exited with {}, expected {expect_exit}",
                command.join(" "),
                output.exit_code
            )),
            Err(e) => ProbeOutcome::NotReady(e.to_string()),
        }
    }
}

#[async_trait]
impl ReadinessCheck for NetworkCheck {
    async fn check(&self, project: &str, service: &ServiceId, check: &HealthCheck) -> ProbeOutcome {
        match check {
            HealthCheck::Http { url, expect_status } => self.http(url, *expect_status).await,
            HealthCheck::Tcp { host, port } => Self::tcp(host, *port).await,
            HealthCheck::Exec {
                command,
                expect_exit,
            } => self.exec(project, service, command, *expect_exit).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::runtime::FakeRuntime;

    fn check() -> NetworkCheck {
        NetworkCheck::new(Arc::new(FakeRuntime::new()))
    }

    #[tokio::test]
    async fn tcp_ready_when_listening() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let outcome = check()
            .check(
                "acme",
                &ServiceId::new("db"),
                &HealthCheck::Tcp {
                    host: "127.0.0.1".into(),
                    port,
                },
            )
            .await;
        assert!(outcome.is_ready());
    }

    #[tokio::test]
    async fn tcp_not_ready_when_closed() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let outcome = check()
            .check(
                "acme",
                &ServiceId::new("db"),
                &HealthCheck::Tcp {
                    host: "127.0.0.1".into(),
                    port,
                },
            )
            .await;
        assert!(matches!(outcome, ProbeOutcome::NotReady(reason) if reason.contains("connect")));
    }

    #[tokio::test]
    async fn http_compares_status() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        let url = format!("http://127.0.0.1:{port}/health");
        let outcome = check()
            .check(
                "acme",
                &ServiceId::new("api"),
                &HealthCheck::Http {
                    url: url.clone(),
                    expect_status: 200,
                },
            )
            .await;
        assert_eq!(
            outcome,
            ProbeOutcome::NotReady(format!("GET {url} returned 503, expected 200"))
        );
    }

    #[tokio::test]
    async fn exec_runs_inside_the_service() {
        let runtime = Arc::new(FakeRuntime::new());
        let check = NetworkCheck::new(runtime.clone());
        let probe = HealthCheck::Exec {
            command: vec!["pg_isready".into()],
            expect_exit: 0,
        };
        let db = ServiceId::new("db");

        assert!(!check.check("acme", &db, &probe).await.is_ready());
        runtime.set_running("db", 1);
        assert!(check.check("acme", &db, &probe).await.is_ready());
    }
}
