//! Query client for the workload target.

use serde::Deserialize;

use std::io::Read as _;
use std::time::{Duration, Instant};

use crate::{QprofError, QprofResult, RunLog, format_duration};

const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// The rows of one query response. Contents are not interpreted.
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    pub series: Vec<serde_json::Value>,
}

/// Connection to the service the workload runs against.
pub trait QueryClient {
    /// Round-trip time of a liveness check.
    fn ping(&self) -> QprofResult<Duration>;

    fn query(&self, text: &str, database: &str) -> QprofResult<QueryRows>;
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// InfluxDB 1.x HTTP API client (`/ping`, `/query`).
#[derive(Debug, Clone)]
pub struct InfluxClient {
    agent: ureq::Agent,
    host: String,
    user: Option<String>,
    pass: Option<String>,
}

impl InfluxClient {
    pub fn new(host: impl Into<String>, user: Option<String>, pass: Option<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            host: host.into().trim_end_matches('/').to_string(),
            user,
            pass,
        }
    }

    fn with_credentials(&self, mut request: ureq::Request) -> ureq::Request {
        if let Some(user) = self.user.as_deref().filter(|u| !u.is_empty()) {
            request = request
                .query("u", user)
                .query("p", self.pass.as_deref().unwrap_or_default());
        }
        request
    }
}

/// Builds a client and checks the host answers a ping before any profiling starts.
pub fn connect(
    host: &str,
    user: Option<String>,
    pass: Option<String>,
    log: &RunLog,
) -> QprofResult<InfluxClient> {
    let client = InfluxClient::new(host, user, pass);
    let rtt = client.ping()?;
    log.printf(format_args!(
        "Host {host} responded to a ping in {}",
        format_duration(rtt)
    ));
    Ok(client)
}

impl QueryClient for InfluxClient {
    fn ping(&self) -> QprofResult<Duration> {
        let started = Instant::now();
        let request = self
            .agent
            .get(&format!("{}/ping", self.host))
            .timeout(PING_TIMEOUT);
        self.with_credentials(request).call()?;
        Ok(started.elapsed())
    }

    fn query(&self, text: &str, database: &str) -> QprofResult<QueryRows> {
        let request = self
            .agent
            .post(&format!("{}/query", self.host))
            .query("db", database)
            .query("q", text);
        let response = match self.with_credentials(request).call() {
            Ok(response) => response,
            // The server explains failed statements in a JSON body.
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                let message = serde_json::from_str::<QueryResponse>(&body)
                    .ok()
                    .and_then(|r| r.error)
                    .unwrap_or_else(|| format!("server returned status {status}"));
                return Err(QprofError::Workload(message));
            }
            Err(err) => return Err(err.into()),
        };

        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| QprofError::Network(format!("reading query response: {e}")))?;
        let parsed: QueryResponse = serde_json::from_slice(&body)
            .map_err(|e| QprofError::Workload(format!("decoding query response: {e}")))?;
        if let Some(error) = parsed.error {
            return Err(QprofError::Workload(error));
        }
        let mut rows = QueryRows::default();
        for result in parsed.results {
            if let Some(error) = result.error {
                return Err(QprofError::Workload(error));
            }
            rows.series.extend(result.series);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tiny_http::{Response, Server};

    fn serve_once(status: u16, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let server = Server::http("127.0.0.1:0").expect("bind");
        let addr = server.server_addr().to_ip().expect("ip addr");
        let handle = thread::spawn(move || {
            let request = server.recv().expect("request");
            let seen = format!("{} {}", request.method(), request.url());
            request
                .respond(Response::from_string(body).with_status_code(status))
                .expect("respond");
            seen
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn query_sends_database_and_statement() {
        let (host, handle) = serve_once(
            200,
            r#"{"results":[{"statement_id":0,"series":[{"name":"cpu","columns":["time"],"values":[[1]]}]}]}"#,
        );
        let client = InfluxClient::new(host, None, None);
        let rows = client.query("SELECT * FROM cpu", "mydb").expect("query");
        assert_eq!(rows.series.len(), 1);
        let seen = handle.join().expect("server");
        assert!(seen.starts_with("POST /query?"), "{seen}");
        assert!(seen.contains("db=mydb"));
        assert!(seen.contains("q=SELECT"));
    }

    #[test]
    fn statement_error_is_workload_error() {
        let (host, handle) = serve_once(
            200,
            r#"{"results":[{"statement_id":0,"error":"database not found: nope"}]}"#,
        );
        let err = InfluxClient::new(host, None, None)
            .query("SELECT 1", "nope")
            .expect_err("must fail");
        match err {
            QprofError::Workload(msg) => assert_eq!(msg, "database not found: nope"),
            other => panic!("expected workload error, got {other:?}"),
        }
        handle.join().expect("server");
    }

    #[test]
    fn non_json_success_body_is_workload_error() {
        let (host, handle) = serve_once(200, "<html>proxy</html>");
        let err = InfluxClient::new(host, None, None)
            .query("SELECT 1", "mydb")
            .expect_err("must fail");
        match err {
            QprofError::Workload(msg) => assert!(msg.starts_with("decoding query response"), "{msg}"),
            other => panic!("expected workload error, got {other:?}"),
        }
        handle.join().expect("server");
    }

    #[test]
    fn bad_request_body_is_surfaced() {
        let (host, handle) = serve_once(400, r#"{"error":"error parsing query: found EOF"}"#);
        let err = InfluxClient::new(host, None, None)
            .query("SELECT", "mydb")
            .expect_err("must fail");
        assert!(err.to_string().contains("error parsing query"), "{err}");
        handle.join().expect("server");
    }

    #[test]
    fn credentials_are_sent_as_query_params() {
        let server = Server::http("127.0.0.1:0").expect("bind");
        let addr = server.server_addr().to_ip().expect("ip addr");
        let handle = thread::spawn(move || {
            let request = server.recv().expect("request");
            let url = request.url().to_string();
            request
                .respond(Response::empty(204))
                .expect("respond");
            url
        });
        let log = RunLog::quiet();
        connect(
            &format!("http://{addr}"),
            Some("admin".to_string()),
            Some("secret".to_string()),
            &log,
        )
        .expect("connect");
        let url = handle.join().expect("server");
        assert!(log.contents().contains(&format!("Host http://{addr} responded to a ping in")));
        assert!(url.starts_with("/ping?"));
        assert!(url.contains("u=admin"));
        assert!(url.contains("p=secret"));
    }
}
