//! Scripted collaborators for driver tests.

use crate::errors::{CommandError, HttpError};
use crate::provision::{CommandOutput, CommandRunner, CommandSpec};
use crate::retry::{HttpClient, HttpResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A shared invocation counter.
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    count: Arc<AtomicUsize>,
}

impl CallCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one call and returns the new count.
    pub fn hit(&self) -> usize {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the number of calls so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// One request seen by a [`ScriptedHttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// `GET` or `POST`.
    pub method: &'static str,
    /// The requested URL.
    pub url: String,
    /// Form parameters, for `POST`.
    pub params: Vec<(String, String)>,
}

/// An HTTP client that replays a script of responses.
///
/// Each request consumes the next scripted result. Once the script is down
/// to its last entry, that entry is repeated, so a poll that never
/// succeeds keeps failing the same way.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedHttpClient {
    /// Creates a client with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a response.
    #[must_use]
    pub fn respond(self, status: u16, body: impl AsRef<str>) -> Self {
        self.script.lock().push_back(Ok(HttpResponse::new(status, body)));
        self
    }

    /// Appends a transport failure such as a refused connection.
    #[must_use]
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .push_back(Err(HttpError::new("-", "-", message)));
        self
    }

    /// Returns every request seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests seen so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next(&self, method: &'static str, url: &str, params: &[(String, String)]) -> Result<HttpResponse, HttpError> {
        self.requests.lock().push(RecordedRequest {
            method,
            url: url.to_string(),
            params: params.to_vec(),
        });

        let mut script = self.script.lock();
        let entry = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match entry {
            Some(Ok(response)) => Ok(response),
            Some(Err(e)) => Err(HttpError::new(method, url, e.message)),
            None => Err(HttpError::new(method, url, "no scripted response")),
        }
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.next("GET", url, &[])
    }

    async fn post_form(&self, url: &str, params: &[(String, String)]) -> Result<HttpResponse, HttpError> {
        self.next("POST", url, params)
    }
}

/// A command runner that records every command and answers from rules.
///
/// A rule matches when the rendered command line starts with its prefix;
/// the first matching rule wins. Unmatched commands succeed with empty
/// output.
#[derive(Debug, Default)]
pub struct RecordingCommandRunner {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl RecordingCommandRunner {
    /// Creates a runner with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands starting with `prefix` with `output`.
    #[must_use]
    pub fn on(self, prefix: impl Into<String>, output: CommandOutput) -> Self {
        self.rules.lock().push((prefix.into(), output));
        self
    }

    /// Returns every command run so far.
    #[must_use]
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Returns the rendered command lines run so far.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.lock().iter().map(ToString::to_string).collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls.lock().push(spec.clone());
        let line = spec.to_string();
        let output = self
            .rules
            .lock()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::success(""));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_counter_is_shared() {
        let counter = CallCounter::new();
        let clone = counter.clone();
        assert_eq!(clone.hit(), 1);
        assert_eq!(counter.hit(), 2);
        assert_eq!(clone.count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_client_repeats_last_entry() {
        let client = ScriptedHttpClient::new()
            .fail("connection refused")
            .respond(503, "starting")
            .respond(200, "ok");

        assert!(client.get("http://a").await.is_err());
        assert_eq!(client.get("http://a").await.unwrap().status, 503);
        assert_eq!(client.get("http://a").await.unwrap().status, 200);
        assert_eq!(client.get("http://a").await.unwrap().status, 200);
        assert_eq!(client.request_count(), 4);
    }

    #[tokio::test]
    async fn test_scripted_client_records_form_params() {
        let client = ScriptedHttpClient::new().respond(200, "{}");
        let params = vec![("name".to_string(), "test-bucket".to_string())];
        client.post_form("http://a/pools/default/buckets", &params).await.unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].params, params);
    }

    #[tokio::test]
    async fn test_empty_script_is_transport_error() {
        let err = ScriptedHttpClient::new().get("http://a").await.unwrap_err();
        assert!(err.to_string().contains("no scripted response"));
    }

    #[tokio::test]
    async fn test_recording_runner_rules() {
        let runner = RecordingCommandRunner::new()
            .on("terraform output", CommandOutput::success("10.0.0.1"))
            .on("terraform", CommandOutput::failure(1, "boom"));

        let out = runner
            .run(&CommandSpec::new("terraform").args(["output", "-raw", "ip"]))
            .await
            .unwrap();
        assert_eq!(out.stdout, "10.0.0.1");

        let out = runner.run(&CommandSpec::new("terraform").arg("apply")).await.unwrap();
        assert_eq!(out.exit_code, Some(1));

        let out = runner.run(&CommandSpec::new("docker").arg("ps")).await.unwrap();
        assert!(out.is_success());
        assert_eq!(
            runner.command_lines(),
            vec!["terraform output -raw ip", "terraform apply", "docker ps"]
        );
    }
}
