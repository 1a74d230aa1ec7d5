//! Reusable validation predicates for HTTP polling.
//!
//! A predicate answers "is the system in the expected state yet" for a
//! single `(status, body)` observation.

use serde::de::DeserializeOwned;
use tracing::debug;

/// Accepts any response with the given status.
pub fn status_is(expected: u16) -> impl Fn(u16, &str) -> bool + Send + Sync {
    move |status, _body| status == expected
}

/// Accepts a response with the given status whose body contains `needle`.
pub fn status_and_body_contains(
    expected: u16,
    needle: impl Into<String>,
) -> impl Fn(u16, &str) -> bool + Send + Sync {
    let needle = needle.into();
    move |status, body| status == expected && body.contains(needle.as_str())
}

/// Parses the body as JSON and applies `check` to the decoded value.
///
/// A wrong status or an unparseable body is a rejection, not an error,
/// since readiness endpoints often answer with HTML while booting.
pub fn json_body<T, F>(expected_status: u16, check: F) -> impl Fn(u16, &str) -> bool + Send + Sync
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool + Send + Sync,
{
    move |status, body| {
        if status != expected_status {
            debug!(status, expected_status, "Unexpected status while polling");
            return false;
        }
        match serde_json::from_str::<T>(body) {
            Ok(value) => check(&value),
            Err(e) => {
                debug!(error = %e, "Failed to parse response body");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct NodesResponse {
        nodes: Vec<Node>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Node {
        status: String,
        cluster_membership: String,
    }

    #[test]
    fn test_status_is() {
        let p = status_is(200);
        assert!(p(200, "anything"));
        assert!(!p(404, "anything"));
    }

    #[test]
    fn test_status_and_body_contains() {
        let p = status_and_body_contains(200, r#""state":"Online""#);
        assert!(p(200, r#"{"state":"Online"}"#));
        assert!(!p(200, r#"{"state":"Offline"}"#));
        assert!(!p(500, r#"{"state":"Online"}"#));
    }

    #[test]
    fn test_json_body_all_nodes_healthy() {
        let p = json_body(200, |resp: &NodesResponse| {
            resp.nodes.len() == 2
                && resp
                    .nodes
                    .iter()
                    .all(|n| n.status == "healthy" && n.cluster_membership == "active")
        });

        let ready = r#"{"nodes":[
            {"status":"healthy","clusterMembership":"active"},
            {"status":"healthy","clusterMembership":"active"}]}"#;
        let warming = r#"{"nodes":[
            {"status":"warmup","clusterMembership":"active"},
            {"status":"healthy","clusterMembership":"inactiveAdded"}]}"#;

        assert!(p(200, ready));
        assert!(!p(200, warming));
        assert!(!p(200, "<html>booting</html>"));
        assert!(!p(401, ready));
    }
}
