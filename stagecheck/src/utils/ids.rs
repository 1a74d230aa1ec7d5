//! Short random identifiers for namespacing test resources.

use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;

/// Length of identifiers returned by [`unique_id`].
pub const UNIQUE_ID_LEN: usize = 6;

/// Returns a short base-62 identifier.
///
/// Parallel test runs use it to keep bucket, cluster and container names
/// from colliding.
#[must_use]
pub fn unique_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(UNIQUE_ID_LEN)
        .map(char::from)
        .collect()
}

/// Builds a resource name of the form `<base>-<id>`, lowercased.
///
/// Most cloud resource names reject upper-case characters.
#[must_use]
pub fn format_cluster_name(base: &str, id: &str) -> String {
    format!("{base}-{id}").to_lowercase()
}

/// Picks one of `candidates` at random, or `None` if there are none.
#[must_use]
pub fn random_region<S: AsRef<str>>(candidates: &[S]) -> Option<String> {
    candidates
        .choose(&mut rand::thread_rng())
        .map(|region| region.as_ref().to_string())
}
