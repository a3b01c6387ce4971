//! Name discovery for resources named by an external controller
//!
//! Crossplane appends a generated suffix to every provider's service account
//! (`provider-azure-dbforpostgresql-3c1d2a9b7f04`). The exact names are needed for
//! federated credentials, so we poll the listing until at least the expected number
//! of matching names shows up.

use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::error::BootstrapError;
use crate::poll::{PollOutcome, PollPolicy, poll_until};

/// Pattern resource names must match to be considered.
#[derive(Debug, Clone)]
pub enum NamePattern {
    /// Literal prefix
    Prefix(String),
    Regex(Regex),
}

impl NamePattern {
    /// Match names starting with `prefix` (taken literally).
    #[must_use]
    pub fn prefix(prefix: &str) -> Self {
        Self::Prefix(prefix.to_string())
    }

    /// Match names with an arbitrary regular expression.
    pub fn regex(pattern: &str) -> Result<Self, BootstrapError> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| BootstrapError::parse(format!("name pattern '{pattern}'"), e))
    }

    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Self::Regex(re) => re.is_match(name),
        }
    }

    /// Regular-expression form, for error messages.
    #[must_use]
    pub fn as_regex_source(&self) -> String {
        match self {
            Self::Prefix(prefix) => format!("^{}", regex::escape(prefix)),
            Self::Regex(re) => re.as_str().to_string(),
        }
    }

    /// Matching names, sorted and deduplicated.
    #[must_use]
    pub fn filter<I, S>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matched: Vec<String> = names
            .into_iter()
            .filter(|n| self.matches(n.as_ref()))
            .map(|n| n.as_ref().to_string())
            .collect();
        matched.sort();
        matched.dedup();
        matched
    }
}

/// What to look for and how long to wait.
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    /// Human-readable description used in logs and errors ("provider service accounts")
    pub what: String,
    pub pattern: NamePattern,
    pub min_count: usize,
    pub policy: PollPolicy,
}

/// Poll `list` until at least `min_count` names match the pattern.
///
/// # Errors
///
/// [`BootstrapError::Discovery`] when the cap expires first, carrying the last
/// observed count; any error returned by `list` is propagated as is.
pub async fn discover_names<F, Fut, E>(
    request: &DiscoveryRequest,
    mut list: F,
) -> Result<Vec<String>, BootstrapError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<String>, E>>,
    E: Into<BootstrapError>,
{
    let last_found = Arc::new(AtomicUsize::new(0));

    let outcome = poll_until(request.policy, &request.what, || {
        let fut = list();
        let pattern = request.pattern.clone();
        let min_count = request.min_count;
        let last_found = last_found.clone();
        async move {
            let names = fut.await.map_err(Into::<BootstrapError>::into)?;
            let matched = pattern.filter(names);
            last_found.store(matched.len(), Ordering::SeqCst);
            Ok::<_, BootstrapError>((matched.len() >= min_count).then_some(matched))
        }
    })
    .await;

    match outcome {
        PollOutcome::Ready(names) => {
            info!(what = %request.what, count = names.len(), names = ?names, "names discovered");
            Ok(names)
        }
        PollOutcome::TimedOut { elapsed, .. } => Err(BootstrapError::Discovery {
            what: request.what.clone(),
            pattern: request.pattern.as_regex_source(),
            expected: request.min_count,
            found: last_found.load(Ordering::SeqCst),
            seconds: elapsed.as_secs(),
        }),
        PollOutcome::Error(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn request(min_count: usize, timeout_s: u64) -> DiscoveryRequest {
        DiscoveryRequest {
            what: "provider service accounts".to_string(),
            pattern: NamePattern::prefix("provider-azure-"),
            min_count,
            policy: PollPolicy::every_second(timeout_s),
        }
    }

    #[test]
    fn test_prefix_pattern_is_literal() {
        let pattern = NamePattern::prefix("provider-azure.");
        assert!(pattern.matches("provider-azure.x"));
        assert!(!pattern.matches("provider-azureXx"));
        assert!(!pattern.matches("crossplane-provider-azure.x"));
    }

    #[test]
    fn test_filter_sorts_and_dedups() {
        let pattern = NamePattern::prefix("provider-azure-");
        let names = pattern.filter([
            "provider-azure-dbforpostgresql-b2",
            "default",
            "provider-azure-dbforpostgresql-b2",
            "provider-azure-family-a1",
            "crossplane",
        ]);
        assert_eq!(
            names,
            vec!["provider-azure-dbforpostgresql-b2", "provider-azure-family-a1"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_at_poll_m_plus_one() {
        let m = 4;
        let polls = Arc::new(AtomicU32::new(0));
        let p = polls.clone();

        let names = discover_names(&request(2, 120), move || {
            let n = p.fetch_add(1, Ordering::SeqCst);
            async move {
                let listing = if n < m {
                    vec!["default".to_string(), "crossplane".to_string()]
                } else {
                    vec![
                        "default".to_string(),
                        "provider-azure-family-1f2e".to_string(),
                        "provider-azure-dbforpostgresql-9a8b".to_string(),
                    ]
                };
                Ok::<_, BootstrapError>(listing)
            }
        })
        .await
        .unwrap();

        assert_eq!(polls.load(Ordering::SeqCst), m + 1);
        assert_eq!(names.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_below_minimum() {
        let err = discover_names(&request(2, 120), || async {
            Ok::<_, BootstrapError>(vec!["provider-azure-family-1f2e".to_string()])
        })
        .await
        .unwrap_err();

        match err {
            BootstrapError::Discovery {
                expected,
                found,
                seconds,
                ..
            } => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
                assert_eq!(seconds, 120);
            }
            other => panic!("expected discovery error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_error_is_propagated() {
        let err = discover_names(&request(1, 10), || async {
            Err::<Vec<String>, _>(BootstrapError::NotAuthenticated {
                reason: "token expired".to_string(),
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, BootstrapError::NotAuthenticated { .. }));
    }

    #[test]
    fn test_regex_pattern_rejects_invalid() {
        assert!(NamePattern::regex("provider-(azure").is_err());
        assert!(NamePattern::regex("^provider-azure-(family|dbforpostgresql)-").is_ok());
    }
}
