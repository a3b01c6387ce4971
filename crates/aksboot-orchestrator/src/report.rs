//! Run report: what every stage did, what was discovered, where things are reachable

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use aksboot_stage_api::{DiscoveredSnapshot, StageId, StageOutcome, StageRecord};
use aksboot_utils::canonicalization::emit_jcs;

pub const REPORT_SCHEMA_VERSION: &str = "1";

/// Result of one `aksboot up`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// False when a fatal stage failed or the run was interrupted
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<StageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub records: Vec<StageRecord>,
    pub discovered: DiscoveredSnapshot,
    /// Service name to announced hostname
    pub endpoints: BTreeMap<String, String>,
}

impl RunReport {
    /// Records that ended with a warning.
    pub fn warnings(&self) -> impl Iterator<Item = &StageRecord> {
        self.records
            .iter()
            .filter(|r| r.outcome == StageOutcome::FailedNonFatalWarned)
    }

    #[must_use]
    pub fn count(&self, outcome: StageOutcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Canonical (RFC 8785) JSON.
    pub fn to_json(&self) -> anyhow::Result<String> {
        emit_jcs(self)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn record(stage: StageId, outcome: StageOutcome) -> StageRecord {
        StageRecord {
            stage,
            outcome,
            message: None,
            remediation: None,
            duration_ms: 12,
        }
    }

    pub fn report() -> RunReport {
        let at = DateTime::parse_from_rfc3339("2026-10-16T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut warned = record(StageId::Harbor, StageOutcome::FailedNonFatalWarned);
        warned.message = Some("Timed out after 600s waiting for Harbor API".to_string());
        warned.remediation = Some("Configure Harbor manually".to_string());
        RunReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            started_at: at,
            finished_at: at,
            ok: true,
            failed_stage: None,
            error: None,
            records: vec![
                record(StageId::ResourceGroup, StageOutcome::SkippedAlreadySatisfied),
                record(StageId::AksCluster, StageOutcome::Succeeded),
                warned,
            ],
            discovered: DiscoveredSnapshot {
                load_balancer_ip: Some("203.0.113.5".to_string()),
                ..DiscoveredSnapshot::default()
            },
            endpoints: BTreeMap::from([(
                "argocd".to_string(),
                "argocd.203.0.113.5.nip.io".to_string(),
            )]),
        }
    }
}
