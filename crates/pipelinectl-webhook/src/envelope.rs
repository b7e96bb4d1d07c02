//! Parses the inbound version-control webhook body into the fields the
//! orchestrator needs to open a deployment (§4.11, §6).

use serde::Deserialize;

use pipelinectl_types::{Error, Repository};

/// Minimal event envelope; real VCS providers send far more, but only
/// these fields feed the deployment request (§4.11 "derives a deployment
/// request `{repository, commit, branch, actor, ...}`").
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    repository: String,
    commit: String,
    branch: String,
    #[serde(default = "default_actor")]
    actor: String,
}

fn default_actor() -> String {
    "webhook".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub repository: Repository,
    pub commit: String,
    pub branch: String,
    pub actor: String,
}

/// Parse and validate the body. Empty `repository`, `commit`, or `branch`
/// is malformed, not merely invalid input — the orchestrator has nothing
/// to key a deployment on without them.
pub fn parse(body: &[u8]) -> Result<DeploymentRequest, Error> {
    let raw: RawEnvelope = serde_json::from_slice(body).map_err(|e| Error::Malformed(e.to_string()))?;
    if raw.repository.trim().is_empty() || raw.commit.trim().is_empty() || raw.branch.trim().is_empty() {
        return Err(Error::Malformed("repository, commit, and branch are required".to_string()));
    }
    Ok(DeploymentRequest {
        repository: Repository::new(raw.repository),
        commit: raw.commit,
        branch: raw.branch,
        actor: raw.actor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_envelope() {
        let body = br#"{"repository":"owner/r","commit":"abc123","branch":"main","actor":"alice"}"#;
        let req = parse(body).unwrap();
        assert_eq!(req.repository.as_str(), "owner/r");
        assert_eq!(req.commit, "abc123");
        assert_eq!(req.actor, "alice");
    }

    #[test]
    fn defaults_actor_when_absent() {
        let body = br#"{"repository":"owner/r","commit":"abc123","branch":"main"}"#;
        let req = parse(body).unwrap();
        assert_eq!(req.actor, "webhook");
    }

    #[test]
    fn rejects_non_json_body() {
        let err = parse(b"not json").unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn rejects_empty_commit() {
        let body = br#"{"repository":"owner/r","commit":"","branch":"main"}"#;
        let err = parse(body).unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }
}
