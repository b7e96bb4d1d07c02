//! Inbound request shapes that don't arrive via the webhook intake (§6
//! "Inbound: manual deployment", "Inbound: rollback").

use serde::Deserialize;

use pipelinectl_types::{Error, Result};

fn default_true() -> bool {
    true
}

/// `{repository, commit?, branch, reason, create_backup, skip_health_check,
/// triggered_by}` (§6). A missing `commit` means "deploy the latest commit
/// on `branch`"; resolving that against a live git remote is outside this
/// crate's scope (§1), so it is passed through to the `Applier` as the
/// literal sentinel `"HEAD"`.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualDeploymentRequest {
    pub repository: String,
    #[serde(default)]
    pub commit: Option<String>,
    pub branch: String,
    pub reason: String,
    #[serde(default = "default_true")]
    pub create_backup: bool,
    #[serde(default)]
    pub skip_health_check: bool,
    pub triggered_by: String,
}

const HEAD_SENTINEL: &str = "HEAD";

impl ManualDeploymentRequest {
    pub fn validate(&self) -> Result<()> {
        if self.repository.trim().is_empty() {
            return Err(Error::Validation("repository is required".to_string()));
        }
        if self.branch.trim().is_empty() {
            return Err(Error::Validation("branch is required".to_string()));
        }
        if self.triggered_by.trim().is_empty() {
            return Err(Error::Validation("triggered_by is required".to_string()));
        }
        let reason_len = self.reason.chars().count();
        if !(10..=500).contains(&reason_len) {
            return Err(Error::Validation(format!(
                "reason must be between 10 and 500 characters, got {reason_len}"
            )));
        }
        Ok(())
    }

    pub fn resolved_commit(&self) -> String {
        self.commit.clone().unwrap_or_else(|| HEAD_SENTINEL.to_string())
    }
}

/// `{deployment_id, reason}` (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct RollbackRequest {
    pub deployment_id: String,
    pub reason: String,
}

impl RollbackRequest {
    pub fn validate(&self) -> Result<()> {
        if self.deployment_id.trim().is_empty() {
            return Err(Error::Validation("deployment_id is required".to_string()));
        }
        if self.reason.trim().is_empty() {
            return Err(Error::Validation("reason is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(reason: &str) -> ManualDeploymentRequest {
        ManualDeploymentRequest {
            repository: "owner/r".to_string(),
            commit: None,
            branch: "main".to_string(),
            reason: reason.to_string(),
            create_backup: true,
            skip_health_check: false,
            triggered_by: "alice".to_string(),
        }
    }

    #[test]
    fn reason_shorter_than_ten_chars_is_rejected() {
        assert!(request("too short").validate().is_err());
    }

    #[test]
    fn reason_within_bounds_is_accepted() {
        assert!(request("deploying the hotfix for the outage").validate().is_ok());
    }

    #[test]
    fn missing_commit_resolves_to_head_sentinel() {
        assert_eq!(request("deploying the hotfix for the outage").resolved_commit(), "HEAD");
    }

    #[test]
    fn empty_branch_is_rejected() {
        let mut r = request("deploying the hotfix for the outage");
        r.branch = "".to_string();
        assert!(r.validate().is_err());
    }

    #[test]
    fn rollback_request_requires_a_reason() {
        let r = RollbackRequest { deployment_id: "dep_1".to_string(), reason: "".to_string() };
        assert!(r.validate().is_err());
    }
}
