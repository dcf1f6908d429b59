use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::{AppConfig, DepartmentHead};
use crate::errors::ServiceError;

/// The fixed second-tier approver role.
pub const FINANCE_MANAGER_ROLE: &str = "Finance Manager";

/// The approver chain resolved for a department at submission time.
#[derive(Debug, Clone)]
pub struct ApproverChain {
    pub department_head: String,
    pub department_head_email: Option<String>,
    pub finance_role: String,
    pub finance_email: Option<String>,
}

/// Resolves the required approver chain for a department. External
/// collaborator seam; the in-process implementation reads a configured
/// table, a directory-backed one would slot in behind the same trait.
#[async_trait]
pub trait ApprovalRuleLookup: Send + Sync {
    async fn approver_chain(&self, department: &str) -> Result<ApproverChain, ServiceError>;
}

/// Config-backed approval rules: department -> head, plus the fixed finance
/// role target.
pub struct StaticApprovalRules {
    heads: HashMap<String, DepartmentHead>,
    finance_email: Option<String>,
}

impl StaticApprovalRules {
    pub fn new(heads: HashMap<String, DepartmentHead>, finance_email: Option<String>) -> Self {
        Self {
            heads,
            finance_email,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.department_heads.clone(), cfg.finance_manager_email.clone())
    }
}

#[async_trait]
impl ApprovalRuleLookup for StaticApprovalRules {
    async fn approver_chain(&self, department: &str) -> Result<ApproverChain, ServiceError> {
        let head = self.heads.get(department.trim()).ok_or_else(|| {
            ServiceError::NotFound(format!(
                "No department head configured for department '{}'",
                department
            ))
        })?;

        Ok(ApproverChain {
            department_head: head.name.clone(),
            department_head_email: head.email.clone(),
            finance_role: FINANCE_MANAGER_ROLE.to_string(),
            finance_email: self.finance_email.clone(),
        })
    }
}
