//! Persistence ports for specs, operations and response rules.
//!
//! The dispatcher and the admin surface both talk to the [`Store`] trait;
//! any backend honoring the documented sort guarantees is acceptable.
//! Operations are owned transitively by specs: they are regenerated from
//! the stored document on load and never persisted on their own.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::models::{Operation, ResponseRule, Spec};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("spec not found: {0}")]
    SpecNotFound(String),
    #[error("spec already exists: {0}")]
    SpecExists(String),
    #[error("operation not found: {0}")]
    OperationNotFound(String),
    #[error("operation already exists: {0}")]
    OperationExists(String),
    #[error("response rule not found: {0}")]
    RuleNotFound(String),
    #[error("response rule already exists: {0}")]
    RuleExists(String),
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    /// Missing-entity errors surface as 404s on the admin API; everything
    /// else is a 500.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::SpecNotFound(_)
                | StoreError::OperationNotFound(_)
                | StoreError::RuleNotFound(_)
        )
    }
}

/// CRUD port consumed by the dispatcher and the admin handlers.
pub trait Store: Send + Sync {
    // Specs
    fn create_spec(&self, spec: Spec) -> Result<(), StoreError>;
    fn get_spec(&self, id: &str) -> Result<Spec, StoreError>;
    /// All specs, sorted by name.
    fn get_all_specs(&self) -> Result<Vec<Spec>, StoreError>;
    fn get_enabled_specs(&self) -> Result<Vec<Spec>, StoreError>;
    fn update_spec(&self, spec: Spec) -> Result<(), StoreError>;
    fn delete_spec(&self, id: &str) -> Result<(), StoreError>;

    // Operations
    fn create_operation(&self, op: Operation) -> Result<(), StoreError>;
    fn get_operation(&self, id: &str) -> Result<Operation, StoreError>;
    /// Operations for a spec, sorted by path then method.
    fn get_operations_by_spec(&self, spec_id: &str) -> Result<Vec<Operation>, StoreError>;
    fn get_all_operations(&self) -> Result<Vec<Operation>, StoreError>;
    fn update_operation(&self, op: Operation) -> Result<(), StoreError>;
    fn delete_operation(&self, id: &str) -> Result<(), StoreError>;
    fn delete_operations_by_spec(&self, spec_id: &str) -> Result<(), StoreError>;

    // Response rules
    fn create_rule(&self, rule: ResponseRule) -> Result<(), StoreError>;
    fn get_rule(&self, id: &str) -> Result<ResponseRule, StoreError>;
    /// Rules for an operation, sorted ascending by priority; ties break by
    /// creation time, then id.
    fn get_rules_by_operation(&self, operation_id: &str) -> Result<Vec<ResponseRule>, StoreError>;
    fn update_rule(&self, rule: ResponseRule) -> Result<(), StoreError>;
    fn delete_rule(&self, id: &str) -> Result<(), StoreError>;
    fn delete_rules_by_operation(&self, operation_id: &str) -> Result<(), StoreError>;

    /// Flush and release backend resources.
    fn close(&self) -> Result<(), StoreError>;
}

/// Sort rules the way `get_rules_by_operation` promises.
pub(crate) fn sort_rules(rules: &mut [ResponseRule]) {
    rules.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}
