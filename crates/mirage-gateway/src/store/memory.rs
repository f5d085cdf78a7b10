//! In-memory store backend.

use super::{sort_rules, Store, StoreError};
use crate::models::{Operation, ResponseRule, Spec};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Tables {
    specs: HashMap<String, Spec>,
    operations: HashMap<String, Operation>,
    rules: HashMap<String, ResponseRule>,
}

/// Store backend holding everything in maps behind one reader-writer lock.
/// Reads never block each other.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk insert used by the file store while loading from disk.
    pub(crate) fn load(
        &self,
        specs: Vec<Spec>,
        operations: Vec<Operation>,
        rules: Vec<ResponseRule>,
    ) {
        let mut tables = self.tables.write();
        for spec in specs {
            tables.specs.insert(spec.id.clone(), spec);
        }
        for op in operations {
            tables.operations.insert(op.id.clone(), op);
        }
        for rule in rules {
            tables.rules.insert(rule.id.clone(), rule);
        }
    }
}

impl Store for MemoryStore {
    fn create_spec(&self, spec: Spec) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.specs.contains_key(&spec.id) {
            return Err(StoreError::SpecExists(spec.id));
        }
        tables.specs.insert(spec.id.clone(), spec);
        Ok(())
    }

    fn get_spec(&self, id: &str) -> Result<Spec, StoreError> {
        self.tables
            .read()
            .specs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SpecNotFound(id.to_string()))
    }

    fn get_all_specs(&self) -> Result<Vec<Spec>, StoreError> {
        let mut specs: Vec<Spec> = self.tables.read().specs.values().cloned().collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }

    fn get_enabled_specs(&self) -> Result<Vec<Spec>, StoreError> {
        Ok(self
            .tables
            .read()
            .specs
            .values()
            .filter(|spec| spec.enabled)
            .cloned()
            .collect())
    }

    fn update_spec(&self, spec: Spec) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.specs.contains_key(&spec.id) {
            return Err(StoreError::SpecNotFound(spec.id));
        }
        tables.specs.insert(spec.id.clone(), spec);
        Ok(())
    }

    fn delete_spec(&self, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        tables
            .specs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::SpecNotFound(id.to_string()))
    }

    fn create_operation(&self, op: Operation) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.operations.contains_key(&op.id) {
            return Err(StoreError::OperationExists(op.id));
        }
        tables.operations.insert(op.id.clone(), op);
        Ok(())
    }

    fn get_operation(&self, id: &str) -> Result<Operation, StoreError> {
        self.tables
            .read()
            .operations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::OperationNotFound(id.to_string()))
    }

    fn get_operations_by_spec(&self, spec_id: &str) -> Result<Vec<Operation>, StoreError> {
        let mut ops: Vec<Operation> = self
            .tables
            .read()
            .operations
            .values()
            .filter(|op| op.spec_id == spec_id)
            .cloned()
            .collect();
        ops.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.method.cmp(&b.method)));
        Ok(ops)
    }

    fn get_all_operations(&self) -> Result<Vec<Operation>, StoreError> {
        Ok(self.tables.read().operations.values().cloned().collect())
    }

    fn update_operation(&self, op: Operation) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.operations.contains_key(&op.id) {
            return Err(StoreError::OperationNotFound(op.id));
        }
        tables.operations.insert(op.id.clone(), op);
        Ok(())
    }

    fn delete_operation(&self, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        tables
            .operations
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::OperationNotFound(id.to_string()))
    }

    fn delete_operations_by_spec(&self, spec_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        tables.operations.retain(|_, op| op.spec_id != spec_id);
        Ok(())
    }

    fn create_rule(&self, rule: ResponseRule) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.rules.contains_key(&rule.id) {
            return Err(StoreError::RuleExists(rule.id));
        }
        tables.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    fn get_rule(&self, id: &str) -> Result<ResponseRule, StoreError> {
        self.tables
            .read()
            .rules
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::RuleNotFound(id.to_string()))
    }

    fn get_rules_by_operation(&self, operation_id: &str) -> Result<Vec<ResponseRule>, StoreError> {
        let mut rules: Vec<ResponseRule> = self
            .tables
            .read()
            .rules
            .values()
            .filter(|rule| rule.operation_id == operation_id)
            .cloned()
            .collect();
        sort_rules(&mut rules);
        Ok(rules)
    }

    fn update_rule(&self, rule: ResponseRule) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.rules.contains_key(&rule.id) {
            return Err(StoreError::RuleNotFound(rule.id));
        }
        tables.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    fn delete_rule(&self, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        tables
            .rules
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::RuleNotFound(id.to_string()))
    }

    fn delete_rules_by_operation(&self, operation_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        tables.rules.retain(|_, rule| rule.operation_id != operation_id);
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
