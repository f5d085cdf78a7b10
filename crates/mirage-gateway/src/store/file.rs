//! File-backed store.
//!
//! On-disk layout under the storage root:
//!
//! ```text
//! specs/{id}.json                  spec metadata (content stripped)
//! specs/{id}.yaml|.yml|.spec.json  raw OpenAPI document
//! responses/{id}.json              rule metadata (body stripped)
//! responses/{id}.body              rule body (omitted when empty)
//! ```
//!
//! Older installations embedded the document and body inside the JSON
//! metadata; those files still load, and the modern layout is re-emitted on
//! the spot.

use super::{MemoryStore, Store, StoreError};
use crate::models::{Operation, ResponseRule, Spec};
use crate::openapi;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CONTENT_EXTENSIONS: [&str; 3] = [".yaml", ".yml", ".spec.json"];

/// Store backend persisting every mutation to disk while serving reads from
/// an in-memory mirror.
pub struct FileStore {
    base_path: PathBuf,
    memory: MemoryStore,
    /// Serializes file writes; in-memory state is guarded by the mirror.
    io_lock: Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StoreError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(base_path.join("specs"))?;
        fs::create_dir_all(base_path.join("responses"))?;

        let store = Self {
            base_path,
            memory: MemoryStore::new(),
            io_lock: Mutex::new(()),
        };
        store.load_all()?;
        Ok(store)
    }

    fn specs_dir(&self) -> PathBuf {
        self.base_path.join("specs")
    }

    fn responses_dir(&self) -> PathBuf {
        self.base_path.join("responses")
    }

    fn load_all(&self) -> Result<(), StoreError> {
        let mut specs = Vec::new();
        let mut operations = Vec::new();
        let mut rules = Vec::new();
        let mut specs_to_migrate = Vec::new();
        let mut rules_to_migrate = Vec::new();

        for entry in read_json_files(&self.specs_dir())? {
            let Ok(data) = fs::read_to_string(&entry) else {
                continue;
            };
            let Ok(mut spec) = serde_json::from_str::<Spec>(&data) else {
                warn!(path = %entry.display(), "skipping unreadable spec metadata");
                continue;
            };

            match self.load_spec_content(&spec.id) {
                Some(content) => spec.content = content,
                // Legacy layout: document embedded in the metadata JSON.
                None if !spec.content.is_empty() => specs_to_migrate.push(spec.id.clone()),
                None => {}
            }

            // Tracing never survives a restart.
            spec.tracing = false;

            if !spec.content.is_empty() {
                match openapi::parse_operations(&spec.content, &spec.id, &spec.base_path) {
                    Ok(ops) => operations.extend(ops),
                    Err(e) => warn!(spec = %spec.id, "failed to regenerate operations: {e}"),
                }
            }

            specs.push(spec);
        }

        for entry in read_json_files(&self.responses_dir())? {
            let Ok(data) = fs::read_to_string(&entry) else {
                continue;
            };
            let Ok(mut rule) = serde_json::from_str::<ResponseRule>(&data) else {
                warn!(path = %entry.display(), "skipping unreadable rule metadata");
                continue;
            };

            match self.load_rule_body(&rule.id) {
                Some(body) => rule.body = body,
                None if !rule.body.is_empty() => rules_to_migrate.push(rule.id.clone()),
                None => {}
            }

            rules.push(rule);
        }

        debug!(
            specs = specs.len(),
            operations = operations.len(),
            rules = rules.len(),
            "loaded store from {}",
            self.base_path.display()
        );

        self.memory.load(specs, operations, rules);

        // Re-emit the modern layout for anything loaded from the legacy one.
        for id in specs_to_migrate {
            if let Ok(spec) = self.memory.get_spec(&id) {
                if let Err(e) = self.save_spec(&spec) {
                    warn!(spec = %id, "failed to migrate spec to split layout: {e}");
                }
            }
        }
        for id in rules_to_migrate {
            if let Ok(rule) = self.memory.get_rule(&id) {
                if let Err(e) = self.save_rule(&rule) {
                    warn!(rule = %id, "failed to migrate rule to split layout: {e}");
                }
            }
        }

        Ok(())
    }

    fn load_spec_content(&self, spec_id: &str) -> Option<String> {
        let dir = self.specs_dir();
        CONTENT_EXTENSIONS
            .iter()
            .find_map(|ext| fs::read_to_string(dir.join(format!("{spec_id}{ext}"))).ok())
            .filter(|content| !content.is_empty())
    }

    fn load_rule_body(&self, rule_id: &str) -> Option<String> {
        fs::read_to_string(self.responses_dir().join(format!("{rule_id}.body")))
            .ok()
            .filter(|body| !body.is_empty())
    }

    fn save_spec(&self, spec: &Spec) -> Result<(), StoreError> {
        let _guard = self.io_lock.lock();
        let dir = self.specs_dir();

        if !spec.content.is_empty() {
            let ext = if spec.content.trim_start().starts_with('{') {
                ".spec.json"
            } else {
                ".yaml"
            };
            fs::write(dir.join(format!("{}{ext}", spec.id)), &spec.content)?;
        }

        let mut meta = spec.clone();
        meta.content = String::new();
        let data = serde_json::to_string_pretty(&meta)?;
        fs::write(dir.join(format!("{}.json", spec.id)), data)?;
        Ok(())
    }

    fn delete_spec_files(&self, id: &str) {
        let _guard = self.io_lock.lock();
        let dir = self.specs_dir();
        let _ = fs::remove_file(dir.join(format!("{id}.json")));
        for ext in CONTENT_EXTENSIONS {
            let _ = fs::remove_file(dir.join(format!("{id}{ext}")));
        }
    }

    fn save_rule(&self, rule: &ResponseRule) -> Result<(), StoreError> {
        let _guard = self.io_lock.lock();
        let dir = self.responses_dir();

        if !rule.body.is_empty() {
            fs::write(dir.join(format!("{}.body", rule.id)), &rule.body)?;
        }

        let mut meta = rule.clone();
        meta.body = String::new();
        let data = serde_json::to_string_pretty(&meta)?;
        fs::write(dir.join(format!("{}.json", rule.id)), data)?;
        Ok(())
    }

    fn delete_rule_files(&self, id: &str) {
        let _guard = self.io_lock.lock();
        let dir = self.responses_dir();
        let _ = fs::remove_file(dir.join(format!("{id}.json")));
        let _ = fs::remove_file(dir.join(format!("{id}.body")));
    }
}

fn read_json_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        // Only bare .json metadata; .spec.json holds document content.
        let is_meta = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.ends_with(".json") && !name.ends_with(".spec.json"))
            .unwrap_or(false);
        if path.is_file() && is_meta {
            files.push(path);
        }
    }
    Ok(files)
}

impl Store for FileStore {
    fn create_spec(&self, spec: Spec) -> Result<(), StoreError> {
        self.memory.create_spec(spec.clone())?;
        self.save_spec(&spec)
    }

    fn get_spec(&self, id: &str) -> Result<Spec, StoreError> {
        self.memory.get_spec(id)
    }

    fn get_all_specs(&self) -> Result<Vec<Spec>, StoreError> {
        self.memory.get_all_specs()
    }

    fn get_enabled_specs(&self) -> Result<Vec<Spec>, StoreError> {
        self.memory.get_enabled_specs()
    }

    fn update_spec(&self, spec: Spec) -> Result<(), StoreError> {
        self.memory.update_spec(spec.clone())?;
        self.save_spec(&spec)
    }

    fn delete_spec(&self, id: &str) -> Result<(), StoreError> {
        self.memory.delete_spec(id)?;
        self.delete_spec_files(id);
        Ok(())
    }

    fn create_operation(&self, op: Operation) -> Result<(), StoreError> {
        // Operations are derived state; memory only.
        self.memory.create_operation(op)
    }

    fn get_operation(&self, id: &str) -> Result<Operation, StoreError> {
        self.memory.get_operation(id)
    }

    fn get_operations_by_spec(&self, spec_id: &str) -> Result<Vec<Operation>, StoreError> {
        self.memory.get_operations_by_spec(spec_id)
    }

    fn get_all_operations(&self) -> Result<Vec<Operation>, StoreError> {
        self.memory.get_all_operations()
    }

    fn update_operation(&self, op: Operation) -> Result<(), StoreError> {
        self.memory.update_operation(op)
    }

    fn delete_operation(&self, id: &str) -> Result<(), StoreError> {
        self.memory.delete_operation(id)
    }

    fn delete_operations_by_spec(&self, spec_id: &str) -> Result<(), StoreError> {
        self.memory.delete_operations_by_spec(spec_id)
    }

    fn create_rule(&self, rule: ResponseRule) -> Result<(), StoreError> {
        self.memory.create_rule(rule.clone())?;
        self.save_rule(&rule)
    }

    fn get_rule(&self, id: &str) -> Result<ResponseRule, StoreError> {
        self.memory.get_rule(id)
    }

    fn get_rules_by_operation(&self, operation_id: &str) -> Result<Vec<ResponseRule>, StoreError> {
        self.memory.get_rules_by_operation(operation_id)
    }

    fn update_rule(&self, rule: ResponseRule) -> Result<(), StoreError> {
        self.memory.update_rule(rule.clone())?;
        self.save_rule(&rule)
    }

    fn delete_rule(&self, id: &str) -> Result<(), StoreError> {
        self.memory.delete_rule(id)?;
        self.delete_rule_files(id);
        Ok(())
    }

    fn delete_rules_by_operation(&self, operation_id: &str) -> Result<(), StoreError> {
        let rules = self.memory.get_rules_by_operation(operation_id)?;
        self.memory.delete_rules_by_operation(operation_id)?;
        for rule in rules {
            self.delete_rule_files(&rule.id);
        }
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    const MINIMAL_SPEC: &str = r#"
openapi: 3.0.0
info:
  title: Users
  version: "1.0"
paths:
  /users/{id}:
    get:
      responses:
        '200':
          description: ok
"#;

    fn sample_spec(id: &str) -> Spec {
        let now = Utc::now();
        Spec {
            id: id.to_string(),
            name: "Users".to_string(),
            version: "1.0".to_string(),
            description: String::new(),
            content: MINIMAL_SPEC.to_string(),
            base_path: String::new(),
            enabled: true,
            tracing: true,
            use_example_fallback: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_rule(id: &str, op_id: &str) -> ResponseRule {
        ResponseRule {
            id: id.to_string(),
            operation_id: op_id.to_string(),
            name: "ok".to_string(),
            description: String::new(),
            priority: 0,
            conditions: Vec::new(),
            status_code: 200,
            headers: HashMap::new(),
            body: r#"{"hello":"world"}"#.to_string(),
            delay_ms: 0,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_split_layout_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.create_spec(sample_spec("s1")).unwrap();
        store.create_rule(sample_rule("r1", "op1")).unwrap();

        assert!(dir.path().join("specs/s1.json").exists());
        assert!(dir.path().join("specs/s1.yaml").exists());
        assert!(dir.path().join("responses/r1.json").exists());
        assert!(dir.path().join("responses/r1.body").exists());

        // Metadata JSON carries no inline content/body
        let meta = fs::read_to_string(dir.path().join("specs/s1.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&meta).unwrap();
        assert_eq!(value["content"], "");
        let meta = fs::read_to_string(dir.path().join("responses/r1.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&meta).unwrap();
        assert_eq!(value["body"], "");
    }

    #[test]
    fn test_reload_preserves_data_and_resets_tracing() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::new(dir.path()).unwrap();
            store.create_spec(sample_spec("s1")).unwrap();
            store.create_rule(sample_rule("r1", "op1")).unwrap();
        }

        let store = FileStore::new(dir.path()).unwrap();
        let spec = store.get_spec("s1").unwrap();
        assert_eq!(spec.name, "Users");
        assert!(spec.content.contains("openapi"));
        // Tracing is ephemeral even though it was stored as true
        assert!(!spec.tracing);

        let rule = store.get_rule("r1").unwrap();
        assert_eq!(rule.body, r#"{"hello":"world"}"#);

        // Operations regenerated from the stored document
        let ops = store.get_operations_by_spec("s1").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].method, "GET");
    }

    #[test]
    fn test_operation_ids_stable_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let first_id = {
            let store = FileStore::new(dir.path()).unwrap();
            let spec = sample_spec("s1");
            let ops =
                openapi::parse_operations(&spec.content, &spec.id, &spec.base_path).unwrap();
            store.create_spec(spec).unwrap();
            for op in &ops {
                store.create_operation(op.clone()).unwrap();
            }
            ops[0].id.clone()
        };

        let store = FileStore::new(dir.path()).unwrap();
        let ops = store.get_operations_by_spec("s1").unwrap();
        assert_eq!(ops[0].id, first_id);
    }

    #[test]
    fn test_legacy_inline_content_migrates() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("specs")).unwrap();
        fs::create_dir_all(dir.path().join("responses")).unwrap();

        // Old-format spec metadata with the document embedded
        let legacy = serde_json::to_string(&sample_spec("old")).unwrap();
        fs::write(dir.path().join("specs/old.json"), legacy).unwrap();

        let store = FileStore::new(dir.path()).unwrap();
        let spec = store.get_spec("old").unwrap();
        assert!(spec.content.contains("openapi"));

        // Migrated to the split layout
        assert!(dir.path().join("specs/old.yaml").exists());
        let meta = fs::read_to_string(dir.path().join("specs/old.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&meta).unwrap();
        assert_eq!(value["content"], "");
    }

    #[test]
    fn test_delete_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.create_spec(sample_spec("s1")).unwrap();
        store.create_rule(sample_rule("r1", "op1")).unwrap();

        store.delete_spec("s1").unwrap();
        store.delete_rule("r1").unwrap();

        assert!(!dir.path().join("specs/s1.json").exists());
        assert!(!dir.path().join("specs/s1.yaml").exists());
        assert!(!dir.path().join("responses/r1.json").exists());
        assert!(!dir.path().join("responses/r1.body").exists());
    }

    #[test]
    fn test_json_content_gets_spec_json_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let mut spec = sample_spec("j1");
        spec.content = r#"{"openapi":"3.0.0","info":{"title":"J","version":"1"},"paths":{"/a":{"get":{"responses":{"200":{"description":"ok"}}}}}}"#.to_string();
        store.create_spec(spec).unwrap();
        assert!(dir.path().join("specs/j1.spec.json").exists());

        // .spec.json files are not mistaken for metadata on reload
        let store = FileStore::new(dir.path()).unwrap();
        assert_eq!(store.get_all_specs().unwrap().len(), 1);
    }
}
