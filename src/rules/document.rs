//! Persisted rule documents and hand-authored shell templates.
//!
//! A rule document maps `collective=<name>` to communicator-type subtrees.
//! Key order is significant, so documents are kept as order-preserving JSON
//! values and never re-sorted.

use crate::core::constants::{COMPOSITION_SUFFIX, SHELL_PLACEHOLDER};
use crate::core::error::{Result, TunerError};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const INTRA_KEY: &str = "comm_type=intra";

/// Document key of a collective. Composition collectives share the key of
/// their base collective in their own document.
pub fn collective_key(collective: &str) -> String {
    let base = collective.strip_suffix(COMPOSITION_SUFFIX).unwrap_or(collective);
    format!("collective={}", base)
}

/// An algorithm-selection document such as the runtime's `generic.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDocument {
    root: Map<String, Value>,
}

impl RuleDocument {
    /// Wrap a parsed document; the root must be a mapping.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(root) => Ok(RuleDocument { root }),
            other => Err(TunerError::rule_document(format!(
                "document root must be a mapping, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            TunerError::rule_document(format!("cannot open {}: {}", path.as_ref().display(), e))
        })?;
        let value: Value = serde_json::from_reader(BufReader::new(file))?;
        Self::from_value(value)
    }

    /// Write the document as two-space indented JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json_string()?)?;
        log::info!("Saved rule document to {}", path.as_ref().display());
        Ok(())
    }

    /// The document as two-space indented JSON text.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Collective names in document order.
    pub fn collectives(&self) -> Vec<&str> {
        self.root
            .keys()
            .filter_map(|key| key.strip_prefix("collective="))
            .collect()
    }

    /// Intra-communicator subtree of a collective.
    pub fn intra(&self, collective: &str) -> Option<&Value> {
        self.root.get(&collective_key(collective))?.get(INTRA_KEY)
    }

    /// Replace the intra-communicator subtree of `collective` with `tree`.
    pub fn update_collective(&mut self, collective: &str, tree: Value) -> Result<()> {
        let key = collective_key(collective);
        let slot = self
            .root
            .get_mut(&key)
            .and_then(|entry| entry.get_mut(INTRA_KEY))
            .ok_or_else(|| {
                TunerError::rule_document(format!("document has no {} / {} entry", key, INTRA_KEY))
            })?;
        *slot = tree;
        log::info!("Updated {} in rule document", key);
        Ok(())
    }

    /// Intra-communicator algorithm names referenced by a collective's rules.
    pub fn algorithms(&self, collective: &str) -> Result<BTreeSet<String>> {
        let entry = self.root.get(&collective_key(collective)).ok_or_else(|| {
            TunerError::rule_document(format!("document has no {}", collective_key(collective)))
        })?;

        let mut found = BTreeSet::new();
        let mut stack = vec![entry];
        while let Some(value) = stack.pop() {
            if let Value::Object(map) = value {
                for (key, child) in map {
                    match key.strip_prefix("algorithm=") {
                        Some(name) if !name.contains("inter") => {
                            found.insert(name.to_string());
                        }
                        Some(_) => {}
                        None => stack.push(child),
                    }
                }
            }
        }
        Ok(found)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

fn shell_path(shell_dir: &Path, collective: &str) -> std::path::PathBuf {
    shell_dir.join(format!("{}.json", collective))
}

/// Read the shell template of a collective from `<shell_dir>/<collective>.json`.
pub fn read_collective_shell(shell_dir: &Path, collective: &str) -> Result<Value> {
    let path = shell_path(shell_dir, collective);
    let file = File::open(&path).map_err(|e| {
        TunerError::rule_document(format!("no shell for {} at {}: {}", collective, path.display(), e))
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Splice `tree` into every mapping of `shell` holding the placeholder key.
/// The placeholder entry is replaced by the tree's entries in place.
/// Returns the number of splice points.
pub fn splice_placeholders(shell: &mut Value, tree: &Map<String, Value>) -> usize {
    let mut spliced = 0;
    let mut stack = vec![shell];
    while let Some(value) = stack.pop() {
        match value {
            Value::Object(map) => {
                if map.contains_key(SHELL_PLACEHOLDER) {
                    let entries = std::mem::take(map);
                    for (key, child) in entries {
                        if key == SHELL_PLACEHOLDER {
                            map.extend(tree.iter().map(|(k, v)| (k.clone(), v.clone())));
                            spliced += 1;
                        } else {
                            map.insert(key, child);
                        }
                    }
                }
                stack.extend(map.values_mut());
            }
            Value::Array(items) => stack.extend(items.iter_mut()),
            _ => {}
        }
    }
    spliced
}

/// Wrap a mined tree in a shell template. Without a shell the tree is
/// returned unchanged.
pub fn shell_wrapper(shell: Option<Value>, tree: Value) -> Result<Value> {
    let mut shell = match shell {
        Some(shell) => shell,
        None => return Ok(tree),
    };
    let entries = match &tree {
        Value::Object(map) => map,
        other => {
            return Err(TunerError::rule_document(format!(
                "mined tree must be a mapping, found {}",
                json_kind(other)
            )))
        }
    };
    if splice_placeholders(&mut shell, entries) == 0 {
        log::warn!("shell template has no '{}' entry, keeping it unchanged", SHELL_PLACEHOLDER);
    }
    Ok(shell)
}

/// Wrap `tree` in the collective's shell when `shell_dir` holds one.
pub fn wrap_for_collective(shell_dir: Option<&Path>, collective: &str, tree: Value) -> Result<Value> {
    let shell = match shell_dir {
        Some(dir) if shell_path(dir, collective).is_file() => Some(read_collective_shell(dir, collective)?),
        Some(dir) => {
            log::debug!("no shell for {} in {}", collective, dir.display());
            None
        }
        None => None,
    };
    shell_wrapper(shell, tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn generic() -> Value {
        json!({
            "collective=bcast": {
                "comm_type=intra": {"algorithm=MPIR_Bcast_intra_binomial": {}},
                "comm_type=inter": {"algorithm=MPIR_Bcast_inter_remote_send_local_bcast": {}}
            },
            "collective=allreduce": {
                "comm_type=intra": {
                    "comm_size<=8": {"algorithm=MPIR_Allreduce_intra_recursive_doubling": {}},
                    "comm_size=any": {"algorithm=MPIR_Allreduce_intra_reduce_scatter_allgather": {}}
                }
            }
        })
    }

    fn allreduce_shell() -> Value {
        json!({
            "is_op_built_in=no": {"algorithm=MPIR_Allreduce_intra_recursive_doubling": {}},
            "is_op_built_in=yes": {
                "is_commutative=no": {"algorithm=MPIR_Allreduce_intra_recursive_doubling": {}},
                "is_commutative=yes": {"replace me": {}}
            }
        })
    }

    fn mined() -> Value {
        json!({"comm_size=any": {"comm_avg_ppn=any": {"avg_msg_size=any": {
            "algorithm=MPIR_Allreduce_intra_tree": {"k=3": {}}
        }}}})
    }

    #[test]
    fn test_document_order_and_update() {
        let mut document = RuleDocument::from_value(generic()).unwrap();
        assert_eq!(document.collectives(), vec!["bcast", "allreduce"]);

        document.update_collective("bcast", json!({"comm_size=any": {}})).unwrap();
        assert_eq!(document.intra("bcast"), Some(&json!({"comm_size=any": {}})));
        assert!(document.update_collective("scatter", json!({})).is_err());
        assert!(RuleDocument::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_composition_collectives_use_base_key() {
        assert_eq!(collective_key("allreduce_ch4"), "collective=allreduce");
        let mut document = RuleDocument::from_value(generic()).unwrap();
        document.update_collective("allreduce_ch4", json!({"x": {}})).unwrap();
        assert_eq!(document.intra("allreduce"), Some(&json!({"x": {}})));
    }

    #[test]
    fn test_algorithm_listing_skips_inter() {
        let document = RuleDocument::from_value(generic()).unwrap();
        let bcast: Vec<String> = document.algorithms("bcast").unwrap().into_iter().collect();
        assert_eq!(bcast, vec!["MPIR_Bcast_intra_binomial"]);
        assert_eq!(document.algorithms("allreduce").unwrap().len(), 2);
    }

    #[test]
    fn test_save_and_load_preserve_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("generic.json");
        let document = RuleDocument::from_value(generic()).unwrap();
        document.save(&path).unwrap();

        let loaded = RuleDocument::load(&path).unwrap();
        assert_eq!(loaded, document);
        assert_eq!(loaded.collectives(), vec!["bcast", "allreduce"]);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"collective=bcast\""));
        assert_eq!(text, document.to_json_string().unwrap());
        assert!(RuleDocument::load(dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_shell_wrapper_without_shell() {
        assert_eq!(shell_wrapper(None, mined()).unwrap(), mined());
    }

    #[test]
    fn test_shell_wrapper_splices_tree() {
        let wrapped = shell_wrapper(Some(allreduce_shell()), mined()).unwrap();
        let slot = &wrapped["is_op_built_in=yes"]["is_commutative=yes"];
        assert!(slot.get(SHELL_PLACEHOLDER).is_none());
        assert!(slot["comm_size=any"]["comm_avg_ppn=any"]["avg_msg_size=any"]
            ["algorithm=MPIR_Allreduce_intra_tree"]["k=3"]
            .is_object());
        // siblings of the splice point keep their position
        let keys: Vec<&String> = wrapped["is_op_built_in=yes"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["is_commutative=no", "is_commutative=yes"]);
    }

    #[test]
    fn test_every_placeholder_is_spliced() {
        let mut shell = json!({"a": {"replace me": {}}, "b": [{"replace me": {}, "c": {}}]});
        let tree = json!({"comm_size=any": {}});
        let count = splice_placeholders(&mut shell, tree.as_object().unwrap());
        assert_eq!(count, 2);
        assert_eq!(shell["a"], tree);
        let keys: Vec<&String> = shell["b"][0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["comm_size=any", "c"]);
    }

    #[test]
    fn test_read_collective_shell() {
        let dir = TempDir::new().unwrap();
        assert!(read_collective_shell(dir.path(), "allreduce").is_err());

        std::fs::write(
            dir.path().join("allreduce.json"),
            serde_json::to_string(&allreduce_shell()).unwrap(),
        )
        .unwrap();
        assert_eq!(read_collective_shell(dir.path(), "allreduce").unwrap(), allreduce_shell());

        let wrapped = wrap_for_collective(Some(dir.path()), "allreduce", mined()).unwrap();
        assert!(wrapped.get("is_op_built_in=no").is_some());
        let plain = wrap_for_collective(Some(dir.path()), "bcast", mined()).unwrap();
        assert_eq!(plain, mined());
    }
}
