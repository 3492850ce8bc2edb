//! DAG data model and validation — run this before executing a workflow.
//!
//! Rules enforced, in order (§4.1):
//! 1. The top-level definition is an object with a `nodes` array.
//! 2. `nodes` is non-empty.
//! 3. Every node has non-empty `id`, `name`, `agent_type` strings.
//! 4. Node IDs are unique within the DAG.
//! 5. Every dependency ID refers to a declared node.
//! 6. No node depends on itself.
//! 7. The induced graph is acyclic.
//!
//! Validation and level computation share one Kahn's-algorithm pass: the
//! levels produced here *are* the execution plan the scheduler runs (§4.4).

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EngineError;

/// Mutable lifecycle state of a node within one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

/// A skip predicate plus the `optional` flag used by the failure policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConditions {
    /// Only `"skip_if"` is recognised; anything else never triggers a skip.
    #[serde(rename = "type")]
    pub condition_type: String,
    pub context_key: String,
    pub value: Value,
    /// If `true`, this node failing does not fail the whole workflow (§4.4).
    #[serde(default)]
    pub optional: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    300
}

/// A single step in the workflow graph, as parsed from the canonical JSON
/// format (§6). Immutable after construction — mutable execution state
/// (`status`, `retry_count`, `result`, `error_message`) lives in the
/// scheduler's per-run node-runtime table, not here, so one `DagNode` can be
/// shared read-only across concurrent tasks in the same level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagNode {
    pub id: String,
    pub name: String,
    pub agent_type: String,
    #[serde(default)]
    pub agent_config: Value,
    #[serde(default)]
    pub input_data: Value,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub conditions: Option<NodeConditions>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// A complete DAG definition: just the list of nodes, matching the
/// `{ "nodes": [...] }` wire format (§6) exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDag {
    pub nodes: Vec<DagNode>,
}

impl WorkflowDag {
    pub fn node(&self, id: &str) -> Option<&DagNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Validate a DAG definition parsed from arbitrary JSON and, on success,
/// return the validated graph plus its execution plan (levels).
///
/// `raw` is expected to already be a `serde_json::Value` so malformed-JSON
/// (not-an-object) is distinguished from a well-formed-but-invalid DAG.
pub fn parse_and_validate(raw: &Value) -> Result<(WorkflowDag, Vec<Vec<String>>), EngineError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| EngineError::MalformedDAG("top-level value must be a JSON object".into()))?;

    let nodes_value = obj
        .get("nodes")
        .ok_or_else(|| EngineError::MalformedDAG("missing 'nodes' field".into()))?;
    let nodes_array = nodes_value
        .as_array()
        .ok_or_else(|| EngineError::MalformedDAG("'nodes' must be an array".into()))?;

    if nodes_array.is_empty() {
        return Err(EngineError::EmptyDAG);
    }

    for (index, node_value) in nodes_array.iter().enumerate() {
        let node_obj = node_value
            .as_object()
            .ok_or(EngineError::MissingField { index, field: "id" })?;
        for field in ["id", "name", "agent_type"] {
            match node_obj.get(field).and_then(Value::as_str) {
                Some(s) if !s.is_empty() => {}
                _ => return Err(EngineError::MissingField { index, field }),
            }
        }
    }

    let dag: WorkflowDag =
        serde_json::from_value(raw.clone()).map_err(|e| EngineError::MalformedDAG(e.to_string()))?;

    let levels = validate_dag(&dag)?;
    Ok((dag, levels))
}

/// Validate an already-typed `WorkflowDag` and return its execution levels.
///
/// # Errors
/// See the table in §4.1: [`EngineError::DuplicateNodeId`],
/// [`EngineError::DanglingDependency`], [`EngineError::SelfLoop`],
/// [`EngineError::CyclicDAG`].
pub fn validate_dag(dag: &WorkflowDag) -> Result<Vec<Vec<String>>, EngineError> {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &dag.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    let node_set: HashSet<&str> = dag.nodes.iter().map(|n| n.id.as_str()).collect();

    for node in &dag.nodes {
        for dep in &node.dependencies {
            if dep == &node.id {
                return Err(EngineError::SelfLoop(node.id.clone()));
            }
            if !node_set.contains(dep.as_str()) {
                return Err(EngineError::DanglingDependency {
                    node_id: node.id.clone(),
                    dependency_id: dep.clone(),
                });
            }
        }
    }

    // Kahn's algorithm, level-wise: each round drains every node whose
    // in-degree is currently zero, which is, by construction, exactly the
    // set of nodes whose dependencies all sit in an earlier level.
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in &dag.nodes {
        in_degree.entry(node.id.as_str()).or_insert(0);
        dependents.entry(node.id.as_str()).or_default();
    }
    for node in &dag.nodes {
        in_degree.insert(node.id.as_str(), node.dependencies.len());
        for dep in &node.dependencies {
            dependents.entry(dep.as_str()).or_default().push(node.id.as_str());
        }
    }

    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut frontier: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut processed = 0usize;

    while !frontier.is_empty() {
        let mut level: Vec<String> = frontier.iter().map(|s| s.to_string()).collect();
        level.sort();
        processed += level.len();

        let mut next_frontier = VecDeque::new();
        for node_id in frontier.drain(..) {
            for &dependent in dependents.get(node_id).into_iter().flatten() {
                let deg = in_degree.get_mut(dependent).expect("dependent is tracked");
                *deg -= 1;
                if *deg == 0 {
                    next_frontier.push_back(dependent);
                }
            }
        }
        levels.push(level);
        frontier = next_frontier;
    }

    if processed != dag.nodes.len() {
        return Err(EngineError::CyclicDAG);
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str, deps: &[&str]) -> DagNode {
        DagNode {
            id: id.to_string(),
            name: id.to_string(),
            agent_type: "identity".to_string(),
            agent_config: Value::Null,
            input_data: Value::Null,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            conditions: None,
            max_retries: 3,
            timeout_seconds: 300,
        }
    }

    #[test]
    fn linear_chain_produces_three_singleton_levels() {
        let dag = WorkflowDag {
            nodes: vec![node("a", &[]), node("b", &["a"]), node("c", &["b"])],
        };
        let levels = validate_dag(&dag).expect("valid dag");
        assert_eq!(levels, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn diamond_groups_b_and_c_in_one_level() {
        let dag = WorkflowDag {
            nodes: vec![
                node("a", &[]),
                node("b", &["a"]),
                node("c", &["a"]),
                node("d", &["b", "c"]),
            ],
        };
        let levels = validate_dag(&dag).expect("valid dag");
        assert_eq!(levels, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let dag = WorkflowDag {
            nodes: vec![node("a", &[]), node("a", &[])],
        };
        assert!(matches!(
            validate_dag(&dag),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn dangling_dependency_is_rejected() {
        let dag = WorkflowDag {
            nodes: vec![node("a", &["ghost"])],
        };
        assert!(matches!(
            validate_dag(&dag),
            Err(EngineError::DanglingDependency { dependency_id, .. }) if dependency_id == "ghost"
        ));
    }

    #[test]
    fn self_loop_is_rejected() {
        let dag = WorkflowDag {
            nodes: vec![node("a", &["a"])],
        };
        assert!(matches!(validate_dag(&dag), Err(EngineError::SelfLoop(id)) if id == "a"));
    }

    #[test]
    fn cycle_is_detected() {
        let dag = WorkflowDag {
            nodes: vec![node("a", &["c"]), node("b", &["a"]), node("c", &["b"])],
        };
        assert!(matches!(validate_dag(&dag), Err(EngineError::CyclicDAG)));
    }

    #[test]
    fn parse_and_validate_rejects_non_object_top_level() {
        let raw = json!([1, 2, 3]);
        assert!(matches!(parse_and_validate(&raw), Err(EngineError::MalformedDAG(_))));
    }

    #[test]
    fn parse_and_validate_rejects_empty_nodes() {
        let raw = json!({ "nodes": [] });
        assert!(matches!(parse_and_validate(&raw), Err(EngineError::EmptyDAG)));
    }

    #[test]
    fn parse_and_validate_rejects_missing_field() {
        let raw = json!({ "nodes": [{ "id": "a", "name": "A" }] });
        assert!(matches!(
            parse_and_validate(&raw),
            Err(EngineError::MissingField { field: "agent_type", .. })
        ));
    }

    #[test]
    fn round_trip_preserves_defaults() {
        let raw = json!({
            "nodes": [
                { "id": "a", "name": "A", "agent_type": "identity" }
            ]
        });
        let (dag, _) = parse_and_validate(&raw).expect("valid");
        assert_eq!(dag.nodes[0].max_retries, 3);
        assert_eq!(dag.nodes[0].timeout_seconds, 300);

        let back = serde_json::to_value(&dag).expect("serialize");
        let dag2: WorkflowDag = serde_json::from_value(back).expect("deserialize");
        assert_eq!(dag2.nodes[0].id, dag.nodes[0].id);
        assert_eq!(dag2.nodes[0].max_retries, dag.nodes[0].max_retries);
        assert_eq!(dag2.nodes[0].timeout_seconds, dag.nodes[0].timeout_seconds);
    }
}
