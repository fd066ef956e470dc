//! Shape checks for stored workflow graphs.
//!
//! Graphs come from the board editor as `{nodes: [...], edges: [...]}`. Nodes
//! need an `id`; edges name their ends with `source`/`target` (or `from`/`to`).
//! Any other fields are kept as they are.

use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("graph must be a JSON object")]
    NotAnObject,
    #[error("graph.{0} must be an array")]
    MissingArray(&'static str),
    #[error("node {0} has no id")]
    NodeWithoutId(usize),
    #[error("node id '{0}' is used more than once")]
    DuplicateNode(String),
    #[error("edge {0} needs a source and a target")]
    EdgeWithoutEnds(usize),
    #[error("edge {edge} references unknown node '{node}'")]
    DanglingEdge { edge: usize, node: String },
}

fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn endpoint(edge: &Value, primary: &str, fallback: &str) -> Option<String> {
    edge.get(primary)
        .and_then(id_of)
        .or_else(|| edge.get(fallback).and_then(id_of))
}

pub fn validate_graph(graph: &Value) -> Result<(), GraphError> {
    let object = graph.as_object().ok_or(GraphError::NotAnObject)?;
    let nodes = object
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or(GraphError::MissingArray("nodes"))?;
    let edges = object
        .get("edges")
        .and_then(Value::as_array)
        .ok_or(GraphError::MissingArray("edges"))?;

    let mut ids = HashSet::with_capacity(nodes.len());
    for (index, node) in nodes.iter().enumerate() {
        let id = node
            .get("id")
            .and_then(id_of)
            .ok_or(GraphError::NodeWithoutId(index))?;
        if !ids.insert(id.clone()) {
            return Err(GraphError::DuplicateNode(id));
        }
    }

    for (index, edge) in edges.iter().enumerate() {
        let source = endpoint(edge, "source", "from");
        let target = endpoint(edge, "target", "to");
        let (Some(source), Some(target)) = (source, target) else {
            return Err(GraphError::EdgeWithoutEnds(index));
        };
        for node in [source, target] {
            if !ids.contains(&node) {
                return Err(GraphError::DanglingEdge { edge: index, node });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_graph() {
        let graph = json!({
            "nodes": [{"id": "start", "label": "Triage"}, {"id": 2}],
            "edges": [{"id": "e1", "source": "start", "target": "2"}],
            "viewport": {"zoom": 1.0}
        });
        assert_eq!(validate_graph(&graph), Ok(()));
        assert_eq!(validate_graph(&json!({"nodes": [], "edges": []})), Ok(()));
    }

    #[test]
    fn test_from_to_edges_accepted() {
        let graph = json!({
            "nodes": [{"id": "a"}, {"id": "b"}],
            "edges": [{"from": "a", "to": "b"}]
        });
        assert_eq!(validate_graph(&graph), Ok(()));
    }

    #[test]
    fn test_shape_errors() {
        assert_eq!(validate_graph(&json!([1, 2])), Err(GraphError::NotAnObject));
        assert_eq!(
            validate_graph(&json!({"nodes": []})),
            Err(GraphError::MissingArray("edges"))
        );
        assert_eq!(
            validate_graph(&json!({"nodes": [{"label": "x"}], "edges": []})),
            Err(GraphError::NodeWithoutId(0))
        );
    }

    #[test]
    fn test_duplicate_nodes() {
        let graph = json!({"nodes": [{"id": "a"}, {"id": "a"}], "edges": []});
        assert_eq!(validate_graph(&graph), Err(GraphError::DuplicateNode("a".into())));
    }

    #[test]
    fn test_dangling_edge() {
        let graph = json!({
            "nodes": [{"id": "a"}],
            "edges": [{"source": "a", "target": "ghost"}]
        });
        assert_eq!(
            validate_graph(&graph),
            Err(GraphError::DanglingEdge { edge: 0, node: "ghost".into() })
        );
        let graph = json!({"nodes": [{"id": "a"}], "edges": [{"source": "a"}]});
        assert_eq!(validate_graph(&graph), Err(GraphError::EdgeWithoutEnds(0)));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(GraphError::MissingArray("nodes").to_string(), "graph.nodes must be an array");
        assert_eq!(
            GraphError::DanglingEdge { edge: 3, node: "ghost".into() }.to_string(),
            "edge 3 references unknown node 'ghost'"
        );
        let boxed: Box<dyn std::error::Error> = Box::new(GraphError::NotAnObject);
        assert_eq!(boxed.to_string(), "graph must be a JSON object");
    }
}
