use chrono::Utc;

use crate::{
    Result, RuleflowError,
    model::{AutomationRule, RuleEdge, RuleNode},
};

/// Returns a copy of `rule` with `node` appended.
pub fn add_node(
    rule: &AutomationRule,
    node: RuleNode,
) -> Result<AutomationRule> {
    if rule.node(&node.id).is_some() {
        return Err(RuleflowError::DuplicateNode(node.id));
    }

    let mut next = rule.clone();
    next.nodes.push(node);
    next.metadata.updated_at = Utc::now();
    Ok(next)
}

/// Returns a copy of `rule` without the node and without any edge touching it.
pub fn remove_node(
    rule: &AutomationRule,
    node_id: &str,
) -> Result<AutomationRule> {
    if rule.node(node_id).is_none() {
        return Err(RuleflowError::NodeNotFound(node_id.to_string()));
    }

    let mut next = rule.clone();
    next.nodes.retain(|n| n.id != node_id);
    next.edges.retain(|e| e.source_node_id != node_id && e.target_node_id != node_id);
    next.metadata.updated_at = Utc::now();
    Ok(next)
}

/// Returns a copy of `rule` with `edge` appended.
///
/// Only the endpoint node ids are checked; port types and cycles are left to
/// the validator.
pub fn add_edge(
    rule: &AutomationRule,
    edge: RuleEdge,
) -> Result<AutomationRule> {
    if rule.edge(&edge.id).is_some() {
        return Err(RuleflowError::DuplicateEdge(edge.id));
    }
    for endpoint in [&edge.source_node_id, &edge.target_node_id] {
        if rule.node(endpoint).is_none() {
            return Err(RuleflowError::EdgeEndpointInvalid {
                edge_id: edge.id.clone(),
                node_id: endpoint.clone(),
            });
        }
    }

    let mut next = rule.clone();
    next.edges.push(edge);
    next.metadata.updated_at = Utc::now();
    Ok(next)
}

pub fn remove_edge(
    rule: &AutomationRule,
    edge_id: &str,
) -> Result<AutomationRule> {
    if rule.edge(edge_id).is_none() {
        return Err(RuleflowError::EdgeNotFound(edge_id.to_string()));
    }

    let mut next = rule.clone();
    next.edges.retain(|e| e.id != edge_id);
    next.metadata.updated_at = Utc::now();
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, NodeKind, Port};

    fn base() -> AutomationRule {
        let rule = AutomationRule::new("ops");
        let rule = add_node(&rule, RuleNode::new("t", NodeKind::Trigger).with_output(Port::new("out", DataType::Number))).unwrap();
        add_node(&rule, RuleNode::new("a", NodeKind::Action).with_input(Port::new("in", DataType::Boolean))).unwrap()
    }

    #[test]
    fn test_add_node_returns_new_value() {
        let empty = AutomationRule::new("ops");
        let rule = add_node(&empty, RuleNode::new("t", NodeKind::Trigger)).unwrap();

        assert!(empty.nodes.is_empty());
        assert_eq!(rule.nodes.len(), 1);
        assert_eq!(add_node(&rule, RuleNode::new("t", NodeKind::Action)).unwrap_err(), RuleflowError::DuplicateNode("t".to_string()));
    }

    #[test]
    fn test_add_edge_accepts_type_mismatch() {
        // number -> boolean is a validation problem, not a mutation error
        let rule = add_edge(&base(), RuleEdge::new("e1", ("t", "out"), ("a", "in"))).unwrap();
        assert_eq!(rule.edges.len(), 1);
    }

    #[test]
    fn test_add_edge_unknown_endpoint() {
        let err = add_edge(&base(), RuleEdge::new("e1", ("t", "out"), ("ghost", "in"))).unwrap_err();
        assert_eq!(
            err,
            RuleflowError::EdgeEndpointInvalid {
                edge_id: "e1".to_string(),
                node_id: "ghost".to_string(),
            }
        );

        let rule = add_edge(&base(), RuleEdge::new("e1", ("t", "out"), ("a", "in"))).unwrap();
        assert_eq!(add_edge(&rule, RuleEdge::new("e1", ("t", "out"), ("a", "in"))).unwrap_err(), RuleflowError::DuplicateEdge("e1".to_string()));
    }

    #[test]
    fn test_remove_node_cascades() {
        let rule = add_edge(&base(), RuleEdge::new("e1", ("t", "out"), ("a", "in"))).unwrap();
        let next = remove_node(&rule, "a").unwrap();

        assert_eq!(next.nodes.len(), 1);
        assert!(next.edges.is_empty());
        assert_eq!(rule.edges.len(), 1);
        assert_eq!(remove_node(&next, "a").unwrap_err(), RuleflowError::NodeNotFound("a".to_string()));
    }

    #[test]
    fn test_remove_edge() {
        let rule = add_edge(&base(), RuleEdge::new("e1", ("t", "out"), ("a", "in"))).unwrap();
        let next = remove_edge(&rule, "e1").unwrap();

        assert!(next.edges.is_empty());
        assert_eq!(next.nodes.len(), 2);
        assert_eq!(remove_edge(&next, "e1").unwrap_err(), RuleflowError::EdgeNotFound("e1".to_string()));
    }
}
