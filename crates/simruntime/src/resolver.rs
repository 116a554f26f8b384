use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use simcore::{FlowDefinition, NodeKind, ValidationError};
use std::collections::{BTreeSet, HashMap};

/// Where a node's input port gets its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub source_node: String,
    pub source_output: String,
}

/// Output of resolution: a deterministic execution order plus the
/// input-binding table the runner uses to assemble call arguments without
/// re-walking the connection list per step.
#[derive(Debug, Clone)]
pub struct ResolvedFlow {
    /// Every node, each after all nodes it depends on.
    pub order: Vec<String>,
    /// node name -> input port name -> binding.
    pub bindings: HashMap<String, HashMap<String, Binding>>,
}

/// Derive execution order and input bindings from a flow definition.
///
/// Topological sort with ties broken by declaration order, so repeated calls
/// on the same definition produce the same order. A cycle fails with
/// [`ValidationError::CyclicFlow`] naming every participating node; a
/// declared input port with no satisfying connection fails with
/// [`ValidationError::UnboundInput`].
pub fn resolve(flow: &FlowDefinition) -> Result<ResolvedFlow, ValidationError> {
    // Node index in the graph equals declaration index in the definition.
    let mut graph: DiGraph<(), ()> = DiGraph::new();
    let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();
    for node in flow.nodes() {
        let idx = graph.add_node(());
        index_of.insert(node.name.as_str(), idx);
    }

    let mut bindings: HashMap<String, HashMap<String, Binding>> = HashMap::new();
    for conn in flow.connections() {
        let from = *index_of.get(conn.source.as_str()).ok_or_else(|| {
            ValidationError::DanglingReference {
                connection: conn.name.clone(),
                node: conn.source.clone(),
            }
        })?;
        let to = *index_of.get(conn.target.as_str()).ok_or_else(|| {
            ValidationError::DanglingReference {
                connection: conn.name.clone(),
                node: conn.target.clone(),
            }
        })?;
        // Parallel edges between two nodes collapse to one dependency.
        graph.update_edge(from, to, ());

        let slots = bindings.entry(conn.target.clone()).or_default();
        let previous = slots.insert(
            conn.configuration.target_input.clone(),
            Binding {
                source_node: conn.source.clone(),
                source_output: conn.configuration.source_output.clone(),
            },
        );
        if previous.is_some() {
            return Err(ValidationError::DuplicateBinding {
                node: conn.target.clone(),
                port: conn.configuration.target_input.clone(),
            });
        }
    }

    // Every declared input port of a non-Input node must be satisfied.
    for node in flow.nodes() {
        if matches!(node.kind, NodeKind::Input) {
            continue;
        }
        for port in &node.inputs {
            let satisfied = bindings
                .get(&node.name)
                .is_some_and(|slots| slots.contains_key(&port.name));
            if !satisfied {
                return Err(ValidationError::UnboundInput {
                    node: node.name.clone(),
                    port: port.name.clone(),
                });
            }
        }
    }

    // Kahn's algorithm; the ready set is ordered by declaration index.
    let mut indegree: Vec<usize> = graph
        .node_indices()
        .map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count())
        .collect();
    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(flow.nodes().len());
    while let Some(&i) = ready.iter().next() {
        ready.remove(&i);
        order.push(flow.nodes()[i].name.clone());
        for succ in graph.neighbors_directed(NodeIndex::new(i), Direction::Outgoing) {
            let j = succ.index();
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if order.len() < flow.nodes().len() {
        let mut participants: Vec<usize> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || scc.iter().any(|&idx| graph.contains_edge(idx, idx)))
            .flatten()
            .map(|idx| idx.index())
            .collect();
        participants.sort_unstable();
        return Err(ValidationError::CyclicFlow {
            nodes: participants
                .into_iter()
                .map(|i| flow.nodes()[i].name.clone())
                .collect(),
        });
    }

    Ok(ResolvedFlow { order, bindings })
}
