use crate::FlowDefinition;

/// Render a flow definition as a Mermaid `graph TD` diagram.
///
/// Pure and deterministic: one line per node and one per connection, in
/// declaration order, so the output is suitable for snapshot tests.
pub fn render(flow: &FlowDefinition) -> String {
    let mut lines = vec!["graph TD".to_string()];

    for node in flow.nodes() {
        lines.push(format!(
            "    {name}[{name} <br> Type: {kind}]",
            name = node.name,
            kind = node.kind.label()
        ));
    }

    for conn in flow.connections() {
        lines.push(format!(
            "    {} --> |{}| {}",
            conn.source, conn.name, conn.target
        ));
    }

    lines.join("\n")
}
