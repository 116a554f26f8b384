use simcore::{samples, visualizer};

#[test]
fn renders_identity_flow() {
    let flow = samples::identity_flow().unwrap();
    let diagram = visualizer::render(&flow);

    assert_eq!(
        diagram,
        "graph TD\n\
         \x20   Start[Start <br> Type: Input]\n\
         \x20   End[End <br> Type: Output]\n\
         \x20   Start --> |StartToEnd| End"
    );
}

#[test]
fn renders_upcase_flow() {
    let flow = samples::upcase_flow("arn:lambda:upcase").unwrap();
    let diagram = visualizer::render(&flow);

    assert!(diagram.starts_with("graph TD"));
    assert!(diagram.contains("    Upcase[Upcase <br> Type: LambdaFunction]"));
    assert!(diagram.contains("    Start --> |StartToUpcase| Upcase"));
    assert!(diagram.contains("    Upcase --> |UpcaseToEnd| End"));
}

#[test]
fn renders_knowledge_base_flow_in_declaration_order() {
    let flow = samples::knowledge_base_flow("kb-123", "arn:prompt").unwrap();
    let diagram = visualizer::render(&flow);

    assert!(diagram.contains("    QueryKnowledgeBase[QueryKnowledgeBase <br> Type: KnowledgeBase]"));
    assert!(diagram.contains("    GenerateResponse[GenerateResponse <br> Type: Prompt]"));
    assert!(diagram.contains("    Start --> |StartToKB| QueryKnowledgeBase"));
    assert!(diagram.contains("    Start --> |StartToPrompt| GenerateResponse"));
    assert!(diagram.contains("    QueryKnowledgeBase --> |KBToPrompt| GenerateResponse"));
    assert!(diagram.contains("    GenerateResponse --> |PromptToEnd| End"));

    // Deterministic: rendering twice yields the same text.
    assert_eq!(diagram, visualizer::render(&flow));
}
