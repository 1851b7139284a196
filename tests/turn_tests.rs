// Integration tests for transcript turn assembly

use live_voice::{Role, TurnAssembler};

#[test]
fn test_turn_produces_user_then_agent() {
    let mut turns = TurnAssembler::new();

    turns.push_input("Hel");
    turns.push_output("Hi ");
    turns.push_input("lo");
    turns.push_output("there");

    let messages = turns.complete_turn();

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].text, "Hello");
    assert_eq!(messages[1].role, Role::Agent);
    assert_eq!(messages[1].text, "Hi there");
    assert!(messages.iter().all(|m| m.is_complete));
    assert!(messages[0].id.ends_with("-user"));
    assert!(messages[1].id.ends_with("-agent"));
    assert_ne!(messages[0].id, messages[1].id);
}

#[test]
fn test_complete_turn_clears_buffers() {
    let mut turns = TurnAssembler::new();
    turns.push_input("Hello");
    turns.push_output("Hi");

    turns.complete_turn();

    assert_eq!(turns.pending_input(), "");
    assert_eq!(turns.pending_output(), "");
    assert!(turns.complete_turn().is_empty());
}

#[test]
fn test_empty_sides_are_skipped() {
    let mut turns = TurnAssembler::new();
    turns.push_output("Anything else?");

    let messages = turns.complete_turn();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::Agent);
}

#[test]
fn test_interrupt_discards_agent_partial_only() {
    let mut turns = TurnAssembler::new();

    turns.push_output("I think the iss");
    turns.interrupt();
    turns.push_input("thanks");

    let messages = turns.complete_turn();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].text, "thanks");
}

#[test]
fn test_interrupt_keeps_user_text() {
    let mut turns = TurnAssembler::new();

    turns.push_input("wait, ");
    turns.push_output("Let me expl");
    turns.interrupt();

    assert_eq!(turns.pending_input(), "wait, ");
    assert_eq!(turns.pending_output(), "");
}

#[test]
fn test_reset() {
    let mut turns = TurnAssembler::new();
    turns.push_input("a");
    turns.push_output("b");

    turns.reset();

    assert!(turns.complete_turn().is_empty());
}
