use crate::Phase;

#[test]
fn given_lifecycle_order_when_checking_transitions_then_allowed() {
    use Phase::*;

    let path = [Idle, Starting, Recording, Rotating, Recording, Stopping, Closed];
    for pair in path.windows(2) {
        assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
    }
    assert!(Starting.can_transition_to(Stopping));
    assert!(Rotating.can_transition_to(Stopping));
}

/// WHAT: Skipping or reversing phases is rejected
/// WHY: A closed session must never record again
#[test]
fn given_out_of_order_phases_when_checking_transitions_then_rejected() {
    use Phase::*;

    assert!(!Idle.can_transition_to(Recording));
    assert!(!Recording.can_transition_to(Starting));
    assert!(!Stopping.can_transition_to(Recording));
    assert!(!Closed.can_transition_to(Starting));
    assert!(!Recording.can_transition_to(Recording));
    assert!(Closed.is_terminal());
    assert!(!Stopping.is_terminal());
}

#[test]
#[allow(clippy::unwrap_used)]
fn given_phase_when_serializing_then_lowercase_name() {
    let json = serde_json::to_string(&Phase::Recording).unwrap();

    assert_eq!(json, "\"recording\"");
}
