use pvchain::compensation::{CompensationEngine, CompensationOutcome, FailureCause};
use pvchain::protocol::{NodeStatus, NodeStatusCode};
use pvchain::tracker::NodeTracker;

const TARGET_SYSTEM_V: f32 = 48.0;
const MAX_COMPENSATION_V: f32 = 18.0;

fn engine() -> CompensationEngine {
    // Floors from the reference system: 1 W, 5 V, 0.5 A.
    CompensationEngine::new(TARGET_SYSTEM_V, 1.0, 5.0, 0.5, MAX_COMPENSATION_V, 2)
}

fn healthy(node_id: u8) -> NodeStatus {
    NodeStatus {
        node_id,
        input_voltage: 35.0,
        input_current: 7.0,
        input_power: 245.0,
        output_voltage: 12.0,
        output_current: 8.0,
        output_power: 96.0,
        duty_cycle_percent: 34.0,
        efficiency: 96.0,
        status: NodeStatusCode::Normal,
        timestamp: 100,
    }
}

fn collapsed(node_id: u8) -> NodeStatus {
    NodeStatus {
        input_voltage: 0.2,
        input_current: 0.0,
        input_power: 0.0,
        output_voltage: 0.0,
        output_current: 0.0,
        output_power: 0.0,
        ..healthy(node_id)
    }
}

fn tracker_with(statuses: &[NodeStatus]) -> NodeTracker {
    let mut tracker = NodeTracker::new(4, 12.0);
    for status in statuses {
        tracker.record_status(*status, 0).unwrap();
    }
    tracker.refresh_liveness(0, 5000);
    tracker
}

#[test]
fn all_healthy_is_nominal() {
    let tracker = tracker_with(&[healthy(1), healthy(2), healthy(3), healthy(4)]);
    assert_eq!(engine().evaluate(&tracker), CompensationOutcome::Nominal);
}

#[test]
fn one_collapsed_node_redistributes_across_three() {
    let tracker = tracker_with(&[healthy(1), healthy(2), collapsed(3), healthy(4)]);
    match engine().evaluate(&tracker) {
        CompensationOutcome::Redistributed {
            working,
            faulty,
            setpoint,
        } => {
            assert_eq!(working, 3);
            assert_eq!(faulty, 1);
            assert!((setpoint - 16.0).abs() < 1e-6);
        }
        other => panic!("expected redistribution, got {other:?}"),
    }
}

#[test]
fn redistribution_divides_target_by_survivors() {
    // working >= 2 always yields target / working, capped by the ceiling.
    for working in 2u8..=4 {
        let statuses: Vec<NodeStatus> = (1u8..=4)
            .map(|id| {
                if id <= working {
                    healthy(id)
                } else {
                    collapsed(id)
                }
            })
            .collect();
        let tracker = tracker_with(&statuses);

        match engine().evaluate(&tracker) {
            CompensationOutcome::Nominal => assert_eq!(working, 4),
            CompensationOutcome::Redistributed { setpoint, .. } => {
                let expected = (TARGET_SYSTEM_V / f32::from(working)).min(MAX_COMPENSATION_V);
                assert!((setpoint - expected).abs() < 1e-6, "working={working}");
                assert!(setpoint <= MAX_COMPENSATION_V);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}

#[test]
fn redistribution_is_capped_at_hardware_ceiling() {
    // Two survivors would want 24 V each; the ceiling wins.
    let tracker = tracker_with(&[healthy(1), healthy(2), collapsed(3), collapsed(4)]);
    match engine().evaluate(&tracker) {
        CompensationOutcome::Redistributed { setpoint, .. } => {
            assert!((setpoint - MAX_COMPENSATION_V).abs() < 1e-6);
        }
        other => panic!("expected redistribution, got {other:?}"),
    }
}

#[test]
fn offline_nodes_count_as_failed() {
    // Nodes 3 and 4 never report; power floors never even get checked.
    let tracker = tracker_with(&[healthy(1), healthy(2)]);
    match engine().evaluate(&tracker) {
        CompensationOutcome::Redistributed { working, faulty, .. } => {
            assert_eq!(working, 2);
            assert_eq!(faulty, 2);
        }
        other => panic!("expected redistribution, got {other:?}"),
    }
}

#[test]
fn single_survivor_keeps_full_target() {
    let tracker = tracker_with(&[healthy(2), collapsed(1), collapsed(3), collapsed(4)]);
    match engine().evaluate(&tracker) {
        CompensationOutcome::SingleSurvivor { node_id, setpoint } => {
            assert_eq!(node_id, 2);
            // Best effort at the unreachable target, not a silent derate.
            assert!((setpoint - TARGET_SYSTEM_V).abs() < 1e-6);
        }
        other => panic!("expected single survivor, got {other:?}"),
    }
}

#[test]
fn empty_chain_is_all_nodes_down() {
    let tracker = tracker_with(&[collapsed(1), collapsed(2), collapsed(3), collapsed(4)]);
    assert_eq!(engine().evaluate(&tracker), CompensationOutcome::AllNodesDown);
}

#[test]
fn classify_distinguishes_failure_causes() {
    let eng = engine();
    let mut tracker = NodeTracker::new(4, 12.0);

    tracker.record_status(healthy(1), 0).unwrap();

    let mut no_power = healthy(2);
    no_power.input_power = 0.5;
    tracker.record_status(no_power, 0).unwrap();

    let mut shorted = healthy(3);
    shorted.input_voltage = 2.0;
    tracker.record_status(shorted, 0).unwrap();

    let mut open = healthy(4);
    open.input_current = 0.1;
    tracker.record_status(open, 0).unwrap();

    tracker.refresh_liveness(0, 5000);

    assert_eq!(eng.classify(tracker.slot(1).unwrap()), None);
    assert_eq!(
        eng.classify(tracker.slot(2).unwrap()),
        Some(FailureCause::NoPower)
    );
    assert_eq!(
        eng.classify(tracker.slot(3).unwrap()),
        Some(FailureCause::VoltageCollapse)
    );
    assert_eq!(
        eng.classify(tracker.slot(4).unwrap()),
        Some(FailureCause::OpenCircuit)
    );
}

#[test]
fn silent_node_classifies_as_offline() {
    let eng = engine();
    let mut tracker = NodeTracker::new(4, 12.0);
    tracker.record_status(healthy(1), 0).unwrap();
    tracker.refresh_liveness(0, 5000);

    assert_eq!(
        eng.classify(tracker.slot(2).unwrap()),
        Some(FailureCause::Offline)
    );
}

#[test]
fn online_but_starving_node_is_failed_not_offline() {
    // The distinction the liveness tracker cannot make: answering polls
    // while producing nothing.
    let eng = engine();
    let tracker = tracker_with(&[healthy(1), collapsed(2), healthy(3), healthy(4)]);

    let slot = tracker.slot(2).unwrap();
    assert!(slot.online);
    assert_eq!(eng.classify(slot), Some(FailureCause::NoPower));
}
