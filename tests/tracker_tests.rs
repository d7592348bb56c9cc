use pvchain::protocol::{NodeStatus, NodeStatusCode};
use pvchain::tracker::{NodeTracker, TrackerError};

const TIMEOUT_MS: u64 = 5000;

fn status(node_id: u8, timestamp: u32) -> NodeStatus {
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
        timestamp,
    }
}

#[test]
fn starts_with_all_nodes_offline() {
    let tracker = NodeTracker::new(4, 12.0);
    assert_eq!(tracker.node_count(), 4);
    assert_eq!(tracker.online_count(), 0);
    assert!(!tracker.any_status_received());
    for slot in tracker.slots() {
        assert!(slot.status.is_none());
        assert_eq!(slot.voltage_setpoint, 12.0);
    }
}

#[test]
fn record_marks_online_and_stores_snapshot() {
    let mut tracker = NodeTracker::new(4, 12.0);
    tracker.record_status(status(2, 100), 1000).unwrap();

    let slot = tracker.slot(2).unwrap();
    assert!(slot.online);
    assert_eq!(slot.last_update_ms, 1000);
    assert_eq!(slot.status.unwrap().output_voltage, 12.0);
    assert!(tracker.any_status_received());
    assert_eq!(tracker.online_count(), 1);
}

#[test]
fn rejects_unknown_node() {
    let mut tracker = NodeTracker::new(4, 12.0);
    assert_eq!(
        tracker.record_status(status(9, 100), 1000),
        Err(TrackerError::UnknownNode(9))
    );
}

#[test]
fn goes_offline_exactly_at_timeout() {
    let mut tracker = NodeTracker::new(4, 12.0);
    tracker.record_status(status(1, 100), 1000).unwrap();

    // One millisecond inside the window: still online.
    tracker.refresh_liveness(1000 + TIMEOUT_MS - 1, TIMEOUT_MS);
    assert!(tracker.slot(1).unwrap().online);

    // At the timeout boundary: offline on this very cycle, no grace cycle.
    tracker.refresh_liveness(1000 + TIMEOUT_MS, TIMEOUT_MS);
    assert!(!tracker.slot(1).unwrap().online);
    assert_eq!(tracker.online_count(), 0);
}

#[test]
fn offline_node_is_never_removed() {
    let mut tracker = NodeTracker::new(4, 12.0);
    tracker.record_status(status(1, 100), 0).unwrap();
    tracker.refresh_liveness(60_000, TIMEOUT_MS);

    assert_eq!(tracker.node_count(), 4);
    let slot = tracker.slot(1).unwrap();
    assert!(!slot.online);
    // Snapshot is retained for post-mortem even while offline.
    assert!(slot.status.is_some());
}

#[test]
fn fresh_status_brings_node_back_online() {
    let mut tracker = NodeTracker::new(4, 12.0);
    tracker.record_status(status(1, 100), 0).unwrap();
    tracker.refresh_liveness(10_000, TIMEOUT_MS);
    assert!(!tracker.slot(1).unwrap().online);

    tracker.record_status(status(1, 200), 10_500).unwrap();
    tracker.refresh_liveness(10_600, TIMEOUT_MS);
    assert!(tracker.slot(1).unwrap().online);
    assert_eq!(tracker.slot(1).unwrap().consecutive_errors, 0);
}

#[test]
fn consecutive_errors_count_missed_cycles() {
    let mut tracker = NodeTracker::new(2, 12.0);
    tracker.record_status(status(1, 100), 0).unwrap();

    tracker.refresh_liveness(6_000, TIMEOUT_MS);
    tracker.refresh_liveness(8_000, TIMEOUT_MS);
    tracker.refresh_liveness(10_000, TIMEOUT_MS);
    assert_eq!(tracker.slot(1).unwrap().consecutive_errors, 3);
}

#[test]
fn stale_frame_is_dropped_and_counted() {
    let mut tracker = NodeTracker::new(4, 12.0);
    tracker.record_status(status(1, 500), 1000).unwrap();

    let mut old = status(1, 400);
    old.output_voltage = 99.0;
    assert_eq!(
        tracker.record_status(old, 1100),
        Err(TrackerError::StaleFrame {
            node_id: 1,
            frame_ts: 400,
            last_ts: 500,
        })
    );

    let slot = tracker.slot(1).unwrap();
    assert_eq!(slot.stale_drops, 1);
    // Fresh data untouched by the stale delivery.
    assert_eq!(slot.status.unwrap().output_voltage, 12.0);
    assert_eq!(slot.last_update_ms, 1000);
    assert_eq!(tracker.total_stale_drops(), 1);
}

#[test]
fn duplicated_frame_with_equal_timestamp_is_accepted() {
    let mut tracker = NodeTracker::new(4, 12.0);
    tracker.record_status(status(1, 500), 1000).unwrap();
    tracker.record_status(status(1, 500), 1200).unwrap();
    assert_eq!(tracker.slot(1).unwrap().last_update_ms, 1200);
    assert_eq!(tracker.slot(1).unwrap().stale_drops, 0);
}

#[test]
fn stale_check_is_per_node() {
    let mut tracker = NodeTracker::new(4, 12.0);
    tracker.record_status(status(1, 900), 1000).unwrap();
    // Node 2's clock being far behind node 1's is irrelevant.
    tracker.record_status(status(2, 5), 1000).unwrap();
    assert_eq!(tracker.online_count(), 2);
}

#[test]
fn voltage_spread_over_online_nodes() {
    let mut tracker = NodeTracker::new(4, 12.0);
    let mut high = status(1, 100);
    high.output_voltage = 13.5;
    let mut low = status(2, 100);
    low.output_voltage = 11.8;
    tracker.record_status(high, 0).unwrap();
    tracker.record_status(low, 0).unwrap();

    assert!((tracker.output_voltage_spread() - 1.7).abs() < 1e-6);
}

#[test]
fn voltage_spread_is_zero_below_two_nodes() {
    let mut tracker = NodeTracker::new(4, 12.0);
    assert_eq!(tracker.output_voltage_spread(), 0.0);
    tracker.record_status(status(1, 100), 0).unwrap();
    assert_eq!(tracker.output_voltage_spread(), 0.0);
}

#[test]
fn assign_setpoint_touches_every_slot() {
    let mut tracker = NodeTracker::new(3, 12.0);
    tracker.assign_setpoint(16.0);
    for slot in tracker.slots() {
        assert_eq!(slot.voltage_setpoint, 16.0);
    }
}

#[test]
fn mark_hard_fault_overrides_last_status() {
    let mut tracker = NodeTracker::new(4, 12.0);
    tracker.record_status(status(3, 100), 0).unwrap();
    tracker.mark_hard_fault(3);
    assert_eq!(tracker.slot(3).unwrap().last_status, NodeStatusCode::HardFault);
    // Still online: faulty and offline are orthogonal.
    assert!(tracker.slot(3).unwrap().online);
}
