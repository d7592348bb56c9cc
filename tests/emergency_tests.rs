use pvchain::emergency::{ControlState, EmergencyController, ShutdownReason};
use pvchain::faults::{FaultSet, SystemFault};

const RECOVERY_HOLD_MS: u64 = 5000;

fn controller() -> EmergencyController {
    EmergencyController::new(RECOVERY_HOLD_MS)
}

fn faults(list: &[SystemFault]) -> FaultSet {
    list.iter().copied().collect()
}

#[test]
fn starts_normal() {
    let ctl = controller();
    assert_eq!(ctl.state(), ControlState::Normal);
    assert!(!ctl.is_shutdown());
    assert_eq!(ctl.shutdown_reason(), None);
}

#[test]
fn any_fault_bit_enters_fault_state() {
    let mut ctl = controller();
    ctl.observe_faults(faults(&[SystemFault::ShadingDetected]), 1000);
    assert_eq!(ctl.state(), ControlState::Fault);
}

#[test]
fn recovery_waits_for_the_hold_window() {
    let mut ctl = controller();
    ctl.observe_faults(faults(&[SystemFault::NodeOffline]), 1000);
    assert_eq!(ctl.state(), ControlState::Fault);

    // Faults clear at t=2000; the first clean observation starts the clock.
    ctl.observe_faults(FaultSet::empty(), 2000);
    assert_eq!(ctl.state(), ControlState::Fault);

    // Still inside the hold window.
    ctl.observe_faults(FaultSet::empty(), 2000 + RECOVERY_HOLD_MS - 1);
    assert_eq!(ctl.state(), ControlState::Fault);

    // Window elapsed: back to normal.
    ctl.observe_faults(FaultSet::empty(), 2000 + RECOVERY_HOLD_MS);
    assert_eq!(ctl.state(), ControlState::Normal);
}

#[test]
fn fault_reappearing_restarts_the_debounce() {
    let mut ctl = controller();
    ctl.observe_faults(faults(&[SystemFault::LowEfficiency]), 0);
    ctl.observe_faults(FaultSet::empty(), 1000);

    // Fault flaps back just before recovery would land.
    ctl.observe_faults(faults(&[SystemFault::LowEfficiency]), 5000);
    assert_eq!(ctl.state(), ControlState::Fault);

    // Clean again: the old clean interval does not count.
    ctl.observe_faults(FaultSet::empty(), 6000);
    ctl.observe_faults(FaultSet::empty(), 6000 + RECOVERY_HOLD_MS - 1);
    assert_eq!(ctl.state(), ControlState::Fault);
    ctl.observe_faults(FaultSet::empty(), 6000 + RECOVERY_HOLD_MS);
    assert_eq!(ctl.state(), ControlState::Normal);
}

#[test]
fn shutdown_is_terminal() {
    let mut ctl = controller();
    ctl.trigger_shutdown(ShutdownReason::AllNodesDown);
    assert!(ctl.is_shutdown());

    // A perfectly clean fault picture changes nothing, ever.
    for t in (0..10).map(|i| i * 100_000) {
        ctl.observe_faults(FaultSet::empty(), t);
    }
    assert_eq!(ctl.state(), ControlState::EmergencyShutdown);
}

#[test]
fn first_shutdown_reason_wins() {
    let mut ctl = controller();
    ctl.trigger_shutdown(ShutdownReason::OperatorStop);
    ctl.trigger_shutdown(ShutdownReason::AllNodesDown);
    assert_eq!(ctl.shutdown_reason(), Some(ShutdownReason::OperatorStop));
}

#[test]
fn shutdown_can_interrupt_fault_state() {
    let mut ctl = controller();
    ctl.observe_faults(faults(&[SystemFault::NodeOffline]), 0);
    ctl.trigger_shutdown(ShutdownReason::AllNodesDown);
    assert!(ctl.is_shutdown());
}
