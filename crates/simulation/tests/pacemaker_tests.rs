//! Round timeouts and view changes in a running cluster.

use hotstuff_bft::ConsensusConfig;
use hotstuff_simulation::{SimulationConfig, SimulationRunner};
use hotstuff_types::HotstuffStep;
use tracing_test::traced_test;

fn automatic_cluster() -> SimulationRunner {
    let config = SimulationConfig::default()
        .with_consensus(ConsensusConfig::for_testing().with_manual_mode(false));
    SimulationRunner::new(config).unwrap()
}

#[traced_test]
#[test]
fn test_isolated_leader_is_replaced_after_timeout() {
    let mut runner = automatic_cluster();
    runner.network_mut().isolate_node(0);
    runner.start_all();
    runner.run_until_quiet(1_000);

    // Everyone waits on node 0's proposal.
    assert_eq!(runner.heights(), vec![1, 1, 1, 1]);
    assert!(runner.stats().messages_dropped_partition > 0);

    runner.fire_all_timeouts();
    for i in 1..4 {
        assert_eq!(runner.node(i).engine.round(), 1);
    }

    assert!(runner.run_until(5_000, |r| (1..4).all(|i| r.node(i).engine.height() >= 2)));
    let block = runner.node(1).storage.block(1).unwrap();
    assert_eq!(block.proposer(), runner.node(1).address());
    assert_eq!(runner.node(0).engine.height(), 1);
    runner.check_safety().unwrap();
}

#[traced_test]
#[test]
fn test_stale_timeout_is_ignored() {
    let mut runner = SimulationRunner::new(SimulationConfig::default()).unwrap();
    runner.trigger_all();
    let stale = runner.node(1).timer.armed().unwrap();

    // Handling a message re-arms the timer.
    assert!(runner.step());
    assert!(runner.step());
    let current = runner.node(1).timer.armed().unwrap();
    assert!(current.generation > stale.generation);

    let before = runner.node(1).state();
    runner.node(1).engine.on_round_timeout(stale);
    assert_eq!(runner.node(1).state(), before);
}

#[traced_test]
#[test]
fn test_consecutive_timeouts_advance_round_one_each() {
    let mut runner = SimulationRunner::new(SimulationConfig::default()).unwrap();
    runner.network_mut().isolate_node(0);
    runner.trigger_all();
    runner.run_until_quiet(1_000);
    let start = runner.node(2).state();

    let mut stale = None;
    for fired in 1..=4u64 {
        let ticket = runner.node(2).timer.armed().unwrap();
        assert!(runner.fire_timeout(2));
        let state = runner.node(2).state();
        assert_eq!(
            (state.height, state.round, state.step),
            (start.height, start.round + fired, HotstuffStep::NewRound)
        );
        if fired == 2 {
            stale = Some(ticket);
        }
    }

    // A ticket from an earlier round changes nothing.
    let before = runner.node(2).state();
    runner.node(2).engine.on_round_timeout(stale.unwrap());
    assert_eq!(runner.node(2).state(), before);
    assert_eq!(before.round, start.round + 4);
    assert_eq!(runner.stats().timeouts_fired, 4);
}

#[traced_test]
#[test]
fn test_manual_timeout_holds_new_round_until_triggered() {
    let mut runner = SimulationRunner::new(SimulationConfig::default()).unwrap();
    runner.network_mut().isolate_node(0);
    runner.trigger_all();
    runner.run_until_quiet(1_000);
    let sent = runner.stats().messages_sent;

    assert!(runner.fire_timeout(1));
    let state = runner.node(1).state();
    assert_eq!((state.height, state.round, state.step), (1, 1, HotstuffStep::NewRound));
    assert_eq!(runner.stats().messages_sent, sent);
    assert_eq!(runner.in_flight(), 0);

    runner.debug_command(1, hotstuff_core::DebugCommand::TriggerNextView).unwrap();
    assert_eq!(runner.node(1).engine.round(), 1);
    assert_eq!(runner.in_flight(), 3);
}

#[traced_test]
#[test]
fn test_split_network_stalls_then_recovers() {
    let mut runner = automatic_cluster();
    runner.network_mut().partition_groups(&[0, 1], &[2, 3]);
    runner.start_all();
    for _ in 0..3 {
        runner.run_until_quiet(1_000);
        runner.fire_all_timeouts();
    }
    runner.run_until_quiet(1_000);
    for node in runner.nodes() {
        assert_eq!(node.storage.max_height(), 0);
    }

    runner.network_mut().heal_all();
    assert!(runner.run_to_height(2, 10, 5_000));
    runner.check_safety().unwrap();
}
