//! Catching up a node that fell behind.

use hotstuff_bft::ConsensusConfig;
use hotstuff_simulation::{DeliveryOrder, SimulationConfig, SimulationRunner};
use tracing_test::traced_test;

fn automatic_cluster() -> SimulationRunner {
    let config = SimulationConfig::default()
        .with_consensus(ConsensusConfig::for_testing().with_manual_mode(false));
    SimulationRunner::new(config).unwrap()
}

#[traced_test]
#[test]
fn test_lagging_node_catches_up_through_sync() {
    let mut runner = automatic_cluster();
    runner.network_mut().isolate_node(3);
    runner.start_all();

    // Heights 1 to 3 are led by nodes 0 to 2; height 4 waits on node 3.
    assert!(runner.run_until(10_000, |r| (0..3).all(|i| r.node(i).engine.height() == 4)));
    runner.run_until_quiet(1_000);
    assert_eq!(runner.node(3).engine.height(), 1);

    runner.network_mut().heal_all();
    assert!(runner.fire_timeout(0));
    runner.run_until_quiet(1_000);
    assert!(runner.node(3).state_sync.unsynced().contains(&(1, 4)));

    assert_eq!(runner.sync_node(3), 3);
    assert_eq!(runner.node(3).engine.height(), 4);
    assert_eq!(runner.node(3).storage.blocks(), runner.node(0).storage.blocks());
    assert_eq!(runner.node(3).state_sync.committed().len(), 3);
    runner.check_safety().unwrap();

    assert!(runner.run_to_height(5, 10, 5_000));
    runner.check_safety().unwrap();
}

#[traced_test]
#[test]
fn test_one_way_partition_from_leader_then_sync() {
    let mut runner = automatic_cluster();
    // Node 3 can still send to node 0 but never hears from it.
    runner.network_mut().partition_unidirectional(0, 3);
    runner.start_all();

    assert!(runner.run_until(10_000, |r| (0..3).all(|i| r.node(i).engine.height() == 4)));
    runner.run_until_quiet(1_000);
    assert_eq!(runner.node(3).engine.height(), 1);
    assert!(runner.node(3).state_sync.unsynced().iter().any(|&(local, _)| local == 1));

    runner.network_mut().heal_bidirectional(0, 3);
    assert_eq!(runner.network().partition_count(), 0);
    runner.network_mut().set_delivery_order(DeliveryOrder::Random);

    assert_eq!(runner.sync_node(3), 3);
    assert_eq!(runner.node(3).storage.blocks(), runner.node(0).storage.blocks());
    assert!(runner.run_to_height(5, 10, 5_000));
    runner.check_safety().unwrap();
}

#[traced_test]
#[test]
fn test_sync_is_a_no_op_for_an_up_to_date_node() {
    let mut runner = SimulationRunner::new(SimulationConfig::default()).unwrap();
    runner.trigger_all();
    runner.run_until_quiet(1_000);
    assert_eq!(runner.sync_node(2), 0);
    assert_eq!(runner.node(2).storage.max_height(), 1);
}
