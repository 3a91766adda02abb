//! Nodes running on tokio with real round timers.

use hotstuff_bft::{Collaborators, ConsensusConfig};
use hotstuff_production::{LocalHub, LocalNetwork, NodeHandle, NodeRunner, ShutdownHandle};
use hotstuff_simulation::{SimStateSync, SimStorage, SimUtility};
use hotstuff_types::test_utils::test_key_pairs;
use hotstuff_types::{KeyPair, ValidatorInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_test::traced_test;

struct Node {
    handle: NodeHandle,
    storage: Arc<SimStorage>,
    shutdown: ShutdownHandle,
    task: JoinHandle<Result<(), hotstuff_production::RunnerError>>,
}

fn sorted_keys(n: u8) -> Vec<KeyPair> {
    let mut keys = test_key_pairs(n);
    keys.sort_by_key(KeyPair::address);
    keys
}

fn build_node(key: KeyPair, keys: &[KeyPair], hub: &Arc<LocalHub>, config: ConsensusConfig) -> (NodeRunner, Arc<SimStorage>) {
    let validators = keys
        .iter()
        .map(|k| ValidatorInfo::from_public_key(k.public_key(), 1))
        .collect();
    let storage = Arc::new(SimStorage::new(validators));
    let collaborators = Collaborators {
        persistence: storage.clone(),
        network: Arc::new(LocalNetwork::new(key.address(), hub.clone())),
        utility: Arc::new(SimUtility::new(storage.clone())),
        state_sync: Arc::new(SimStateSync::default()),
    };
    let address = key.address();
    let runner = NodeRunner::new(config, key, collaborators, 1_024).unwrap();
    hub.register(address, runner.event_sender());
    (runner, storage)
}

fn start(mut runner: NodeRunner, storage: Arc<SimStorage>) -> Node {
    let shutdown = runner.shutdown_handle().unwrap();
    let handle = runner.handle();
    Node {
        handle,
        storage,
        shutdown,
        task: tokio::spawn(runner.run()),
    }
}

fn config() -> ConsensusConfig {
    ConsensusConfig::for_testing()
        .with_manual_mode(false)
        .with_round_timeout(Duration::from_millis(200))
}

async fn wait_for(nodes: &[Node], height: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if nodes.iter().all(|n| n.storage.max_height() >= height) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn stop(nodes: Vec<Node>) {
    for node in nodes {
        node.shutdown.shutdown();
        node.task.await.unwrap().unwrap();
    }
}

#[traced_test]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_validator_builds_a_chain() {
    let keys = sorted_keys(1);
    let hub = LocalHub::new();
    let (runner, storage) = build_node(keys[0].clone(), &keys, &hub, config());
    let nodes = vec![start(runner, storage)];

    assert!(wait_for(&nodes, 5).await);
    stop(nodes).await;
}

#[traced_test]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_four_validators_agree() {
    let keys = sorted_keys(4);
    let hub = LocalHub::new();
    let runners: Vec<_> = keys
        .iter()
        .map(|k| build_node(k.clone(), &keys, &hub, config()))
        .collect();
    let nodes: Vec<Node> = runners.into_iter().map(|(r, s)| start(r, s)).collect();

    assert!(wait_for(&nodes, 3).await);
    for height in 1..=3 {
        let hash = nodes[0].storage.block_hash(height);
        assert!(nodes.iter().all(|n| n.storage.block_hash(height) == hash));
    }
    stop(nodes).await;
}

#[traced_test]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_round_timeout_replaces_a_silent_leader() {
    let keys = sorted_keys(4);
    let hub = LocalHub::new();
    // The first leader never starts.
    let runners: Vec<_> = keys[1..]
        .iter()
        .map(|k| build_node(k.clone(), &keys, &hub, config()))
        .collect();
    let nodes: Vec<Node> = runners.into_iter().map(|(r, s)| start(r, s)).collect();

    assert!(wait_for(&nodes, 1).await);
    let block = nodes[0].storage.block(1).unwrap();
    assert_ne!(block.proposer(), keys[0].address());
    assert!(nodes.iter().all(|n| n.handle.engine().height() >= 2));
    stop(nodes).await;
}
