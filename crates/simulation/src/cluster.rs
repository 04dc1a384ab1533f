//! Multi-process cluster harness.

use crate::network::SimNetwork;
use crate::oracle::SimOracle;
use hare_consensus::{
    decode_message, ConsensusProcess, InboundMessage, NetworkService, TerminationOutput,
    GOSSIP_PROTOCOL,
};
use hare_types::{HareConfig, InstanceId, Keypair, ValueSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tracing::warn;

/// A committee of consensus processes over one in-memory network.
///
/// Every node gets a broker task that decodes network payloads, filters by
/// instance id, and forwards the rest to the process inbox. Termination
/// outputs from all processes arrive on a single channel.
pub struct HareCluster {
    config: HareConfig,
    instance_id: InstanceId,
    keypairs: Vec<Keypair>,
    network: SimNetwork,
    oracle: Arc<SimOracle>,
    processes: Vec<ConsensusProcess>,
    termination_rx: mpsc::Receiver<TerminationOutput>,
}

impl HareCluster {
    /// Build a cluster with one process per starting set.
    pub fn new(config: HareConfig, instance_id: InstanceId, initial_sets: Vec<ValueSet>) -> Self {
        Self::build(config, instance_id, initial_sets, None)
    }

    /// Build a cluster whose leader elections are pinned to one node.
    pub fn with_leader(
        config: HareConfig,
        instance_id: InstanceId,
        initial_sets: Vec<ValueSet>,
        leader: usize,
    ) -> Self {
        Self::build(config, instance_id, initial_sets, Some(leader))
    }

    fn build(
        config: HareConfig,
        instance_id: InstanceId,
        initial_sets: Vec<ValueSet>,
        leader: Option<usize>,
    ) -> Self {
        config.validate().expect("invalid cluster configuration");
        assert_eq!(config.n, initial_sets.len(), "one starting set per node");

        let keypairs: Vec<Keypair> = (0..config.n)
            .map(|i| Keypair::from_seed(&[i as u8 + 1; 32]))
            .collect();
        let identities: Vec<_> = keypairs.iter().map(Keypair::public_key).collect();
        let oracle = Arc::new(match leader {
            Some(node) => SimOracle::with_leader(identities.clone(), identities[node]),
            None => SimOracle::new(identities),
        });

        let network = SimNetwork::new(config.n);
        let (termination_tx, termination_rx) = mpsc::channel(config.n.max(1));

        let processes = initial_sets
            .into_iter()
            .enumerate()
            .map(|(node, initial_set)| {
                ConsensusProcess::new(
                    config.clone(),
                    instance_id,
                    initial_set,
                    oracle.clone(),
                    keypairs[node].clone(),
                    Arc::new(network.handle(node)),
                    termination_tx.clone(),
                )
            })
            .collect();

        Self {
            config,
            instance_id,
            keypairs,
            network,
            oracle,
            processes,
            termination_rx,
        }
    }

    /// The cluster configuration.
    pub fn config(&self) -> &HareConfig {
        &self.config
    }

    /// The shared network, for silencing nodes and injecting payloads.
    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    /// The shared oracle.
    pub fn oracle(&self) -> &Arc<SimOracle> {
        &self.oracle
    }

    /// A node's signing keypair. Tests use these to play Byzantine actors.
    pub fn keypair(&self, node: usize) -> &Keypair {
        &self.keypairs[node]
    }

    /// Start every node. `skip` lists nodes that never run, standing in
    /// for participants fully controlled by the adversary.
    ///
    /// The spawned loops are detached; they exit on termination or when
    /// [`HareCluster::close`] is called.
    pub fn start(&mut self, skip: &[usize]) {
        for (node, process) in self.processes.iter_mut().enumerate() {
            if skip.contains(&node) {
                continue;
            }
            Self::spawn_broker(
                self.network.handle(node),
                process.inbox(),
                self.instance_id,
            );
            let _ = process.start().expect("process started twice");
        }
    }

    fn spawn_broker(
        handle: crate::network::NodeHandle,
        inbox: mpsc::Sender<InboundMessage>,
        instance_id: InstanceId,
    ) {
        let mut rx = handle.register_gossip_protocol(GOSSIP_PROTOCOL);
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                match decode_message(&payload) {
                    Ok(message) if message.inner.instance_id == instance_id => {
                        // A closed inbox means the process terminated.
                        if inbox.send(InboundMessage::new(message)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "undecodable gossip payload dropped"),
                }
            }
        });
    }

    /// Wait for `expected` termination outputs, failing the test if they
    /// do not all arrive within `within`.
    pub async fn collect_outputs(
        &mut self,
        expected: usize,
        within: Duration,
    ) -> Vec<TerminationOutput> {
        let mut outputs = Vec::with_capacity(expected);
        let deadline = time::Instant::now() + within;
        while outputs.len() < expected {
            let output = time::timeout_at(deadline, self.termination_rx.recv())
                .await
                .unwrap_or_else(|_| {
                    panic!(
                        "expected {expected} termination outputs, got {} in {within:?}",
                        outputs.len()
                    )
                })
                .expect("termination channel closed");
            outputs.push(output);
        }
        outputs
    }

    /// Assert that no process terminates within `within`.
    pub async fn expect_no_output(&mut self, within: Duration) {
        if let Ok(Some(output)) = time::timeout(within, self.termination_rx.recv()).await {
            panic!("unexpected termination output: {output:?}");
        }
    }

    /// Ask every running process to stop.
    pub fn close(&self) {
        for process in &self.processes {
            process.close();
        }
    }
}
