//! Worker placement over the machine topology.
//!
//! Detection is deliberately conservative: it assumes a single NUMA node
//! unless the core count strongly suggests otherwise. A wrong multi-node
//! guess skews steal order and pinning for no benefit, while "one node" is
//! always safe. Detection never fails; it degrades to one node.
//!
//! [`plan`] turns a detected topology into one [`Placement`] per worker: an
//! optional core to pin to and the worker's *neighbor rings*. Ring 0 holds
//! the peers on the same node, later rings hold peers at growing node
//! distance. Workers hunting for stealable work walk their rings near to
//! far, so work tends to stay close to the cache hierarchy that produced it.

use std::collections::HashMap;

use core_affinity::CoreId;

/// Estimated NUMA layout of the machine.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Logical CPU index to estimated node.
    pub core_to_node: HashMap<usize, usize>,
    /// Estimated node to its logical CPU indices.
    pub node_cores: HashMap<usize, Vec<usize>>,
    /// Number of estimated nodes, at least 1.
    pub num_nodes: usize,
}

impl Topology {
    /// Detects the machine topology.
    pub fn detect() -> Self {
        use sysinfo::{CpuRefreshKind, System};

        let mut system = System::new();
        system.refresh_cpu_specifics(CpuRefreshKind::everything());
        Self::estimate(system.cpus().len())
    }

    fn estimate(num_cores: usize) -> Self {
        let num_cores = num_cores.max(1);
        // Only machines with plenty of cores plausibly span nodes; guess a
        // node per 16 cores, capped, and otherwise stay on one node.
        let estimated_nodes = if num_cores > 32 {
            (num_cores / 16).clamp(1, 4)
        } else {
            1
        };
        Self::build(num_cores, estimated_nodes)
    }

    fn build(num_cores: usize, num_nodes: usize) -> Self {
        let mut core_to_node = HashMap::new();
        let mut node_cores: HashMap<usize, Vec<usize>> = HashMap::new();

        for core in 0..num_cores {
            let node = core % num_nodes;
            core_to_node.insert(core, node);
            node_cores.entry(node).or_default().push(core);
        }

        Topology {
            core_to_node,
            node_cores,
            num_nodes,
        }
    }

    /// Node of a logical CPU index, defaulting to node 0.
    pub fn node_of(&self, core: usize) -> usize {
        self.core_to_node.get(&core).copied().unwrap_or(0)
    }
}

/// Where one worker runs and whom it steals from first.
#[derive(Debug, Clone)]
pub struct Placement {
    /// Core to pin the worker thread to, when affinity is available.
    pub core: Option<CoreId>,
    /// Peer worker ids grouped by node distance, nearest ring first. Every
    /// peer appears in exactly one ring; the rings never contain the worker
    /// itself.
    pub rings: Vec<Vec<usize>>,
}

/// Computes placements for `worker_count` workers.
///
/// With `numa_aware` unset (or when detection sees a single node) every
/// worker gets one ring holding all its peers and no pinning. Workers are
/// assigned to cores round-robin, so oversubscribed pools wrap.
pub fn plan(worker_count: usize, numa_aware: bool) -> Vec<Placement> {
    if !numa_aware {
        return flat_plan(worker_count);
    }

    let topology = Topology::detect();
    let cores = core_affinity::get_core_ids().unwrap_or_default();
    if topology.num_nodes <= 1 {
        // Single node: ring structure degenerates, but pinning still helps.
        let mut plan = flat_plan(worker_count);
        if !cores.is_empty() {
            for (worker, placement) in plan.iter_mut().enumerate() {
                placement.core = Some(cores[worker % cores.len()]);
            }
        }
        return plan;
    }

    let num_cores = topology.core_to_node.len().max(1);
    let worker_node: Vec<usize> = (0..worker_count)
        .map(|worker| topology.node_of(worker % num_cores))
        .collect();

    (0..worker_count)
        .map(|worker| {
            let core = if cores.is_empty() {
                None
            } else {
                Some(cores[worker % cores.len()])
            };

            Placement {
                core,
                rings: rings_from_nodes(worker, &worker_node),
            }
        })
        .collect()
}

/// Buckets `worker`'s peers by node distance, nearest first.
fn rings_from_nodes(worker: usize, worker_node: &[usize]) -> Vec<Vec<usize>> {
    let mut by_distance: Vec<(usize, usize)> = (0..worker_node.len())
        .filter(|&peer| peer != worker)
        .map(|peer| {
            let distance = worker_node[worker].abs_diff(worker_node[peer]);
            (distance, peer)
        })
        .collect();
    by_distance.sort_unstable();

    let mut rings: Vec<Vec<usize>> = Vec::new();
    let mut last_distance = None;
    for (distance, peer) in by_distance {
        if last_distance != Some(distance) {
            rings.push(Vec::new());
            last_distance = Some(distance);
        }
        rings.last_mut().expect("ring pushed above").push(peer);
    }
    rings
}

fn flat_plan(worker_count: usize) -> Vec<Placement> {
    (0..worker_count)
        .map(|worker| {
            let peers: Vec<usize> = (0..worker_count).filter(|&p| p != worker).collect();
            let rings = if peers.is_empty() {
                Vec::new()
            } else {
                vec![peers]
            };
            Placement { core: None, rings }
        })
        .collect()
}
