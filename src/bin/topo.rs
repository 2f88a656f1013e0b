use lazypool::topology::{self, Topology};

fn main() {
    let topo = Topology::detect();
    println!("Detected {} NUMA nodes", topo.num_nodes);
    println!("Core -> Node map: {:?}", topo.core_to_node);
    println!("Node -> Cores map: {:?}", topo.node_cores);

    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    println!("\nPlacement for {} workers:", workers);
    for (worker, placement) in topology::plan(workers, true).iter().enumerate() {
        println!(
            "  worker {:2} core={:?} rings={:?}",
            worker,
            placement.core.map(|c| c.id),
            placement.rings
        );
    }
}
