//! Degree-1 edge trimming.
//!
//! Edges adjacent to a degree-<=1 node cannot be part of any cycle, so each
//! round removes them and decrements the endpoint degrees. After enough
//! rounds only cycle edges remain. The parallel kernel shares the degree
//! arrays and alive bitmap between threads with relaxed atomics; a racing
//! read may kill an edge whose true degree was 2, but the algorithm is
//! monotone and idempotent up to one extra round, so the surviving set after
//! the full round count is still deterministic.

use crate::{Edge, GraphParams};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing::trace;

/// Trim `edges` with the parallel kernel; returns surviving edge indices in
/// ascending order.
pub fn trim(edges: &[Edge], params: &GraphParams) -> Vec<u32> {
    let num_nodes = params.num_nodes as usize;
    let deg_u: Vec<AtomicU32> = (0..num_nodes).map(|_| AtomicU32::new(0)).collect();
    let deg_v: Vec<AtomicU32> = (0..num_nodes).map(|_| AtomicU32::new(0)).collect();
    let alive: Vec<AtomicBool> = (0..edges.len()).map(|_| AtomicBool::new(true)).collect();

    edges.par_iter().for_each(|edge| {
        deg_u[edge.u as usize].fetch_add(1, Ordering::Relaxed);
        deg_v[edge.v as usize].fetch_add(1, Ordering::Relaxed);
    });

    for round in 0..params.trim_rounds {
        let killed = AtomicU64::new(0);

        edges.par_iter().enumerate().for_each(|(i, edge)| {
            if alive[i].load(Ordering::Relaxed)
                && deg_u[edge.u as usize].load(Ordering::Relaxed) <= 1
                && alive[i].swap(false, Ordering::Relaxed)
            {
                deg_u[edge.u as usize].fetch_sub(1, Ordering::Relaxed);
                deg_v[edge.v as usize].fetch_sub(1, Ordering::Relaxed);
                killed.fetch_add(1, Ordering::Relaxed);
            }
        });

        edges.par_iter().enumerate().for_each(|(i, edge)| {
            if alive[i].load(Ordering::Relaxed)
                && deg_v[edge.v as usize].load(Ordering::Relaxed) <= 1
                && alive[i].swap(false, Ordering::Relaxed)
            {
                deg_u[edge.u as usize].fetch_sub(1, Ordering::Relaxed);
                deg_v[edge.v as usize].fetch_sub(1, Ordering::Relaxed);
                killed.fetch_add(1, Ordering::Relaxed);
            }
        });

        let killed = killed.load(Ordering::Relaxed);
        trace!(round, killed, "trim round");
        if killed == 0 {
            break;
        }
    }

    (0..edges.len() as u32)
        .filter(|&i| alive[i as usize].load(Ordering::Relaxed))
        .collect()
}

/// Sequential CPU reference trimmer.
///
/// Produces the same surviving set as [`trim`] after the full round count.
pub fn trim_reference(edges: &[Edge], params: &GraphParams) -> Vec<u32> {
    let num_nodes = params.num_nodes as usize;
    let mut deg_u = vec![0u32; num_nodes];
    let mut deg_v = vec![0u32; num_nodes];
    let mut alive = vec![true; edges.len()];

    for edge in edges {
        deg_u[edge.u as usize] += 1;
        deg_v[edge.v as usize] += 1;
    }

    for _ in 0..params.trim_rounds {
        let mut killed = 0u64;

        for (i, edge) in edges.iter().enumerate() {
            if alive[i] && deg_u[edge.u as usize] <= 1 {
                alive[i] = false;
                deg_u[edge.u as usize] -= 1;
                deg_v[edge.v as usize] -= 1;
                killed += 1;
            }
        }

        for (i, edge) in edges.iter().enumerate() {
            if alive[i] && deg_v[edge.v as usize] <= 1 {
                alive[i] = false;
                deg_u[edge.u as usize] -= 1;
                deg_v[edge.v as usize] -= 1;
                killed += 1;
            }
        }

        if killed == 0 {
            break;
        }
    }

    (0..edges.len() as u32)
        .filter(|&i| alive[i as usize])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphParams;

    fn params_with_rounds(trim_rounds: u32) -> GraphParams {
        GraphParams::custom(4096, 64, 8, trim_rounds).unwrap()
    }

    fn e(u: u32, v: u32) -> Edge {
        Edge { u, v }
    }

    /// A 4-U/4-V 8-cycle: every node has degree exactly 2.
    fn eight_cycle() -> Vec<Edge> {
        vec![
            e(0, 0),
            e(1, 0),
            e(1, 1),
            e(2, 1),
            e(2, 2),
            e(3, 2),
            e(3, 3),
            e(0, 3),
        ]
    }

    #[test]
    fn test_cycle_survives_intact() {
        let edges = eight_cycle();
        let params = params_with_rounds(60);
        let survivors = trim(&edges, &params);
        assert_eq!(survivors, (0..8).collect::<Vec<u32>>());
    }

    #[test]
    fn test_tree_trims_to_empty() {
        // A path is a tree: depth 4, so 8 rounds are ample.
        let edges = vec![e(0, 0), e(1, 0), e(1, 1), e(2, 1)];
        let params = params_with_rounds(60);
        assert!(trim(&edges, &params).is_empty());
        assert!(trim_reference(&edges, &params).is_empty());
    }

    #[test]
    fn test_isolated_edges_die() {
        let edges = vec![e(0, 0), e(1, 1), e(2, 2), e(3, 3)];
        let params = params_with_rounds(60);
        assert!(trim(&edges, &params).is_empty());
    }

    #[test]
    fn test_cycle_plus_dangling_tail() {
        let mut edges = eight_cycle();
        edges.push(e(4, 0)); // tail hanging off the cycle's V node 0
        edges.push(e(4, 5));
        let params = params_with_rounds(60);

        let survivors = trim(&edges, &params);
        assert_eq!(survivors, (0..8).collect::<Vec<u32>>());
    }

    #[test]
    fn test_parallel_matches_reference() {
        let edges = {
            let mut edges = eight_cycle();
            edges.extend([e(5, 5), e(6, 5), e(6, 6), e(7, 6), e(7, 7), e(5, 7)]); // 6-cycle
            edges.extend([e(8, 8), e(9, 8), e(9, 9)]); // path, dies
            edges
        };
        let params = params_with_rounds(60);
        assert_eq!(trim(&edges, &params), trim_reference(&edges, &params));
    }

    #[test]
    fn test_survivors_shrink_monotonically() {
        let mut edges = eight_cycle();
        edges.extend([e(4, 4), e(5, 4), e(5, 5)]);

        let mut previous: Option<Vec<u32>> = None;
        for rounds in 1..6 {
            let survivors = trim_reference(&edges, &params_with_rounds(rounds));
            if let Some(prev) = previous {
                assert!(
                    survivors.iter().all(|i| prev.contains(i)),
                    "set after {} rounds must be a subset of the set after {}",
                    rounds,
                    rounds - 1
                );
            }
            previous = Some(survivors);
        }
    }
}
