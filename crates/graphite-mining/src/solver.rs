//! Single-nonce solving.

use graphite_pow::{
    trim, CycleFinder, Edge, EdgeGenerator, GraphParams, Proof, CYCLE_LEN, HEADER_BYTES,
};

/// Runs the generate-trim-search pipeline for one nonce at a time.
///
/// Owns a scratchpad-backed edge generator; one solver per worker thread.
pub struct CycleSolver {
    generator: EdgeGenerator,
    params: GraphParams,
}

impl CycleSolver {
    /// Allocate a solver for the given graph parameters.
    pub fn new(params: GraphParams) -> Self {
        Self {
            generator: EdgeGenerator::new(params.clone()),
            params,
        }
    }

    /// Attempt one nonce. Returns a proof whose cycle is valid for the
    /// graph; the difficulty check is the caller's business.
    pub fn try_nonce(&mut self, header: &[u8; HEADER_BYTES], nonce: u64) -> Option<Proof> {
        let edges = self.generator.generate(header, nonce);
        let survivors = trim(&edges, &self.params);
        if survivors.len() < CYCLE_LEN {
            return None;
        }

        let surviving_edges: Vec<Edge> = survivors.iter().map(|&i| edges[i as usize]).collect();
        let local = CycleFinder::new(&surviving_edges).find()?;

        // Map positions in the survivor list back to full-graph indices.
        let mut cycle_edges = [0u32; CYCLE_LEN];
        for (slot, position) in cycle_edges.iter_mut().zip(local.iter()) {
            *slot = survivors[*position];
        }
        Some(Proof {
            header: *header,
            nonce,
            cycle_edges,
        })
    }
}
