//! Consensus proof verification.
//!
//! Verification re-derives the graph for the proof's (header, nonce) and
//! checks, in order: proof structure, header bits policy, difficulty target,
//! cycle structure over the re-derived edges, and trim survival. Every check
//! is fatal; there is no partial credit.

use crate::{
    compact_to_target, forms_valid_cycle, hash_meets_target, parse_header_bits, trim, Edge,
    EdgeGenerator, GraphParams, PowError, PowResult, Proof, CYCLE_LEN,
};
use tracing::debug;

/// Verifier policy and graph configuration.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Graph parameters for the epoch the proof claims.
    pub params: GraphParams,
    /// When set, the header's bits field must equal this exactly.
    pub expected_bits: Option<u32>,
    /// Policy floor: header targets easier than this are rejected.
    pub min_bits: u32,
}

/// Proof verifier.
pub struct Verifier {
    config: VerifyConfig,
}

impl Verifier {
    /// Create a verifier with the given configuration.
    pub fn new(config: VerifyConfig) -> Self {
        Self { config }
    }

    /// Full consensus verification of a proof.
    pub fn verify(&self, proof: &Proof) -> PowResult<()> {
        self.check_structure(proof)?;

        let bits = parse_header_bits(&proof.header)?;
        if let Some(expected) = self.config.expected_bits {
            if bits != expected {
                return Err(PowError::InvalidProof(format!(
                    "header bits {:#010x} do not match required {:#010x}",
                    bits, expected
                )));
            }
        }

        let target = compact_to_target(bits);
        let min_target = compact_to_target(self.config.min_bits);
        if target > min_target {
            return Err(PowError::InvalidProof(
                "header target easier than network minimum".into(),
            ));
        }
        if !hash_meets_target(&proof.hash(), &target) {
            return Err(PowError::TargetNotMet);
        }

        let mut generator = EdgeGenerator::new(self.config.params.clone());
        let edges = generator.generate(&proof.header, proof.nonce);

        let cycle = self.collect_cycle_edges(&edges, proof)?;
        if !forms_valid_cycle(&cycle) {
            return Err(PowError::InvalidProof(
                "edges do not form a single 8-cycle".into(),
            ));
        }

        let survivors = trim(&edges, &self.config.params);
        for &index in &proof.cycle_edges {
            if survivors.binary_search(&index).is_err() {
                return Err(PowError::InvalidProof(format!(
                    "cycle edge {} does not survive trimming",
                    index
                )));
            }
        }

        debug!(nonce = proof.nonce, "proof verified");
        Ok(())
    }

    /// Cycle-structure-only verification.
    ///
    /// Skips the bits, target and trim-survival checks and derives only the
    /// claimed edges via partial replay. A testing and debugging interface,
    /// not part of consensus.
    pub fn verify_cycle_only(&self, proof: &Proof) -> PowResult<()> {
        self.check_structure(proof)?;

        let mut generator = EdgeGenerator::new(self.config.params.clone());
        let cycle = generator.generate_at(&proof.header, proof.nonce, &proof.cycle_edges);
        if !forms_valid_cycle(&cycle) {
            return Err(PowError::InvalidProof(
                "edges do not form a single 8-cycle".into(),
            ));
        }
        Ok(())
    }

    /// Structural checks: index count, distinctness, range.
    fn check_structure(&self, proof: &Proof) -> PowResult<()> {
        let mut seen = proof.cycle_edges;
        seen.sort_unstable();
        if seen.windows(2).any(|w| w[0] == w[1]) {
            return Err(PowError::InvalidProof("duplicate cycle edge index".into()));
        }
        if seen[CYCLE_LEN - 1] >= self.config.params.num_edges {
            return Err(PowError::InvalidProof(format!(
                "cycle edge index {} out of range",
                seen[CYCLE_LEN - 1]
            )));
        }
        Ok(())
    }

    /// Map proof indices into the regenerated edge list.
    fn collect_cycle_edges(&self, edges: &[Edge], proof: &Proof) -> PowResult<Vec<Edge>> {
        proof
            .cycle_edges
            .iter()
            .map(|&i| {
                edges
                    .get(i as usize)
                    .copied()
                    .ok_or_else(|| PowError::InvalidProof(format!("edge index {} out of range", i)))
            })
            .collect()
    }
}
