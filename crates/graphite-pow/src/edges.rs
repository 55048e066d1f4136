//! Edge generation.
//!
//! Edges of the bipartite graph are produced by a dependent chain over the
//! scratchpad. Each step selects two dense f32 matrices from scratchpad
//! bytes, multiplies them, XOR-folds the product into a 16-byte block, runs
//! one AES encryption keyed by the previous state, and writes the new state
//! back into the scratchpad. Edge `i` therefore depends on every edge before
//! it; computing a sparse set of edges costs as much as computing the prefix
//! up to the largest requested index.
//!
//! The matrix product is a pinned scalar f32 algorithm (row-major triple
//! loop, inner accumulation over `k` in ascending order). No BLAS or SIMD
//! dispatch is permitted here: the product bytes feed the fold, so every
//! validator must produce the same bit patterns.

use crate::scratchpad::aes128_encrypt;
use crate::{GraphParams, Scratchpad};
use sha2::{Digest, Sha256};

/// An unordered pair of node indices, one per partition.
///
/// Values are already masked to `node_mask`. An edge is identified by its
/// position in the generator's output, not by its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// U-partition node.
    pub u: u32,
    /// V-partition node.
    pub v: u32,
}

/// Generates the edge set for a (header, nonce).
///
/// Owns one scratchpad and the matrix work buffers, all recycled across
/// nonces. Not shareable between threads; concurrent miners allocate their
/// own generator.
pub struct EdgeGenerator {
    params: GraphParams,
    scratchpad: Scratchpad,
    mat_a: Vec<f32>,
    mat_b: Vec<f32>,
    mat_c: Vec<f32>,
}

impl EdgeGenerator {
    /// Allocate a generator for the given parameters.
    pub fn new(params: GraphParams) -> Self {
        let dim = params.matrix_dim;
        let scratchpad = Scratchpad::new(params.scratchpad_bytes);
        Self {
            params,
            scratchpad,
            mat_a: vec![0.0; dim * dim],
            mat_b: vec![0.0; dim * dim],
            mat_c: vec![0.0; dim * dim],
        }
    }

    /// The parameters this generator was built with.
    pub fn params(&self) -> &GraphParams {
        &self.params
    }

    /// Generate the full edge set for `(header, nonce)`.
    pub fn generate(&mut self, header: &[u8], nonce: u64) -> Vec<Edge> {
        let num_edges = self.params.num_edges;
        let mut edges = Vec::with_capacity(num_edges as usize);
        self.run_chain(header, nonce, num_edges, |_, edge| edges.push(edge));
        edges
    }

    /// Generate only the edges at `indices` via partial replay.
    ///
    /// The chain still runs from index 0 up to the largest requested index;
    /// results are returned in the order of `indices`.
    pub fn generate_at(&mut self, header: &[u8], nonce: u64, indices: &[u32]) -> Vec<Edge> {
        let Some(&max) = indices.iter().max() else {
            return Vec::new();
        };
        let mut by_index = vec![Edge { u: 0, v: 0 }; max as usize + 1];
        let mut wanted = vec![false; max as usize + 1];
        for &i in indices {
            wanted[i as usize] = true;
        }
        self.run_chain(header, nonce, max + 1, |idx, edge| {
            if wanted[idx as usize] {
                by_index[idx as usize] = edge;
            }
        });
        indices.iter().map(|&i| by_index[i as usize]).collect()
    }

    /// Walk the dependent chain, emitting each edge in index order.
    fn run_chain(&mut self, header: &[u8], nonce: u64, limit: u32, mut emit: impl FnMut(u32, Edge)) {
        let mut hasher = Sha256::new();
        hasher.update(header);
        hasher.update(nonce.to_le_bytes());
        let seed: [u8; 32] = hasher.finalize().into();

        let mut key = [0u8; 16];
        let mut state = [0u8; 16];
        key.copy_from_slice(&seed[0..16]);
        state.copy_from_slice(&seed[16..32]);

        state = self.scratchpad.fill(&key, &state);

        let dim = self.params.matrix_dim;
        let matrix_bytes = self.params.matrix_bytes();
        let max_off = self.params.max_matrix_offset() as u32;
        let mask = self.params.node_mask;

        for index in 0..limit {
            let s32 = u32::from_le_bytes(state[0..4].try_into().unwrap());
            let off = ((s32 % max_off) & !3) as usize;

            let pad = self.scratchpad.as_slice();
            load_matrix(&mut self.mat_a, &pad[off..off + matrix_bytes]);
            load_matrix(&mut self.mat_b, &pad[off + matrix_bytes..off + 2 * matrix_bytes]);
            matmul(&self.mat_a, &self.mat_b, &mut self.mat_c, dim);

            let mut folded = [0u8; 16];
            for (i, value) in self.mat_c.iter().enumerate() {
                for (j, byte) in value.to_le_bytes().into_iter().enumerate() {
                    folded[(i * 4 + j) % 16] ^= byte;
                }
            }

            state = aes128_encrypt(&state, &folded);
            self.scratchpad.write_state(off, &state);

            let u = u32::from_le_bytes(state[0..4].try_into().unwrap()) & mask;
            let v = u32::from_le_bytes(state[4..8].try_into().unwrap()) & mask;
            emit(index, Edge { u, v });
        }
    }
}

/// Reinterpret raw scratchpad bytes as little-endian f32 values.
///
/// NaN bit patterns are allowed and propagate through the multiply.
fn load_matrix(dst: &mut [f32], bytes: &[u8]) {
    for (value, chunk) in dst.iter_mut().zip(bytes.chunks_exact(4)) {
        *value = f32::from_le_bytes(chunk.try_into().unwrap());
    }
}

/// Reference scalar f32 matrix multiply, `c = a * b`, row-major.
fn matmul(a: &[f32], b: &[f32], c: &mut [f32], dim: usize) {
    for row in 0..dim {
        for col in 0..dim {
            let mut acc = 0.0f32;
            for k in 0..dim {
                acc += a[row * dim + k] * b[k * dim + col];
            }
            c[row * dim + col] = acc;
        }
    }
}
