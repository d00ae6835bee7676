// Copyright 2024 The Scribe Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Balanced binary Merkle tree over change digests.
//!
//! Leaves are kept in insertion order. A node without a sibling at some level
//! is paired with itself, `hash_internal(x, x)`; this is deterministic and
//! must be reproduced bit-exactly by any reimplementation, because the root
//! becomes the envelope's `tree_hash`.

use crate::digest::Digest;
use crate::digest::hash_internal;
use crate::digest::hash_leaf;
use crate::error::ScribeError;
use crate::error::ScribeResult;

/// Bottom-up Merkle tree. Nodes live in per-level arenas rather than an
/// owning node graph.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    // levels[0] holds the leaves; after build, the last level is the root.
    levels: Vec<Vec<Digest>>,
    built: bool,
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

/// One level of an inclusion proof: the sibling digest and which side it
/// hashes on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProofStep {
    /// Digest of the sibling node at this level.
    pub sibling: Digest,
    /// True if the sibling is the left input of `hash_internal`.
    pub sibling_on_left: bool,
}

/// Proof that a leaf is included under a given root.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InclusionProof {
    /// Index of the proven leaf.
    pub leaf_index: usize,
    /// Sibling digests from the leaf level up to (excluding) the root.
    pub steps: Vec<ProofStep>,
}

impl MerkleTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            levels: vec![vec![]],
            built: false,
        }
    }

    /// Appends a leaf from raw bytes; the bytes are hashed with the leaf
    /// domain prefix.
    pub fn add_leaf_bytes(&mut self, data: &[u8]) -> ScribeResult<()> {
        self.add_leaf(hash_leaf(data))
    }

    /// Appends a pre-computed digest as a leaf.
    ///
    /// The digest is stored as the leaf hash as-is, without re-applying the
    /// leaf prefix. Callers hashing raw data should use
    /// [`MerkleTree::add_leaf_bytes`] instead.
    pub fn add_leaf_digest(&mut self, digest: Digest) -> ScribeResult<()> {
        self.add_leaf(digest)
    }

    fn add_leaf(&mut self, digest: Digest) -> ScribeResult<()> {
        if self.built {
            return Err(ScribeError::invalid_argument(
                "cannot add leaves to a built merkle tree",
            ));
        }
        self.levels[0].push(digest);
        Ok(())
    }

    /// Number of leaves added so far.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Hash of the leaf at `index`, if present.
    pub fn leaf(&self, index: usize) -> Option<&Digest> {
        self.levels[0].get(index)
    }

    /// Builds the internal levels and returns the root. Afterwards the leaf
    /// set is frozen. Building an already-built tree returns the same root.
    pub fn build(&mut self) -> ScribeResult<Digest> {
        if self.built {
            return Ok(self.root());
        }
        while self.levels.last().unwrap().len() > 1 {
            let current = self.levels.last().unwrap();
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                let left = &pair[0];
                // The unpaired tail node hashes with itself.
                let right = pair.get(1).unwrap_or(left);
                next.push(hash_internal(left, right));
            }
            self.levels.push(next);
        }
        self.built = true;
        Ok(self.root())
    }

    /// Root digest. Zero for an empty tree; for a single leaf, the leaf's own
    /// hash.
    pub fn root(&self) -> Digest {
        match self.levels.last().unwrap().first() {
            Some(digest) => *digest,
            None => Digest::ZERO,
        }
    }

    /// Produces an inclusion proof for the leaf at `index`. The tree must
    /// have been built.
    pub fn prove(&self, index: usize) -> ScribeResult<InclusionProof> {
        if !self.built {
            return Err(ScribeError::invalid_argument(
                "merkle tree must be built before proving",
            ));
        }
        if index >= self.leaf_count() {
            return Err(ScribeError::invalid_argument(format!(
                "leaf index {index} out of range (have {} leaves)",
                self.leaf_count()
            )));
        }
        let mut steps = vec![];
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_position = position ^ 1;
            // An unpaired tail node was hashed with itself.
            let sibling = *level.get(sibling_position).unwrap_or(&level[position]);
            steps.push(ProofStep {
                sibling,
                sibling_on_left: position % 2 == 1,
            });
            position /= 2;
        }
        Ok(InclusionProof {
            leaf_index: index,
            steps,
        })
    }
}

impl InclusionProof {
    /// Folds the proof from `leaf` and succeeds iff the result equals `root`.
    pub fn verify(&self, leaf: &Digest, root: &Digest) -> bool {
        let mut current = *leaf;
        for step in &self.steps {
            current = if step.sibling_on_left {
                hash_internal(&step.sibling, &current)
            } else {
                hash_internal(&current, &step.sibling)
            };
        }
        current == *root
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use test_case::test_case;

    use super::*;
    use crate::digest::hash_bytes;
    use crate::error::ErrorKind;

    fn built_tree(leaves: &[&[u8]]) -> MerkleTree {
        let mut tree = MerkleTree::new();
        for leaf in leaves {
            tree.add_leaf_bytes(leaf).unwrap();
        }
        tree.build().unwrap();
        tree
    }

    #[test]
    fn test_empty_tree_root_is_zero() {
        let mut tree = MerkleTree::new();
        assert_eq!(tree.build().unwrap(), Digest::ZERO);
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let tree = built_tree(&[b"only"]);
        assert_eq!(tree.root(), hash_leaf(b"only"));
    }

    #[test]
    fn test_precomputed_digest_is_not_reprefixed() {
        let digest = hash_bytes(b"already hashed");
        let mut tree = MerkleTree::new();
        tree.add_leaf_digest(digest).unwrap();
        assert_eq!(tree.build().unwrap(), digest);
        assert_ne!(digest, hash_leaf(digest.as_bytes()));
    }

    #[test]
    fn test_two_leaves() {
        let tree = built_tree(&[b"a", b"b"]);
        let expected = hash_internal(&hash_leaf(b"a"), &hash_leaf(b"b"));
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn test_odd_tail_pairs_with_itself() {
        let tree = built_tree(&[b"a", b"b", b"c"]);
        let ab = hash_internal(&hash_leaf(b"a"), &hash_leaf(b"b"));
        let cc = hash_internal(&hash_leaf(b"c"), &hash_leaf(b"c"));
        assert_eq!(tree.root(), hash_internal(&ab, &cc));
    }

    #[test]
    fn test_four_leaves_balanced() {
        let (a, b, c, d) = (
            hash_bytes(b"A"),
            hash_bytes(b"B"),
            hash_bytes(b"C"),
            hash_bytes(b"D"),
        );
        let mut tree = MerkleTree::new();
        for digest in [a, b, c, d] {
            tree.add_leaf_digest(digest).unwrap();
        }
        let root = tree.build().unwrap();
        let left = hash_internal(&a, &b);
        let right = hash_internal(&c, &d);
        assert_eq!(root, hash_internal(&left, &right));
    }

    #[test]
    fn test_add_after_build_is_rejected() {
        let mut tree = built_tree(&[b"a"]);
        assert_matches!(
            tree.add_leaf_bytes(b"late"),
            Err(err) if err.kind() == ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_leaf_order_changes_root() {
        assert_ne!(built_tree(&[b"a", b"b"]).root(), built_tree(&[b"b", b"a"]).root());
    }

    #[test_case(1)]
    #[test_case(2)]
    #[test_case(3)]
    #[test_case(5)]
    #[test_case(8)]
    #[test_case(13)]
    fn test_proof_round_trip(leaf_count: usize) {
        let leaves: Vec<Vec<u8>> = (0..leaf_count)
            .map(|i| format!("leaf-{i}").into_bytes())
            .collect();
        let mut tree = MerkleTree::new();
        for leaf in &leaves {
            tree.add_leaf_bytes(leaf).unwrap();
        }
        let root = tree.build().unwrap();
        for (i, leaf) in leaves.iter().enumerate() {
            let proof = tree.prove(i).unwrap();
            assert!(proof.verify(&hash_leaf(leaf), &root));
            // The proof must not verify for a different leaf.
            assert!(!proof.verify(&hash_leaf(b"not that leaf"), &root));
        }
    }

    #[test]
    fn test_tampered_proof_fails() {
        let mut tree = MerkleTree::new();
        for i in 0..6 {
            tree.add_leaf_bytes(format!("row-{i}").as_bytes()).unwrap();
        }
        let root = tree.build().unwrap();
        let leaf = hash_leaf(b"row-2");

        let proof = tree.prove(2).unwrap();
        assert!(proof.verify(&leaf, &root));

        // Any altered proof element falsifies the proof.
        for i in 0..proof.steps.len() {
            let mut tampered = proof.clone();
            tampered.steps[i].sibling = hash_bytes(b"tampered");
            assert!(!tampered.verify(&leaf, &root));
        }
        let mut flipped = proof.clone();
        // Leaf 2 sits left of leaf 3, so its first side bit is load-bearing.
        flipped.steps[0].sibling_on_left = !flipped.steps[0].sibling_on_left;
        assert!(!flipped.verify(&leaf, &root));
        assert!(!proof.verify(&leaf, &hash_bytes(b"wrong root")));
    }

    #[test]
    fn test_prove_out_of_range() {
        let tree = built_tree(&[b"a", b"b"]);
        assert_matches!(
            tree.prove(2),
            Err(err) if err.kind() == ErrorKind::InvalidArgument
        );
    }
}
