use super::sha256_hex;

#[derive(Debug, Clone)]
pub struct MerkleNode {
    pub hash: String,
}

/// Builds the Merkle tree levels over `{address, balance}` leaves, sorted
/// by address ascending. Odd nodes at any level are paired with
/// themselves (spec.md §3, §4.7). Returns all levels, leaves first,
/// root last.
pub fn build_merkle_tree(accounts: &[(String, i64)]) -> Vec<Vec<String>> {
    let mut sorted = accounts.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let leaves: Vec<String> = sorted
        .iter()
        .map(|(addr, balance)| sha256_hex(format!("{addr}|{balance}").as_bytes()))
        .collect();

    if leaves.is_empty() {
        return vec![vec![sha256_hex(b"")]];
    }

    let mut levels = vec![leaves];
    while levels.last().unwrap().len() > 1 {
        let current = levels.last().unwrap();
        let mut next = Vec::with_capacity((current.len() + 1) / 2);
        let mut i = 0;
        while i < current.len() {
            let left = &current[i];
            let right = if i + 1 < current.len() {
                &current[i + 1]
            } else {
                left
            };
            next.push(sha256_hex(format!("{left}{right}").as_bytes()));
            i += 2;
        }
        levels.push(next);
    }
    levels
}

pub fn merkle_root(accounts: &[(String, i64)]) -> String {
    build_merkle_tree(accounts).last().unwrap()[0].clone()
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProofStep {
    pub sibling_hash: String,
    /// true if the sibling is on the left of the current node.
    pub sibling_is_left: bool,
}

/// Walks up the levels for the leaf at `leaf_index`, collecting
/// left/right sibling pointers, for an inclusion proof against the
/// stored root.
pub fn inclusion_proof(levels: &[Vec<String>], leaf_index: usize) -> Vec<ProofStep> {
    let mut steps = Vec::new();
    let mut idx = leaf_index;
    for level in &levels[..levels.len().saturating_sub(1)] {
        let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
        let sibling_is_left = idx % 2 == 1;
        let sibling_hash = level
            .get(sibling_idx)
            .cloned()
            .unwrap_or_else(|| level[idx].clone());
        steps.push(ProofStep {
            sibling_hash,
            sibling_is_left,
        });
        idx /= 2;
    }
    steps
}

pub fn verify_inclusion(leaf_hash: &str, steps: &[ProofStep], root: &str) -> bool {
    let mut current = leaf_hash.to_string();
    for step in steps {
        current = if step.sibling_is_left {
            sha256_hex(format!("{}{}", step.sibling_hash, current).as_bytes())
        } else {
            sha256_hex(format!("{}{}", current, step.sibling_hash).as_bytes())
        };
    }
    current == root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inclusion_proof_verifies_against_root() {
        let accounts = vec![
            ("addr-a".to_string(), 1000),
            ("addr-b".to_string(), 2500),
            ("addr-c".to_string(), 500),
        ];
        let levels = build_merkle_tree(&accounts);
        let root = levels.last().unwrap()[0].clone();

        let mut sorted = accounts.clone();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let b_index = sorted.iter().position(|(a, _)| a == "addr-b").unwrap();
        let b_leaf = sha256_hex(b"addr-b|2500");

        let proof = inclusion_proof(&levels, b_index);
        assert!(verify_inclusion(&b_leaf, &proof, &root));
    }
}
