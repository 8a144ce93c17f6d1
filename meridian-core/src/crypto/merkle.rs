//! Merkle commitment over transaction hashes
//!
//! Leaves are the hex-encoded transaction hashes of a block, paired
//! left-to-right. An odd trailing node is paired with itself. The parent
//! of two nodes is `sha256(left ∥ right)` over the hex text. An empty
//! leaf set commits to the empty string.

use super::sha256_hex;

/// Compute the Merkle root of an ordered list of hex digests.
pub fn merkle_root<S: AsRef<str>>(leaves: &[S]) -> String {
    if leaves.is_empty() {
        return String::new();
    }

    let mut level: Vec<String> = leaves.iter().map(|l| l.as_ref().to_string()).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(sha256_hex(format!("{left}{right}")));
        }
        level = next;
    }
    level.swap_remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_commits_to_empty_string() {
        let leaves: [&str; 0] = [];
        assert_eq!(merkle_root(&leaves), "");
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let h = sha256_hex("tx1");
        assert_eq!(merkle_root(&[h.clone()]), h);
    }

    #[test]
    fn two_leaves() {
        let h1 = sha256_hex("tx1");
        let h2 = sha256_hex("tx2");
        let expected = sha256_hex(format!("{h1}{h2}"));
        assert_eq!(merkle_root(&[h1, h2]), expected);
    }

    #[test]
    fn odd_leaf_is_paired_with_itself() {
        let h1 = sha256_hex("tx1");
        let h2 = sha256_hex("tx2");
        let h3 = sha256_hex("tx3");

        let n12 = sha256_hex(format!("{h1}{h2}"));
        let n33 = sha256_hex(format!("{h3}{h3}"));
        let expected = sha256_hex(format!("{n12}{n33}"));

        assert_eq!(merkle_root(&[h1, h2, h3]), expected);
    }

    #[test]
    fn four_leaves() {
        let hs: Vec<String> = (0..4).map(|i| sha256_hex(format!("tx{i}"))).collect();
        let n01 = sha256_hex(format!("{}{}", hs[0], hs[1]));
        let n23 = sha256_hex(format!("{}{}", hs[2], hs[3]));
        let expected = sha256_hex(format!("{n01}{n23}"));
        assert_eq!(merkle_root(&hs), expected);
    }

    #[test]
    fn root_depends_on_leaf_order() {
        let h1 = sha256_hex("tx1");
        let h2 = sha256_hex("tx2");
        assert_ne!(
            merkle_root(&[h1.clone(), h2.clone()]),
            merkle_root(&[h2, h1])
        );
    }
}
