//! Lock-free concurrent union-find for cluster formation.
//!
//! Parents live in a flat atomic array. `find` shortens paths by halving as
//! it walks; the plain store is safe because any parent it observes is still
//! a valid ancestor. `union` links the larger root id under the smaller with
//! a single CAS, which both guarantees progress (ids only ever decrease
//! along a path) and makes the surviving representative independent of
//! thread interleaving.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

#[derive(Debug)]
pub(crate) struct UnionFind {
    stat: Vec<AtomicU32>,
}

impl UnionFind {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            stat: (0..len as u32).map(AtomicU32::new).collect(),
        }
    }

    /// Root of the set containing `node`, halving the path on the way.
    pub(crate) fn find(&self, node: u32) -> u32 {
        let mut current = node;
        loop {
            let parent = self.stat[current as usize].load(Ordering::Acquire);
            if parent == current {
                return current;
            }
            let grandparent = self.stat[parent as usize].load(Ordering::Acquire);
            if grandparent != parent {
                self.stat[current as usize].store(grandparent, Ordering::Release);
            }
            current = parent;
        }
    }

    /// Merges the sets containing `a` and `b`.
    pub(crate) fn union(&self, a: u32, b: u32) {
        let mut root_a = self.find(a);
        let mut root_b = self.find(b);
        while root_a != root_b {
            let (lo, hi) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            match self.stat[hi as usize].compare_exchange(
                hi,
                lo,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(_) => {
                    // Someone re-rooted `hi` first; chase the new root.
                    root_a = self.find(hi);
                    root_b = lo;
                }
            }
        }
    }

    /// Attaches `child` to `parent` only if `child` is still its own set.
    /// Returns `false` when another thread claimed it first.
    pub(crate) fn claim(&self, child: u32, parent: u32) -> bool {
        self.stat[child as usize]
            .compare_exchange(child, parent, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Rewrites every entry to point directly at its representative.
    pub(crate) fn flatten(&self) {
        self.stat.par_iter().for_each(|cell| {
            let first = cell.load(Ordering::Acquire);
            let mut root = first;
            loop {
                let next = self.stat[root as usize].load(Ordering::Acquire);
                if next >= root {
                    break;
                }
                root = next;
            }
            if root != first {
                cell.store(root, Ordering::Release);
            }
        });
    }

    /// Representative of `node` after [`Self::flatten`].
    pub(crate) fn get(&self, node: u32) -> u32 {
        self.stat[node as usize].load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use rayon::prelude::*;
    use rstest::rstest;

    use super::UnionFind;

    #[test]
    fn fresh_sets_are_singletons() {
        let uf = UnionFind::new(4);
        for i in 0..4 {
            assert_eq!(uf.find(i), i);
        }
    }

    #[test]
    fn union_links_larger_root_under_smaller() {
        let uf = UnionFind::new(5);
        uf.union(4, 2);
        assert_eq!(uf.find(4), 2);
        uf.union(2, 0);
        assert_eq!(uf.find(4), 0);
        assert_eq!(uf.find(2), 0);
    }

    #[test]
    fn claim_succeeds_exactly_once() {
        let uf = UnionFind::new(3);
        assert!(uf.claim(2, 0));
        assert!(!uf.claim(2, 1));
        uf.flatten();
        assert_eq!(uf.get(2), 0);
    }

    #[rstest]
    #[case::chain(1_000)]
    #[case::larger_chain(10_000)]
    fn parallel_chain_collapses_to_one_root(#[case] len: u32) {
        let uf = UnionFind::new(len as usize);
        (0..len - 1).into_par_iter().for_each(|i| uf.union(i, i + 1));
        uf.flatten();
        for i in 0..len {
            assert_eq!(uf.get(i), 0);
        }
    }

    #[test]
    fn parallel_random_pairs_match_sequential_components() {
        let len = 512u32;
        let pairs: Vec<(u32, u32)> = (0..len)
            .map(|i| (i, (i.wrapping_mul(31).wrapping_add(7)) % len))
            .filter(|&(a, b)| a % 3 != 0 && a != b)
            .collect();

        let uf = UnionFind::new(len as usize);
        pairs.par_iter().for_each(|&(a, b)| uf.union(a, b));
        uf.flatten();

        // Sequential reference.
        let mut parent: Vec<u32> = (0..len).collect();
        fn find(parent: &mut [u32], mut v: u32) -> u32 {
            while parent[v as usize] != v {
                let grandparent = parent[parent[v as usize] as usize];
                parent[v as usize] = grandparent;
                v = grandparent;
            }
            v
        }
        for &(a, b) in &pairs {
            let ra = find(&mut parent, a);
            let rb = find(&mut parent, b);
            if ra != rb {
                parent[ra.max(rb) as usize] = ra.min(rb);
            }
        }

        for a in 0..len {
            for b in 0..len {
                let together = uf.get(a) == uf.get(b);
                let expected = find(&mut parent, a) == find(&mut parent, b);
                assert_eq!(together, expected, "membership of ({a}, {b})");
            }
        }
    }
}
