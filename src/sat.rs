use std::collections::HashMap;

use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Returns one satisfying path of the BDD, if any exists.
    ///
    /// The path is a vector of signed literals: `v` for a variable set to
    /// true, `-v` for false. Variables not on the path are don't-cares.
    /// The high branch is preferred, so the result is deterministic.
    ///
    /// Returns `None` if the BDD represents the constant false function.
    pub fn one_sat(&self, node: Ref) -> Option<Vec<i32>> {
        if self.is_zero(node) {
            return None;
        }

        let mut path = Vec::new();
        let mut current = node;

        // Walk down the BDD, always picking a satisfying branch
        while !self.is_one(current) {
            let var = self.variable(current.index()) as i32;
            let low = self.low_node(current);
            let high = self.high_node(current);

            // Prefer high branch if satisfiable, otherwise take low
            if !self.is_zero(high) {
                path.push(var);
                current = high;
            } else {
                path.push(-var);
                current = low;
            }
        }

        Some(path)
    }

    /// Number of satisfying assignments over variables `1..=num_vars`.
    pub fn sat_count(&self, node: Ref, num_vars: usize) -> BigUint {
        let mut cache = HashMap::new();
        let max = BigUint::from(1u32) << num_vars;
        self.sat_count_(node, &max, &mut cache)
    }

    fn sat_count_(&self, node: Ref, max: &BigUint, cache: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(node) {
            return BigUint::ZERO;
        } else if self.is_one(node) {
            return max.clone();
        }

        if let Some(count) = cache.get(&node) {
            return count.clone();
        }

        let low = self.low(node.index());
        let high = self.high(node.index());

        let count_low = self.sat_count_(low, max, cache);
        let count_high = self.sat_count_(high, max, cache);

        // Each branch fixes the node variable, halving the assignments.
        let count: BigUint = (count_low + count_high) >> 1;
        let count = if node.is_negated() { max - count } else { count };

        cache.insert(node, count.clone());
        count
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn mk_lits(bdd: &Bdd, lits: &[i32]) -> Ref {
        bdd.apply_and_many(lits.iter().map(|&l| {
            let x = bdd.mk_var(l.unsigned_abs());
            if l < 0 {
                -x
            } else {
                x
            }
        }))
    }

    #[test]
    fn test_one_sat() {
        let bdd = Bdd::default();

        let f = mk_lits(&bdd, &[1, -2, -3]);
        let model = bdd.one_sat(f);
        assert_eq!(model, Some(vec![1, -2, -3]));

        let g = bdd.apply_and(f, -mk_lits(&bdd, &[1, -2, -3]));
        assert_eq!(bdd.one_sat(g), None);
    }

    #[test]
    fn test_one_sat_prefers_high() {
        let bdd = Bdd::default();
        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let f = bdd.apply_or(-x1, x2);
        assert_eq!(bdd.one_sat(f), Some(vec![1, 2]));
        let g = bdd.apply_and(-x1, -x2);
        assert_eq!(bdd.one_sat(g), Some(vec![-1, -2]));
        assert_eq!(bdd.one_sat(bdd.one), Some(vec![]));
    }

    #[test]
    fn test_one_sat_many() {
        let bdd = Bdd::default();
        for &s1 in &[1, -1] {
            for &s2 in &[1, -1] {
                for &s3 in &[1, -1] {
                    let cube = [s1, 2 * s2, 3 * s3];
                    let f = mk_lits(&bdd, &cube);
                    assert_eq!(bdd.one_sat(f), Some(cube.to_vec()));
                }
            }
        }
    }

    #[test]
    fn test_sat_count() {
        let bdd = Bdd::default();
        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let x3 = bdd.mk_var(3);

        assert_eq!(bdd.sat_count(bdd.zero, 3), BigUint::ZERO);
        assert_eq!(bdd.sat_count(bdd.one, 3), BigUint::from(8u32));
        assert_eq!(bdd.sat_count(x2, 3), BigUint::from(4u32));
        assert_eq!(bdd.sat_count(-x2, 3), BigUint::from(4u32));

        let f = bdd.apply_or(bdd.apply_and(x1, x2), x3);
        assert_eq!(bdd.sat_count(f, 3), BigUint::from(5u32));
        assert_eq!(bdd.sat_count(-f, 3), BigUint::from(3u32));
        assert_eq!(bdd.sat_count(f, 4), BigUint::from(10u32));
    }
}
