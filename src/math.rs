use num_integer::Integer;
use num_traits::Zero;

use crate::Weight;

/// Type alias for sets, we use this to hide which type of `HashSet` we are actually using.
pub type Set<S> = fxhash::FxHashSet<S>;
/// Type alias for maps, we use this to hide which type of `HashMap` we are actually using.
pub type Map<K, V> = fxhash::FxHashMap<K, V>;

/// Collects anything that converts into weights into a vector of weights, so that `vector([1, -2])`
/// gives the weights `1` and `-2`.
pub fn vector<W: Into<Weight>, I: IntoIterator<Item = W>>(values: I) -> Vec<Weight> {
    values.into_iter().map(Into::into).collect()
}

/// Computes the (non-negative) greatest common divisor of `a` and `b`. By convention `gcd(0, 0) = 0`,
/// which makes `0` the neutral element, so folding over a sequence starting from `0` is fine.
pub fn gcd(a: &Weight, b: &Weight) -> Weight {
    a.gcd(b)
}

/// Computes the greatest common divisor of all given values, which is `0` for an empty
/// iterator or if all values are zero.
pub fn gcd_all<'a, I: IntoIterator<Item = &'a Weight>>(values: I) -> Weight {
    values
        .into_iter()
        .fold(Weight::zero(), |acc, x| gcd(&acc, x))
}

/// Returns true if `divisor` divides `value`, i.e. if there is some integer `k` such that
/// `value = k * divisor`. Note that `0` only divides `0`.
pub fn divides(divisor: &Weight, value: &Weight) -> bool {
    if divisor.is_zero() {
        value.is_zero()
    } else {
        (value % divisor).is_zero()
    }
}

/// Computes the dot product of two vectors of weights, pairing up entries until the shorter
/// of the two is exhausted.
pub fn dot(left: &[Weight], right: &[Weight]) -> Weight {
    left.iter().zip(right).map(|(x, y)| x * y).sum()
}

/// Returns the unit vector of length `size` which is `scale` at position `index` and zero everywhere else.
pub fn unit(index: usize, size: usize, scale: Weight) -> Vec<Weight> {
    let mut out = vec![Weight::zero(); size];
    out[index] = scale;
    out
}

/// Computes the linear combination `sum_i coefficients[i] * rows[i]` of the given rows, which
/// all have length `width`.
pub fn combine(coefficients: &[Weight], rows: &[Vec<Weight>], width: usize) -> Vec<Weight> {
    let mut out = vec![Weight::zero(); width];
    for (c, row) in coefficients.iter().zip(rows) {
        if c.is_zero() {
            continue;
        }
        for (o, x) in out.iter_mut().zip(row) {
            *o += c * x;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(x: i64) -> Weight {
        Weight::from(x)
    }

    #[test]
    fn gcd_conventions() {
        assert_eq!(gcd(&w(12), &w(18)), w(6));
        assert_eq!(gcd(&w(-12), &w(18)), w(6));
        assert_eq!(gcd(&w(0), &w(-7)), w(7));
        assert_eq!(gcd(&w(0), &w(0)), w(0));
        assert_eq!(gcd_all(&vector([6, 10, 15])), w(1));
        assert_eq!(gcd_all(&vector([0, 0])), w(0));
        assert_eq!(gcd_all(&[]), w(0));
    }

    #[test]
    fn divisibility() {
        assert!(divides(&w(3), &w(9)));
        assert!(divides(&w(-3), &w(9)));
        assert!(!divides(&w(2), &w(9)));
        assert!(divides(&w(0), &w(0)));
        assert!(!divides(&w(0), &w(4)));
        assert!(divides(&w(5), &w(0)));
    }

    #[test]
    fn linear_combinations() {
        let rows = vec![vector([1, 0, 2]), vector([0, 3, 1])];
        assert_eq!(combine(&vector([2, -1]), &rows, 3), vector([2, -3, 3]));
        assert_eq!(unit(1, 3, w(4)), vector([0, 4, 0]));
        assert_eq!(dot(&vector([1, 2, 3]), &vector([4, 5, 6])), w(32));
    }

    #[test]
    fn weights_do_not_overflow() {
        // 4^70 is far beyond the range of any fixed width integer type
        let power = (0..70).fold(w(1), |acc, _| acc * 4);
        assert_eq!(power.clone() % 4, w(0));
        assert!(divides(&power, &(power.clone() * 3)));
        assert_eq!(gcd(&power, &(power.clone() * 6)), power);
    }
}
