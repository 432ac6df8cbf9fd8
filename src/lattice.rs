//! Exact integer linear algebra.
//!
//! Everything in here works with row vectors: a matrix is a slice of rows and a solution `x` of a
//! system with matrix `M` and right hand side `t` satisfies `x · M = t`, i.e. `t` is written as an
//! integer linear combination of the rows of `M`. The central tool is an echelon form obtained by
//! unimodular row operations (each step replaces two rows by an invertible integer combination of
//! them), which is a Hermite normal form once the entries above each pivot have been reduced.
//!
//! Entries are [`Weight`]s of arbitrary size, so intermediate values may grow but never overflow. Since
//! elimination on large matrices can take a while, the variants ending in `_until` take an optional
//! point in time after which they give up with [`LatticeError::Interrupted`].
use std::time::Instant;

use num_integer::Integer;
use num_traits::{One, Signed, Zero};
use thiserror::Error;

use crate::{math, Weight};

/// Errors that may occur during exact integer computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LatticeError {
    /// The computation did not finish before the given point in time.
    #[error("exact elimination was interrupted")]
    Interrupted,
    /// A vector does not have the expected number of entries.
    #[error("expected vector of length {expected}, got length {found}")]
    Dimension {
        /// The expected length.
        expected: usize,
        /// The length that was encountered.
        found: usize,
    },
}

/// Computes `(g, s, t)` such that `g = s * a + t * b` is the non-negative greatest common
/// divisor of `a` and `b`.
pub fn extended_gcd(a: &Weight, b: &Weight) -> (Weight, Weight, Weight) {
    let (mut old_r, mut r) = (a.clone(), b.clone());
    let (mut old_s, mut s) = (Weight::one(), Weight::zero());
    let (mut old_t, mut t) = (Weight::zero(), Weight::one());
    while !r.is_zero() {
        let q = &old_r / &r;
        let next_r = &old_r - &q * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &q * &s;
        old_s = std::mem::replace(&mut s, next_s);
        let next_t = &old_t - &q * &t;
        old_t = std::mem::replace(&mut t, next_t);
    }
    if old_r.is_negative() {
        (-old_r, -old_s, -old_t)
    } else {
        (old_r, old_s, old_t)
    }
}

fn combination(x: &Weight, u: &[Weight], y: &Weight, v: &[Weight]) -> Vec<Weight> {
    u.iter().zip(v).map(|(a, b)| x * a + y * b).collect()
}

/// Subtracts `f` times `v` from `u` in place.
fn subtract(u: &mut [Weight], f: &Weight, v: &[Weight]) {
    for (a, b) in u.iter_mut().zip(v) {
        *a -= f * b;
    }
}

fn negate(u: &mut [Weight]) {
    for a in u.iter_mut() {
        *a = -std::mem::take(a);
    }
}

fn first_nonzero(v: &[Weight]) -> Option<usize> {
    v.iter().position(|x| !x.is_zero())
}

fn check_width(rows: &[Vec<Weight>], width: usize) -> Result<(), LatticeError> {
    match rows.iter().find(|r| r.len() != width) {
        Some(row) => Err(LatticeError::Dimension {
            expected: width,
            found: row.len(),
        }),
        None => Ok(()),
    }
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), LatticeError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(LatticeError::Interrupted),
        _ => Ok(()),
    }
}

/// Eliminates column `col` of row `below` using row `pivot`, where `pivot[col]` may be zero. Afterwards
/// `pivot[col]` holds the greatest common divisor of the two old entries and `below[col]` is zero. The
/// same operation is applied to the companion rows, so that a transformation matrix can be tracked.
fn eliminate(
    rows: &mut [Vec<Weight>],
    companion: &mut [Vec<Weight>],
    pivot: usize,
    below: usize,
    col: usize,
) {
    let a = rows[pivot][col].clone();
    let b = rows[below][col].clone();
    if b.is_zero() {
        return;
    }
    if !a.is_zero() && b.is_multiple_of(&a) {
        let f = &b / &a;
        let (p, r) = (rows[pivot].clone(), &mut rows[below]);
        subtract(r, &f, &p);
        if !companion.is_empty() {
            let p = companion[pivot].clone();
            subtract(&mut companion[below], &f, &p);
        }
        return;
    }
    let (g, s, t) = extended_gcd(&a, &b);
    let (x, y) = (-(&b / &g), &a / &g);
    let new_pivot = combination(&s, &rows[pivot], &t, &rows[below]);
    let new_below = combination(&x, &rows[pivot], &y, &rows[below]);
    rows[pivot] = new_pivot;
    rows[below] = new_below;
    if !companion.is_empty() {
        let new_pivot = combination(&s, &companion[pivot], &t, &companion[below]);
        let new_below = combination(&x, &companion[pivot], &y, &companion[below]);
        companion[pivot] = new_pivot;
        companion[below] = new_below;
    }
}

/// The result of bringing a matrix into echelon form, see [`echelon`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echelon {
    /// The rows of the echelon form, the first `rank` rows are non-zero and the remaining ones vanish.
    pub rows: Vec<Vec<Weight>>,
    /// The unimodular transformation, `transform · M = rows`.
    pub transform: Vec<Vec<Weight>>,
    /// For each of the first `rank` rows, the column of its pivot. Pivots are strictly increasing.
    pub pivots: Vec<usize>,
}

impl Echelon {
    /// The rank of the original matrix.
    pub fn rank(&self) -> usize {
        self.pivots.len()
    }
}

/// Computes a Hermite normal form of the given matrix whose rows have length `width`, together with
/// the unimodular transformation matrix that produces it. Pivots are positive and the entries above
/// each pivot are reduced into the range `0..pivot`.
pub fn echelon(matrix: &[Vec<Weight>], width: usize) -> Result<Echelon, LatticeError> {
    echelon_until(matrix, width, None)
}

/// Like [`echelon`], but gives up with [`LatticeError::Interrupted`] once `deadline` has passed.
pub fn echelon_until(
    matrix: &[Vec<Weight>],
    width: usize,
    deadline: Option<Instant>,
) -> Result<Echelon, LatticeError> {
    check_width(matrix, width)?;
    let m = matrix.len();
    let mut rows = matrix.to_vec();
    let mut transform: Vec<Vec<Weight>> = (0..m).map(|i| math::unit(i, m, Weight::one())).collect();
    let mut pivots = vec![];

    for col in 0..width {
        let rank = pivots.len();
        if rank == m {
            break;
        }
        for below in (rank + 1)..m {
            check_deadline(deadline)?;
            eliminate(&mut rows, &mut transform, rank, below, col);
        }
        if rows[rank][col].is_zero() {
            continue;
        }
        if rows[rank][col].is_negative() {
            negate(&mut rows[rank]);
            negate(&mut transform[rank]);
        }
        let p = rows[rank][col].clone();
        let (pivot_row, pivot_transform) = (rows[rank].clone(), transform[rank].clone());
        for above in 0..rank {
            let f = rows[above][col].div_floor(&p);
            if !f.is_zero() {
                subtract(&mut rows[above], &f, &pivot_row);
                subtract(&mut transform[above], &f, &pivot_transform);
            }
        }
        pivots.push(col);
    }

    Ok(Echelon {
        rows,
        transform,
        pivots,
    })
}

/// Finds an integer vector `x` with `x · basis = target`, that is it writes `target` as an integer linear
/// combination of the rows of `basis`. Returns `Ok(None)` if no such combination exists. The returned vector
/// has one entry per row of `basis`.
///
/// # Example
/// ```
/// use wfa::{lattice::solve, math::vector};
/// let basis = vec![vector([2, 0]), vector([0, 3])];
/// assert_eq!(solve(&basis, &vector([4, -3])).unwrap(), Some(vector([2, -1])));
/// assert_eq!(solve(&basis, &vector([1, 1])).unwrap(), None);
/// ```
pub fn solve(basis: &[Vec<Weight>], target: &[Weight]) -> Result<Option<Vec<Weight>>, LatticeError> {
    solve_until(basis, target, None)
}

/// Like [`solve`], but gives up with [`LatticeError::Interrupted`] once `deadline` has passed.
pub fn solve_until(
    basis: &[Vec<Weight>],
    target: &[Weight],
    deadline: Option<Instant>,
) -> Result<Option<Vec<Weight>>, LatticeError> {
    let width = target.len();
    let ech = echelon_until(basis, width, deadline)?;
    let mut residual = target.to_vec();
    let mut y = vec![Weight::zero(); basis.len()];

    for (i, &col) in ech.pivots.iter().enumerate() {
        if first_nonzero(&residual).is_some_and(|lead| lead < col) {
            return Ok(None);
        }
        let p = &ech.rows[i][col];
        if !residual[col].is_multiple_of(p) {
            return Ok(None);
        }
        let f = &residual[col] / p;
        if !f.is_zero() {
            subtract(&mut residual, &f, &ech.rows[i]);
            y[i] = f;
        }
    }
    if first_nonzero(&residual).is_some() {
        return Ok(None);
    }

    check_deadline(deadline)?;
    Ok(Some(math::combine(&y, &ech.transform, basis.len())))
}

/// A finitely generated sublattice of `Z^dimension`, that is the set of all integer linear
/// combinations of some vectors. It is stored as an echelon basis which is updated
/// incrementally whenever a vector is inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lattice {
    dimension: usize,
    rows: Vec<Vec<Weight>>,
    pivots: Vec<usize>,
}

impl Lattice {
    /// Creates the trivial lattice `{0}` in `Z^dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            rows: vec![],
            pivots: vec![],
        }
    }

    /// Computes the lattice generated by the given vectors.
    pub fn generated_by<'a, I: IntoIterator<Item = &'a Vec<Weight>>>(
        dimension: usize,
        vectors: I,
    ) -> Result<Self, LatticeError> {
        Self::generated_until(dimension, vectors, None)
    }

    /// Like [`Lattice::generated_by`], but gives up with [`LatticeError::Interrupted`] once `deadline`
    /// has passed.
    pub fn generated_until<'a, I: IntoIterator<Item = &'a Vec<Weight>>>(
        dimension: usize,
        vectors: I,
        deadline: Option<Instant>,
    ) -> Result<Self, LatticeError> {
        let mut lattice = Self::new(dimension);
        for v in vectors {
            check_deadline(deadline)?;
            lattice.insert(v)?;
        }
        Ok(lattice)
    }

    /// The dimension of the ambient space.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The rank of the lattice, i.e. the size of any of its bases.
    pub fn rank(&self) -> usize {
        self.rows.len()
    }

    /// Gives a basis of the lattice in echelon form.
    pub fn basis(&self) -> &[Vec<Weight>] {
        &self.rows
    }

    fn check(&self, v: &[Weight]) -> Result<(), LatticeError> {
        if v.len() != self.dimension {
            return Err(LatticeError::Dimension {
                expected: self.dimension,
                found: v.len(),
            });
        }
        Ok(())
    }

    /// Decides whether `v` is an integer linear combination of the basis vectors.
    pub fn contains(&self, v: &[Weight]) -> Result<bool, LatticeError> {
        self.check(v)?;
        let mut residual = v.to_vec();
        for (row, &pivot) in self.rows.iter().zip(&self.pivots) {
            let Some(lead) = first_nonzero(&residual) else {
                return Ok(true);
            };
            if lead < pivot {
                return Ok(false);
            }
            if lead > pivot {
                continue;
            }
            if !residual[pivot].is_multiple_of(&row[pivot]) {
                return Ok(false);
            }
            let f = &residual[pivot] / &row[pivot];
            subtract(&mut residual, &f, row);
        }
        Ok(first_nonzero(&residual).is_none())
    }

    /// Inserts `v` into the lattice, returns `true` if the lattice grew and `false` if `v` was
    /// already contained in it.
    pub fn insert(&mut self, v: &[Weight]) -> Result<bool, LatticeError> {
        self.check(v)?;
        let mut v = v.to_vec();
        let mut changed = false;
        let mut i = 0;
        loop {
            let Some(lead) = first_nonzero(&v) else {
                return Ok(changed);
            };
            while i < self.pivots.len() && self.pivots[i] < lead {
                i += 1;
            }
            if i == self.pivots.len() || self.pivots[i] > lead {
                if v[lead].is_negative() {
                    negate(&mut v);
                }
                self.rows.insert(i, v);
                self.pivots.insert(i, lead);
                return Ok(true);
            }
            let a = self.rows[i][lead].clone();
            let b = v[lead].clone();
            if b.is_multiple_of(&a) {
                subtract(&mut v, &(&b / &a), &self.rows[i]);
            } else {
                let (g, s, t) = extended_gcd(&a, &b);
                let row = combination(&s, &self.rows[i], &t, &v);
                v = combination(&-(&b / &g), &self.rows[i], &(&a / &g), &v);
                self.rows[i] = row;
                changed = true;
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::math::vector;

    fn w(x: i64) -> Weight {
        Weight::from(x)
    }

    #[test]
    fn extended_gcd_is_bezout() {
        for (a, b) in [(12, 18), (-4, 6), (0, 5), (7, 0), (-3, -9), (17, 5)] {
            let (a, b) = (w(a), w(b));
            let (g, s, t) = extended_gcd(&a, &b);
            assert_eq!(g, math::gcd(&a, &b));
            assert_eq!(s * &a + t * &b, g);
        }
    }

    #[test]
    fn echelon_transform_is_consistent() {
        let m = vec![vector([2, 4, 4]), vector([-6, 6, 12]), vector([10, -4, -16])];
        let ech = echelon(&m, 3).unwrap();
        for (i, row) in ech.rows.iter().enumerate() {
            assert_eq!(&math::combine(&ech.transform[i], &m, 3), row);
        }
        assert_eq!(ech.rank(), 3);
        for (i, &p) in ech.pivots.iter().enumerate() {
            assert!(ech.rows[i][p].is_positive());
            assert!(ech.rows[i][..p].iter().all(Zero::is_zero));
        }
    }

    #[test]
    fn solve_refutes_non_integral_combination() {
        let basis = vec![vector([2, 0]), vector([0, 3])];
        assert_eq!(solve(&basis, &vector([1, 1])).unwrap(), None);
        assert_eq!(solve(&basis, &vector([2, 3])).unwrap(), Some(vector([1, 1])));
        // rationally this is half of the first row, which is not good enough
        assert_eq!(solve(&basis, &vector([1, 0])).unwrap(), None);
    }

    #[test]
    fn solve_with_dependent_rows() {
        let basis = vec![vector([2, 4]), vector([3, 6]), vector([0, 0])];
        let target = vector([1, 2]);
        let x = solve(&basis, &target).unwrap().unwrap();
        assert_eq!(x.len(), 3);
        assert_eq!(math::combine(&x, &basis, 2), target);
        assert_eq!(solve(&basis, &vector([1, 3])).unwrap(), None);
    }

    #[test]
    fn solve_edge_cases() {
        assert_eq!(solve(&[], &vector([0, 0])).unwrap(), Some(vec![]));
        assert_eq!(solve(&[], &vector([1])).unwrap(), None);
        assert_eq!(solve(&[vector([5])], &vector([0])).unwrap(), Some(vector([0])));
        assert_eq!(
            solve(&[vector([1, 2])], &vector([1])),
            Err(LatticeError::Dimension {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn large_entries_are_exact() {
        // entries around 4^70 overflow every fixed width integer type
        let big = (0..70).fold(w(1), |acc, _| acc * 4);
        let basis = vec![
            vec![big.clone(), w(1)],
            vec![big.clone() * 3 + 1, w(2)],
        ];
        let target = vec![big.clone() * 5 + 1, w(4)];
        let x = solve(&basis, &target).unwrap().unwrap();
        assert_eq!(math::combine(&x, &basis, 2), target);
        let lattice = Lattice::generated_by(2, &basis).unwrap();
        let other = [big + 1, w(0)];
        assert_eq!(
            solve(&basis, &other).unwrap().is_some(),
            lattice.contains(&other).unwrap()
        );
    }

    #[test]
    fn passed_deadlines_interrupt_elimination() {
        let basis = vec![vector([2, 4]), vector([3, 6])];
        let passed = Some(Instant::now());
        assert_eq!(
            solve_until(&basis, &vector([1, 2]), passed),
            Err(LatticeError::Interrupted)
        );
        assert_eq!(
            Lattice::generated_until(2, &basis, passed),
            Err(LatticeError::Interrupted)
        );
        let later = Some(Instant::now() + Duration::from_secs(3600));
        assert!(solve_until(&basis, &vector([1, 2]), later).unwrap().is_some());
    }

    #[test]
    fn lattice_membership() {
        let mut lattice = Lattice::new(2);
        assert!(lattice.contains(&vector([0, 0])).unwrap());
        assert!(lattice.insert(&vector([2, 0])).unwrap());
        assert!(lattice.insert(&vector([3, 0])).unwrap());
        // 2 and 3 generate 1
        assert_eq!(lattice.basis(), &[vector([1, 0])]);
        assert!(!lattice.insert(&vector([5, 0])).unwrap());
        assert!(!lattice.contains(&vector([0, 1])).unwrap());
        assert!(lattice.insert(&vector([4, 6])).unwrap());
        assert!(lattice.contains(&vector([1, 12])).unwrap());
        assert!(!lattice.contains(&vector([1, 3])).unwrap());
        assert_eq!(lattice.rank(), 2);
    }

    #[cfg(feature = "random")]
    #[test]
    fn lattice_matches_solver() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..50 {
            let rows: Vec<Vec<Weight>> = (0..3)
                .map(|_| (0..3).map(|_| w(rng.i64(-4..=4))).collect())
                .collect();
            let lattice = Lattice::generated_by(3, &rows).unwrap();
            for _ in 0..10 {
                let v: Vec<Weight> = (0..3).map(|_| w(rng.i64(-6..=6))).collect();
                assert_eq!(
                    lattice.contains(&v).unwrap(),
                    solve(&rows, &v).unwrap().is_some(),
                    "disagreement for {v:?} and {rows:?}"
                );
            }
        }
    }
}
