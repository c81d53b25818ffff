use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Inclusive (min, max) window a dynamic dimension may take at runtime.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct DimBounds {
    pub min: u64,
    pub max: u64,
}

impl DimBounds {
    pub const UNBOUNDED: DimBounds = DimBounds {
        min: 0,
        max: i64::MAX as u64,
    };

    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Applies a monotonically non-decreasing function to both ends.
    pub fn map(&self, f: impl Fn(u64) -> u64) -> DimBounds {
        let max = if self.max == Self::UNBOUNDED.max {
            self.max
        } else {
            f(self.max)
        };
        DimBounds { min: f(self.min), max }
    }
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Dimension {
    Known(u64),
    Dynamic(DimBounds),
}

impl Dimension {
    pub fn known(&self) -> Option<u64> {
        match self {
            Dimension::Known(x) => Some(*x),
            Dimension::Dynamic(_) => None,
        }
    }

    pub fn bounds(&self) -> DimBounds {
        match self {
            Dimension::Known(x) => DimBounds::new(*x, *x),
            Dimension::Dynamic(b) => *b,
        }
    }

    pub fn map_bounds(&self, f: impl Fn(u64) -> u64) -> Dimension {
        match self {
            Dimension::Known(x) => Dimension::Known(f(*x)),
            Dimension::Dynamic(b) => Dimension::Dynamic(b.map(f)),
        }
    }

    /// Returns `Some(true)`/`Some(false)` only when the answer is decidable at trace time.
    pub fn try_test_eq(&self, other: &Dimension) -> Option<bool> {
        match (self, other) {
            (Dimension::Known(x), Dimension::Known(y)) => Some(x == y),
            _ => None,
        }
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::Known(x) => write!(f, "{x}"),
            Dimension::Dynamic(_) => write!(f, "?"),
        }
    }
}

impl From<u64> for Dimension {
    fn from(value: u64) -> Self {
        Dimension::Known(value)
    }
}

pub fn format_shape(shape: &[Dimension]) -> String {
    let dims = shape.iter().map(|d| d.to_string()).collect::<Vec<_>>();
    format!("({})", dims.join(", "))
}

pub fn static_shape(dims: &[u64]) -> Vec<Dimension> {
    dims.iter().map(|x| Dimension::Known(*x)).collect()
}

/// Right-aligned broadcasting of two shapes.
///
/// Unknown dimensions are treated optimistically: a dynamic dimension paired with a
/// known non-unit dimension resolves to the known one, since that is the only way the
/// program can be valid at runtime.
pub fn broadcast_shapes(a: &[Dimension], b: &[Dimension]) -> Result<Vec<Dimension>, String> {
    let rank = a.len().max(b.len());
    let mut out = Vec::with_capacity(rank);
    for i in 0..rank {
        let da = (i + a.len()).checked_sub(rank).map(|x| a[x]);
        let db = (i + b.len()).checked_sub(rank).map(|x| b[x]);
        let dim = match (da, db) {
            (None, Some(x)) | (Some(x), None) => x,
            (Some(x), Some(y)) => broadcast_dim(x, y).ok_or_else(|| {
                format!(
                    "cannot broadcast dimension {i}: {} vs {}",
                    format_shape(a),
                    format_shape(b)
                )
            })?,
            (None, None) => unreachable!(),
        };
        out.push(dim);
    }
    Ok(out)
}

fn broadcast_dim(a: Dimension, b: Dimension) -> Option<Dimension> {
    match (a, b) {
        (Dimension::Known(1), x) | (x, Dimension::Known(1)) => Some(x),
        (Dimension::Known(x), Dimension::Known(y)) => (x == y).then_some(Dimension::Known(x)),
        (Dimension::Known(x), Dimension::Dynamic(_)) | (Dimension::Dynamic(_), Dimension::Known(x)) => {
            Some(Dimension::Known(x))
        }
        (Dimension::Dynamic(x), Dimension::Dynamic(y)) => Some(Dimension::Dynamic(DimBounds::new(
            x.min.max(y.min),
            x.max.max(y.max),
        ))),
    }
}

/// Resolves a possibly negative dimension index against `rank`.
pub fn normalize_dim(dim: i64, rank: usize) -> Option<usize> {
    let rank = rank as i64;
    let d = if dim < 0 { dim + rank } else { dim };
    (0..rank).contains(&d).then_some(d as usize)
}

/// How an operation derives its output rank from its input ranks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InferRankPolicy {
    /// Output rank equals the rank of input `index`.
    SameAsInput(usize),
    /// All inputs must agree on rank; the output takes it.
    SameAsInputs,
    /// Output rank is the largest input rank (broadcasting).
    MaxOfInputs,
    Fixed(usize),
    /// Output rank is the rank of input 0 less `count` removed dimensions.
    InputMinus(usize),
    /// Output rank is the rank of input 0 plus `count` inserted dimensions.
    InputPlus(usize),
}

impl InferRankPolicy {
    pub fn apply(&self, input_ranks: &[usize]) -> Result<usize, String> {
        let first = || {
            input_ranks
                .first()
                .copied()
                .ok_or_else(|| "operation has no inputs".to_string())
        };
        match *self {
            InferRankPolicy::SameAsInput(index) => input_ranks
                .get(index)
                .copied()
                .ok_or_else(|| format!("no input at index {index}")),
            InferRankPolicy::SameAsInputs => {
                let rank = first()?;
                if let Some(other) = input_ranks.iter().find(|r| **r != rank) {
                    return Err(format!(
                        "expected all inputs to have rank {rank}, found rank {other}"
                    ));
                }
                Ok(rank)
            }
            InferRankPolicy::MaxOfInputs => input_ranks
                .iter()
                .copied()
                .max()
                .ok_or_else(|| "operation has no inputs".to_string()),
            InferRankPolicy::Fixed(rank) => Ok(rank),
            InferRankPolicy::InputMinus(count) => {
                let rank = first()?;
                rank.checked_sub(count).ok_or_else(|| {
                    format!("cannot remove {count} dimensions from a rank {rank} input")
                })
            }
            InferRankPolicy::InputPlus(count) => Ok(first()? + count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_unit_and_rank_extension() {
        let a = static_shape(&[2, 1, 3]);
        let b = static_shape(&[4, 1]);
        let out = broadcast_shapes(&a, &b).unwrap();
        assert_eq!(out, static_shape(&[2, 4, 3]));
    }

    #[test]
    fn test_broadcast_incompatible() {
        assert!(broadcast_shapes(&static_shape(&[2]), &static_shape(&[3])).is_err());
    }

    #[test]
    fn test_broadcast_dynamic_merges_bounds() {
        let a = vec![Dimension::Dynamic(DimBounds::new(1, 4))];
        let b = vec![Dimension::Dynamic(DimBounds::new(2, 8))];
        let out = broadcast_shapes(&a, &b).unwrap();
        assert_eq!(out, vec![Dimension::Dynamic(DimBounds::new(2, 8))]);
    }

    #[test]
    fn test_rank_policies() {
        assert_eq!(InferRankPolicy::SameAsInput(1).apply(&[1, 3]), Ok(3));
        assert_eq!(InferRankPolicy::MaxOfInputs.apply(&[1, 3, 2]), Ok(3));
        assert_eq!(InferRankPolicy::InputMinus(2).apply(&[3]), Ok(1));
        assert!(InferRankPolicy::InputMinus(4).apply(&[3]).is_err());
        assert!(InferRankPolicy::SameAsInputs.apply(&[2, 3]).is_err());
        assert_eq!(InferRankPolicy::SameAsInput(0).apply(&[0]), Ok(0));
    }

    #[test]
    fn test_normalize_dim() {
        assert_eq!(normalize_dim(-1, 3), Some(2));
        assert_eq!(normalize_dim(3, 3), None);
        assert_eq!(normalize_dim(-4, 3), None);
    }
}
