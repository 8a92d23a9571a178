//! Index resolution - numpy-style indexing over row-major flat positions
//!
//! An index expression is resolved against a shape into the result shape and
//! the flat positions it selects. Two strategies are provided:
//! - [`resolve_materialized`]: gathers from a materialized position grid; handles everything
//! - [`resolve_analytic`]: Cartesian product of per-axis positions; no fancy indices
//!
//! [`resolve`] picks between them.

use std::ops::{Range, RangeFull};
use crate::{Error, Result};

/// Arrays at or below this size are always resolved through the materialized grid
pub const DEFAULT_INDEXING_THRESHOLD: usize = 1000;

/// One component of an index expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index {
    /// A single position; negative values count from the end
    Int(i64),
    /// Python slice semantics
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
    /// An integer index array ("fancy" indexing)
    Fancy { shape: Vec<usize>, values: Vec<i64> },
    /// A boolean mask over one axis; selects the true positions
    Mask(Vec<bool>),
    /// Insert a length-1 axis
    NewAxis,
    /// Full slices for all remaining axes
    Ellipsis,
}

impl Index {
    /// The `:` slice
    pub fn full() -> Self {
        Index::Slice { start: None, stop: None, step: None }
    }

    pub fn slice(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Index::Slice { start, stop, step }
    }

    /// A one-dimensional fancy index
    pub fn list(values: impl IntoIterator<Item = i64>) -> Self {
        let values: Vec<i64> = values.into_iter().collect();
        Index::Fancy { shape: vec![values.len()], values }
    }

    pub fn is_fancy(&self) -> bool {
        matches!(self, Index::Fancy { .. } | Index::Mask(_))
    }

    fn consumes_axis(&self) -> bool {
        !matches!(self, Index::NewAxis | Index::Ellipsis)
    }
}

impl From<i64> for Index {
    fn from(i: i64) -> Self {
        Index::Int(i)
    }
}

impl From<Range<i64>> for Index {
    fn from(r: Range<i64>) -> Self {
        Index::slice(Some(r.start), Some(r.end), None)
    }
}

impl From<RangeFull> for Index {
    fn from(_: RangeFull) -> Self {
        Index::full()
    }
}

impl From<Vec<i64>> for Index {
    fn from(values: Vec<i64>) -> Self {
        Index::list(values)
    }
}

impl From<Vec<bool>> for Index {
    fn from(mask: Vec<bool>) -> Self {
        Index::Mask(mask)
    }
}

/// Result of resolving an index expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub shape: Vec<usize>,
    pub flat: Vec<usize>,
}

/// Index component with axes assigned and positions normalized
#[derive(Debug, Clone)]
enum Component {
    Int(usize),
    Range(Vec<usize>),
    Fancy { shape: Vec<usize>, values: Vec<usize> },
    NewAxis,
}

/// Number of elements of a shape
pub fn size_of(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Row-major strides of a shape, in elements
pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Multi-index of a flat position
pub fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; shape.len()];
    for axis in (0..shape.len()).rev() {
        let dim = shape[axis].max(1);
        coords[axis] = flat % dim;
        flat /= dim;
    }
    coords
}

/// Flat position of a multi-index
pub fn ravel(coords: &[usize], shape: &[usize]) -> usize {
    coords.iter().zip(strides(shape)).map(|(c, s)| c * s).sum()
}

/// Broadcast two shapes together, aligning trailing dimensions
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut out = vec![0; ndim];
    for i in 0..ndim {
        let da = if i < ndim - a.len() { 1 } else { a[i - (ndim - a.len())] };
        let db = if i < ndim - b.len() { 1 } else { b[i - (ndim - b.len())] };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(out)
}

/// Wrap a possibly negative position against an axis length
pub fn wrap_index(index: i64, len: usize, axis: usize) -> Result<usize> {
    let n = len as i64;
    let wrapped = if index < 0 { index + n } else { index };
    if wrapped < 0 || wrapped >= n {
        return Err(Error::Index(format!(
            "index {} is out of bounds for axis {} with size {}",
            index, axis, len
        )));
    }
    Ok(wrapped as usize)
}

/// Positions selected by a Python slice over a sequence of `len` elements
pub fn slice_positions(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Error::Index("slice step cannot be zero".to_string()));
    }

    let n = len as i64;
    let (lower, upper) = if step > 0 { (0, n) } else { (-1, n - 1) };
    let clamp = |bound: i64| {
        if bound < 0 {
            (bound + n).max(lower)
        } else {
            bound.min(upper)
        }
    };
    let start = start.map_or(if step > 0 { lower } else { upper }, clamp);
    let stop = stop.map_or(if step > 0 { upper } else { lower }, clamp);

    // both bounds lie in -1..=len, so the span and every k * step fit
    let span = if step > 0 { stop - start } else { start - stop };
    if span <= 0 {
        return Ok(Vec::new());
    }
    let count = (span as u64 - 1) / step.unsigned_abs() + 1;
    Ok((0..count as i64).map(|k| (start + k * step) as usize).collect())
}

/// Expand ellipses, assign axes, wrap negatives and validate bounds
fn normalize(shape: &[usize], index: &[Index]) -> Result<Vec<Component>> {
    let ellipses = index.iter().filter(|i| matches!(i, Index::Ellipsis)).count();
    if ellipses > 1 {
        return Err(Error::Index("an index can only have a single ellipsis".to_string()));
    }

    let consumed = index.iter().filter(|i| i.consumes_axis()).count();
    if consumed > shape.len() {
        return Err(Error::Index(format!(
            "too many indices for array: array is {}-dimensional, but {} were indexed",
            shape.len(),
            consumed
        )));
    }
    let fill = shape.len() - consumed;

    let mut components = Vec::with_capacity(shape.len() + index.len());
    let mut axis = 0;
    for idx in index {
        match idx {
            Index::Ellipsis => {
                for _ in 0..fill {
                    components.push(Component::Range((0..shape[axis]).collect()));
                    axis += 1;
                }
            }
            Index::NewAxis => components.push(Component::NewAxis),
            Index::Int(i) => {
                components.push(Component::Int(wrap_index(*i, shape[axis], axis)?));
                axis += 1;
            }
            Index::Slice { start, stop, step } => {
                components.push(Component::Range(slice_positions(shape[axis], *start, *stop, *step)?));
                axis += 1;
            }
            Index::Fancy { shape: fancy_shape, values } => {
                if size_of(fancy_shape) != values.len() {
                    return Err(Error::Index(format!(
                        "index array of shape {:?} holds {} values",
                        fancy_shape,
                        values.len()
                    )));
                }
                let values = values
                    .iter()
                    .map(|&v| wrap_index(v, shape[axis], axis))
                    .collect::<Result<Vec<_>>>()?;
                components.push(Component::Fancy { shape: fancy_shape.clone(), values });
                axis += 1;
            }
            Index::Mask(mask) => {
                if mask.len() != shape[axis] {
                    return Err(Error::Index(format!(
                        "boolean index did not match indexed array along axis {}; size of axis is {} but size of corresponding boolean axis is {}",
                        axis,
                        shape[axis],
                        mask.len()
                    )));
                }
                let values: Vec<usize> = mask
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &keep)| keep.then_some(i))
                    .collect();
                components.push(Component::Fancy { shape: vec![values.len()], values });
                axis += 1;
            }
        }
    }

    if ellipses == 0 {
        while axis < shape.len() {
            components.push(Component::Range((0..shape[axis]).collect()));
            axis += 1;
        }
    }
    Ok(components)
}

/// Output dimension of a gather: one basic component or the broadcast fancy block
#[derive(Debug, Clone, Copy)]
enum OutDim {
    Basic(usize),
    Broadcast,
}

/// Resolve by materializing the position grid and gathering from it.
///
/// Integers among fancy indices act as 0-d index arrays. The broadcast
/// dimensions of the fancy indices replace the first of them when they are
/// all adjacent and go first otherwise.
pub fn resolve_materialized(shape: &[usize], index: &[Index]) -> Result<Resolved> {
    let mut components = normalize(shape, index)?;
    let grid: Vec<usize> = (0..size_of(shape)).collect();

    let has_fancy = components.iter().any(|c| matches!(c, Component::Fancy { .. }));
    if has_fancy {
        for component in components.iter_mut() {
            if let Component::Int(i) = *component {
                *component = Component::Fancy { shape: Vec::new(), values: vec![i] };
            }
        }
    }

    let fancy_at: Vec<usize> = components
        .iter()
        .enumerate()
        .filter_map(|(ci, c)| matches!(c, Component::Fancy { .. }).then_some(ci))
        .collect();

    let mut fancy_shape: Vec<usize> = Vec::new();
    for component in &components {
        if let Component::Fancy { shape: s, .. } = component {
            fancy_shape = broadcast_shapes(&fancy_shape, s).ok_or_else(|| {
                Error::Index(format!(
                    "shape mismatch: indexing arrays could not be broadcast together ({:?} and {:?})",
                    fancy_shape, s
                ))
            })?;
        }
    }

    let adjacent = fancy_at.windows(2).all(|w| w[1] == w[0] + 1);
    let mut layout = Vec::new();
    if has_fancy && !adjacent {
        layout.push(OutDim::Broadcast);
    }
    for (ci, component) in components.iter().enumerate() {
        match component {
            Component::Range(_) | Component::NewAxis => layout.push(OutDim::Basic(ci)),
            Component::Fancy { .. } if adjacent && fancy_at.first() == Some(&ci) => {
                layout.push(OutDim::Broadcast)
            }
            _ => {}
        }
    }

    let mut out_shape = Vec::new();
    for dim in &layout {
        match dim {
            OutDim::Basic(ci) => match &components[*ci] {
                Component::Range(p) => out_shape.push(p.len()),
                _ => out_shape.push(1),
            },
            OutDim::Broadcast => out_shape.extend(&fancy_shape),
        }
    }

    let total = size_of(&out_shape);
    let mut flat = Vec::with_capacity(total);
    let mut basic_coord = vec![0usize; components.len()];
    for out in 0..total {
        let coords = unravel(out, &out_shape);
        let mut cursor = 0;
        let mut broadcast_coords: &[usize] = &[];
        for dim in &layout {
            match dim {
                OutDim::Basic(ci) => {
                    basic_coord[*ci] = coords[cursor];
                    cursor += 1;
                }
                OutDim::Broadcast => {
                    broadcast_coords = &coords[cursor..cursor + fancy_shape.len()];
                    cursor += fancy_shape.len();
                }
            }
        }

        let mut source = Vec::with_capacity(shape.len());
        for (ci, component) in components.iter().enumerate() {
            match component {
                Component::Int(i) => source.push(*i),
                Component::Range(p) => source.push(p[basic_coord[ci]]),
                Component::Fancy { shape: s, values } => {
                    source.push(values[broadcast_position(broadcast_coords, s)])
                }
                Component::NewAxis => {}
            }
        }
        flat.push(grid[ravel(&source, shape)]);
    }

    Ok(Resolved { shape: out_shape, flat })
}

/// Position inside an index array of `shape` for coordinates in the broadcast block
fn broadcast_position(coords: &[usize], shape: &[usize]) -> usize {
    let offset = coords.len() - shape.len();
    shape
        .iter()
        .zip(strides(shape))
        .enumerate()
        .map(|(i, (&dim, stride))| if dim == 1 { 0 } else { coords[offset + i] * stride })
        .sum()
}

/// Resolve without materializing: combine per-axis positions by Cartesian product.
///
/// Fails with [`Error::Index`] when a fancy index is present.
pub fn resolve_analytic(shape: &[usize], index: &[Index]) -> Result<Resolved> {
    if index.iter().any(Index::is_fancy) {
        return Err(Error::Index(
            "analytic resolution does not support fancy indices".to_string(),
        ));
    }

    let components = normalize(shape, index)?;
    let strides = strides(shape);
    let mut flat = vec![0usize];
    let mut out_shape = Vec::new();
    let mut axis = 0;

    for component in components {
        match component {
            Component::NewAxis => out_shape.push(1),
            Component::Int(i) => {
                let offset = i * strides[axis];
                for f in flat.iter_mut() {
                    *f += offset;
                }
                axis += 1;
            }
            Component::Range(positions) => {
                let stride = strides[axis];
                out_shape.push(positions.len());
                flat = flat
                    .iter()
                    .flat_map(|&f| positions.iter().map(move |&p| f + p * stride))
                    .collect();
                axis += 1;
            }
            Component::Fancy { .. } => {
                return Err(Error::Index(
                    "analytic resolution does not support fancy indices".to_string(),
                ));
            }
        }
    }

    Ok(Resolved { shape: out_shape, flat })
}

/// Resolve an index expression, choosing the strategy by array size
pub fn resolve(shape: &[usize], index: &[Index], threshold: usize) -> Result<Resolved> {
    let size = size_of(shape);
    if index.iter().any(Index::is_fancy) || size <= threshold {
        tracing::trace!(size, "resolving index through the position grid");
        resolve_materialized(shape, index)
    } else {
        tracing::trace!(size, "resolving index analytically");
        resolve_analytic(shape, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn both(shape: &[usize], index: &[Index]) -> Resolved {
        let a = resolve_materialized(shape, index).unwrap();
        let b = resolve_analytic(shape, index).unwrap();
        assert_eq!(a, b);
        a
    }

    #[test]
    fn test_slice_positions() {
        assert_eq!(slice_positions(5, None, None, None).unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(slice_positions(5, Some(1), Some(-1), None).unwrap(), vec![1, 2, 3]);
        assert_eq!(slice_positions(5, None, None, Some(-2)).unwrap(), vec![4, 2, 0]);
        assert_eq!(slice_positions(5, Some(10), None, Some(-1)).unwrap(), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_positions(5, Some(-10), Some(2), None).unwrap(), vec![0, 1]);
        assert!(slice_positions(5, Some(3), Some(1), None).unwrap().is_empty());
        assert!(slice_positions(5, None, None, Some(0)).is_err());
        assert_eq!(slice_positions(5, Some(1), None, Some(i64::MAX)).unwrap(), vec![1]);
        assert_eq!(slice_positions(5, None, None, Some(i64::MIN)).unwrap(), vec![4]);
        assert_eq!(slice_positions(5, Some(i64::MIN), Some(i64::MAX), Some(3)).unwrap(), vec![0, 3]);
    }

    #[test]
    fn test_int_and_slice() {
        let r = both(&[2, 3], &[Index::Int(0), Index::Int(1)]);
        assert_eq!(r, Resolved { shape: vec![], flat: vec![1] });

        let r = both(&[2, 3], &[Index::Int(-1)]);
        assert_eq!(r, Resolved { shape: vec![3], flat: vec![3, 4, 5] });

        let r = both(&[2, 3], &[Index::full(), Index::slice(None, None, Some(-2))]);
        assert_eq!(r, Resolved { shape: vec![2, 2], flat: vec![2, 0, 5, 3] });
    }

    #[test]
    fn test_newaxis_and_ellipsis() {
        let r = both(&[2, 3], &[Index::NewAxis, Index::Ellipsis, Index::Int(2)]);
        assert_eq!(r, Resolved { shape: vec![1, 2], flat: vec![2, 5] });

        let r = both(&[2, 3, 4], &[Index::Ellipsis, Index::Int(0)]);
        assert_eq!(r.shape, vec![2, 3]);
        assert_eq!(r.flat, vec![0, 4, 8, 12, 16, 20]);
    }

    #[test]
    fn test_out_of_bounds() {
        assert!(matches!(resolve_materialized(&[3], &[Index::Int(3)]), Err(Error::Index(_))));
        assert!(matches!(resolve_analytic(&[3], &[Index::Int(-4)]), Err(Error::Index(_))));
        assert!(matches!(
            resolve_materialized(&[3], &[Index::Int(0), Index::Int(0)]),
            Err(Error::Index(_))
        ));
        assert!(matches!(
            resolve_materialized(&[3], &[Index::Ellipsis, Index::Ellipsis]),
            Err(Error::Index(_))
        ));
    }

    #[test]
    fn test_fancy_single_axis() {
        let r = resolve_materialized(&[2, 3], &[Index::full(), Index::list([2, 0, -1])]).unwrap();
        assert_eq!(r, Resolved { shape: vec![2, 3], flat: vec![2, 0, 2, 5, 3, 5] });
    }

    #[test]
    fn test_fancy_broadcast_adjacent() {
        let rows = Index::Fancy { shape: vec![2, 1], values: vec![0, 1] };
        let cols = Index::list([0, 2]);
        let r = resolve_materialized(&[2, 3], &[rows, cols]).unwrap();
        assert_eq!(r, Resolved { shape: vec![2, 2], flat: vec![0, 2, 3, 5] });
    }

    #[test]
    fn test_fancy_non_adjacent_goes_first() {
        // a[[0, 1], :, [0, 1]] on a (2, 3, 2) array has shape (2, 3)
        let r = resolve_materialized(
            &[2, 3, 2],
            &[Index::list([0, 1]), Index::full(), Index::list([0, 1])],
        )
        .unwrap();
        assert_eq!(r.shape, vec![2, 3]);
        assert_eq!(r.flat, vec![0, 2, 4, 7, 9, 11]);

        // an integer between fancy indices counts as one of them
        let r = resolve_materialized(&[2, 3, 2], &[Index::Int(1), Index::full(), Index::list([1])]).unwrap();
        assert_eq!(r.shape, vec![1, 3]);
        assert_eq!(r.flat, vec![7, 9, 11]);
    }

    #[test]
    fn test_mask() {
        let r = resolve_materialized(&[4], &[Index::Mask(vec![true, false, false, true])]).unwrap();
        assert_eq!(r, Resolved { shape: vec![2], flat: vec![0, 3] });
        assert!(resolve_materialized(&[4], &[Index::Mask(vec![true])]).is_err());
    }

    #[test]
    fn test_analytic_rejects_fancy() {
        assert!(resolve_analytic(&[3], &[Index::list([0])]).is_err());
    }

    #[test]
    fn test_resolve_picks_strategy() {
        let shape = [40, 40];
        let index = [Index::slice(Some(1), None, Some(7)), Index::Int(-3)];
        let chosen = resolve(&shape, &index, 100).unwrap();
        assert_eq!(chosen, resolve_materialized(&shape, &index).unwrap());

        let fancy = [Index::list([0, 39])];
        assert_eq!(resolve(&shape, &fancy, 100).unwrap().shape, vec![2, 40]);
    }

    #[test]
    fn test_zero_dim() {
        let r = both(&[], &[]);
        assert_eq!(r, Resolved { shape: vec![], flat: vec![0] });
    }

    #[test]
    fn test_broadcast_shapes() {
        assert_eq!(broadcast_shapes(&[2, 1], &[3]), Some(vec![2, 3]));
        assert_eq!(broadcast_shapes(&[], &[4]), Some(vec![4]));
        assert_eq!(broadcast_shapes(&[2], &[3]), None);
    }
}
