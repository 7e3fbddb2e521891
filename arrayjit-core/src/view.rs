//! A single `View`: shape + strides + offset + optional mask (§3.2).

use smallvec::SmallVec;

use crate::errors::ShapeError;

pub type Dims = SmallVec<[i64; 4]>;
pub type MaskBounds = SmallVec<[(i64, i64); 4]>;

/// A lazy reinterpretation of a backing buffer's linear index space.
///
/// `strides[d] == 0` marks dimension `d` as broadcast. `mask`, when present,
/// gives a `[begin, end)` validity range per dimension; coordinates outside
/// it read as the dtype's zero (§3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub shape: Dims,
    pub strides: Dims,
    pub offset: i64,
    pub mask: Option<MaskBounds>,
}

impl View {
    /// A contiguous row-major view over `shape`, offset zero, no mask.
    ///
    /// Dimensions of size 1 canonicalize to stride 0, per the invariant in
    /// §3.2.
    pub fn contiguous(shape: &[i64]) -> View {
        let mut strides = vec![0i64; shape.len()];
        let mut acc = 1i64;
        for d in (0..shape.len()).rev() {
            strides[d] = if shape[d] == 1 { 0 } else { acc };
            acc *= shape[d].max(1);
        }
        View { shape: shape.into(), strides: strides.into(), offset: 0, mask: None }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> i64 {
        self.shape.iter().product()
    }

    /// Whether this is exactly `contiguous(shape)` — the per-view half of
    /// `ShapeTracker::is_contiguous` (§8 "Contiguity is decidable").
    pub fn is_default_contiguous(&self) -> bool {
        self.offset == 0 && self.mask.is_none() && *self == View::contiguous(&self.shape)
    }

    fn check_rank(&self, got: usize) -> Result<(), ShapeError> {
        if got != self.rank() {
            return Err(ShapeError::RankMismatch { expected: self.rank(), rank: self.rank(), found: got });
        }
        Ok(())
    }

    /// §3.2 `permute`/`transpose`: permutes shape and strides.
    pub fn permute(&self, axes: &[usize]) -> Result<View, ShapeError> {
        self.check_rank(axes.len())?;
        let rank = self.rank();
        for &a in axes {
            if a >= rank {
                return Err(ShapeError::AxisOutOfBounds { axis: a as i64, rank });
            }
        }
        let shape: Dims = axes.iter().map(|&a| self.shape[a]).collect();
        let strides: Dims = axes.iter().map(|&a| self.strides[a]).collect();
        let mask = self
            .mask
            .as_ref()
            .map(|m| axes.iter().map(|&a| m[a]).collect::<MaskBounds>());
        Ok(View { shape, strides, offset: self.offset, mask })
    }

    /// §3.2 `shrink`: increases offset, tightens mask.
    pub fn shrink(&self, bounds: &[(i64, i64)]) -> Result<View, ShapeError> {
        self.check_rank(bounds.len())?;
        let mut shape = Dims::new();
        let mut offset = self.offset;
        for (d, &(begin, end)) in bounds.iter().enumerate() {
            if begin < 0 || end > self.shape[d] || begin > end {
                return Err(ShapeError::InvalidBounds { begin, end, size: self.shape[d] });
            }
            shape.push(end - begin);
            offset += begin * self.strides[d];
        }
        let mask = self.mask.as_ref().map(|old| {
            bounds
                .iter()
                .enumerate()
                .map(|(d, &(begin, end))| {
                    let (ob, oe) = old[d];
                    let new_begin = (ob - begin).max(0);
                    let new_end = (oe - begin).min(end - begin);
                    (new_begin, new_end)
                })
                .collect::<MaskBounds>()
        });
        Ok(View { shape, strides: self.strides.clone(), offset, mask })
    }

    /// §3.2 `expand`: turns size-1 dimensions into broadcasts (stride 0).
    pub fn expand(&self, new_shape: &[i64]) -> Result<View, ShapeError> {
        self.check_rank(new_shape.len())?;
        let mut shape = Dims::new();
        let mut strides = Dims::new();
        for (d, &new_size) in new_shape.iter().enumerate() {
            let old_size = self.shape[d];
            if old_size == new_size {
                shape.push(new_size);
                strides.push(self.strides[d]);
            } else if old_size == 1 {
                shape.push(new_size);
                strides.push(0);
            } else {
                return Err(ShapeError::Broadcast {
                    lhs: self.shape.to_vec(),
                    rhs: new_shape.to_vec(),
                });
            }
        }
        // Broadcasting an already-masked dimension from size 1 makes the
        // mask meaningless for it (every broadcast index reads the same
        // single valid/invalid slot); keep the mask as-is, reindexed.
        let mask = self.mask.clone();
        Ok(View { shape, strides, offset: self.offset, mask })
    }

    /// §3.2 `pad`: enlarges shape, installs a mask that excludes the new
    /// region.
    pub fn pad(&self, bounds: &[(i64, i64)]) -> Result<View, ShapeError> {
        self.check_rank(bounds.len())?;
        let mut shape = Dims::new();
        let mut mask = MaskBounds::new();
        for (d, &(before, after)) in bounds.iter().enumerate() {
            if before < 0 || after < 0 {
                return Err(ShapeError::InvalidBounds {
                    begin: before,
                    end: after,
                    size: self.shape[d],
                });
            }
            let old_size = self.shape[d];
            shape.push(before + old_size + after);
            let (prev_begin, prev_end) = self.mask.as_ref().map(|m| m[d]).unwrap_or((0, old_size));
            mask.push((prev_begin + before, prev_end + before));
        }
        Ok(View { shape, strides: self.strides.clone(), offset: self.offset, mask: Some(mask) })
    }

    /// §3.2 `flip`: negates a stride and shifts the offset to the last
    /// element.
    pub fn flip(&self, axes: &[usize]) -> Result<View, ShapeError> {
        let rank = self.rank();
        for &a in axes {
            if a >= rank {
                return Err(ShapeError::AxisOutOfBounds { axis: a as i64, rank });
            }
        }
        let mut strides = self.strides.clone();
        let mut offset = self.offset;
        let mut mask = self.mask.clone();
        for &a in axes {
            let size = self.shape[a];
            offset += strides[a] * (size - 1);
            strides[a] = -strides[a];
            if let Some(m) = mask.as_mut() {
                let (begin, end) = m[a];
                m[a] = (size - end, size - begin);
            }
        }
        Ok(View { shape: self.shape.clone(), strides, offset, mask })
    }

    /// §3.2 `reshape`: fuses adjacent dimensions with compatible strides;
    /// returns `None` ("needs a new view") when the reshape cannot be
    /// represented as a stride rewrite of this single view.
    pub fn reshape(&self, new_shape: &[i64]) -> Option<View> {
        if self.shape.as_slice() == new_shape {
            return Some(self.clone());
        }
        if self.mask.is_some() {
            return None;
        }
        if self.is_default_contiguous() {
            return Some(View::contiguous(new_shape));
        }

        let groups = merge_contiguous_groups(&self.shape, &self.strides);
        if groups.len() == 1 && groups[0].0 == 1 {
            return if new_shape.iter().all(|&d| d == 1) {
                Some(View {
                    shape: new_shape.into(),
                    strides: vec![0i64; new_shape.len()].into(),
                    offset: self.offset,
                    mask: None,
                })
            } else {
                None
            };
        }

        split_groups_into_shape(&groups, new_shape).map(|strides| View {
            shape: new_shape.into(),
            strides: strides.into(),
            offset: self.offset,
            mask: None,
        })
    }
}

/// Groups adjacent (size, stride) pairs that are contiguous with each other
/// (`stride[i] == stride[i+1] * shape[i+1]`), dropping size-1 dims first.
fn merge_contiguous_groups(shape: &[i64], strides: &[i64]) -> Vec<(i64, i64)> {
    let dims: Vec<(i64, i64)> = shape
        .iter()
        .zip(strides)
        .filter(|(&s, _)| s != 1)
        .map(|(&s, &st)| (s, st))
        .collect();
    if dims.is_empty() {
        return vec![(1, 0)];
    }
    let mut groups = vec![dims[0]];
    for &(size, stride) in &dims[1..] {
        let last = groups.last_mut().unwrap();
        if last.1 == stride * size {
            last.0 *= size;
            last.1 = stride;
        } else {
            groups.push((size, stride));
        }
    }
    groups
}

/// Tries to carve `new_shape`'s dimensions (processed innermost-first) out
/// of the maximal contiguous `groups`, returning the resulting per-dimension
/// strides, or `None` if a dimension straddles a group boundary.
fn split_groups_into_shape(groups: &[(i64, i64)], new_shape: &[i64]) -> Option<Vec<i64>> {
    let total_old: i64 = groups.iter().map(|g| g.0).product();
    let total_new: i64 = new_shape.iter().product();
    if total_old != total_new {
        return None;
    }

    let mut new_strides = vec![0i64; new_shape.len()];
    let mut gi = groups.len();
    let mut remaining = 1i64;
    let mut cur_stride = 0i64;

    for ni in (0..new_shape.len()).rev() {
        let dim = new_shape[ni];
        if dim == 1 {
            continue;
        }
        if remaining == 1 {
            if gi == 0 {
                return None;
            }
            gi -= 1;
            remaining = groups[gi].0;
            cur_stride = groups[gi].1;
        }
        if remaining % dim != 0 {
            return None;
        }
        new_strides[ni] = cur_stride;
        cur_stride *= dim;
        remaining /= dim;
    }

    if remaining != 1 || gi != 0 {
        return None;
    }
    Some(new_strides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_strides_row_major() {
        let v = View::contiguous(&[2, 3, 4]);
        assert_eq!(v.strides.as_slice(), &[12, 4, 1]);
    }

    #[test]
    fn size_one_dims_canonicalize_to_zero_stride() {
        let v = View::contiguous(&[1, 3, 1]);
        assert_eq!(v.strides.as_slice(), &[0, 1, 0]);
    }

    #[test]
    fn reshape_contiguous_always_fuses() {
        let v = View::contiguous(&[2, 3, 4]);
        let r = v.reshape(&[6, 4]).unwrap();
        assert_eq!(r.strides.as_slice(), &[4, 1]);
        assert_eq!(r.offset, 0);
    }

    #[test]
    fn reshape_after_permute_does_not_fuse() {
        let v = View::contiguous(&[2, 3, 4]).permute(&[1, 0, 2]).unwrap();
        assert!(v.reshape(&[3, 8]).is_none());
    }

    #[test]
    fn flip_negates_stride_and_shifts_offset() {
        let v = View::contiguous(&[4]).flip(&[0]).unwrap();
        assert_eq!(v.strides.as_slice(), &[-1]);
        assert_eq!(v.offset, 3);
    }

    #[test]
    fn pad_installs_mask() {
        let v = View::contiguous(&[3]).pad(&[(1, 1)]).unwrap();
        assert_eq!(v.shape.as_slice(), &[5]);
        assert_eq!(v.mask, Some(MaskBounds::from_slice(&[(1, 4)])));
    }

    #[test]
    fn shrink_tightens_existing_mask() {
        let v = View::contiguous(&[3]).pad(&[(1, 1)]).unwrap();
        let s = v.shrink(&[(0, 4)]).unwrap();
        assert_eq!(s.mask, Some(MaskBounds::from_slice(&[(1, 4)])));
    }
}
