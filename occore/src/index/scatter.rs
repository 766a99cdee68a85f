//! Segmented reductions over an index array.
//!
//! These are the sequential counterparts of the scatter operations a tensor
//! backend provides: every hit carries a segment id (event, cluster, object)
//! and the reduction folds all hits of one segment into one output slot.
//! Output length is always passed explicitly (`dim_size`) so that trailing
//! empty segments keep their slot.

use ndarray::{Array2, ArrayView2};

use crate::error::{ensure_len, OcError, OcResult};

#[inline]
fn check_index(index: &[usize], dim_size: usize) -> OcResult<()> {
    if let Some(&bad) = index.iter().find(|&&i| i >= dim_size) {
        return Err(OcError::InvalidInput(format!(
            "segment index {} out of range for {} segments",
            bad, dim_size
        )));
    }
    Ok(())
}

/// Number of entries per segment.
///
/// `scatter_count(&[1, 1, 1, 2, 2, 4, 4], 5) == [0, 3, 2, 0, 2]`
pub fn scatter_count(index: &[usize], dim_size: usize) -> OcResult<Vec<usize>> {
    check_index(index, dim_size)?;
    let mut out = vec![0usize; dim_size];
    for &i in index {
        out[i] += 1;
    }
    Ok(out)
}

/// Inverse of [`scatter_count`] for sorted segments: `[3, 2, 2] -> [0, 0, 0, 1, 1, 2, 2]`.
pub fn scatter_counts_to_indices(counts: &[usize]) -> Vec<usize> {
    let total: usize = counts.iter().sum();
    let mut out = Vec::with_capacity(total);
    for (group, &n) in counts.iter().enumerate() {
        out.extend(std::iter::repeat(group).take(n));
    }
    out
}

/// Exclusive prefix sum: start offset of every segment.
pub fn segment_offsets(counts: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(counts.len());
    let mut acc = 0usize;
    for &c in counts {
        out.push(acc);
        acc += c;
    }
    out
}

pub fn scatter_add(values: &[f32], index: &[usize], dim_size: usize) -> OcResult<Vec<f32>> {
    ensure_len("scatter_add values", index.len(), values.len())?;
    check_index(index, dim_size)?;
    let mut out = vec![0.0f32; dim_size];
    for (&v, &i) in values.iter().zip(index) {
        out[i] += v;
    }
    Ok(out)
}

/// Logical OR per segment; empty segments are `false`.
pub fn scatter_any(flags: &[bool], index: &[usize], dim_size: usize) -> OcResult<Vec<bool>> {
    ensure_len("scatter_any flags", index.len(), flags.len())?;
    check_index(index, dim_size)?;
    let mut out = vec![false; dim_size];
    for (&f, &i) in flags.iter().zip(index) {
        out[i] |= f;
    }
    Ok(out)
}

/// Maximum per segment and the position (into `values`) of the first entry
/// reaching it. Empty segments yield `(0.0, None)`.
pub fn scatter_argmax(
    values: &[f32],
    index: &[usize],
    dim_size: usize,
) -> OcResult<(Vec<f32>, Vec<Option<usize>>)> {
    ensure_len("scatter_argmax values", index.len(), values.len())?;
    check_index(index, dim_size)?;
    let mut max = vec![0.0f32; dim_size];
    let mut arg: Vec<Option<usize>> = vec![None; dim_size];
    for (pos, (&v, &i)) in values.iter().zip(index).enumerate() {
        match arg[i] {
            Some(_) if v <= max[i] => {}
            _ => {
                max[i] = v;
                arg[i] = Some(pos);
            }
        }
    }
    Ok((max, arg))
}

/// Row-wise mean per segment. Segments without rows stay at zero.
pub fn scatter_mean_rows(
    values: ArrayView2<f32>,
    index: &[usize],
    dim_size: usize,
) -> OcResult<Array2<f32>> {
    ensure_len("scatter_mean_rows values", index.len(), values.nrows())?;
    let counts = scatter_count(index, dim_size)?;
    let mut out = Array2::<f32>::zeros((dim_size, values.ncols()));
    for (row, &i) in values.rows().into_iter().zip(index) {
        let mut target = out.row_mut(i);
        target += &row;
    }
    for (mut row, &n) in out.rows_mut().into_iter().zip(&counts) {
        if n > 0 {
            row /= n as f32;
        }
    }
    Ok(out)
}
