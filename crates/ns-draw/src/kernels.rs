//! Jagged-array runtime primitives.
//!
//! The evaluator only touches nested data through [`JaggedKernels`], so a
//! different array backend can be dropped in without changing the compiler
//! or the draw engine. [`NativeKernels`] is the plain-Rust implementation.

use crate::array::{Jagged, Masked, truthy};
use crate::error::{DrawError, Result};
use crate::plan::Reducer;

/// How [`JaggedKernels::pad`] treats rows longer than the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadMode {
    /// Extend short rows with missing markers; keep long rows intact.
    Extend,
    /// Extend short rows and truncate long rows to exactly the target.
    Clip,
}

/// Flat numeric data with the positions of missing entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extracted {
    /// Payload (entries at `missing` positions are unspecified).
    pub values: Vec<f64>,
    /// Sorted positions of missing entries.
    pub missing: Vec<usize>,
}

/// Capability interface of the jagged-array runtime.
pub trait JaggedKernels {
    /// Reduce each row's valid elements to one value per row.
    ///
    /// `Sum` of an empty row is `0`; every other reducer yields missing.
    /// `ArgMin` / `ArgMax` return the position within the row.
    fn reduce(&self, jagged: &Jagged, reducer: Reducer) -> Masked;

    /// Number of valid elements per row.
    fn count(&self, jagged: &Jagged) -> Masked;

    /// Pad rows to `target` elements with missing markers.
    fn pad(&self, jagged: &Jagged, target: usize, mode: PadMode) -> Jagged;

    /// Keep elements where `mask` (same row structure) is valid and true.
    fn mask(&self, jagged: &Jagged, mask: &Jagged) -> Result<Jagged>;

    /// Concatenate all rows in row order.
    fn flatten(&self, jagged: &Jagged) -> Masked;

    /// Numeric payload plus missing positions.
    fn extract(&self, values: &Masked) -> Extracted;
}

/// Default single-threaded backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeKernels;

impl JaggedKernels for NativeKernels {
    fn reduce(&self, jagged: &Jagged, reducer: Reducer) -> Masked {
        Masked::from_options((0..jagged.n_rows()).map(|row| {
            let base = jagged.offsets[row];
            let valid = jagged
                .row_range(row)
                .filter_map(|i| jagged.content.get(i).map(|v| (i - base, v)));
            reduce_row(valid, reducer)
        }))
    }

    fn count(&self, jagged: &Jagged) -> Masked {
        Masked::dense(
            (0..jagged.n_rows())
                .map(|row| {
                    jagged.row_range(row).filter(|&i| jagged.content.is_valid(i)).count() as f64
                })
                .collect(),
        )
    }

    fn pad(&self, jagged: &Jagged, target: usize, mode: PadMode) -> Jagged {
        Jagged::from_rows((0..jagged.n_rows()).map(|row| {
            let mut items = jagged.row(row);
            if items.len() < target {
                items.resize(target, None);
            } else if mode == PadMode::Clip {
                items.truncate(target);
            }
            items
        }))
    }

    fn mask(&self, jagged: &Jagged, mask: &Jagged) -> Result<Jagged> {
        if !jagged.same_shape(mask) {
            return Err(DrawError::ShapeMismatch(format!(
                "boolean mask has a different row structure than the masked value \
                 ({} vs {} elements over {} vs {} rows)",
                mask.content.len(),
                jagged.content.len(),
                mask.n_rows(),
                jagged.n_rows()
            )));
        }
        let keep: Vec<bool> = (0..mask.content.len())
            .map(|i| mask.content.get(i).is_some_and(truthy))
            .collect();
        let mut offsets = Vec::with_capacity(jagged.offsets.len());
        offsets.push(0usize);
        for row in 0..jagged.n_rows() {
            let kept = jagged.row_range(row).filter(|&i| keep[i]).count();
            offsets.push(offsets[offsets.len() - 1] + kept);
        }
        Ok(Jagged { offsets, content: jagged.content.filter(&keep) })
    }

    fn flatten(&self, jagged: &Jagged) -> Masked {
        let start = jagged.offsets.first().copied().unwrap_or(0);
        let end = jagged.offsets.last().copied().unwrap_or(0);
        Masked::from_options((start..end).map(|i| jagged.content.get(i)))
    }

    fn extract(&self, values: &Masked) -> Extracted {
        let missing = match &values.valid {
            None => Vec::new(),
            Some(valid) => valid.iter().enumerate().filter(|(_, v)| !**v).map(|(i, _)| i).collect(),
        };
        Extracted { values: values.values.clone(), missing }
    }
}

fn reduce_row(mut items: impl Iterator<Item = (usize, f64)>, reducer: Reducer) -> Option<f64> {
    match reducer {
        Reducer::Sum => Some(items.map(|(_, v)| v).sum()),
        Reducer::Mean => {
            let (n, total) = items.fold((0usize, 0.0f64), |(n, s), (_, v)| (n + 1, s + v));
            if n == 0 { None } else { Some(total / n as f64) }
        }
        Reducer::Min => items.map(|(_, v)| v).reduce(f64::min),
        Reducer::Max => items.map(|(_, v)| v).reduce(f64::max),
        Reducer::ArgMin | Reducer::ArgMax => {
            let first = items.next()?;
            let best = items.fold(first, |best, cur| {
                let better =
                    if reducer == Reducer::ArgMin { cur.1 < best.1 } else { cur.1 > best.1 };
                if better { cur } else { best }
            });
            Some(best.0 as f64)
        }
    }
}
