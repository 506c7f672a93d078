//! Chunked draw: fold histograms over externally supplied chunks.

use serde::Serialize;

use crate::column::ColumnSource;
use crate::draw::Drawer;
use crate::error::Result;
use crate::histogram::Histogram;
use crate::kernels::JaggedKernels;

/// Result of a chunked fold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldSummary {
    /// Sum of per-chunk histograms; `None` when there were no chunks.
    pub hist: Option<Histogram>,
    /// Number of chunks processed.
    pub chunks: usize,
    /// Total rows across chunks.
    pub rows: usize,
}

/// Draw each chunk and sum the resulting histograms.
///
/// The expressions are compiled once. Binning comes from the drawer's options,
/// or from the first chunk's automatic binning, and is reused for every later
/// chunk. The first failing chunk aborts the fold.
pub fn fold_draw<K, S, I>(
    drawer: &mut Drawer<K>,
    chunks: I,
    varexp: &str,
    selection: Option<&str>,
    weights: Option<&str>,
) -> Result<FoldSummary>
where
    K: JaggedKernels,
    S: ColumnSource,
    I: IntoIterator<Item = Result<S>>,
{
    let prepared = drawer.prepare(varexp, selection, weights)?;
    let mut summary = FoldSummary { hist: None, chunks: 0, rows: 0 };
    for chunk in chunks {
        let chunk = chunk?;
        let arrays = drawer.run_arrays(&prepared, &chunk)?;
        match summary.hist.as_mut() {
            None => summary.hist = Some(drawer.histogram(&arrays)?),
            Some(total) => {
                let mut part = total.empty_like();
                drawer.fill(&mut part, &arrays)?;
                total.add(&part)?;
            }
        }
        summary.chunks += 1;
        summary.rows += chunk.n_rows();
        log::debug!("fold '{varexp}': chunk {} with {} rows", summary.chunks, chunk.n_rows());
    }
    log::info!(
        "fold '{varexp}': {} chunks, {} rows, {} entries",
        summary.chunks,
        summary.rows,
        summary.hist.as_ref().map_or(0, Histogram::entries)
    );
    Ok(summary)
}
