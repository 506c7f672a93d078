//! # ns-draw
//!
//! Draw expressions over jagged columns for NextStat.
//!
//! Compiles a small Python-flavoured expression language (`sum(Jet_pt[:2])`,
//! `Jet_eta[argmin(Jet_pt)]`, `-0.8 < Jet_eta < 0.8 and Jet_pt > 25`) into
//! whole-column array operations and evaluates them against flat and
//! variable-length-per-row columns. A draw yields aligned flat arrays
//! (optionally with weights) or a filled 1D/2D histogram.
//!
//! ## Example
//!
//! ```
//! use ns_draw::{Drawer, JaggedCol, Table};
//!
//! let table = Table::new()
//!     .with("Jet_pt", JaggedCol::from_rows(&[vec![42.0, 15.0, 10.5], vec![], vec![11.5]]))
//!     .unwrap()
//!     .with("MET_pt", vec![46.5, 30.0, 82.0])
//!     .unwrap();
//!
//! let mut drawer = Drawer::new();
//! let out = drawer.draw_arrays(&table, "sum(Jet_pt[:2])", Some("MET_pt > 40"), None).unwrap();
//! assert_eq!(out.dims, vec![vec![57.0, 11.5]]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod array;
pub mod ast;
pub mod column;
pub mod compile;
pub mod draw;
pub mod env;
pub mod error;
pub mod eval;
pub mod fold;
pub mod histogram;
pub mod kernels;
pub mod lexer;
pub mod plan;
pub mod refs;
pub mod transform;

pub use array::{DType, Data, Jagged, Masked, Value};
pub use column::{Column, ColumnSource, JaggedCol, Table};
pub use compile::{CompileCache, CompiledExpr, split_dims, split_on_free_colon};
pub use draw::{DrawArrays, DrawOptions, Drawer, PreparedDraw, draw};
pub use env::{ExternalFn, Symbols};
pub use error::{DrawError, Result};
pub use fold::{FoldSummary, fold_draw};
pub use histogram::{
    Bins, DEFAULT_AUTO_BINS, FlowPolicy, Hist1D, Hist2D, Histogram, NegativeWeightPolicy,
};
pub use kernels::{Extracted, JaggedKernels, NativeKernels, PadMode};
pub use refs::{RESERVED_WORDS, column_refs, column_refs_expanded, column_refs_many};
pub use transform::Aliases;
