//! Binned 1D/2D histograms filled from drawn arrays.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DrawError, Result};

/// Number of uniform bins used when no binning is given.
pub const DEFAULT_AUTO_BINS: usize = 50;

/// Under/overflow handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPolicy {
    /// Drop entries outside the histogram range (record them in `underflow/overflow`).
    #[default]
    Drop,
    /// Fold underflow into the first bin and overflow into the last bin.
    Fold,
}

/// Negative weight handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeWeightPolicy {
    /// Keep negative weights as-is.
    #[default]
    Allow,
    /// Clamp negative weights to 0.
    ClampToZero,
    /// Error on the first negative weight encountered.
    Error,
}

/// Binning of one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bins {
    /// `n` equal-width bins over `[lo, hi]`.
    Uniform {
        /// Number of bins.
        n: usize,
        /// Lower edge.
        lo: f64,
        /// Upper edge.
        hi: f64,
    },
    /// Explicit, strictly increasing edges.
    Edges(Vec<f64>),
}

impl Bins {
    /// Uniform bins spanning the finite range of `values`.
    ///
    /// An empty sample gives `[0, 1]`. A single-valued sample is widened by
    /// ±0.5, or by a millionth of its magnitude when that is larger.
    pub fn auto(values: &[f64]) -> Bins {
        let (lo, hi) = values
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let (lo, hi) = if lo > hi {
            (0.0, 1.0)
        } else if lo == hi {
            let half = 0.5_f64.max(lo.abs() * 1e-6);
            ((lo - half).max(f64::MIN), (hi + half).min(f64::MAX))
        } else {
            (lo, hi)
        };
        Bins::Uniform { n: DEFAULT_AUTO_BINS, lo, hi }
    }

    /// Validated bin edges (`n_bins + 1` values).
    pub fn edges(&self) -> Result<Vec<f64>> {
        match self {
            Bins::Uniform { n, lo, hi } => {
                if *n == 0 {
                    return Err(DrawError::Histogram("number of bins must be positive".into()));
                }
                if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                    return Err(DrawError::Histogram(format!(
                        "invalid bin range [{lo}, {hi}]"
                    )));
                }
                let n_f = *n as f64;
                // `hi - lo` overflows for ranges wider than f64::MAX.
                let width =
                    if (hi - lo).is_finite() { (hi - lo) / n_f } else { hi / n_f - lo / n_f };
                let mut edges = Vec::with_capacity(*n + 1);
                edges.push(*lo);
                edges.extend((1..*n).map(|i| lo + width * i as f64));
                edges.push(*hi);
                Ok(edges)
            }
            Bins::Edges(edges) => {
                if edges.len() < 2 {
                    return Err(DrawError::Histogram(format!(
                        "need at least 2 bin edges, got {}",
                        edges.len()
                    )));
                }
                if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(DrawError::Histogram(
                        "bin edges must be finite and strictly increasing".into(),
                    ));
                }
                Ok(edges.clone())
            }
        }
    }
}

impl FromStr for Bins {
    type Err = DrawError;

    /// Parses `"n,lo,hi"`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [n, lo, hi] = parts.as_slice() else {
            return Err(DrawError::Histogram(format!("expected 'n,lo,hi', got '{s}'")));
        };
        let bad = |what: &str| DrawError::Histogram(format!("invalid {what} in binning '{s}'"));
        let bins = Bins::Uniform {
            n: n.parse().map_err(|_| bad("bin count"))?,
            lo: lo.parse().map_err(|_| bad("lower edge"))?,
            hi: hi.parse().map_err(|_| bad("upper edge"))?,
        };
        bins.edges()?;
        Ok(bins)
    }
}

enum Slot {
    Under,
    Bin(usize),
    Over,
}

/// Locate `val` in sorted `edges`: `[lo, hi)` bins, the last bin closed on the right.
fn find_bin(edges: &[f64], val: f64) -> Slot {
    let last = edges.len() - 1;
    if val < edges[0] {
        Slot::Under
    } else if val > edges[last] {
        Slot::Over
    } else if val == edges[last] {
        Slot::Bin(last - 1)
    } else {
        Slot::Bin(edges.partition_point(|&e| e <= val) - 1)
    }
}

fn apply_weight_policy(weight: f64, policy: NegativeWeightPolicy) -> Result<f64> {
    if weight >= 0.0 {
        return Ok(weight);
    }
    match policy {
        NegativeWeightPolicy::Allow => Ok(weight),
        NegativeWeightPolicy::ClampToZero => Ok(0.0),
        NegativeWeightPolicy::Error => {
            Err(DrawError::Histogram(format!("negative weight encountered (weight={weight})")))
        }
    }
}

fn check_same_edges(a: &[f64], b: &[f64], axis: &str) -> Result<()> {
    if a != b {
        return Err(DrawError::ShapeMismatch(format!(
            "cannot add histograms with different {axis} edges ({} vs {} edges)",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

/// One-dimensional histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hist1D {
    /// Bin edges (length = n_bins + 1).
    pub edges: Vec<f64>,
    /// Sum of weights per bin.
    pub counts: Vec<f64>,
    /// Sum of squared weights per bin.
    pub sumw2: Vec<f64>,
    /// Sum of weights below the first edge (before optional folding).
    pub underflow: f64,
    /// Sum of weights above the last edge (before optional folding).
    pub overflow: f64,
    /// Entries that landed in a bin.
    pub entries: u64,
    /// Entries with a negative weight (after applying the policy).
    pub negative_weight_entries: u64,
}

impl Hist1D {
    /// Empty histogram with the given binning.
    pub fn new(bins: &Bins) -> Result<Self> {
        Ok(Self::with_edges(bins.edges()?))
    }

    fn with_edges(edges: Vec<f64>) -> Self {
        let n = edges.len() - 1;
        Self {
            edges,
            counts: vec![0.0; n],
            sumw2: vec![0.0; n],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
            negative_weight_entries: 0,
        }
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    /// Fill `values` with optional per-value `weights` (unit weight otherwise).
    pub fn fill(
        &mut self,
        values: &[f64],
        weights: Option<&[f64]>,
        flow: FlowPolicy,
        negative: NegativeWeightPolicy,
    ) -> Result<()> {
        let mut clamped = 0usize;
        for (i, &val) in values.iter().enumerate() {
            if val.is_nan() {
                continue;
            }
            let raw = weights.map_or(1.0, |w| w[i]);
            let weight = apply_weight_policy(raw, negative)?;
            if raw < 0.0 {
                self.negative_weight_entries += 1;
                if weight != raw {
                    clamped += 1;
                }
            }
            let w2 = weight * weight;
            let bin = match find_bin(&self.edges, val) {
                Slot::Bin(b) => b,
                Slot::Under => {
                    self.underflow += weight;
                    if flow == FlowPolicy::Drop {
                        continue;
                    }
                    0
                }
                Slot::Over => {
                    self.overflow += weight;
                    if flow == FlowPolicy::Drop {
                        continue;
                    }
                    self.n_bins() - 1
                }
            };
            self.counts[bin] += weight;
            self.sumw2[bin] += w2;
            self.entries += 1;
        }
        if clamped > 0 {
            log::warn!("clamped {clamped} negative weights to zero");
        }
        Ok(())
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Add another histogram with identical edges.
    pub fn add(&mut self, other: &Hist1D) -> Result<()> {
        check_same_edges(&self.edges, &other.edges, "x")?;
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.entries += other.entries;
        self.negative_weight_entries += other.negative_weight_entries;
        Ok(())
    }
}

/// Two-dimensional histogram; `counts[ix * ny + iy]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hist2D {
    /// X bin edges.
    pub x_edges: Vec<f64>,
    /// Y bin edges.
    pub y_edges: Vec<f64>,
    /// Sum of weights per bin, row-major over x then y.
    pub counts: Vec<f64>,
    /// Sum of squared weights per bin.
    pub sumw2: Vec<f64>,
    /// Sum of weights outside the x or y range (before optional folding).
    pub outside: f64,
    /// Entries that landed in a bin.
    pub entries: u64,
    /// Entries with a negative weight (after applying the policy).
    pub negative_weight_entries: u64,
}

impl Hist2D {
    /// Empty histogram with the given binnings.
    pub fn new(x: &Bins, y: &Bins) -> Result<Self> {
        Ok(Self::with_edges(x.edges()?, y.edges()?))
    }

    fn with_edges(x_edges: Vec<f64>, y_edges: Vec<f64>) -> Self {
        let n = (x_edges.len() - 1) * (y_edges.len() - 1);
        Self {
            x_edges,
            y_edges,
            counts: vec![0.0; n],
            sumw2: vec![0.0; n],
            outside: 0.0,
            entries: 0,
            negative_weight_entries: 0,
        }
    }

    /// `(nx, ny)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.x_edges.len() - 1, self.y_edges.len() - 1)
    }

    /// Content of bin `(ix, iy)`.
    pub fn get(&self, ix: usize, iy: usize) -> f64 {
        self.counts[ix * self.shape().1 + iy]
    }

    /// Fill `(x[i], y[i])` pairs with optional weights.
    pub fn fill(
        &mut self,
        x: &[f64],
        y: &[f64],
        weights: Option<&[f64]>,
        flow: FlowPolicy,
        negative: NegativeWeightPolicy,
    ) -> Result<()> {
        if x.len() != y.len() {
            return Err(DrawError::ShapeMismatch(format!(
                "2D fill needs equal lengths, got {} and {}",
                x.len(),
                y.len()
            )));
        }
        let (nx, ny) = self.shape();
        let axis = |slot: Slot, n: usize| match slot {
            Slot::Bin(b) => (b, true),
            Slot::Under => (0, false),
            Slot::Over => (n - 1, false),
        };
        for i in 0..x.len() {
            if x[i].is_nan() || y[i].is_nan() {
                continue;
            }
            let raw = weights.map_or(1.0, |w| w[i]);
            let weight = apply_weight_policy(raw, negative)?;
            if raw < 0.0 {
                self.negative_weight_entries += 1;
            }
            let (ix, in_x) = axis(find_bin(&self.x_edges, x[i]), nx);
            let (iy, in_y) = axis(find_bin(&self.y_edges, y[i]), ny);
            if !(in_x && in_y) {
                self.outside += weight;
                if flow == FlowPolicy::Drop {
                    continue;
                }
            }
            self.counts[ix * ny + iy] += weight;
            self.sumw2[ix * ny + iy] += weight * weight;
            self.entries += 1;
        }
        Ok(())
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Add another histogram with identical edges.
    pub fn add(&mut self, other: &Hist2D) -> Result<()> {
        check_same_edges(&self.x_edges, &other.x_edges, "x")?;
        check_same_edges(&self.y_edges, &other.y_edges, "y")?;
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.outside += other.outside;
        self.entries += other.entries;
        self.negative_weight_entries += other.negative_weight_entries;
        Ok(())
    }
}

/// A filled 1D or 2D histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Histogram {
    /// One dimension.
    OneD(Hist1D),
    /// Two dimensions.
    TwoD(Hist2D),
}

impl Histogram {
    /// Same binning, no content.
    pub fn empty_like(&self) -> Histogram {
        match self {
            Histogram::OneD(h) => Histogram::OneD(Hist1D::with_edges(h.edges.clone())),
            Histogram::TwoD(h) => {
                Histogram::TwoD(Hist2D::with_edges(h.x_edges.clone(), h.y_edges.clone()))
            }
        }
    }

    /// Fill from drawn dimension arrays (one or two) and optional weights.
    pub fn fill(
        &mut self,
        dims: &[Vec<f64>],
        weights: Option<&[f64]>,
        flow: FlowPolicy,
        negative: NegativeWeightPolicy,
    ) -> Result<()> {
        match (self, dims) {
            (Histogram::OneD(h), [x]) => h.fill(x, weights, flow, negative),
            (Histogram::TwoD(h), [x, y]) => h.fill(x, y, weights, flow, negative),
            (h, _) => Err(DrawError::ShapeMismatch(format!(
                "cannot fill a {}D histogram from {} dimension(s)",
                h.ndim(),
                dims.len()
            ))),
        }
    }

    /// Add another histogram with identical binning.
    pub fn add(&mut self, other: &Histogram) -> Result<()> {
        match (self, other) {
            (Histogram::OneD(a), Histogram::OneD(b)) => a.add(b),
            (Histogram::TwoD(a), Histogram::TwoD(b)) => a.add(b),
            (a, b) => Err(DrawError::ShapeMismatch(format!(
                "cannot add a {}D histogram to a {}D histogram",
                b.ndim(),
                a.ndim()
            ))),
        }
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        match self {
            Histogram::OneD(_) => 1,
            Histogram::TwoD(_) => 2,
        }
    }

    /// Entries that landed in a bin.
    pub fn entries(&self) -> u64 {
        match self {
            Histogram::OneD(h) => h.entries,
            Histogram::TwoD(h) => h.entries,
        }
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        match self {
            Histogram::OneD(h) => h.integral(),
            Histogram::TwoD(h) => h.integral(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn edges(e: &[f64]) -> Bins {
        Bins::Edges(e.to_vec())
    }

    #[test]
    fn parse_uniform() {
        let b: Bins = "4, 0, 2".parse().unwrap();
        assert_eq!(b, Bins::Uniform { n: 4, lo: 0.0, hi: 2.0 });
        assert_eq!(b.edges().unwrap(), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert!("4,0".parse::<Bins>().is_err());
        assert!("x,0,1".parse::<Bins>().is_err());
        assert!("0,0,1".parse::<Bins>().is_err());
        assert!("3,1,1".parse::<Bins>().is_err());
    }

    #[test]
    fn invalid_edges() {
        assert!(edges(&[1.0]).edges().is_err());
        assert!(edges(&[0.0, 1.0, 1.0]).edges().is_err());
        assert!(edges(&[0.0, f64::NAN]).edges().is_err());
    }

    #[test]
    fn auto_binning() {
        assert_eq!(Bins::auto(&[3.0, 1.0, 2.0]), Bins::Uniform { n: DEFAULT_AUTO_BINS, lo: 1.0, hi: 3.0 });
        assert_eq!(Bins::auto(&[2.0, 2.0]), Bins::Uniform { n: DEFAULT_AUTO_BINS, lo: 1.5, hi: 2.5 });
        assert_eq!(Bins::auto(&[]), Bins::Uniform { n: DEFAULT_AUTO_BINS, lo: 0.0, hi: 1.0 });
    }

    fn strictly_increasing(edges: &[f64]) -> bool {
        edges.iter().all(|e| e.is_finite()) && edges.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn auto_binning_of_large_constant_sample() {
        let bins = Bins::auto(&[1e17, 1e17]);
        let e = bins.edges().unwrap();
        assert_eq!(e.len(), DEFAULT_AUTO_BINS + 1);
        assert!(strictly_increasing(&e));
        assert!(e[0] < 1e17 && 1e17 < e[DEFAULT_AUTO_BINS]);

        for v in [f64::MAX, f64::MIN] {
            let e = Bins::auto(&[v]).edges().unwrap();
            assert!(strictly_increasing(&e));
        }
    }

    #[test]
    fn range_wider_than_f64_max() {
        let e = Bins::auto(&[-1e308, 0.0, 1e308]).edges().unwrap();
        assert_eq!(e[0], -1e308);
        assert_eq!(e[DEFAULT_AUTO_BINS], 1e308);
        assert!(strictly_increasing(&e));

        let e = Bins::Uniform { n: 1, lo: f64::MIN, hi: f64::MAX }.edges().unwrap();
        assert_eq!(e, vec![f64::MIN, f64::MAX]);

        let mut h = Hist1D::new(&Bins::auto(&[-1e308, 1e308])).unwrap();
        h.fill(&[-1e308, 0.0, 1e308], None, FlowPolicy::Drop, NegativeWeightPolicy::Allow).unwrap();
        assert_eq!(h.entries, 3);
    }

    #[test]
    fn last_bin_closed_on_the_right() {
        let mut h = Hist1D::new(&edges(&[0.0, 1.0, 2.0])).unwrap();
        h.fill(&[0.0, 1.0, 2.0, 2.5, -1.0], None, FlowPolicy::Drop, NegativeWeightPolicy::Allow)
            .unwrap();
        assert_eq!(h.counts, vec![1.0, 2.0]);
        assert_eq!(h.overflow, 1.0);
        assert_eq!(h.underflow, 1.0);
        assert_eq!(h.entries, 3);
    }

    #[test]
    fn flow_fold() {
        let mut h = Hist1D::new(&edges(&[0.0, 1.0, 2.0])).unwrap();
        h.fill(&[-5.0, 5.0], Some(&[2.0, 3.0]), FlowPolicy::Fold, NegativeWeightPolicy::Allow)
            .unwrap();
        assert_eq!(h.counts, vec![2.0, 3.0]);
        assert_eq!(h.sumw2, vec![4.0, 9.0]);
        assert_eq!(h.underflow, 2.0);
        assert_eq!(h.overflow, 3.0);
    }

    #[test]
    fn negative_weight_policies() {
        let bins = edges(&[0.0, 1.0]);
        let mut h = Hist1D::new(&bins).unwrap();
        h.fill(&[0.5, 0.5], Some(&[-1.0, 2.0]), FlowPolicy::Drop, NegativeWeightPolicy::Allow)
            .unwrap();
        assert_relative_eq!(h.integral(), 1.0);
        assert_eq!(h.negative_weight_entries, 1);

        let mut h = Hist1D::new(&bins).unwrap();
        h.fill(&[0.5, 0.5], Some(&[-1.0, 2.0]), FlowPolicy::Drop, NegativeWeightPolicy::ClampToZero)
            .unwrap();
        assert_relative_eq!(h.integral(), 2.0);

        let mut h = Hist1D::new(&bins).unwrap();
        let r = h.fill(&[0.5], Some(&[-1.0]), FlowPolicy::Drop, NegativeWeightPolicy::Error);
        assert!(matches!(r, Err(DrawError::Histogram(_))));
    }

    #[test]
    fn fill_2d() {
        let mut h = Hist2D::new(&edges(&[0.0, 1.0, 2.0]), &edges(&[0.0, 10.0])).unwrap();
        h.fill(&[0.5, 1.5, 1.5, 3.0], &[5.0, 5.0, 10.0, 5.0], None, FlowPolicy::Drop, NegativeWeightPolicy::Allow)
            .unwrap();
        assert_eq!(h.shape(), (2, 1));
        assert_eq!(h.get(0, 0), 1.0);
        assert_eq!(h.get(1, 0), 2.0);
        assert_eq!(h.outside, 1.0);
        assert!(h.fill(&[1.0], &[], None, FlowPolicy::Drop, NegativeWeightPolicy::Allow).is_err());
    }

    #[test]
    fn add_requires_same_edges() {
        let mut a = Histogram::OneD(Hist1D::new(&edges(&[0.0, 1.0, 2.0])).unwrap());
        a.fill(&[vec![0.5]], None, FlowPolicy::Drop, NegativeWeightPolicy::Allow).unwrap();
        let mut b = a.empty_like();
        b.fill(&[vec![1.5, 1.7]], None, FlowPolicy::Drop, NegativeWeightPolicy::Allow).unwrap();
        a.add(&b).unwrap();
        assert_eq!(a.entries(), 3);
        assert_relative_eq!(a.integral(), 3.0);

        let c = Histogram::OneD(Hist1D::new(&edges(&[0.0, 2.0])).unwrap());
        assert!(matches!(a.add(&c), Err(DrawError::ShapeMismatch(_))));
        let d = Histogram::TwoD(Hist2D::new(&edges(&[0.0, 1.0]), &edges(&[0.0, 1.0])).unwrap());
        assert!(a.add(&d).is_err());
    }
}
