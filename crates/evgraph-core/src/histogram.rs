//! Fixed-binning 1D histogram with bin-wise merge.
//!
//! Layout follows the usual convention: bin 0 is the underflow, bins
//! `1..=nbins` are the regular bins, bin `nbins + 1` is the overflow.

use serde::{Deserialize, Serialize};

use crate::action::HistoModel;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram1D {
    pub model: HistoModel,
    /// Weighted counts, `nbins + 2` entries.
    pub counts: Vec<f64>,
    /// Sum of squared weights per bin, same layout as `counts`.
    pub sumw2: Vec<f64>,
    /// Number of fill calls.
    pub entries: u64,
}

impl Histogram1D {
    pub fn new(model: HistoModel) -> Self {
        let n = model.nbins + 2;
        Self {
            model,
            counts: vec![0.0; n],
            sumw2: vec![0.0; n],
            entries: 0,
        }
    }

    pub fn nbins(&self) -> usize {
        self.model.nbins
    }

    /// Index into `counts` for value `x`. NaN goes to the overflow.
    pub fn find_bin(&self, x: f64) -> usize {
        let m = &self.model;
        if x.is_nan() || x >= m.high {
            return m.nbins + 1;
        }
        if x < m.low {
            return 0;
        }
        let width = (m.high - m.low) / m.nbins as f64;
        let idx = ((x - m.low) / width) as usize;
        1 + idx.min(m.nbins - 1)
    }

    pub fn fill(&mut self, x: f64, w: f64) {
        let b = self.find_bin(x);
        self.counts[b] += w;
        self.sumw2[b] += w * w;
        self.entries += 1;
    }

    /// Weighted content of regular bin `i` (1-based, like `find_bin`).
    pub fn bin_content(&self, i: usize) -> f64 {
        self.counts.get(i).copied().unwrap_or(0.0)
    }

    pub fn underflow(&self) -> f64 {
        self.counts[0]
    }

    pub fn overflow(&self) -> f64 {
        self.counts[self.model.nbins + 1]
    }

    /// Sum of weights in the regular bins.
    pub fn integral(&self) -> f64 {
        self.counts[1..=self.model.nbins].iter().sum()
    }

    /// Bin-wise sum. Both sides must share the same binning.
    pub fn merge(&mut self, other: &Histogram1D) -> Result<()> {
        if self.model.nbins != other.model.nbins
            || self.model.low != other.model.low
            || self.model.high != other.model.high
        {
            return Err(Error::Invariant(format!(
                "cannot merge histogram '{}' with incompatible binning of '{}'",
                self.model.name, other.model.name
            )));
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.entries += other.entries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> HistoModel {
        HistoModel::new("h", 25, 50.0, 550.0)
    }

    #[test]
    fn bins_edges_and_flows() {
        let h = Histogram1D::new(model());
        assert_eq!(h.find_bin(49.9), 0);
        assert_eq!(h.find_bin(50.0), 1);
        assert_eq!(h.find_bin(69.999), 1);
        assert_eq!(h.find_bin(70.0), 2);
        assert_eq!(h.find_bin(549.0), 25);
        assert_eq!(h.find_bin(550.0), 26);
        assert_eq!(h.find_bin(f64::NAN), 26);
    }

    #[test]
    fn merge_is_binwise() {
        let mut a = Histogram1D::new(model());
        let mut b = Histogram1D::new(model());
        a.fill(60.0, 2.0);
        b.fill(60.0, 3.0);
        b.fill(10.0, 1.0);
        a.merge(&b).unwrap();
        assert_eq!(a.bin_content(1), 5.0);
        assert_eq!(a.sumw2[1], 13.0);
        assert_eq!(a.underflow(), 1.0);
        assert_eq!(a.entries, 3);
    }

    #[test]
    fn merge_rejects_other_binning() {
        let mut a = Histogram1D::new(model());
        let b = Histogram1D::new(HistoModel::new("h", 10, 0.0, 1.0));
        assert!(a.merge(&b).is_err());
    }
}
