use serde::{Deserialize, Serialize};

use super::model::PeptideRecord;

// ---------------------------------------------------------------------------
// Peptide length window
// ---------------------------------------------------------------------------

/// Inclusive peptide-length bounds. A missing bound means "no constraint".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthWindow {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl LengthWindow {
    pub fn new(min: Option<usize>, max: Option<usize>) -> Self {
        LengthWindow { min, max }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, len: usize) -> bool {
        self.min.map_or(true, |m| len >= m) && self.max.map_or(true, |m| len <= m)
    }

    /// Keep the records whose peptide length is inside the window, returning
    /// how many were dropped.
    pub fn retain(&self, records: &mut Vec<PeptideRecord>) -> usize {
        if self.is_unbounded() {
            return 0;
        }
        let before = records.len();
        records.retain(|r| self.contains(r.peptide.len()));
        before - records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(peptide: &str) -> PeptideRecord {
        PeptideRecord::new(peptide, "HLA-A*02:01", "s1", 1.0, None).unwrap()
    }

    #[test]
    fn unbounded_keeps_everything() {
        let mut records = vec![rec("A"), rec("AAAAAAAAAAAAAAAAAAAA")];
        assert_eq!(LengthWindow::default().retain(&mut records), 0);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn bounds_are_inclusive() {
        let window = LengthWindow::new(Some(8), Some(12));
        assert!(!window.contains(7));
        assert!(window.contains(8));
        assert!(window.contains(12));
        assert!(!window.contains(13));

        let mut records = vec![rec("SIINFEK"), rec("SIINFEKL"), rec("SIINFEKLSIINF")];
        assert_eq!(window.retain(&mut records), 2);
        assert_eq!(records, vec![rec("SIINFEKL")]);
    }

    #[test]
    fn one_sided_window() {
        let window = LengthWindow::new(Some(13), None);
        assert!(window.contains(25));
        assert!(!window.contains(9));
    }
}
