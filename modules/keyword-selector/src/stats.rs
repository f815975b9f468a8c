use serde::Serialize;

use keyword_common::PerSlice;

/// Counts for one slice at each pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SliceStats {
    /// Raw candidates from the loader.
    pub loaded: usize,
    /// Survived the generic-term filter.
    pub valid: usize,
    /// After collapsing repeats within the slice.
    pub unique: usize,
    /// After cooldown suppression and cross-slice dedup.
    pub eligible: usize,
    /// Picked against the slice quota.
    pub selected: usize,
    /// Picked from overflow to use leftover budget.
    pub backfilled: usize,
    /// Quota slots the slice could not fill itself.
    pub underfilled: usize,
}

/// Why candidates never reached the eligible set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub invalid: usize,
    pub cooldown: usize,
    /// Repeats within a slice plus later occurrences across slices.
    pub deduped: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.invalid + self.cooldown + self.deduped
    }
}

/// Diagnostics for one selection call.
/// `candidates == eligible + dropped.total()` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionStats {
    pub slices: PerSlice<SliceStats>,
    pub candidates: usize,
    pub eligible: usize,
    pub selected: usize,
    pub backfilled: usize,
    pub underfilled: usize,
    pub dropped: DropCounts,
}

impl std::fmt::Display for SelectionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Keyword Selection ===")?;
        writeln!(f, "Candidates:   {}", self.candidates)?;
        writeln!(f, "Eligible:     {}", self.eligible)?;
        writeln!(f, "Selected:     {}", self.selected)?;
        writeln!(f, "Backfilled:   {}", self.backfilled)?;
        writeln!(f, "Underfilled:  {}", self.underfilled)?;
        writeln!(f, "\nDropped:")?;
        writeln!(f, "  Invalid:  {}", self.dropped.invalid)?;
        writeln!(f, "  Cooldown: {}", self.dropped.cooldown)?;
        writeln!(f, "  Deduped:  {}", self.dropped.deduped)?;
        writeln!(f, "\nBy slice (loaded/eligible/selected+backfilled):")?;
        for (slice, s) in self.slices.iter() {
            writeln!(
                f,
                "  {:<8} {}/{}/{}+{}",
                slice.as_str(),
                s.loaded,
                s.eligible,
                s.selected,
                s.backfilled
            )?;
        }
        Ok(())
    }
}
