//! # Paging Advice
//!
//! Index files are read in two very different patterns: random point lookups
//! that touch one node per level, and full sequential sweeps (offset
//! extraction, rewrites). `ReadAdvice` names the kernel paging strategy for
//! each pattern; on unix it maps onto `madvise(2)` through `memmap2::Advice`.
//!
//! Advice only affects I/O performance, never results.
//!
//! ## Scoped Advice
//!
//! `MappedFile::scoped_advice` applies an advice and returns an `AdviceGuard`.
//! Dropping the guard re-applies whatever advice was active before, so nested
//! scopes unwind in LIFO order:
//!
//! ```text
//! let _sweep = index.enable_read_ahead()?;      // Sequential
//! {
//!     let _probe = index.disable_read_ahead()?; // Random
//! }                                             // back to Sequential
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

use eyre::Result;

use super::MappedFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadAdvice {
    Normal = 0,
    Random = 1,
    Sequential = 2,
    WillNeed = 3,
}

impl ReadAdvice {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Random,
            2 => Self::Sequential,
            3 => Self::WillNeed,
            _ => Self::Normal,
        }
    }
}

#[cfg(unix)]
impl From<ReadAdvice> for memmap2::Advice {
    fn from(advice: ReadAdvice) -> Self {
        match advice {
            ReadAdvice::Normal => memmap2::Advice::Normal,
            ReadAdvice::Random => memmap2::Advice::Random,
            ReadAdvice::Sequential => memmap2::Advice::Sequential,
            ReadAdvice::WillNeed => memmap2::Advice::WillNeed,
        }
    }
}

/// Tracks the advice currently applied to a mapping.
#[derive(Debug)]
pub(crate) struct AdviceState(AtomicU8);

impl AdviceState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ReadAdvice::Normal as u8))
    }

    pub(crate) fn current(&self) -> ReadAdvice {
        ReadAdvice::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn replace(&self, advice: ReadAdvice) -> ReadAdvice {
        ReadAdvice::from_u8(self.0.swap(advice as u8, Ordering::AcqRel))
    }
}

/// Restores the previously active advice when dropped.
#[must_use = "dropping the guard immediately restores the previous advice"]
#[derive(Debug)]
pub struct AdviceGuard<'a> {
    mapped: &'a MappedFile,
    applied: ReadAdvice,
    previous: ReadAdvice,
}

impl<'a> AdviceGuard<'a> {
    pub(crate) fn new(mapped: &'a MappedFile, applied: ReadAdvice, previous: ReadAdvice) -> Self {
        Self {
            mapped,
            applied,
            previous,
        }
    }

    pub fn applied(&self) -> ReadAdvice {
        self.applied
    }

    pub fn previous(&self) -> ReadAdvice {
        self.previous
    }
}

impl Drop for AdviceGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.mapped.restore_advice(self.previous) {
            log::warn!(
                "failed to restore {:?} advice on '{}': {:#}",
                self.previous,
                self.mapped.path().display(),
                err
            );
        }
    }
}

pub(crate) fn apply_scoped(mapped: &MappedFile, advice: ReadAdvice) -> Result<AdviceGuard<'_>> {
    mapped.advise(advice)?;
    let previous = mapped.advice_state().replace(advice);
    Ok(AdviceGuard::new(mapped, advice, previous))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advice_round_trips_through_u8() {
        for advice in [
            ReadAdvice::Normal,
            ReadAdvice::Random,
            ReadAdvice::Sequential,
            ReadAdvice::WillNeed,
        ] {
            assert_eq!(ReadAdvice::from_u8(advice as u8), advice);
        }
    }

    #[test]
    fn state_replace_returns_previous() {
        let state = AdviceState::new();
        assert_eq!(state.current(), ReadAdvice::Normal);

        assert_eq!(state.replace(ReadAdvice::Random), ReadAdvice::Normal);
        assert_eq!(state.replace(ReadAdvice::Sequential), ReadAdvice::Random);
        assert_eq!(state.current(), ReadAdvice::Sequential);
    }
}
