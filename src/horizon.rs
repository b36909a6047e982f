//! Planning Horizon

use rustc_hash::FxHashMap;
use thiserror::Error;

/// Week identifier as written in the input data.
pub type WeekId = i64;

/// Number of weeks planned when nothing else is known: one quarter.
pub const DEFAULT_WEEK_COUNT: usize = 13;

/// Errors raised when building a horizon.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HorizonError {
    /// No week identifiers were supplied.
    #[error("cannot derive a planning horizon without any weeks")]
    Empty,

    /// The week span is too large to index.
    #[error("week span {first}..={last} is too large")]
    SpanTooLarge {
        /// First week id
        first: WeekId,
        /// Last week id
        last: WeekId,
    },
}

/// Contiguous range of planning weeks with a week id <-> week index bijection.
///
/// Week indexes run `0..len()` in chronological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningHorizon {
    week_ids: Vec<WeekId>,
    indexes: FxHashMap<WeekId, usize>,
}

impl PlanningHorizon {
    /// Build the horizon spanning `first..=last`.
    ///
    /// # Errors
    ///
    /// Returns [`HorizonError::Empty`] if `last < first`.
    pub fn from_span(first: WeekId, last: WeekId) -> Result<Self, HorizonError> {
        if last < first {
            return Err(HorizonError::Empty);
        }

        let len = last
            .checked_sub(first)
            .and_then(|span| usize::try_from(span).ok())
            .and_then(|span| span.checked_add(1))
            .ok_or(HorizonError::SpanTooLarge { first, last })?;

        let week_ids: Vec<WeekId> = (first..=last).collect();
        let mut indexes = FxHashMap::default();
        indexes.reserve(len);

        for (idx, id) in week_ids.iter().copied().enumerate() {
            indexes.insert(id, idx);
        }

        Ok(Self { week_ids, indexes })
    }

    /// Build the horizon spanning the smallest to the largest of the given week ids.
    ///
    /// Gaps inside the span still count as planning weeks.
    ///
    /// # Errors
    ///
    /// Returns [`HorizonError::Empty`] if no ids are given.
    pub fn from_week_ids(ids: impl IntoIterator<Item = WeekId>) -> Result<Self, HorizonError> {
        let (first, last) = ids
            .into_iter()
            .fold(None, |span: Option<(WeekId, WeekId)>, id| match span {
                None => Some((id, id)),
                Some((first, last)) => Some((first.min(id), last.max(id))),
            })
            .ok_or(HorizonError::Empty)?;

        Self::from_span(first, last)
    }

    /// Keep only the first `weeks` weeks. Horizons already that short are returned unchanged.
    #[must_use]
    pub fn truncated(mut self, weeks: usize) -> Self {
        if weeks < self.week_ids.len() {
            for id in self.week_ids.drain(weeks..) {
                self.indexes.remove(&id);
            }
        }

        self
    }

    /// Number of weeks in the horizon.
    pub fn len(&self) -> usize {
        self.week_ids.len()
    }

    /// Whether the horizon has no weeks.
    pub fn is_empty(&self) -> bool {
        self.week_ids.is_empty()
    }

    /// Index of the last week, if any.
    pub fn last_index(&self) -> Option<usize> {
        self.week_ids.len().checked_sub(1)
    }

    /// Week id of a week index.
    pub fn week_id(&self, index: usize) -> Option<WeekId> {
        self.week_ids.get(index).copied()
    }

    /// Week index of a week id.
    pub fn week_index(&self, id: WeekId) -> Option<usize> {
        self.indexes.get(&id).copied()
    }

    /// Iterate over `(index, id)` pairs in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, WeekId)> + '_ {
        self.week_ids.iter().copied().enumerate()
    }
}

impl Default for PlanningHorizon {
    fn default() -> Self {
        let week_ids: Vec<WeekId> = (1..).take(DEFAULT_WEEK_COUNT).collect();
        let indexes = week_ids
            .iter()
            .copied()
            .enumerate()
            .map(|(idx, id)| (id, idx))
            .collect();

        Self { week_ids, indexes }
    }
}
