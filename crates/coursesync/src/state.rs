//! Course selection state for the active term.

use crate::models::{
    CourseCardArray, CourseCardOptions, CourseCardUpdate, SerializedCourseCardOptions,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Saved cards as returned by the session store, keyed by card index.
pub type SavedCourseCards = BTreeMap<usize, SerializedCourseCardOptions>;

/// Result of a card update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// The update was issued for a term that is no longer active.
    StaleTerm,
    UnknownCard,
}

/// The active term and its cards.
#[derive(Debug, Clone, Default)]
pub struct TermData {
    term: Option<String>,
    course_cards: CourseCardArray,
}

impl TermData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(&self) -> Option<&str> {
        self.term.as_deref()
    }

    pub fn course_cards(&self) -> &CourseCardArray {
        &self.course_cards
    }

    pub fn card(&self, index: usize) -> Option<&CourseCardOptions> {
        self.course_cards.get(index)
    }

    /// Activates `term`. Cards of the previous term are dropped and the new
    /// term starts with a single blank card until saved cards are restored.
    pub fn set_term(&mut self, term: &str) {
        self.term = Some(term.to_string());
        self.course_cards = CourseCardArray::with_blank_card();
    }

    pub fn add_card(&mut self) -> usize {
        self.course_cards.add(CourseCardOptions::default())
    }

    pub fn remove_card(&mut self, index: usize) -> Option<CourseCardOptions> {
        self.course_cards.remove(index)
    }

    /// Applies `update` to the card at `index`.
    ///
    /// When `term` is given it must match the active term, otherwise the
    /// update is dropped: it belongs to a request that finished after the
    /// user moved on.
    pub fn update_card(
        &mut self,
        index: usize,
        update: CourseCardUpdate,
        term: Option<&str>,
    ) -> UpdateOutcome {
        if let Some(term) = term {
            if self.term.as_deref() != Some(term) {
                debug!(
                    card = index,
                    update_term = term,
                    active_term = ?self.term,
                    "Dropping card update for stale term"
                );
                return UpdateOutcome::StaleTerm;
            }
        }

        match self.course_cards.get_mut(index) {
            Some(card) => {
                card.apply(update);
                UpdateOutcome::Applied
            }
            None => UpdateOutcome::UnknownCard,
        }
    }

    /// Replaces the cards with the saved ones for `term`. Ignored if `term`
    /// is no longer active. An empty save keeps the blank starter card.
    pub fn restore_cards(&mut self, saved: &SavedCourseCards, term: &str) -> UpdateOutcome {
        if self.term.as_deref() != Some(term) {
            return UpdateOutcome::StaleTerm;
        }
        if saved.is_empty() {
            return UpdateOutcome::Applied;
        }

        let mut cards = CourseCardArray::new();
        for (index, card) in saved {
            cards.insert_at(*index, CourseCardOptions::from_serialized(card));
        }
        self.course_cards = cards;
        UpdateOutcome::Applied
    }

    pub fn serialize_cards(&self) -> Vec<SerializedCourseCardOptions> {
        self.course_cards.serialize()
    }
}
