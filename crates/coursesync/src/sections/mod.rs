//! Sorting and filtering of a card's sections.
mod filter;
mod sort;

pub use filter::SectionFilters;
pub use sort::{sort_sections, SortOrder, SortPolicy};

use crate::models::{CourseCardOptions, SectionSelected};

/// The sections a card shows: filtered by its predicates, then ordered by
/// its sort type and direction.
pub fn visible_sections(card: &CourseCardOptions) -> Vec<&SectionSelected> {
    let filters = SectionFilters::from_card(card);
    sort_sections(
        filters.apply(&card.sections),
        card.sort_type,
        card.sort_is_descending,
    )
}
