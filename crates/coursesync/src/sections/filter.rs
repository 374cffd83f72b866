//! Attribute predicates over a card's sections.

use crate::models::{CourseCardOptions, Section, SectionFilter, SectionSelected};

/// The filter settings of one card, composed with logical AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionFilters {
    pub honors: SectionFilter,
    pub remote: SectionFilter,
    pub asynchronous: SectionFilter,
    pub mcallen: SectionFilter,
    pub include_full: bool,
}

impl SectionFilters {
    pub fn from_card(card: &CourseCardOptions) -> Self {
        Self {
            honors: card.honors,
            remote: card.remote,
            asynchronous: card.asynchronous,
            mcallen: card.mcallen,
            include_full: card.include_full,
        }
    }

    pub fn matches(&self, section: &Section) -> bool {
        self.honors.admits(section.honors)
            && self.remote.admits(section.remote)
            && self.asynchronous.admits(section.asynchronous)
            && self.mcallen.admits(section.mcallen)
            && (self.include_full || !section.is_full())
    }

    /// Entries passing every filter, in their original order.
    pub fn apply<'a>(
        &self,
        sections: &'a [SectionSelected],
    ) -> impl Iterator<Item = &'a SectionSelected> + 'a {
        let filters = *self;
        sections.iter().filter(move |s| filters.matches(&s.section))
    }
}
