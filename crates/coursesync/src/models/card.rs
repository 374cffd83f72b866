//! Course cards: one user-configured course search/selection unit each.

use super::meeting::Meeting;
use super::section::Section;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Tri-state preference applied to a boolean section attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionFilter {
    #[default]
    NoPreference,
    Exclude,
    Only,
}

impl SectionFilter {
    /// Whether a section whose attribute is `value` passes this filter.
    pub fn admits(self, value: bool) -> bool {
        match self {
            SectionFilter::NoPreference => true,
            SectionFilter::Exclude => !value,
            SectionFilter::Only => value,
        }
    }
}

/// How a card orders its sections. Stored on the wire as its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SortType {
    /// Groups sections by instructor and honors status, orders groups by
    /// their lowest section number, TBA sections last.
    #[default]
    Default,
    SectionNumber,
    Gpa,
    Instructor,
    OpenSeats,
    Honors,
    InstructionalMethod,
}

impl SortType {
    pub const ALL: [SortType; 7] = [
        SortType::Default,
        SortType::SectionNumber,
        SortType::Gpa,
        SortType::Instructor,
        SortType::OpenSeats,
        SortType::Honors,
        SortType::InstructionalMethod,
    ];
}

impl From<SortType> for u8 {
    fn from(sort_type: SortType) -> Self {
        sort_type as u8
    }
}

impl TryFrom<u8> for SortType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SortType::ALL
            .get(usize::from(value))
            .copied()
            .ok_or_else(|| format!("unknown sort type {value}"))
    }
}

/// A candidate section within a card and whether the user chose it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSelected {
    pub section: Section,
    #[serde(default)]
    pub meetings: Vec<Meeting>,
    #[serde(default)]
    pub selected: bool,
}

impl SectionSelected {
    pub fn unselected(section: Section, meetings: Vec<Meeting>) -> Self {
        Self {
            section,
            meetings,
            selected: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseCardOptions {
    /// `"<SUBJECT> <NUMBER>"`, e.g. `"CSCE 121"`
    pub course: Option<String>,
    pub honors: SectionFilter,
    pub remote: SectionFilter,
    pub asynchronous: SectionFilter,
    pub mcallen: SectionFilter,
    pub include_full: bool,
    pub has_honors: bool,
    pub has_remote: bool,
    pub has_asynchronous: bool,
    pub has_mcallen: bool,
    pub sections: Vec<SectionSelected>,
    pub loading: bool,
    pub collapsed: bool,
    pub disabled: bool,
    pub sort_type: SortType,
    pub sort_is_descending: bool,
    /// Saved section ids not yet matched against a fetched catalog. They are
    /// what gets persisted until sections arrive.
    pub pending_selection: Vec<u64>,
}

impl Default for CourseCardOptions {
    fn default() -> Self {
        Self {
            course: None,
            honors: SectionFilter::NoPreference,
            remote: SectionFilter::NoPreference,
            asynchronous: SectionFilter::NoPreference,
            mcallen: SectionFilter::NoPreference,
            include_full: false,
            has_honors: false,
            has_remote: false,
            has_asynchronous: false,
            has_mcallen: false,
            sections: Vec::new(),
            loading: false,
            collapsed: false,
            disabled: false,
            sort_type: SortType::Default,
            sort_is_descending: SortType::Default.policy().default_descending,
            pending_selection: Vec::new(),
        }
    }
}

impl CourseCardOptions {
    /// The course string if it is set and not blank.
    pub fn course_id(&self) -> Option<&str> {
        self.course.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    pub fn selected_sections(&self) -> impl Iterator<Item = &SectionSelected> {
        self.sections.iter().filter(|s| s.selected)
    }

    /// Applies a partial update. A sort type change without an explicit
    /// direction resets the direction to the new type's default.
    pub fn apply(&mut self, update: CourseCardUpdate) {
        let course_changed = update
            .course
            .as_ref()
            .is_some_and(|c| Some(c) != self.course.as_ref());

        if let Some(course) = update.course {
            self.course = Some(course);
        }
        if let Some(honors) = update.honors {
            self.honors = honors;
        }
        if let Some(remote) = update.remote {
            self.remote = remote;
        }
        if let Some(asynchronous) = update.asynchronous {
            self.asynchronous = asynchronous;
        }
        if let Some(mcallen) = update.mcallen {
            self.mcallen = mcallen;
        }
        if let Some(include_full) = update.include_full {
            self.include_full = include_full;
        }
        match update.sections {
            Some(sections) => self.set_sections(sections),
            None if course_changed => self.set_sections(Vec::new()),
            None => {}
        }
        if let Some(loading) = update.loading {
            self.loading = loading;
        }
        if let Some(collapsed) = update.collapsed {
            self.collapsed = collapsed;
        }
        if let Some(disabled) = update.disabled {
            self.disabled = disabled;
        }
        if let Some(sort_type) = update.sort_type {
            if sort_type != self.sort_type && update.sort_is_descending.is_none() {
                self.sort_is_descending = sort_type.policy().default_descending;
            }
            self.sort_type = sort_type;
        }
        if let Some(descending) = update.sort_is_descending {
            self.sort_is_descending = descending;
        }
    }

    fn set_sections(&mut self, sections: Vec<SectionSelected>) {
        self.has_honors = sections.iter().any(|s| s.section.honors);
        self.has_remote = sections.iter().any(|s| s.section.remote);
        self.has_asynchronous = sections.iter().any(|s| s.section.asynchronous);
        self.has_mcallen = sections.iter().any(|s| s.section.mcallen);
        self.sections = sections;
        self.pending_selection.clear();
    }

    /// Rebuilds a card from its persisted form. Sections are left empty
    /// until they are fetched and passed through [`resolve_selection`]; the
    /// saved ids are kept in `pending_selection` meanwhile.
    pub fn from_serialized(saved: &SerializedCourseCardOptions) -> Self {
        let defaults = Self::default();
        let sort_type = saved.sort_type.unwrap_or(defaults.sort_type);
        Self {
            course: saved.course.clone(),
            honors: saved.honors.unwrap_or_default(),
            remote: saved.remote.unwrap_or_default(),
            asynchronous: saved.asynchronous.unwrap_or_default(),
            mcallen: saved.mcallen.unwrap_or_default(),
            include_full: saved.include_full.unwrap_or(defaults.include_full),
            collapsed: saved.collapsed.unwrap_or(defaults.collapsed),
            disabled: saved.disabled.unwrap_or(defaults.disabled),
            sort_type,
            sort_is_descending: saved
                .sort_is_descending
                .unwrap_or(sort_type.policy().default_descending),
            pending_selection: saved.sections.clone(),
            ..defaults
        }
    }

    pub fn to_serialized(&self) -> SerializedCourseCardOptions {
        SerializedCourseCardOptions {
            course: self.course.clone(),
            honors: Some(self.honors),
            remote: Some(self.remote),
            asynchronous: Some(self.asynchronous),
            mcallen: Some(self.mcallen),
            include_full: Some(self.include_full),
            sections: if self.pending_selection.is_empty() {
                self.selected_sections().map(|s| s.section.id).collect()
            } else {
                self.pending_selection.clone()
            },
            collapsed: Some(self.collapsed),
            sort_type: Some(self.sort_type),
            sort_is_descending: Some(self.sort_is_descending),
            disabled: Some(self.disabled),
        }
    }
}

/// Marks the catalog entries whose ids were saved as selected.
pub fn resolve_selection(
    catalog: Vec<SectionSelected>,
    selected_ids: &[u64],
) -> Vec<SectionSelected> {
    let selected: HashSet<u64> = selected_ids.iter().copied().collect();
    catalog
        .into_iter()
        .map(|mut entry| {
            entry.selected = selected.contains(&entry.section.id);
            entry
        })
        .collect()
}

/// Partial update for a card; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseCardUpdate {
    pub course: Option<String>,
    pub honors: Option<SectionFilter>,
    pub remote: Option<SectionFilter>,
    pub asynchronous: Option<SectionFilter>,
    pub mcallen: Option<SectionFilter>,
    pub include_full: Option<bool>,
    pub sections: Option<Vec<SectionSelected>>,
    pub loading: Option<bool>,
    pub collapsed: Option<bool>,
    pub disabled: Option<bool>,
    pub sort_type: Option<SortType>,
    pub sort_is_descending: Option<bool>,
}

impl CourseCardUpdate {
    fn touches_anything_but_loading(&self) -> bool {
        self.course.is_some()
            || self.honors.is_some()
            || self.remote.is_some()
            || self.asynchronous.is_some()
            || self.mcallen.is_some()
            || self.include_full.is_some()
            || self.sections.is_some()
            || self.collapsed.is_some()
            || self.disabled.is_some()
            || self.sort_type.is_some()
            || self.sort_is_descending.is_some()
    }

    /// Whether applying this update should be persisted. Pure loading
    /// toggles are not, and neither is anything that starts a fetch.
    pub fn warrants_save(&self) -> bool {
        self.loading != Some(true) && self.touches_anything_but_loading()
    }
}

/// All cards of a term, keyed by position.
///
/// `num_cards_created` only ever grows; it mints the next index and says
/// nothing about how many cards are alive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseCardArray {
    cards: BTreeMap<usize, CourseCardOptions>,
    num_cards_created: usize,
}

impl CourseCardArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a term with one blank card.
    pub fn with_blank_card() -> Self {
        let mut cards = Self::new();
        cards.add(CourseCardOptions::default());
        cards
    }

    pub fn add(&mut self, card: CourseCardOptions) -> usize {
        let index = self.num_cards_created;
        self.cards.insert(index, card);
        self.num_cards_created = index.saturating_add(1);
        index
    }

    /// Places a card at a specific index, as when restoring saved cards.
    pub fn insert_at(&mut self, index: usize, card: CourseCardOptions) {
        self.cards.insert(index, card);
        self.num_cards_created = self.num_cards_created.max(index.saturating_add(1));
    }

    pub fn remove(&mut self, index: usize) -> Option<CourseCardOptions> {
        self.cards.remove(&index)
    }

    pub fn get(&self, index: usize) -> Option<&CourseCardOptions> {
        self.cards.get(&index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CourseCardOptions> {
        self.cards.get_mut(&index)
    }

    /// Cards in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &CourseCardOptions)> {
        self.cards.iter().map(|(index, card)| (*index, card))
    }

    pub fn num_cards_created(&self) -> usize {
        self.num_cards_created
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn any_loading(&self) -> bool {
        self.cards.values().any(|c| c.loading)
    }

    /// Cards in index order, in their persisted form.
    pub fn serialize(&self) -> Vec<SerializedCourseCardOptions> {
        self.cards.values().map(CourseCardOptions::to_serialized).collect()
    }
}

/// Persisted form of a card. Sections are reduced to the ids of the
/// selected ones to keep saved sessions small.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedCourseCardOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<SectionFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub honors: Option<SectionFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asynchronous: Option<SectionFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcallen: Option<SectionFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_full: Option<bool>,
    #[serde(default)]
    pub sections: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_type: Option<SortType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_is_descending: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}
