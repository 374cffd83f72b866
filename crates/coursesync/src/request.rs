//! Schedule generation request building.

use crate::models::{CourseCardArray, SectionFilter};
use crate::sections::SectionFilters;
use serde::{Deserialize, Serialize};

/// How much the user customizes each course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomizationLevel {
    /// Legacy mode: honors/remote preferences are forwarded to the backend.
    Basic,
    /// Per-section selection; honors/remote are sent as no preference since
    /// the selected sections already carry that intent.
    #[default]
    Section,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRequest {
    pub course: String,
    /// Section numbers, e.g. `"501"`
    pub sections: Vec<String>,
    pub honors: SectionFilter,
    pub remote: SectionFilter,
}

/// Body of `POST scheduler/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub term: String,
    pub courses: Vec<CourseRequest>,
}

impl ScheduleRequest {
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

/// Projects the cards into a generation request. Never mutates the cards.
///
/// A card contributes when it has a course, is neither disabled nor loading,
/// and at least one of its selected sections passes the card's current
/// filters. Filters are applied here rather than at selection time, so a
/// selection made under looser filters is not sent once they tighten.
pub fn build_schedule_request(
    cards: &CourseCardArray,
    term: &str,
    level: CustomizationLevel,
) -> ScheduleRequest {
    let courses = cards
        .iter()
        .filter(|(_, card)| !card.disabled && !card.loading)
        .filter_map(|(_, card)| {
            let course = card.course_id()?;
            let filters = SectionFilters::from_card(card);
            let sections: Vec<String> = filters
                .apply(&card.sections)
                .filter(|s| s.selected)
                .map(|s| s.section.section_num.clone())
                .collect();
            if sections.is_empty() {
                return None;
            }

            let (honors, remote) = match level {
                CustomizationLevel::Basic => (card.honors, card.remote),
                CustomizationLevel::Section => {
                    (SectionFilter::NoPreference, SectionFilter::NoPreference)
                }
            };

            Some(CourseRequest {
                course: course.to_string(),
                sections,
                honors,
                remote,
            })
        })
        .collect();

    ScheduleRequest {
        term: term.to_string(),
        courses,
    }
}

/// One generated schedule: the sections it is made of, as the backend
/// describes them.
pub type Schedule = Vec<serde_json::Value>;

/// Body of a `scheduler/generate` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    #[serde(default)]
    pub message: String,
}

/// What schedule generation produced. Finding nothing is a normal outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    Schedules(Vec<Schedule>),
    NoSchedules { message: String },
}

impl From<GenerateResponse> for GenerateOutcome {
    fn from(response: GenerateResponse) -> Self {
        if response.schedules.is_empty() {
            GenerateOutcome::NoSchedules {
                message: response.message,
            }
        } else {
            GenerateOutcome::Schedules(response.schedules)
        }
    }
}
