/// Section, meeting and course card types
mod card;
mod meeting;
mod section;

pub use card::*;
pub use meeting::Meeting;
pub use section::*;

/// Builds a valid open section for tests.
#[cfg(test)]
pub(crate) fn test_section(id: u64, section_num: &str, instructor: &str, honors: bool) -> Section {
    Section {
        id,
        crn: 10_000 + id,
        subject: "CSCE".to_string(),
        course_num: "121".to_string(),
        section_num: section_num.to_string(),
        min_credits: 4,
        max_credits: None,
        current_enrollment: 10,
        max_enrollment: 25,
        honors,
        remote: false,
        asynchronous: false,
        mcallen: false,
        instructor: Instructor {
            name: instructor.to_string(),
        },
        grades: None,
        instructional_method: InstructionalMethod::FaceToFace,
    }
}
