//! Section ordering for a card.
//!
//! Every [`SortType`] maps to one [`SortPolicy`] in a single table: its label,
//! its default direction and how it compares sections. Keyed orders break ties
//! by section number ascending; the grouped default order keeps TBA sections
//! at the bottom in both directions.

use crate::models::{compare_section_nums, Section, SectionSelected, SortType};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy)]
pub enum SortOrder {
    /// Group by (instructor, honors), order groups by lowest section number.
    Grouped,
    /// Total order on one field.
    Keyed(fn(&Section, &Section) -> Ordering),
}

#[derive(Debug, Clone, Copy)]
pub struct SortPolicy {
    pub sort_type: SortType,
    pub label: &'static str,
    /// Direction applied when the user switches to this sort type.
    pub default_descending: bool,
    pub order: SortOrder,
}

fn by_section_number(a: &Section, b: &Section) -> Ordering {
    compare_section_nums(&a.section_num, &b.section_num)
}

fn by_gpa(a: &Section, b: &Section) -> Ordering {
    // no grade data sorts as the lowest GPA
    let gpa = |s: &Section| s.gpa().unwrap_or(f64::NEG_INFINITY);
    gpa(a).total_cmp(&gpa(b))
}

fn by_instructor(a: &Section, b: &Section) -> Ordering {
    a.instructor.name.cmp(&b.instructor.name)
}

fn by_open_seats(a: &Section, b: &Section) -> Ordering {
    a.open_seats().cmp(&b.open_seats())
}

fn by_honors(a: &Section, b: &Section) -> Ordering {
    a.honors.cmp(&b.honors)
}

fn by_instructional_method(a: &Section, b: &Section) -> Ordering {
    a.instructional_method
        .priority()
        .cmp(&b.instructional_method.priority())
}

// Indexed by `SortType as usize`.
static SORT_POLICIES: [SortPolicy; 7] = [
    SortPolicy {
        sort_type: SortType::Default,
        label: "Default",
        default_descending: true,
        order: SortOrder::Grouped,
    },
    SortPolicy {
        sort_type: SortType::SectionNumber,
        label: "Section Number",
        default_descending: false,
        order: SortOrder::Keyed(by_section_number),
    },
    SortPolicy {
        sort_type: SortType::Gpa,
        label: "GPA",
        default_descending: true,
        order: SortOrder::Keyed(by_gpa),
    },
    SortPolicy {
        sort_type: SortType::Instructor,
        label: "Instructor",
        default_descending: false,
        order: SortOrder::Keyed(by_instructor),
    },
    SortPolicy {
        sort_type: SortType::OpenSeats,
        label: "Open Seats",
        default_descending: true,
        order: SortOrder::Keyed(by_open_seats),
    },
    SortPolicy {
        sort_type: SortType::Honors,
        label: "Honors",
        default_descending: true,
        order: SortOrder::Keyed(by_honors),
    },
    SortPolicy {
        sort_type: SortType::InstructionalMethod,
        label: "Instructional Method",
        default_descending: true,
        order: SortOrder::Keyed(by_instructional_method),
    },
];

impl SortType {
    pub fn policy(self) -> &'static SortPolicy {
        &SORT_POLICIES[self as usize]
    }

    pub fn label(self) -> &'static str {
        self.policy().label
    }
}

/// Orders a card's sections. Ascending order is computed first and
/// `descending` reverses it as the last step.
pub fn sort_sections<'a, I>(
    sections: I,
    sort_type: SortType,
    descending: bool,
) -> Vec<&'a SectionSelected>
where
    I: IntoIterator<Item = &'a SectionSelected>,
{
    match sort_type.policy().order {
        SortOrder::Grouped => grouped_order(sections, descending),
        SortOrder::Keyed(compare) => {
            let mut ordered: Vec<&SectionSelected> = sections.into_iter().collect();
            ordered.sort_by(|a, b| {
                compare(&a.section, &b.section)
                    .then_with(|| by_section_number(&a.section, &b.section))
            });
            if descending {
                ordered.reverse();
            }
            ordered
        }
    }
}

struct Group<'a> {
    instructor: &'a str,
    honors: bool,
    lowest: &'a str,
    members: Vec<&'a SectionSelected>,
}

fn grouped_order<'a, I>(sections: I, descending: bool) -> Vec<&'a SectionSelected>
where
    I: IntoIterator<Item = &'a SectionSelected>,
{
    let (tba, assigned): (Vec<&SectionSelected>, Vec<&SectionSelected>) =
        sections.into_iter().partition(|s| s.section.is_tba());

    let mut groups: Vec<Group<'a>> = Vec::new();
    for entry in assigned {
        let section = &entry.section;
        let existing = groups
            .iter_mut()
            .find(|g| g.instructor == section.instructor.name && g.honors == section.honors);
        match existing {
            Some(group) => {
                if compare_section_nums(&section.section_num, group.lowest) == Ordering::Less {
                    group.lowest = &section.section_num;
                }
                group.members.push(entry);
            }
            None => groups.push(Group {
                instructor: &section.instructor.name,
                honors: section.honors,
                lowest: &section.section_num,
                members: vec![entry],
            }),
        }
    }

    groups.sort_by(|a, b| compare_section_nums(a.lowest, b.lowest));

    let mut ordered: Vec<&SectionSelected> =
        groups.into_iter().flat_map(|g| g.members).collect();
    if descending {
        ordered.reverse();
    }
    // TBA goes last regardless of direction
    ordered.extend(tba);
    ordered
}
