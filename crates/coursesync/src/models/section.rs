/// Section value objects, validated on construction
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::cmp::Ordering;

/// Instructional methods reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InstructionalMethod {
    #[serde(rename = "Face to Face")]
    FaceToFace,
    #[serde(rename = "Mixed, F2F and Remote")]
    MixedF2fRemote,
    #[serde(rename = "F2F or Remote")]
    F2fRemoteOption,
    #[serde(rename = "Synchronous Video/Web Conf")]
    SynchronousVideo,
    #[serde(rename = "Remote Only")]
    Remote,
    #[serde(rename = "Web Based")]
    WebBased,
    #[serde(rename = "Internship")]
    Internship,
    #[serde(rename = "Non-traditional")]
    Nontraditional,
    #[serde(rename = "Study abroad")]
    StudyAbroad,
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

impl InstructionalMethod {
    /// Parses the catalog label, e.g. `"Face to Face"`.
    pub fn from_label(label: &str) -> Option<Self> {
        let method = match label {
            "Face to Face" => Self::FaceToFace,
            "Mixed, F2F and Remote" => Self::MixedF2fRemote,
            "F2F or Remote" => Self::F2fRemoteOption,
            "Synchronous Video/Web Conf" => Self::SynchronousVideo,
            "Remote Only" => Self::Remote,
            "Web Based" => Self::WebBased,
            "Internship" => Self::Internship,
            "Non-traditional" => Self::Nontraditional,
            "Study abroad" => Self::StudyAbroad,
            "" => Self::Unspecified,
            _ => return None,
        };
        Some(method)
    }

    /// Rank used when sorting by instructional method; lower sorts first.
    ///
    /// Synchronous video has no rank of its own and shares the last slot
    /// with unspecified sections.
    pub fn priority(self) -> u8 {
        match self {
            Self::FaceToFace => 0,
            Self::MixedF2fRemote => 1,
            Self::F2fRemoteOption => 2,
            Self::Remote => 3,
            Self::WebBased => 4,
            Self::Internship => 5,
            Self::Nontraditional => 6,
            Self::StudyAbroad => 7,
            Self::SynchronousVideo | Self::Unspecified => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instructor {
    pub name: String,
}

/// Historical grade distribution for an instructor/course pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Grades {
    pub gpa: Option<f64>,
    #[serde(rename = "A", default)]
    pub a: u32,
    #[serde(rename = "B", default)]
    pub b: u32,
    #[serde(rename = "C", default)]
    pub c: u32,
    #[serde(rename = "D", default)]
    pub d: u32,
    #[serde(rename = "F", default)]
    pub f: u32,
}

/// A course section. Immutable once built; construct through
/// [`Section::try_from`] or serde so validation always runs.
///
/// ```compile_fail
/// use coursesync::models::Section;
/// fn rename(section: &mut Section) {
///     section.subject = String::new();
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSection", rename_all = "camelCase")]
pub struct Section {
    pub(crate) id: u64,
    pub(crate) crn: u64,
    pub(crate) subject: String,
    pub(crate) course_num: String,
    pub(crate) section_num: String,
    pub(crate) min_credits: u32,
    pub(crate) max_credits: Option<u32>,
    pub(crate) current_enrollment: u32,
    pub(crate) max_enrollment: u32,
    pub(crate) honors: bool,
    pub(crate) remote: bool,
    pub(crate) asynchronous: bool,
    pub(crate) mcallen: bool,
    pub(crate) instructor: Instructor,
    pub(crate) grades: Option<Grades>,
    pub(crate) instructional_method: InstructionalMethod,
}

impl Section {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn crn(&self) -> u64 {
        self.crn
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn course_num(&self) -> &str {
        &self.course_num
    }

    pub fn section_num(&self) -> &str {
        &self.section_num
    }

    pub fn min_credits(&self) -> u32 {
        self.min_credits
    }

    pub fn max_credits(&self) -> Option<u32> {
        self.max_credits
    }

    pub fn current_enrollment(&self) -> u32 {
        self.current_enrollment
    }

    pub fn max_enrollment(&self) -> u32 {
        self.max_enrollment
    }

    pub fn honors(&self) -> bool {
        self.honors
    }

    pub fn remote(&self) -> bool {
        self.remote
    }

    pub fn asynchronous(&self) -> bool {
        self.asynchronous
    }

    pub fn mcallen(&self) -> bool {
        self.mcallen
    }

    pub fn instructor(&self) -> &Instructor {
        &self.instructor
    }

    pub fn grades(&self) -> Option<&Grades> {
        self.grades.as_ref()
    }

    pub fn instructional_method(&self) -> InstructionalMethod {
        self.instructional_method
    }

    /// True when the section number has not been assigned yet.
    pub fn is_tba(&self) -> bool {
        self.section_num.trim().eq_ignore_ascii_case("TBA")
    }

    pub fn is_full(&self) -> bool {
        self.current_enrollment >= self.max_enrollment
    }

    /// Remaining seats; negative when the section is over-enrolled.
    pub fn open_seats(&self) -> i64 {
        i64::from(self.max_enrollment) - i64::from(self.current_enrollment)
    }

    pub fn gpa(&self) -> Option<f64> {
        self.grades.as_ref().and_then(|g| g.gpa)
    }

    /// Credit hours as shown to users: `"3"` or `"1-4"`.
    pub fn credits_label(&self) -> String {
        match self.max_credits {
            Some(max) if max != self.min_credits => format!("{}-{}", self.min_credits, max),
            _ => self.min_credits.to_string(),
        }
    }
}

/// Sort key for a section number: numeric ones first in numeric order, then
/// the rest lexically. The trimmed text breaks ties such as `"01"`/`"1"`.
fn section_num_key(num: &str) -> (bool, u32, &str) {
    let trimmed = num.trim();
    match trimmed.parse::<u32>() {
        Ok(n) => (false, n, trimmed),
        Err(_) => (true, 0, trimmed),
    }
}

/// Total order on section numbers; see [`section_num_key`].
pub fn compare_section_nums(a: &str, b: &str) -> Ordering {
    section_num_key(a).cmp(&section_num_key(b))
}

/// Wire shape of a section before validation. Every field is optional so
/// a missing value becomes a [`ValidationError`] naming it, not a serde error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSection {
    pub id: Option<Number>,
    pub crn: Option<Number>,
    pub subject: Option<String>,
    pub course_num: Option<String>,
    pub section_num: Option<String>,
    pub min_credits: Option<Number>,
    pub max_credits: Option<Number>,
    pub current_enrollment: Option<Number>,
    pub max_enrollment: Option<Number>,
    pub honors: Option<bool>,
    pub remote: Option<bool>,
    pub asynchronous: Option<bool>,
    pub mcallen: Option<bool>,
    pub instructor: Option<Instructor>,
    pub grades: Option<Grades>,
    pub instructional_method: Option<String>,
}

fn required_int(field: &'static str, value: Option<&Number>) -> Result<u64, ValidationError> {
    let value = value.ok_or_else(|| ValidationError::missing(field))?;
    value
        .as_u64()
        .ok_or_else(|| ValidationError::new(field, value.to_string()))
}

fn required_u32(field: &'static str, value: Option<&Number>) -> Result<u32, ValidationError> {
    let n = required_int(field, value)?;
    u32::try_from(n).map_err(|_| ValidationError::new(field, format!("{n} is out of range")))
}

fn required_text(field: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    match value {
        Some(text) if !text.is_empty() => Ok(text),
        Some(_) => Err(ValidationError::new(field, "empty string")),
        None => Err(ValidationError::missing(field)),
    }
}

fn required_flag(field: &'static str, value: Option<bool>) -> Result<bool, ValidationError> {
    value.ok_or_else(|| ValidationError::missing(field))
}

impl TryFrom<RawSection> for Section {
    type Error = ValidationError;

    fn try_from(raw: RawSection) -> Result<Self, Self::Error> {
        let max_credits = match raw.max_credits.as_ref() {
            None => None,
            Some(n) => Some(required_u32("maxCredits", Some(n))?),
        };

        let instructional_method = match raw.instructional_method.as_deref() {
            None => InstructionalMethod::Unspecified,
            Some(label) => InstructionalMethod::from_label(label).ok_or_else(|| {
                ValidationError::new("instructionalMethod", format!("unknown method {label:?}"))
            })?,
        };

        let instructor = raw
            .instructor
            .filter(|i| !i.name.is_empty())
            .ok_or_else(|| ValidationError::missing("instructor"))?;

        Ok(Section {
            id: required_int("id", raw.id.as_ref())?,
            crn: required_int("crn", raw.crn.as_ref())?,
            subject: required_text("subject", raw.subject)?,
            course_num: required_text("courseNum", raw.course_num)?,
            section_num: required_text("sectionNum", raw.section_num)?,
            min_credits: required_u32("minCredits", raw.min_credits.as_ref())?,
            max_credits,
            current_enrollment: required_u32("currentEnrollment", raw.current_enrollment.as_ref())?,
            max_enrollment: required_u32("maxEnrollment", raw.max_enrollment.as_ref())?,
            honors: required_flag("honors", raw.honors)?,
            remote: required_flag("remote", raw.remote)?,
            asynchronous: required_flag("asynchronous", raw.asynchronous)?,
            mcallen: required_flag("mcallen", raw.mcallen)?,
            instructor,
            grades: raw.grades,
            instructional_method,
        })
    }
}
