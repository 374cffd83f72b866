//! HTTP client for the remote session store and scheduler.
//!
//! Endpoints (relative to the configured base URL):
//! 1. `GET sessions/get_saved_courses?term=...` restores a term's cards
//! 2. `POST sessions/save_courses` persists them (204, no body)
//! 3. `GET api/sections?term=...&subject=...&course_num=...` lists a course's sections
//! 4. `POST scheduler/generate` generates schedules from a request
//!
//! Nothing here retries; failures are returned to the caller.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::models::{Meeting, RawSection, Section, SectionSelected, SerializedCourseCardOptions};
use crate::request::{GenerateOutcome, GenerateResponse, ScheduleRequest};
use crate::state::SavedCourseCards;
use futures::future::BoxFuture;
use futures::FutureExt;
use rand::Rng;
use regex::Regex;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

const SAVED_COURSES_PATH: &str = "sessions/get_saved_courses";
const SAVE_COURSES_PATH: &str = "sessions/save_courses";
const SECTIONS_PATH: &str = "api/sections";
const GENERATE_PATH: &str = "scheduler/generate";

static COURSE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z]{2,5})\s+([0-9]{3}[A-Za-z]?)\s*$").unwrap());

/// Splits `"CSCE 121"` into `("CSCE", "121")`. The subject is upper-cased.
pub fn parse_course(course: &str) -> Result<(String, String), SyncError> {
    COURSE_REGEX
        .captures(course)
        .and_then(|caps| Some((caps.get(1)?, caps.get(2)?)))
        .map(|(subject, number)| (subject.as_str().to_uppercase(), number.as_str().to_string()))
        .ok_or_else(|| SyncError::InvalidCourse {
            course: course.to_string(),
        })
}

/// The remote collaborators the autosave orchestrator talks to.
pub trait CourseApi: Send + Sync + 'static {
    fn load_saved_courses<'a>(
        &'a self,
        term: &'a str,
    ) -> BoxFuture<'a, Result<SavedCourseCards, SyncError>>;

    fn save_courses<'a>(
        &'a self,
        term: &'a str,
        cards: &'a [SerializedCourseCardOptions],
    ) -> BoxFuture<'a, Result<(), SyncError>>;

    fn fetch_sections<'a>(
        &'a self,
        term: &'a str,
        course: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SectionSelected>, SyncError>>;

    fn generate_schedules<'a>(
        &'a self,
        request: &'a ScheduleRequest,
    ) -> BoxFuture<'a, Result<GenerateOutcome, SyncError>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveCoursesBody<'a> {
    term: &'a str,
    course_cards: &'a [SerializedCourseCardOptions],
}

#[derive(Deserialize)]
struct CatalogEntry {
    section: RawSection,
    #[serde(default)]
    meetings: Vec<Meeting>,
}

/// reqwest-backed [`CourseApi`].
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url()?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        Ok(self.base_url.join(path)?)
    }

    /// Fetches the cards saved for `term`; an empty map if none were saved.
    pub async fn get_saved_courses(&self, term: &str) -> Result<SavedCourseCards, SyncError> {
        let correlation_id = generate_correlation_id();
        let mut url = self.endpoint(SAVED_COURSES_PATH)?;
        url.query_pairs_mut().append_pair("term", term);

        debug!(correlation_id = %correlation_id, url = %url, "Fetching saved courses");

        let response = self.client.get(url).send().await?;
        let response = ensure_success(response, SAVED_COURSES_PATH).await?;
        let text = response.text().await?;
        let saved: SavedCourseCards = serde_json::from_str(&text)?;

        info!(
            correlation_id = %correlation_id,
            term = %term,
            cards = saved.len(),
            "Fetched saved courses"
        );
        Ok(saved)
    }

    /// Persists a term's cards.
    pub async fn post_save_courses(
        &self,
        term: &str,
        cards: &[SerializedCourseCardOptions],
    ) -> Result<(), SyncError> {
        let correlation_id = generate_correlation_id();
        let url = self.endpoint(SAVE_COURSES_PATH)?;
        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .json(&SaveCoursesBody {
                term,
                course_cards: cards,
            })
            .send()
            .await?;

        let status = response.status();
        let response = ensure_success(response, SAVE_COURSES_PATH).await?;
        if status != StatusCode::NO_CONTENT {
            let body = response.text().await.unwrap_or_default();
            warn!(
                correlation_id = %correlation_id,
                status = status.as_u16(),
                body_len = body.len(),
                "save_courses answered without 204"
            );
        }

        info!(
            correlation_id = %correlation_id,
            term = %term,
            cards = cards.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Saved courses"
        );
        Ok(())
    }

    /// Lists the sections of `course` in `term`, all unselected.
    pub async fn get_sections(
        &self,
        term: &str,
        course: &str,
    ) -> Result<Vec<SectionSelected>, SyncError> {
        let (subject, course_num) = parse_course(course)?;
        let correlation_id = generate_correlation_id();
        let mut url = self.endpoint(SECTIONS_PATH)?;
        url.query_pairs_mut()
            .append_pair("term", term)
            .append_pair("subject", &subject)
            .append_pair("course_num", &course_num);

        debug!(correlation_id = %correlation_id, url = %url, "Fetching sections");

        let response = self.client.get(url).send().await?;
        let response = ensure_success(response, SECTIONS_PATH).await?;
        let text = response.text().await?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&text)?;

        let sections = entries
            .into_iter()
            .map(|entry| {
                let section = Section::try_from(entry.section).inspect_err(|e| {
                    error!(correlation_id = %correlation_id, error = %e, "Invalid section data");
                })?;
                Ok(SectionSelected::unselected(section, entry.meetings))
            })
            .collect::<Result<Vec<_>, SyncError>>()?;

        info!(
            correlation_id = %correlation_id,
            course = %course,
            sections = sections.len(),
            "Fetched sections"
        );
        Ok(sections)
    }

    /// Sends a generation request. No schedules is a normal outcome.
    pub async fn post_generate(
        &self,
        request: &ScheduleRequest,
    ) -> Result<GenerateOutcome, SyncError> {
        let correlation_id = generate_correlation_id();
        let url = self.endpoint(GENERATE_PATH)?;
        let start = Instant::now();

        info!(
            correlation_id = %correlation_id,
            term = %request.term,
            courses = request.courses.len(),
            "Requesting schedule generation"
        );

        let response = self.client.post(url).json(request).send().await?;
        let response = ensure_success(response, GENERATE_PATH).await?;
        let text = response.text().await?;
        let outcome = GenerateOutcome::from(serde_json::from_str::<GenerateResponse>(&text)?);

        match &outcome {
            GenerateOutcome::Schedules(schedules) => info!(
                correlation_id = %correlation_id,
                schedules = schedules.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Generated schedules"
            ),
            GenerateOutcome::NoSchedules { message } => info!(
                correlation_id = %correlation_id,
                message = %message,
                duration_ms = start.elapsed().as_millis() as u64,
                "No schedules found"
            ),
        }
        Ok(outcome)
    }
}

impl CourseApi for ApiClient {
    fn load_saved_courses<'a>(
        &'a self,
        term: &'a str,
    ) -> BoxFuture<'a, Result<SavedCourseCards, SyncError>> {
        self.get_saved_courses(term).boxed()
    }

    fn save_courses<'a>(
        &'a self,
        term: &'a str,
        cards: &'a [SerializedCourseCardOptions],
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        self.post_save_courses(term, cards).boxed()
    }

    fn fetch_sections<'a>(
        &'a self,
        term: &'a str,
        course: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SectionSelected>, SyncError>> {
        self.get_sections(term, course).boxed()
    }

    fn generate_schedules<'a>(
        &'a self,
        request: &'a ScheduleRequest,
    ) -> BoxFuture<'a, Result<GenerateOutcome, SyncError>> {
        self.post_generate(request).boxed()
    }
}

/// Turns a non-2xx response into [`SyncError::UnexpectedStatus`].
async fn ensure_success(response: Response, endpoint: &str) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(endpoint = endpoint, status = status.as_u16(), "Request failed");
    Err(SyncError::UnexpectedStatus {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Short id tying together the log lines of one request.
fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}
