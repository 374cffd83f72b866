use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use coursesync::models::{SectionFilter, SerializedCourseCardOptions};
use coursesync::request::{CourseRequest, GenerateOutcome, ScheduleRequest};
use coursesync::{ApiClient, SyncConfig, SyncError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

type Saves = Arc<Mutex<Vec<Value>>>;

async fn get_saved_courses(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("term").map(String::as_str) {
        Some("202031") => Json(json!({
            "0": { "course": "CSCE 121", "sections": [1], "sortType": 3, "sortIsDescending": false },
            "2": { "course": "MATH 151", "honors": "only", "sections": [] }
        })),
        _ => Json(json!({})),
    }
}

async fn post_save_courses(State(saves): State<Saves>, Json(body): Json<Value>) -> StatusCode {
    saves.lock().unwrap().push(body);
    StatusCode::NO_CONTENT
}

fn section_json(id: u64, section_num: &str) -> Value {
    json!({
        "id": id,
        "crn": 40_000 + id,
        "subject": "CSCE",
        "courseNum": "121",
        "sectionNum": section_num,
        "minCredits": 4,
        "maxCredits": null,
        "currentEnrollment": 25,
        "maxEnrollment": 25,
        "honors": false,
        "remote": false,
        "asynchronous": false,
        "mcallen": false,
        "instructor": { "name": "Aakash Tyagi" },
        "grades": null,
        "instructionalMethod": "Face to Face"
    })
}

async fn get_sections(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("course_num").map(String::as_str) {
        Some("121") => Json(json!([
            {
                "section": section_json(1, "501"),
                "meetings": [{ "id": 7, "meetingDays": [true, false, true, false, true, false, false], "meetingType": "LEC" }]
            },
            { "section": section_json(2, "502"), "meetings": [] }
        ])),
        _ => {
            let mut broken = section_json(3, "200");
            broken["honors"] = Value::Null;
            Json(json!([{ "section": broken, "meetings": [] }]))
        }
    }
}

async fn post_generate(Json(body): Json<Value>) -> Response {
    if body["term"] == "000000" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "scheduler crashed").into_response();
    }
    Json(json!({ "schedules": [], "message": "No schedules found. Try widening your search." }))
        .into_response()
}

async fn spawn_server() -> (ApiClient, Saves) {
    let saves = Saves::default();
    let router = Router::new()
        .route("/sessions/get_saved_courses", get(get_saved_courses))
        .route("/sessions/save_courses", post(post_save_courses))
        .route("/api/sections", get(get_sections))
        .route("/scheduler/generate", post(post_generate))
        .with_state(Arc::clone(&saves));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let config = SyncConfig {
        api_base_url: format!("http://{addr}"),
        ..Default::default()
    };
    (ApiClient::new(&config).unwrap(), saves)
}

fn request(term: &str) -> ScheduleRequest {
    ScheduleRequest {
        term: term.to_string(),
        courses: vec![CourseRequest {
            course: "CSCE 121".to_string(),
            sections: vec!["501".to_string()],
            honors: SectionFilter::NoPreference,
            remote: SectionFilter::NoPreference,
        }],
    }
}

#[tokio::test]
async fn test_saved_courses_keyed_by_index() {
    let (client, _) = spawn_server().await;

    let saved = client.get_saved_courses("202031").await.unwrap();
    assert_eq!(saved.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
    assert_eq!(saved[&0].sections, vec![1]);
    assert_eq!(saved[&0].sort_is_descending, Some(false));
    assert_eq!(saved[&2].honors, Some(SectionFilter::Only));

    assert!(client.get_saved_courses("201931").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_save_sends_term_and_cards() {
    let (client, saves) = spawn_server().await;
    let cards = vec![SerializedCourseCardOptions {
        course: Some("CSCE 121".to_string()),
        sections: vec![1, 2],
        ..Default::default()
    }];

    client.post_save_courses("202031", &cards).await.unwrap();

    let saves = saves.lock().unwrap();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0]["term"], "202031");
    assert_eq!(saves[0]["courseCards"][0]["course"], "CSCE 121");
    assert_eq!(saves[0]["courseCards"][0]["sections"], json!([1, 2]));
}

#[tokio::test]
async fn test_sections_arrive_unselected() {
    let (client, _) = spawn_server().await;

    let sections = client.get_sections("202031", "csce 121").await.unwrap();
    assert_eq!(sections.len(), 2);
    assert!(sections.iter().all(|s| !s.selected));
    let first = &sections[0].section;
    assert!(first.is_full());
    assert_eq!(first.section_num(), "501");
    assert_eq!(first.subject(), "CSCE");
    assert_eq!(first.crn(), 40_001);
    assert_eq!(first.instructor().name, "Aakash Tyagi");
    assert_eq!(first.max_credits(), None);
    assert!(first.grades().is_none());
    assert_eq!(sections[0].meetings.len(), 1);
    assert_eq!(sections[0].meetings[0].meeting_type, "LEC");
}

#[tokio::test]
async fn test_invalid_section_is_a_validation_error() {
    let (client, _) = spawn_server().await;

    match client.get_sections("202031", "CSCE 999").await {
        Err(SyncError::Validation(e)) => assert_eq!(e.field, "honors"),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(matches!(
        client.get_sections("202031", "not a course").await,
        Err(SyncError::InvalidCourse { .. })
    ));
}

#[tokio::test]
async fn test_generate_without_schedules() {
    let (client, _) = spawn_server().await;

    let outcome = client.post_generate(&request("202031")).await.unwrap();
    assert_eq!(
        outcome,
        GenerateOutcome::NoSchedules {
            message: "No schedules found. Try widening your search.".to_string()
        }
    );
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let (client, _) = spawn_server().await;

    let err = client.post_generate(&request("000000")).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::UnexpectedStatus { status: 500, .. }
    ));
    assert!(err.is_retryable());
}
