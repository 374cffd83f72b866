//! Autosave orchestrator.
//!
//! Every qualifying card change schedules a debounced save keyed by the
//! active term. Switching terms flushes the previous term's pending save
//! before the new term loads, and [`Autosave::shutdown`] flushes everything.
//!
//! Per term the save state moves `Idle -> PendingSave -> Saved`, re-entering
//! `PendingSave` on each qualifying change.

use crate::client::CourseApi;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::models::{
    resolve_selection, CourseCardOptions, CourseCardUpdate, SerializedCourseCardOptions,
};
use crate::request::{build_schedule_request, CustomizationLevel, GenerateOutcome, ScheduleRequest};
use crate::state::{TermData, UpdateOutcome};
use crate::throttle::DebounceScheduler;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SaveState {
    Idle,
    PendingSave,
    Saved { at: DateTime<Utc> },
    /// The last persist attempt failed; the payload is kept for teardown.
    Failed { message: String },
}

/// Save bookkeeping shared with the scheduled callbacks.
struct SaveLedger {
    status: DashMap<String, SaveState>,
    /// Payloads whose persist failed and that no newer change has replaced
    unsaved: DashMap<String, Vec<SerializedCourseCardOptions>>,
}

impl SaveLedger {
    async fn persist<A: CourseApi>(
        &self,
        api: &A,
        term: String,
        cards: Vec<SerializedCourseCardOptions>,
    ) -> bool {
        match api.save_courses(&term, &cards).await {
            Ok(()) => {
                self.unsaved.remove(&term);
                self.status
                    .insert(term, SaveState::Saved { at: Utc::now() });
                true
            }
            Err(e) => {
                error!(term = %term, error = %e, "Failed to save courses");
                self.status.insert(
                    term.clone(),
                    SaveState::Failed {
                        message: e.to_string(),
                    },
                );
                self.unsaved.insert(term, cards);
                false
            }
        }
    }
}

pub struct Autosave<A: CourseApi> {
    api: Arc<A>,
    state: Mutex<TermData>,
    scheduler: DebounceScheduler<String>,
    ledger: Arc<SaveLedger>,
    delay: Duration,
    level: CustomizationLevel,
}

impl<A: CourseApi> Autosave<A> {
    pub fn new(api: Arc<A>, config: &SyncConfig) -> Self {
        Self {
            api,
            state: Mutex::new(TermData::new()),
            scheduler: DebounceScheduler::new(),
            ledger: Arc::new(SaveLedger {
                status: DashMap::new(),
                unsaved: DashMap::new(),
            }),
            delay: config.autosave_delay(),
            level: config.customization_level,
        }
    }

    fn state(&self) -> MutexGuard<'_, TermData> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the current term and cards.
    pub fn snapshot(&self) -> TermData {
        self.state().clone()
    }

    pub fn term(&self) -> Option<String> {
        self.state().term().map(str::to_string)
    }

    pub fn save_state(&self, term: &str) -> SaveState {
        self.ledger
            .status
            .get(term)
            .map(|s| s.value().clone())
            .unwrap_or(SaveState::Idle)
    }

    /// Activates `term`: flushes other terms' pending saves, then restores
    /// the cards saved for `term` and reloads their sections.
    pub async fn switch_term(&self, term: &str) -> Result<(), SyncError> {
        if self.term().as_deref() == Some(term) {
            return Ok(());
        }

        let flushed = self.scheduler.flush_others(&term.to_string()).await;
        info!(term = %term, flushed, "Switching term");
        self.state().set_term(term);

        let saved = self.api.load_saved_courses(term).await?;
        let to_load: Vec<(usize, String, Vec<u64>)> = {
            let mut state = self.state();
            if state.restore_cards(&saved, term) == UpdateOutcome::StaleTerm {
                debug!(term = %term, "Term changed while restoring cards");
                return Ok(());
            }
            saved
                .iter()
                .filter_map(|(index, card)| {
                    let course = card.course.as_deref()?.trim();
                    (!course.is_empty()).then(|| (*index, course.to_string(), card.sections.clone()))
                })
                .collect()
        };

        for (index, course, selected_ids) in to_load {
            if let Err(e) = self.load_sections(index, &course, term, &selected_ids).await {
                warn!(term = %term, card = index, course = %course, error = %e, "Could not restore sections");
            }
        }
        Ok(())
    }

    /// Fetches a card's sections and selects `selected_ids` among them. The
    /// card is marked loading meanwhile; results for a stale term are dropped.
    async fn load_sections(
        &self,
        index: usize,
        course: &str,
        term: &str,
        selected_ids: &[u64],
    ) -> Result<(), SyncError> {
        let started = self.state().update_card(
            index,
            CourseCardUpdate {
                loading: Some(true),
                ..Default::default()
            },
            Some(term),
        );
        if started != UpdateOutcome::Applied {
            return Ok(());
        }

        let update = match self.api.fetch_sections(term, course).await {
            Ok(catalog) => CourseCardUpdate {
                sections: Some(resolve_selection(catalog, selected_ids)),
                loading: Some(false),
                ..Default::default()
            },
            Err(e) => {
                self.state().update_card(
                    index,
                    CourseCardUpdate {
                        loading: Some(false),
                        ..Default::default()
                    },
                    Some(term),
                );
                return Err(e);
            }
        };

        self.update_card(index, update, Some(term)).await;
        Ok(())
    }

    /// Sets a card's course and loads its sections.
    pub async fn set_course(&self, index: usize, course: &str) -> Result<(), SyncError> {
        let term = self.term().ok_or(SyncError::NoTerm)?;
        let outcome = self.state().update_card(
            index,
            CourseCardUpdate {
                course: Some(course.to_string()),
                ..Default::default()
            },
            Some(&term),
        );
        match outcome {
            UpdateOutcome::Applied => self.load_sections(index, course, &term, &[]).await,
            UpdateOutcome::UnknownCard => Err(SyncError::UnknownCard { index }),
            UpdateOutcome::StaleTerm => Ok(()),
        }
    }

    /// Applies a card update and schedules a save if it warrants one.
    pub async fn update_card(
        &self,
        index: usize,
        update: CourseCardUpdate,
        term: Option<&str>,
    ) -> UpdateOutcome {
        let warrants_save = update.warrants_save();
        let outcome = self.state().update_card(index, update, term);
        if outcome == UpdateOutcome::Applied && warrants_save {
            self.schedule_save().await;
        }
        outcome
    }

    pub async fn add_card(&self) -> Result<usize, SyncError> {
        let index = {
            let mut state = self.state();
            if state.term().is_none() {
                return Err(SyncError::NoTerm);
            }
            state.add_card()
        };
        self.schedule_save().await;
        Ok(index)
    }

    pub async fn remove_card(&self, index: usize) -> Option<CourseCardOptions> {
        let removed = self.state().remove_card(index);
        if removed.is_some() {
            self.schedule_save().await;
        }
        removed
    }

    /// Snapshots the active term's cards and schedules them to be saved.
    async fn schedule_save(&self) {
        let (term, cards) = {
            let state = self.state();
            match state.term() {
                Some(term) => (term.to_string(), state.serialize_cards()),
                None => return,
            }
        };

        self.ledger.unsaved.remove(&term);
        self.ledger.status.insert(term.clone(), SaveState::PendingSave);
        debug!(term = %term, cards = cards.len(), "Scheduling save");

        let api = Arc::clone(&self.api);
        let ledger = Arc::clone(&self.ledger);
        let key = term.clone();
        self.scheduler
            .schedule(
                key,
                move || async move {
                    ledger.persist(api.as_ref(), term, cards).await;
                },
                self.delay,
                false,
            )
            .await;
    }

    /// The generation request the current cards would produce.
    pub fn schedule_request(&self) -> Option<ScheduleRequest> {
        let state = self.state();
        let term = state.term()?;
        Some(build_schedule_request(state.course_cards(), term, self.level))
    }

    /// Builds the request from the current cards and asks for schedules.
    /// With nothing selected there is nothing to send.
    pub async fn generate(&self) -> Result<GenerateOutcome, SyncError> {
        let request = self.schedule_request().ok_or(SyncError::NoTerm)?;
        if request.is_empty() {
            info!(term = %request.term, "No selected sections to generate schedules from");
            return Ok(GenerateOutcome::NoSchedules {
                message: "No sections selected".to_string(),
            });
        }
        self.api.generate_schedules(&request).await
    }

    /// Teardown: runs every pending save now, then makes one more attempt
    /// for payloads whose earlier save failed. Returns how many saves ran.
    pub async fn shutdown(&self) -> usize {
        let mut ran = self.scheduler.flush_all().await;

        let unsaved: Vec<String> = self
            .ledger
            .unsaved
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for term in unsaved {
            if let Some((term, cards)) = self.ledger.unsaved.remove(&term) {
                self.ledger.persist(self.api.as_ref(), term, cards).await;
                ran += 1;
            }
        }

        info!(saves = ran, "Flushed pending saves");
        ran
    }

    /// Spawns the teardown listener: on Ctrl-C (or SIGTERM on unix) every
    /// pending save is flushed through [`Autosave::shutdown`]. The handle
    /// yields how many saves ran.
    pub fn spawn_teardown_flush(self: &Arc<Self>) -> JoinHandle<usize> {
        self.spawn_flush_on(teardown_signal())
    }

    /// Like [`Autosave::spawn_teardown_flush`], triggered by `signal`.
    pub fn spawn_flush_on<F>(self: &Arc<Self>, signal: F) -> JoinHandle<usize>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let autosave = Arc::clone(self);
        tokio::spawn(async move {
            signal.await;
            info!("Teardown requested, flushing pending saves");
            autosave.shutdown().await
        })
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM. A broken Ctrl-C listener
/// resolves immediately so pending saves are flushed rather than lost.
pub async fn teardown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C listener failed");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM listener failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{test_section, SectionFilter, SectionSelected};
    use crate::request::ScheduleRequest;
    use crate::state::SavedCourseCards;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::time;

    type SaveLog = Vec<(String, Vec<SerializedCourseCardOptions>)>;

    #[derive(Default)]
    struct MockApi {
        saved: HashMap<String, SavedCourseCards>,
        catalog: Vec<SectionSelected>,
        saves: StdMutex<SaveLog>,
        fetch_fails: bool,
        failures_left: AtomicUsize,
        attempts: AtomicUsize,
    }

    impl MockApi {
        fn saves(&self) -> SaveLog {
            self.saves.lock().unwrap().clone()
        }
    }

    impl CourseApi for MockApi {
        fn load_saved_courses<'a>(
            &'a self,
            term: &'a str,
        ) -> BoxFuture<'a, Result<SavedCourseCards, SyncError>> {
            futures::future::ready(Ok(self.saved.get(term).cloned().unwrap_or_default())).boxed()
        }

        fn save_courses<'a>(
            &'a self,
            term: &'a str,
            cards: &'a [SerializedCourseCardOptions],
        ) -> BoxFuture<'a, Result<(), SyncError>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failed = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return futures::future::ready(Err(SyncError::Network {
                    message: "connection refused".to_string(),
                }))
                .boxed();
            }
            self.saves
                .lock()
                .unwrap()
                .push((term.to_string(), cards.to_vec()));
            futures::future::ready(Ok(())).boxed()
        }

        fn fetch_sections<'a>(
            &'a self,
            _term: &'a str,
            _course: &'a str,
        ) -> BoxFuture<'a, Result<Vec<SectionSelected>, SyncError>> {
            if self.fetch_fails {
                return futures::future::ready(Err(SyncError::UnexpectedStatus {
                    endpoint: "api/sections".to_string(),
                    status: 502,
                    body: String::new(),
                }))
                .boxed();
            }
            futures::future::ready(Ok(self.catalog.clone())).boxed()
        }

        fn generate_schedules<'a>(
            &'a self,
            _request: &'a ScheduleRequest,
        ) -> BoxFuture<'a, Result<GenerateOutcome, SyncError>> {
            futures::future::ready(Ok(GenerateOutcome::Schedules(vec![Vec::new()]))).boxed()
        }
    }

    const DELAY: Duration = Duration::from_millis(1000);

    fn config() -> SyncConfig {
        SyncConfig {
            autosave_delay_ms: DELAY.as_millis() as u64,
            ..Default::default()
        }
    }

    fn catalog() -> Vec<SectionSelected> {
        vec![
            SectionSelected::unselected(test_section(1, "501", "Tyagi", false), Vec::new()),
            SectionSelected::unselected(test_section(2, "502", "Tyagi", true), Vec::new()),
        ]
    }

    fn honors(filter: SectionFilter) -> CourseCardUpdate {
        CourseCardUpdate {
            honors: Some(filter),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_coalesce_into_one_save() {
        let api = Arc::new(MockApi::default());
        let autosave = Autosave::new(Arc::clone(&api), &config());
        autosave.switch_term("202031").await.unwrap();

        autosave.update_card(0, honors(SectionFilter::Only), None).await;
        autosave.update_card(0, honors(SectionFilter::Exclude), None).await;
        assert_eq!(autosave.save_state("202031"), SaveState::PendingSave);

        time::sleep(DELAY + Duration::from_millis(10)).await;
        let saves = api.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].1[0].honors, Some(SectionFilter::Exclude));
        assert!(matches!(autosave.save_state("202031"), SaveState::Saved { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_change_does_not_save() {
        let api = Arc::new(MockApi::default());
        let autosave = Autosave::new(Arc::clone(&api), &config());
        autosave.switch_term("202031").await.unwrap();

        let outcome = autosave
            .update_card(
                0,
                CourseCardUpdate {
                    loading: Some(true),
                    ..Default::default()
                },
                None,
            )
            .await;
        assert_eq!(outcome, UpdateOutcome::Applied);

        time::sleep(DELAY * 3).await;
        assert!(api.saves().is_empty());
        assert_eq!(autosave.save_state("202031"), SaveState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_term_switch_flushes_previous_term_first() {
        let api = Arc::new(MockApi::default());
        let autosave = Autosave::new(Arc::clone(&api), &config());
        autosave.switch_term("202031").await.unwrap();
        autosave.update_card(0, honors(SectionFilter::Only), None).await;

        autosave.switch_term("201931").await.unwrap();
        let saves = api.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].0, "202031");
        assert_eq!(saves[0].1[0].honors, Some(SectionFilter::Only));

        // a late update for the old term must not leak into the new one
        let stale = autosave
            .update_card(0, honors(SectionFilter::Exclude), Some("202031"))
            .await;
        assert_eq!(stale, UpdateOutcome::StaleTerm);

        autosave.update_card(0, honors(SectionFilter::Exclude), None).await;
        time::sleep(DELAY + Duration::from_millis(10)).await;

        let saves = api.saves();
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[1].0, "201931");
        assert_eq!(saves[1].1[0].honors, Some(SectionFilter::Exclude));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_without_waiting() {
        let api = Arc::new(MockApi::default());
        let autosave = Autosave::new(Arc::clone(&api), &config());
        autosave.switch_term("202031").await.unwrap();
        autosave.add_card().await.unwrap();

        assert_eq!(autosave.shutdown().await, 1);
        let saves = api.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].1.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_is_retried_at_shutdown() {
        let api = Arc::new(MockApi {
            failures_left: AtomicUsize::new(1),
            ..Default::default()
        });
        let autosave = Autosave::new(Arc::clone(&api), &config());
        autosave.switch_term("202031").await.unwrap();
        autosave.update_card(0, honors(SectionFilter::Only), None).await;

        time::sleep(DELAY + Duration::from_millis(10)).await;
        assert!(matches!(autosave.save_state("202031"), SaveState::Failed { .. }));
        assert!(api.saves().is_empty());

        // no timer-driven retry
        time::sleep(DELAY * 3).await;
        assert_eq!(api.attempts.load(Ordering::SeqCst), 1);

        assert_eq!(autosave.shutdown().await, 1);
        assert_eq!(api.saves().len(), 1);
        assert!(matches!(autosave.save_state("202031"), SaveState::Saved { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_term_restores_saved_selection() {
        let mut saved = SavedCourseCards::new();
        saved.insert(
            2,
            SerializedCourseCardOptions {
                course: Some("CSCE 121".to_string()),
                sections: vec![2],
                ..Default::default()
            },
        );
        let api = Arc::new(MockApi {
            saved: HashMap::from([("202031".to_string(), saved)]),
            catalog: catalog(),
            ..Default::default()
        });
        let autosave = Autosave::new(Arc::clone(&api), &config());
        autosave.switch_term("202031").await.unwrap();

        let state = autosave.snapshot();
        let card = state.card(2).unwrap();
        assert!(!card.loading);
        assert!(card.has_honors);
        let selected: Vec<u64> = card.selected_sections().map(|s| s.section.id).collect();
        assert_eq!(selected, vec![2]);
        assert_eq!(state.course_cards().num_cards_created(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_course_then_generate() {
        let api = Arc::new(MockApi {
            catalog: catalog(),
            ..Default::default()
        });
        let autosave = Autosave::new(Arc::clone(&api), &config());
        autosave.switch_term("202031").await.unwrap();

        let nothing = autosave.generate().await.unwrap();
        assert!(matches!(nothing, GenerateOutcome::NoSchedules { .. }));

        autosave.set_course(0, "CSCE 121").await.unwrap();
        let sections: Vec<SectionSelected> = autosave
            .snapshot()
            .card(0)
            .unwrap()
            .sections
            .iter()
            .cloned()
            .map(|mut s| {
                s.selected = true;
                s
            })
            .collect();
        autosave
            .update_card(
                0,
                CourseCardUpdate {
                    sections: Some(sections),
                    ..Default::default()
                },
                None,
            )
            .await;

        let request = autosave.schedule_request().unwrap();
        assert_eq!(request.courses[0].sections, vec!["501", "502"]);
        assert!(matches!(
            autosave.generate().await.unwrap(),
            GenerateOutcome::Schedules(_)
        ));

        assert!(matches!(
            autosave.set_course(9, "CSCE 121").await,
            Err(SyncError::UnknownCard { index: 9 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_changes_need_a_term() {
        let api = Arc::new(MockApi::default());
        let autosave = Autosave::new(api, &config());
        assert!(matches!(autosave.add_card().await, Err(SyncError::NoTerm)));
        assert!(matches!(autosave.generate().await, Err(SyncError::NoTerm)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_change_keeps_scheduled_save() {
        let api = Arc::new(MockApi::default());
        let autosave = Autosave::new(Arc::clone(&api), &config());
        autosave.switch_term("202031").await.unwrap();

        autosave.update_card(0, honors(SectionFilter::Only), None).await;
        autosave
            .update_card(
                0,
                CourseCardUpdate {
                    loading: Some(true),
                    ..Default::default()
                },
                None,
            )
            .await;
        assert_eq!(autosave.save_state("202031"), SaveState::PendingSave);

        time::sleep(DELAY * 3).await;
        let saves = api.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].1[0].honors, Some(SectionFilter::Only));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_restore_keeps_saved_selection() {
        let mut saved = SavedCourseCards::new();
        saved.insert(
            0,
            SerializedCourseCardOptions {
                course: Some("CSCE 121".to_string()),
                sections: vec![2],
                ..Default::default()
            },
        );
        let api = Arc::new(MockApi {
            saved: HashMap::from([("202031".to_string(), saved)]),
            fetch_fails: true,
            ..Default::default()
        });
        let autosave = Autosave::new(Arc::clone(&api), &config());
        autosave.switch_term("202031").await.unwrap();

        let card = autosave.snapshot().card(0).cloned().unwrap();
        assert!(!card.loading);
        assert!(card.sections.is_empty());

        autosave.add_card().await.unwrap();
        assert_eq!(autosave.shutdown().await, 1);

        let saves = api.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].1[0].course.as_deref(), Some("CSCE 121"));
        assert_eq!(saves[0].1[0].sections, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_listener_flushes_pending_saves() {
        let api = Arc::new(MockApi::default());
        let autosave = Arc::new(Autosave::new(Arc::clone(&api), &config()));
        autosave.switch_term("202031").await.unwrap();

        let (trigger, teardown) = tokio::sync::oneshot::channel::<()>();
        let listener = autosave.spawn_flush_on(async move {
            let _ = teardown.await;
        });

        autosave.update_card(0, honors(SectionFilter::Exclude), None).await;
        assert!(api.saves().is_empty());

        trigger.send(()).unwrap();
        assert_eq!(listener.await.unwrap(), 1);
        let saves = api.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].1[0].honors, Some(SectionFilter::Exclude));
    }
}
