//! Per-session state owner for one entity kind.
//!
//! All mutable fields live behind a single `tokio::sync::Mutex`. Entry points
//! take the lock only to read criteria or to apply a result; store round
//! trips and stream reads happen with the lock released.

use shared::{
    error::{capitalize, FieldErrors, Notification, StateError},
    query::{total_pages, ColumnFilter, Page, PageRequest, QueryCriteria},
};
use storage::{criteria_error, filter_sort, is_unique_violation, CriteriaError, Entity, Storage};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::{
    prompt::GenerationPreferences,
    streamer::GenerationOutcome,
    validation::{RawInput, Validate},
};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
const EVENT_CAPACITY: usize = 1024;

/// Change notifications. Observers re-read [`StateStore::snapshot`] for data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    EntitiesReplaced { count: usize, total_items: u64 },
    EntityUpdated { id: i64 },
    EntityRemoved { id: i64 },
    ErrorsChanged { fields: usize },
    CriteriaChanged,
    SelectionChanged { id: Option<i64> },
    GenerationStarted { selection_id: i64 },
    GenerationDelta { text: String },
    GenerationFinished { outcome: GenerationOutcome },
    Notified(Notification),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState<E> {
    /// Current page, in query order.
    pub entities: Vec<E>,
    pub current_selection: Option<E>,
    pub errors: FieldErrors,
    pub search_text: String,
    /// Empty when unsorted.
    pub sort_field: String,
    pub sort_descending: bool,
    pub column_filters: Vec<ColumnFilter>,
    pub page_number: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub generation_text: String,
    pub is_generating: bool,
    pub preferences: GenerationPreferences,
    pub last_notification: Option<Notification>,
}

impl<E> SessionState<E> {
    fn new(page_size: u32) -> Self {
        Self {
            entities: Vec::new(),
            current_selection: None,
            errors: FieldErrors::new(),
            search_text: String::new(),
            sort_field: String::new(),
            sort_descending: false,
            column_filters: Vec::new(),
            page_number: 1,
            page_size: page_size.max(1),
            total_items: 0,
            generation_text: String::new(),
            is_generating: false,
            preferences: GenerationPreferences::default(),
            last_notification: None,
        }
    }

    pub fn criteria(&self) -> QueryCriteria {
        QueryCriteria {
            filter: Some(self.search_text.clone()).filter(|text| !text.is_empty()),
            sort_field: Some(self.sort_field.clone()).filter(|field| !field.is_empty()),
            descending: self.sort_descending,
            column_filters: self.column_filters.clone(),
            page: Some(PageRequest {
                number: self.page_number,
                size: self.page_size,
            }),
        }
    }

    pub fn total_pages(&self) -> u32 {
        total_pages(self.total_items, self.page_size)
    }
}

struct Inner<E> {
    state: SessionState<E>,
    /// Bumped on every criteria change so late reload results can be dropped.
    criteria_version: u64,
    /// Identifies the generation session allowed to append.
    generation_token: u64,
}

pub(crate) struct GenerationSession<E> {
    pub(crate) token: u64,
    pub(crate) subject: E,
    pub(crate) preferences: GenerationPreferences,
}

pub struct StateStore<E: Entity> {
    storage: Storage,
    inner: Mutex<Inner<E>>,
    events: broadcast::Sender<StateEvent>,
}

impl<E: Entity> StateStore<E> {
    pub fn new(storage: Storage, page_size: u32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            storage,
            inner: Mutex::new(Inner {
                state: SessionState::new(page_size),
                criteria_version: 0,
                generation_token: 0,
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionState<E> {
        self.inner.lock().await.state.clone()
    }

    pub async fn entities(&self) -> Vec<E> {
        self.inner.lock().await.state.entities.clone()
    }

    pub async fn errors(&self) -> FieldErrors {
        self.inner.lock().await.state.errors.clone()
    }

    pub async fn generation_text(&self) -> String {
        self.inner.lock().await.state.generation_text.clone()
    }

    pub async fn is_generating(&self) -> bool {
        self.inner.lock().await.state.is_generating
    }

    pub async fn current_selection(&self) -> Option<E> {
        self.inner.lock().await.state.current_selection.clone()
    }

    /// Replaces `entities` with the result of `criteria`. On failure the
    /// previous list is kept and only a notification is raised; `errors`
    /// and `current_selection` are never touched.
    pub async fn load(&self, criteria: &QueryCriteria) -> Result<usize, StateError> {
        let page = match self.fetch(criteria).await {
            Ok(page) => page,
            Err(err) => return Err(self.report(err).await),
        };
        let mut inner = self.inner.lock().await;
        Ok(self.apply_page(&mut inner, page))
    }

    /// Re-runs the session's own criteria.
    pub async fn reload(&self) -> Result<usize, StateError> {
        match self.refetch().await {
            Ok(count) => Ok(count),
            Err(err) => Err(self.report(err).await),
        }
    }

    /// `reload` without raising a notification on failure.
    async fn refetch(&self) -> Result<usize, StateError> {
        let (criteria, version) = {
            let inner = self.inner.lock().await;
            (inner.state.criteria(), inner.criteria_version)
        };
        let page = self.fetch(&criteria).await?;
        let mut inner = self.inner.lock().await;
        if inner.criteria_version != version {
            debug!(entity = E::KIND, "state: dropping reload for superseded criteria");
            return Ok(inner.state.entities.len());
        }
        Ok(self.apply_page(&mut inner, page))
    }

    pub async fn create(&self, raw: &RawInput) -> Result<E, StateError>
    where
        E::Draft: Validate,
    {
        self.clear_errors().await;
        let draft = match E::Draft::validate(raw) {
            Ok(draft) => draft,
            Err(errors) => return Err(self.reject(StateError::ValidationFailed(errors)).await),
        };
        self.ensure_unique(&draft, None).await?;

        let duplicate = duplicate_of::<E>(&draft);
        let created = match self.storage.insert::<E>(draft).await {
            Ok(created) => created,
            Err(err) => return Err(self.reject(write_error::<E>(err, duplicate)).await),
        };
        info!(entity = E::KIND, id = created.id(), "state: created");

        if let Err(err) = self.refetch().await {
            warn!(entity = E::KIND, %err, "state: reload after create failed; appending locally");
            let mut inner = self.inner.lock().await;
            inner.state.entities.push(created.clone());
            inner.state.total_items += 1;
            self.publish(StateEvent::EntitiesReplaced {
                count: inner.state.entities.len(),
                total_items: inner.state.total_items,
            });
        }

        self.succeed(Notification::success(format!(
            "{} {} has been added.",
            capitalize(E::KIND),
            created.label()
        )))
        .await;
        Ok(created)
    }

    /// Re-validates every field and overwrites the record. An edit aimed at a
    /// missing record fails with `NotFound`.
    pub async fn update(&self, id: i64, raw: &RawInput) -> Result<E, StateError>
    where
        E::Draft: Validate,
    {
        self.clear_errors().await;
        let draft = match E::Draft::validate(raw) {
            Ok(draft) => draft,
            Err(errors) => return Err(self.reject(StateError::ValidationFailed(errors)).await),
        };

        match self.storage.find_by_id::<E>(id).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err(self.reject(not_found::<E>(id)).await),
            Err(err) => return Err(self.reject(store_unavailable::<E>(err)).await),
        }
        self.ensure_unique(&draft, Some(id)).await?;

        let duplicate = duplicate_of::<E>(&draft);
        let updated = match self.storage.update::<E>(id, draft).await {
            Ok(Some(updated)) => updated,
            Ok(None) => return Err(self.reject(not_found::<E>(id)).await),
            Err(err) => return Err(self.reject(write_error::<E>(err, duplicate)).await),
        };
        info!(entity = E::KIND, id, "state: updated");

        {
            let mut inner = self.inner.lock().await;
            if let Some(slot) = inner.state.entities.iter_mut().find(|e| e.id() == id) {
                *slot = updated.clone();
            }
            if inner
                .state
                .current_selection
                .as_ref()
                .is_some_and(|selected| selected.id() == id)
            {
                inner.state.current_selection = Some(updated.clone());
            }
            self.publish(StateEvent::EntityUpdated { id });
        }

        self.succeed(Notification::success(format!(
            "{} {} has been modified.",
            capitalize(E::KIND),
            updated.label()
        )))
        .await;
        Ok(updated)
    }

    /// Removes the record. Deleting an id that is already gone is a no-op
    /// success and returns `false`.
    pub async fn delete(&self, id: i64) -> Result<bool, StateError> {
        self.clear_errors().await;
        let removed = match self.storage.delete::<E>(id).await {
            Ok(removed) => removed,
            Err(err) => return Err(self.reject(store_unavailable::<E>(err)).await),
        };

        let label = {
            let mut inner = self.inner.lock().await;
            let label = inner
                .state
                .entities
                .iter()
                .position(|e| e.id() == id)
                .map(|position| inner.state.entities.remove(position).label());
            if removed {
                inner.state.total_items = inner.state.total_items.saturating_sub(1);
            }
            if inner
                .state
                .current_selection
                .as_ref()
                .is_some_and(|selected| selected.id() == id)
            {
                inner.state.current_selection = None;
                self.publish(StateEvent::SelectionChanged { id: None });
            }
            self.publish(StateEvent::EntityRemoved { id });
            label
        };

        let notification = if removed {
            info!(entity = E::KIND, id, "state: deleted");
            Notification::success(format!(
                "{} {} has been deleted.",
                capitalize(E::KIND),
                label.unwrap_or_else(|| id.to_string())
            ))
        } else {
            info!(entity = E::KIND, id, "state: delete of missing record ignored");
            Notification::info(format!("{} {id} was already deleted.", capitalize(E::KIND)))
        };
        self.succeed(notification).await;
        Ok(removed)
    }

    pub async fn set_search(&self, text: &str) -> Result<usize, StateError> {
        {
            let mut inner = self.inner.lock().await;
            inner.state.search_text = text.to_string();
            inner.state.page_number = 1;
            self.criteria_changed(&mut inner);
        }
        self.reload().await
    }

    /// Selecting the active field flips the direction; any other field
    /// becomes active in ascending order.
    pub async fn set_sort(&self, field: &str) -> Result<usize, StateError> {
        if let Err(err) = filter_sort::sort_column::<E>(field) {
            return Err(self.reject(criteria_invalid(&err)).await);
        }
        {
            let mut inner = self.inner.lock().await;
            if inner.state.sort_field == field {
                inner.state.sort_descending = !inner.state.sort_descending;
            } else {
                inner.state.sort_field = field.to_string();
                inner.state.sort_descending = false;
            }
            self.criteria_changed(&mut inner);
        }
        self.reload().await
    }

    pub async fn toggle_sort_direction(&self) -> Result<usize, StateError> {
        {
            let mut inner = self.inner.lock().await;
            inner.state.sort_descending = !inner.state.sort_descending;
            self.criteria_changed(&mut inner);
        }
        self.reload().await
    }

    pub async fn apply_filters(&self, filters: Vec<ColumnFilter>) -> Result<usize, StateError> {
        let probe = QueryCriteria {
            column_filters: filters.clone(),
            ..QueryCriteria::default()
        };
        if let Err(err) = filter_sort::shape::<E>(&probe) {
            return Err(self.reject(criteria_invalid(&err)).await);
        }
        {
            let mut inner = self.inner.lock().await;
            inner.state.column_filters = filters;
            inner.state.page_number = 1;
            self.criteria_changed(&mut inner);
        }
        self.reload().await
    }

    pub async fn reset_filters(&self) -> Result<usize, StateError> {
        self.apply_filters(Vec::new()).await
    }

    pub async fn set_page_size(&self, size: u32) -> Result<usize, StateError> {
        {
            let mut inner = self.inner.lock().await;
            inner.state.page_size = size.max(1);
            inner.state.page_number = 1;
            self.criteria_changed(&mut inner);
        }
        self.reload().await
    }

    /// Moves to `page`, clamped to the pages that currently exist.
    pub async fn go_to_page(&self, page: u32) -> Result<usize, StateError> {
        {
            let mut inner = self.inner.lock().await;
            let last = inner.state.total_pages();
            inner.state.page_number = page.clamp(1, last);
            self.criteria_changed(&mut inner);
        }
        self.reload().await
    }

    /// Unique values of `column` across the whole table.
    pub async fn distinct_values(&self, column: &str) -> Result<Vec<String>, StateError> {
        match self.storage.distinct_values::<E>(column).await {
            Ok(values) => Ok(values),
            Err(err) => Err(self.report(load_error::<E>(err)).await),
        }
    }

    /// Targets a loaded record for editing or generation.
    pub async fn select(&self, id: i64) -> Option<E> {
        let mut inner = self.inner.lock().await;
        let selected = inner.state.entities.iter().find(|e| e.id() == id).cloned();
        inner.state.current_selection = selected.clone();
        if !inner.state.errors.is_empty() {
            inner.state.errors = FieldErrors::new();
            self.publish(StateEvent::ErrorsChanged { fields: 0 });
        }
        self.publish(StateEvent::SelectionChanged {
            id: selected.as_ref().map(|e| e.id()),
        });
        selected
    }

    pub async fn clear_selection(&self) {
        let mut inner = self.inner.lock().await;
        inner.state.current_selection = None;
        self.publish(StateEvent::SelectionChanged { id: None });
    }

    pub async fn set_tone(&self, tone: &str) {
        self.inner.lock().await.state.preferences.tone = tone.to_string();
    }

    pub async fn set_length(&self, length: u32) {
        self.inner.lock().await.state.preferences.length = length;
    }

    /// Starts a generation session for a loaded record: selects it and
    /// resets `generation_text`, all under one lock acquisition. `None`
    /// when the id is not among the loaded entities.
    pub(crate) async fn begin_generation(&self, selection_id: i64) -> Option<GenerationSession<E>> {
        let mut inner = self.inner.lock().await;
        let subject = inner
            .state
            .entities
            .iter()
            .find(|e| e.id() == selection_id)
            .cloned()?;
        inner.generation_token += 1;
        inner.state.current_selection = Some(subject.clone());
        inner.state.generation_text.clear();
        inner.state.is_generating = true;
        self.publish(StateEvent::SelectionChanged {
            id: Some(selection_id),
        });
        self.publish(StateEvent::GenerationStarted { selection_id });
        Some(GenerationSession {
            token: inner.generation_token,
            subject,
            preferences: inner.state.preferences.clone(),
        })
    }

    /// Appends one chunk. Returns `false`, leaving the text untouched, when
    /// a newer session has started since `token` was issued.
    pub(crate) async fn append_generation(&self, token: u64, text: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.generation_token != token {
            return false;
        }
        inner.state.generation_text.push_str(text);
        debug!(token, bytes = text.len(), "state: generation chunk merged");
        self.publish(StateEvent::GenerationDelta {
            text: text.to_string(),
        });
        true
    }

    pub(crate) async fn finish_generation(
        &self,
        token: u64,
        outcome: GenerationOutcome,
    ) -> GenerationOutcome {
        let mut inner = self.inner.lock().await;
        if inner.generation_token == token {
            inner.state.is_generating = false;
            if let GenerationOutcome::Failed(reason) = &outcome {
                let notification = Notification::from(&StateError::StreamFailed(reason.clone()));
                inner.state.last_notification = Some(notification.clone());
                self.publish(StateEvent::Notified(notification));
            }
        }
        self.publish(StateEvent::GenerationFinished {
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn fetch(&self, criteria: &QueryCriteria) -> Result<Page<E>, StateError> {
        self.storage
            .load::<E>(criteria)
            .await
            .map_err(load_error::<E>)
    }

    fn apply_page(&self, inner: &mut MutexGuard<'_, Inner<E>>, page: Page<E>) -> usize {
        let count = page.items.len();
        inner.state.entities = page.items;
        inner.state.total_items = page.total_items;
        self.publish(StateEvent::EntitiesReplaced {
            count,
            total_items: page.total_items,
        });
        count
    }

    fn criteria_changed(&self, inner: &mut MutexGuard<'_, Inner<E>>) {
        inner.criteria_version += 1;
        self.publish(StateEvent::CriteriaChanged);
    }

    async fn ensure_unique(&self, draft: &E::Draft, except: Option<i64>) -> Result<(), StateError> {
        let Some(key) = E::draft_business_key(draft) else {
            return Ok(());
        };
        match self.storage.find_by_business_key::<E>(key).await {
            Ok(Some(existing)) if Some(existing.id()) != except => {
                Err(self.reject(not_unique::<E>(key)).await)
            }
            Ok(_) => Ok(()),
            Err(err) => Err(self.reject(store_unavailable::<E>(err)).await),
        }
    }

    async fn clear_errors(&self) {
        let mut inner = self.inner.lock().await;
        if !inner.state.errors.is_empty() {
            inner.state.errors = FieldErrors::new();
            self.publish(StateEvent::ErrorsChanged { fields: 0 });
        }
    }

    /// Records a failed mutation: field errors for validation failures, plus
    /// a headline notification. Hands the error back for returning.
    async fn reject(&self, err: StateError) -> StateError {
        if let Some(errors) = err.field_errors() {
            let mut inner = self.inner.lock().await;
            inner.state.errors = errors.clone();
            self.publish(StateEvent::ErrorsChanged {
                fields: errors.len(),
            });
        }
        self.report(err).await
    }

    /// Headline notification only. Used for query failures.
    async fn report(&self, err: StateError) -> StateError {
        warn!(entity = E::KIND, code = ?err.code(), "state: {}", err.headline());
        let notification = Notification::from(&err);
        let mut inner = self.inner.lock().await;
        inner.state.last_notification = Some(notification.clone());
        self.publish(StateEvent::Notified(notification));
        err
    }

    async fn succeed(&self, notification: Notification) {
        let mut inner = self.inner.lock().await;
        inner.state.last_notification = Some(notification.clone());
        self.publish(StateEvent::Notified(notification));
    }

    fn publish(&self, event: StateEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn not_found<E: Entity>(id: i64) -> StateError {
    StateError::NotFound {
        entity: E::KIND,
        id,
    }
}

fn not_unique<E: Entity>(key: &str) -> StateError {
    StateError::DuplicateKey {
        entity: E::KIND,
        field: E::BUSINESS_KEY.unwrap_or("key"),
        value: key.to_string(),
    }
}

fn duplicate_of<E: Entity>(draft: &E::Draft) -> Option<StateError> {
    E::draft_business_key(draft).map(not_unique::<E>)
}

fn store_unavailable<E: Entity>(err: anyhow::Error) -> StateError {
    let detail = format!("{err:#}");
    error!(entity = E::KIND, error = %detail, "state: store round trip failed");
    StateError::StoreUnavailable(err.to_string())
}

fn load_error<E: Entity>(err: anyhow::Error) -> StateError {
    match criteria_error(&err) {
        Some(invalid) => criteria_invalid(invalid),
        None => store_unavailable::<E>(err),
    }
}

/// A uniqueness race lost between the check and the write is still a duplicate.
fn write_error<E: Entity>(err: anyhow::Error, duplicate: Option<StateError>) -> StateError {
    match duplicate {
        Some(duplicate) if is_unique_violation(&err) => duplicate,
        _ => store_unavailable::<E>(err),
    }
}

fn criteria_invalid(err: &CriteriaError) -> StateError {
    StateError::ValidationFailed(FieldErrors::single(err.field(), capitalize(&err.to_string())))
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
