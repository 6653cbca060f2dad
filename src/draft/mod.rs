//! Artifact draft lifecycle.
//!
//! A draft is the in-memory, not-yet-persisted artifact shown as an inline
//! editor card in the transcript. Drafts are born from `content_generated`
//! events or explicit "create X" actions, mutated by field edits and
//! reference selection, and leave through save or discard:
//!
//! ```text
//! draft ──save──→ saving ──2xx──→ saved        (immutable from here)
//!   ▲                │
//!   │              non-2xx
//! discard             ▼
//!   ▲────retry────  error ──discard──→ (gone)
//! ```

pub mod payload;

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::api::{ApiError, ArtifactApi, SavedArtifact};
use crate::cache::ProjectDataCache;
use crate::chat::ArtifactKind;
use crate::config::Identity;

/// Where a draft is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStatus {
    Draft,
    Saving,
    Saved,
    Error,
}

/// Reference fields a user picks through the selectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectedRefs {
    pub project: Option<String>,
    pub assignees: Vec<String>,
    pub labels: Vec<String>,
    pub cycle: Option<String>,
    pub sub_state: Option<String>,
    pub module: Option<String>,
    pub epic: Option<String>,
    pub feature: Option<String>,
    pub date_range: Option<(String, String)>,
}

/// One reference selection, applied by a selector component.
#[derive(Debug, Clone, PartialEq)]
pub enum RefSelection {
    Project(String),
    Assignees(Vec<String>),
    Labels(Vec<String>),
    Cycle(String),
    SubState(String),
    Module(String),
    Epic(String),
    Feature(String),
    DateRange { start: String, end: String },
}

/// An in-memory artifact being edited inline.
#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    pub id: String,
    pub kind: ArtifactKind,
    pub fields: Map<String, Value>,
    pub refs: SelectedRefs,
    pub status: DraftStatus,
    /// Server error text from the last failed save, verbatim.
    pub error: Option<String>,
    pub saved: Option<SavedArtifact>,
}

impl ArtifactDraft {
    fn new(kind: ArtifactKind, fields: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            fields,
            refs: SelectedRefs::default(),
            status: DraftStatus::Draft,
            error: None,
            saved: None,
        }
    }
}

/// Draft operation failures. These are caller errors (wrong lifecycle
/// stage, unknown id) or surfaced save failures — never crashes.
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("no draft with id {0}")]
    NotFound(String),

    #[error("draft {id} is {status:?}; only editable while unsaved")]
    NotEditable { id: String, status: DraftStatus },

    #[error("draft {id} is {status:?}; cannot be discarded")]
    NotDiscardable { id: String, status: DraftStatus },

    #[error("draft {id} is {status:?}; save is only legal from draft or error")]
    NotSavable { id: String, status: DraftStatus },

    #[error("save failed: {0}")]
    SaveFailed(String),
}

/// Owns every in-flight draft for one conversation surface.
pub struct DraftController {
    drafts: Mutex<Vec<ArtifactDraft>>,
    api: Arc<dyn ArtifactApi>,
    cache: Arc<ProjectDataCache>,
    identity: Identity,
}

impl DraftController {
    pub fn new(
        api: Arc<dyn ArtifactApi>,
        cache: Arc<ProjectDataCache>,
        identity: Identity,
    ) -> Self {
        Self {
            drafts: Mutex::new(Vec::new()),
            api,
            cache,
            identity,
        }
    }

    /// Instantiate a draft. An unsaved draft of the same kind is replaced —
    /// duplicate unsaved cards for one kind never stack.
    pub async fn create_draft(
        &self,
        kind: ArtifactKind,
        fields: Map<String, Value>,
    ) -> ArtifactDraft {
        let mut drafts = self.drafts.lock().await;
        drafts.retain(|d| {
            !(d.kind == kind && matches!(d.status, DraftStatus::Draft | DraftStatus::Error))
        });
        let draft = ArtifactDraft::new(kind, fields);
        drafts.push(draft.clone());
        draft
    }

    /// Materialize a draft from a generated-artifact payload. Object
    /// payloads become the initial field set; anything else starts empty.
    pub async fn create_from_generated(&self, kind: ArtifactKind, data: Value) -> ArtifactDraft {
        let fields = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.create_draft(kind, fields).await
    }

    /// Shallow-merge one field. Legal while the draft is unsaved — including
    /// after a failed save, so the user can fix the rejected field and retry.
    pub async fn update_field(
        &self,
        draft_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), DraftError> {
        let mut drafts = self.drafts.lock().await;
        let draft = find_mut(&mut drafts, draft_id)?;
        if !matches!(draft.status, DraftStatus::Draft | DraftStatus::Error) {
            return Err(DraftError::NotEditable {
                id: draft.id.clone(),
                status: draft.status,
            });
        }
        draft.fields.insert(key.to_string(), value);
        Ok(())
    }

    /// Apply one selector choice. Selecting a project also warms the
    /// reference cache in the background so the dependent selectors render
    /// without a loading flash.
    pub async fn select_reference(
        &self,
        draft_id: &str,
        selection: RefSelection,
    ) -> Result<(), DraftError> {
        let prefetch = {
            let mut drafts = self.drafts.lock().await;
            let draft = find_mut(&mut drafts, draft_id)?;
            if !matches!(draft.status, DraftStatus::Draft | DraftStatus::Error) {
                return Err(DraftError::NotEditable {
                    id: draft.id.clone(),
                    status: draft.status,
                });
            }
            let mut prefetch = None;
            match selection {
                RefSelection::Project(id) => {
                    prefetch = Some(id.clone());
                    draft.refs.project = Some(id);
                }
                RefSelection::Assignees(ids) => draft.refs.assignees = ids,
                RefSelection::Labels(ids) => draft.refs.labels = ids,
                RefSelection::Cycle(id) => draft.refs.cycle = Some(id),
                RefSelection::SubState(id) => draft.refs.sub_state = Some(id),
                RefSelection::Module(id) => draft.refs.module = Some(id),
                RefSelection::Epic(id) => draft.refs.epic = Some(id),
                RefSelection::Feature(id) => draft.refs.feature = Some(id),
                RefSelection::DateRange { start, end } => {
                    draft.refs.date_range = Some((start, end))
                }
            }
            prefetch
        };

        if let Some(project_id) = prefetch {
            let cache = self.cache.clone();
            tokio::spawn(async move {
                cache.get_all_project_data(&project_id).await;
            });
        }
        Ok(())
    }

    /// Persist the draft through the REST collaborator.
    ///
    /// `draft → saving → saved` on 2xx; `saving → error` on failure, with
    /// the server's error text kept verbatim for the card. A draft in
    /// `error` may be saved again.
    pub async fn save(&self, draft_id: &str) -> Result<SavedArtifact, DraftError> {
        let (kind, body, project) = {
            let mut drafts = self.drafts.lock().await;
            let draft = find_mut(&mut drafts, draft_id)?;
            if !matches!(draft.status, DraftStatus::Draft | DraftStatus::Error) {
                return Err(DraftError::NotSavable {
                    id: draft.id.clone(),
                    status: draft.status,
                });
            }
            draft.status = DraftStatus::Saving;
            draft.error = None;
            (
                draft.kind,
                payload::build_payload(draft.kind, &draft.fields, &draft.refs, &self.identity),
                draft.refs.project.clone(),
            )
        };

        // The lock is released across the network call; the Saving status
        // fences off concurrent edits and discards.
        let result = self.api.create_artifact(kind, body).await;

        let mut drafts = self.drafts.lock().await;
        let draft = find_mut(&mut drafts, draft_id)?;
        match result {
            Ok(saved) => {
                draft.status = DraftStatus::Saved;
                draft.saved = Some(saved.clone());
                drop(drafts);
                // A created entity can change downstream reference lists.
                if let Some(project_id) = project {
                    self.cache.invalidate(Some(&project_id));
                }
                Ok(saved)
            }
            Err(e) => {
                let text = error_text(&e);
                draft.status = DraftStatus::Error;
                draft.error = Some(text.clone());
                debug!(draft = draft_id, error = %text, "artifact save failed");
                Err(DraftError::SaveFailed(text))
            }
        }
    }

    /// Remove a draft. Only legal while `draft` or `error` — an in-flight
    /// save or a persisted artifact cannot be discarded.
    pub async fn discard(&self, draft_id: &str) -> Result<(), DraftError> {
        let mut drafts = self.drafts.lock().await;
        let draft = find_mut(&mut drafts, draft_id)?;
        if !matches!(draft.status, DraftStatus::Draft | DraftStatus::Error) {
            return Err(DraftError::NotDiscardable {
                id: draft.id.clone(),
                status: draft.status,
            });
        }
        drafts.retain(|d| d.id != draft_id);
        Ok(())
    }

    /// Read-only snapshot of one draft, for rendering.
    pub async fn snapshot(&self, draft_id: &str) -> Option<ArtifactDraft> {
        self.drafts
            .lock()
            .await
            .iter()
            .find(|d| d.id == draft_id)
            .cloned()
    }

    /// All drafts, in creation order.
    pub async fn drafts(&self) -> Vec<ArtifactDraft> {
        self.drafts.lock().await.clone()
    }

    /// The reference-data cache backing this controller's selectors.
    pub fn cache(&self) -> &Arc<ProjectDataCache> {
        &self.cache
    }
}

fn find_mut<'a>(
    drafts: &'a mut [ArtifactDraft],
    draft_id: &str,
) -> Result<&'a mut ArtifactDraft, DraftError> {
    drafts
        .iter_mut()
        .find(|d| d.id == draft_id)
        .ok_or_else(|| DraftError::NotFound(draft_id.to_string()))
}

/// The user-facing text for a save failure: the server's message verbatim
/// when it sent one, the transport error otherwise.
fn error_text(e: &ApiError) -> String {
    match e {
        ApiError::Api { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
