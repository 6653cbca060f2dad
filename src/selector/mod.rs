//! Selector view-models for the artifact editor cards.
//!
//! Purely reactive: a selector holds its option list, a text filter, and the
//! current selection, and writes the selection through the draft controller.
//! Options come from the project-data cache (warm reads avoid a loading
//! flash) or, for epics and features, from direct REST reads.

use tracing::warn;

use crate::api::{ArtifactApi, RefEntity, RefKind, RefList};
use crate::cache::ProjectDataCache;
use crate::draft::{DraftController, DraftError, RefSelection};

/// Whether a selector accepts one value or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Single,
    Multiple,
}

/// A selector over one of the five cached reference kinds.
#[derive(Debug)]
pub struct RefSelector {
    kind: RefKind,
    mode: SelectionMode,
    options: Vec<RefEntity>,
    query: String,
    loading: bool,
    selected: Vec<String>,
}

impl RefSelector {
    pub fn new(kind: RefKind) -> Self {
        let mode = match kind {
            RefKind::Members | RefKind::Labels => SelectionMode::Multiple,
            _ => SelectionMode::Single,
        };
        Self {
            kind,
            mode,
            options: Vec::new(),
            query: String::new(),
            loading: false,
            selected: Vec::new(),
        }
    }

    pub fn kind(&self) -> RefKind {
        self.kind
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Warm read: populate from the cache when the project's data is fresh.
    /// Returns `false` on a miss, in which case the selector is left in its
    /// loading state and [`hydrate`](Self::hydrate) should follow.
    pub fn hydrate_from_cache(&mut self, cache: &ProjectDataCache, project_id: &str) -> bool {
        match cache.get_cached(self.kind, project_id) {
            Some(list) => {
                self.set_options(list);
                true
            }
            None => {
                self.loading = true;
                false
            }
        }
    }

    /// Populate through the cache, fetching when cold. A failed fetch has
    /// already been degraded to an empty list by the cache, so the selector
    /// always ends up renderable.
    pub async fn hydrate(&mut self, cache: &ProjectDataCache, project_id: &str) {
        if self.hydrate_from_cache(cache, project_id) {
            return;
        }
        let bundle = cache.get_all_project_data(project_id).await;
        self.set_options(bundle.get(self.kind).clone());
    }

    pub fn set_options(&mut self, list: RefList) {
        self.options = list.data;
        self.loading = false;
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// Options matching the current filter, case-insensitively, in the
    /// order the endpoint returned them.
    pub fn visible_options(&self) -> Vec<&RefEntity> {
        let needle = self.query.to_lowercase();
        self.options
            .iter()
            .filter(|e| needle.is_empty() || e.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Select an option: toggles for multi-select kinds, replaces for
    /// single-select kinds. Unknown ids are ignored.
    pub fn toggle(&mut self, id: &str) {
        if !self.options.iter().any(|e| e.id == id) {
            return;
        }
        match self.mode {
            SelectionMode::Multiple => {
                if let Some(pos) = self.selected.iter().position(|s| s == id) {
                    self.selected.remove(pos);
                } else {
                    self.selected.push(id.to_string());
                }
            }
            SelectionMode::Single => {
                self.selected = vec![id.to_string()];
            }
        }
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// Write the current selection into a draft's reference fields.
    pub async fn apply_to_draft(
        &self,
        drafts: &DraftController,
        draft_id: &str,
    ) -> Result<(), DraftError> {
        let selection = match self.kind {
            RefKind::Members => RefSelection::Assignees(self.selected.clone()),
            RefKind::Labels => RefSelection::Labels(self.selected.clone()),
            RefKind::Cycles => match self.selected.first() {
                Some(id) => RefSelection::Cycle(id.clone()),
                None => return Ok(()),
            },
            RefKind::Modules => match self.selected.first() {
                Some(id) => RefSelection::Module(id.clone()),
                None => return Ok(()),
            },
            RefKind::SubStates => match self.selected.first() {
                Some(id) => RefSelection::SubState(id.clone()),
                None => return Ok(()),
            },
        };
        drafts.select_reference(draft_id, selection).await
    }
}

/// Epics and features are not part of the cached bundle; their selectors
/// list straight from the REST collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityTarget {
    Epic,
    Feature,
}

#[derive(Debug)]
pub struct EntitySelector {
    target: EntityTarget,
    options: Vec<RefEntity>,
    query: String,
    loading: bool,
    selected: Option<String>,
}

impl EntitySelector {
    pub fn new(target: EntityTarget) -> Self {
        Self {
            target,
            options: Vec::new(),
            query: String::new(),
            loading: false,
            selected: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// List options for a project. Fetch failures degrade to an empty list;
    /// the chat flow stays usable without this selector.
    pub async fn load(&mut self, api: &dyn ArtifactApi, project_id: &str) {
        self.loading = true;
        let result = match self.target {
            EntityTarget::Epic => api.list_epics(project_id).await,
            EntityTarget::Feature => api.list_features(project_id).await,
        };
        self.options = match result {
            Ok(list) => list.data,
            Err(e) => {
                warn!(target = ?self.target, error = %e, "entity list failed");
                Vec::new()
            }
        };
        self.loading = false;
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn visible_options(&self) -> Vec<&RefEntity> {
        let needle = self.query.to_lowercase();
        self.options
            .iter()
            .filter(|e| needle.is_empty() || e.name.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn select(&mut self, id: &str) {
        if self.options.iter().any(|e| e.id == id) {
            self.selected = Some(id.to_string());
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub async fn apply_to_draft(
        &self,
        drafts: &DraftController,
        draft_id: &str,
    ) -> Result<(), DraftError> {
        let Some(id) = &self.selected else {
            return Ok(());
        };
        let selection = match self.target {
            EntityTarget::Epic => RefSelection::Epic(id.clone()),
            EntityTarget::Feature => RefSelection::Feature(id.clone()),
        };
        drafts.select_reference(draft_id, selection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Map;

    use crate::api::{ApiError, ReferenceApi, SavedArtifact};
    use crate::chat::ArtifactKind;
    use crate::config::Identity;

    fn entity(id: &str, name: &str) -> RefEntity {
        RefEntity {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }

    fn options(selector: &mut RefSelector, entities: Vec<RefEntity>) {
        selector.set_options(RefList { data: entities });
    }

    #[test]
    fn filter_is_case_insensitive() {
        let mut sel = RefSelector::new(RefKind::Labels);
        options(
            &mut sel,
            vec![entity("l1", "Bug"), entity("l2", "Feature"), entity("l3", "debug")],
        );
        sel.set_query("BUG");
        let visible: Vec<_> = sel.visible_options().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(visible, vec!["l1", "l3"]);
    }

    #[test]
    fn members_toggle_labels_accumulate() {
        let mut sel = RefSelector::new(RefKind::Members);
        options(&mut sel, vec![entity("u1", "Ada"), entity("u2", "Grace")]);
        sel.toggle("u1");
        sel.toggle("u2");
        assert_eq!(sel.selected(), ["u1", "u2"]);
        sel.toggle("u1");
        assert_eq!(sel.selected(), ["u2"]);
    }

    #[test]
    fn single_select_replaces() {
        let mut sel = RefSelector::new(RefKind::Cycles);
        options(&mut sel, vec![entity("c1", "Sprint 11"), entity("c2", "Sprint 12")]);
        sel.toggle("c1");
        sel.toggle("c2");
        assert_eq!(sel.selected(), ["c2"]);
    }

    #[test]
    fn unknown_id_is_ignored() {
        let mut sel = RefSelector::new(RefKind::Modules);
        options(&mut sel, vec![entity("m1", "Auth")]);
        sel.toggle("ghost");
        assert!(sel.selected().is_empty());
    }

    struct StaticReferenceApi;

    #[async_trait]
    impl ReferenceApi for StaticReferenceApi {
        async fn fetch_reference(
            &self,
            kind: RefKind,
            _project_id: &str,
        ) -> Result<RefList, ApiError> {
            Ok(RefList {
                data: vec![entity("x1", kind.path_segment())],
            })
        }
    }

    #[tokio::test]
    async fn cold_hydrate_flags_loading_then_populates() {
        let cache = ProjectDataCache::new(Arc::new(StaticReferenceApi));
        let mut sel = RefSelector::new(RefKind::Members);

        assert!(!sel.hydrate_from_cache(&cache, "p1"));
        assert!(sel.is_loading());

        sel.hydrate(&cache, "p1").await;
        assert!(!sel.is_loading());
        assert_eq!(sel.visible_options()[0].name, "members");
    }

    #[tokio::test]
    async fn warm_hydrate_skips_loading_entirely() {
        let cache = ProjectDataCache::new(Arc::new(StaticReferenceApi));
        cache.get_all_project_data("p1").await;

        let mut sel = RefSelector::new(RefKind::Cycles);
        assert!(sel.hydrate_from_cache(&cache, "p1"));
        assert!(!sel.is_loading());
        assert_eq!(sel.visible_options().len(), 1);
    }

    struct StubArtifactApi {
        fail: bool,
    }

    #[async_trait]
    impl crate::api::ArtifactApi for StubArtifactApi {
        async fn create_artifact(
            &self,
            _kind: ArtifactKind,
            payload: serde_json::Value,
        ) -> Result<SavedArtifact, ApiError> {
            Ok(SavedArtifact {
                id: "a1".into(),
                link: None,
                raw: payload,
            })
        }

        async fn list_epics(&self, _project_id: &str) -> Result<RefList, ApiError> {
            if self.fail {
                return Err(ApiError::Api {
                    status: 500,
                    message: "down".into(),
                });
            }
            Ok(RefList {
                data: vec![entity("e1", "Payments revamp")],
            })
        }

        async fn list_features(&self, _project_id: &str) -> Result<RefList, ApiError> {
            Ok(RefList {
                data: vec![entity("f1", "Checkout")],
            })
        }
    }

    #[tokio::test]
    async fn entity_selector_lists_and_selects() {
        let api = StubArtifactApi { fail: false };
        let mut sel = EntitySelector::new(EntityTarget::Epic);
        sel.load(&api, "p1").await;
        assert_eq!(sel.visible_options().len(), 1);
        sel.select("e1");
        assert_eq!(sel.selected(), Some("e1"));
    }

    #[tokio::test]
    async fn entity_selector_degrades_on_failure() {
        let api = StubArtifactApi { fail: true };
        let mut sel = EntitySelector::new(EntityTarget::Epic);
        sel.load(&api, "p1").await;
        assert!(!sel.is_loading());
        assert!(sel.visible_options().is_empty());
    }

    #[tokio::test]
    async fn selections_write_through_to_the_draft() {
        let api = Arc::new(StubArtifactApi { fail: false });
        let cache = Arc::new(ProjectDataCache::new(Arc::new(StaticReferenceApi)));
        let drafts = DraftController::new(api.clone(), cache, Identity::default());
        let draft = drafts
            .create_draft(ArtifactKind::WorkItem, Map::new())
            .await;

        let mut members = RefSelector::new(RefKind::Members);
        options(&mut members, vec![entity("u1", "Ada")]);
        members.toggle("u1");
        members.apply_to_draft(&drafts, &draft.id).await.unwrap();

        let mut epics = EntitySelector::new(EntityTarget::Epic);
        epics.load(api.as_ref(), "p1").await;
        epics.select("e1");
        epics.apply_to_draft(&drafts, &draft.id).await.unwrap();

        let snap = drafts.snapshot(&draft.id).await.unwrap();
        assert_eq!(snap.refs.assignees, ["u1"]);
        assert_eq!(snap.refs.epic.as_deref(), Some("e1"));
    }
}
