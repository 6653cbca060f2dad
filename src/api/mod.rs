//! REST collaborators: artifact creation, per-project reference data, and
//! best-effort conversation persistence.
//!
//! The core treats these endpoints as black boxes — only their response
//! shapes matter here. No request timeout is enforced at this layer; a hung
//! fetch leaves its consumer in a loading state.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};

use crate::chat::ArtifactKind;

/// The five per-project reference-data kinds backing the selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Members,
    Labels,
    Cycles,
    Modules,
    SubStates,
}

impl RefKind {
    pub const ALL: [RefKind; 5] = [
        RefKind::Members,
        RefKind::Labels,
        RefKind::Cycles,
        RefKind::Modules,
        RefKind::SubStates,
    ];

    /// Path segment under `/api/projects/{id}/`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            RefKind::Members => "members",
            RefKind::Labels => "labels",
            RefKind::Cycles => "cycles",
            RefKind::Modules => "modules",
            RefKind::SubStates => "sub-states",
        }
    }
}

/// One reference entity, normalized: an id, a display name, and whatever
/// else the endpoint sent, preserved verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct RefEntity {
    pub id: String,
    pub name: String,
    pub extra: Map<String, Value>,
}

impl RefEntity {
    /// Normalize one entity object. Ids may arrive as strings or numbers;
    /// display names under several keys depending on the endpoint.
    pub fn from_value(value: &Value) -> Option<RefEntity> {
        let obj = value.as_object()?;
        let id = match obj.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let name = ["name", "display_name", "title"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();
        let mut extra = obj.clone();
        extra.remove("id");
        Some(RefEntity { id, name, extra })
    }
}

/// A reference list, always well-typed even when empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefList {
    pub data: Vec<RefEntity>,
}

/// The server's record of a persisted artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedArtifact {
    pub id: String,
    /// Outbound "View" link, when the entity kind provides one.
    pub link: Option<String>,
    pub raw: Value,
}

impl SavedArtifact {
    pub fn from_response(raw: Value) -> Result<SavedArtifact, ApiError> {
        let id = match raw.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(ApiError::InvalidResponse(
                    "create response missing id".into(),
                ))
            }
        };
        let link = raw
            .get("link")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(SavedArtifact { id, link, raw })
    }
}

/// A persisted conversation, for history reload after reconnect.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub updated_at: Option<String>,
}

/// Errors from REST operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Artifact creation and the uncached entity lists.
#[async_trait]
pub trait ArtifactApi: Send + Sync {
    async fn create_artifact(
        &self,
        kind: ArtifactKind,
        payload: Value,
    ) -> Result<SavedArtifact, ApiError>;

    /// Epics and features back their selectors directly, outside the
    /// reference-data cache.
    async fn list_epics(&self, project_id: &str) -> Result<RefList, ApiError>;
    async fn list_features(&self, project_id: &str) -> Result<RefList, ApiError>;
}

/// Per-project reference-data reads, one call per kind.
#[async_trait]
pub trait ReferenceApi: Send + Sync {
    async fn fetch_reference(
        &self,
        kind: RefKind,
        project_id: &str,
    ) -> Result<RefList, ApiError>;
}

/// Collection path for an artifact kind's create endpoint.
pub fn artifact_path(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::WorkItem => "work-items",
        ArtifactKind::Page => "pages",
        ArtifactKind::Epic => "epics",
        ArtifactKind::Cycle => "cycles",
        ArtifactKind::Module => "modules",
        ArtifactKind::Feature => "features",
        ArtifactKind::UserStory => "user-stories",
        ArtifactKind::Project => "projects",
    }
}

/// Normalize a reference-data response body into a flat list.
///
/// Most endpoints return `{"data": [...]}`. Cycles return groups keyed by
/// status (`UPCOMING`/`ACTIVE`/`COMPLETED`); those flatten into one list
/// with each entity tagged by its group.
pub fn parse_reference_payload(body: &Value) -> RefList {
    let mut data = Vec::new();

    if let Some(items) = body.get("data").and_then(Value::as_array) {
        data.extend(items.iter().filter_map(RefEntity::from_value));
    } else if let Some(obj) = body.as_object() {
        for (group, items) in obj {
            if let Some(items) = items.as_array() {
                for item in items {
                    if let Some(mut entity) = RefEntity::from_value(item) {
                        entity
                            .extra
                            .insert("group".into(), Value::String(group.clone()));
                        data.push(entity);
                    }
                }
            }
        }
    } else if let Some(items) = body.as_array() {
        data.extend(items.iter().filter_map(RefEntity::from_value));
    }

    RefList { data }
}

/// HTTP client for the project-management REST API.
#[derive(Debug)]
pub struct RestClient {
    http: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::read_body(response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::read_body(response).await
    }

    /// Non-2xx bodies are surfaced verbatim as error text, whether the
    /// server sent JSON or plain text.
    async fn read_body(response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(ApiError::Api {
                status,
                message: body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("failed to parse response: {e}")))
    }

    // ── Conversation persistence (best-effort) ──

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let body = self.get_json("/api/conversations").await?;
        let items = body
            .get("data")
            .and_then(Value::as_array)
            .or_else(|| body.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(items
            .iter()
            .filter_map(|item| {
                let id = item.get("id").and_then(Value::as_str)?.to_string();
                Some(ConversationSummary {
                    id,
                    title: item.get("title").and_then(Value::as_str).map(Into::into),
                    updated_at: item
                        .get("updated_at")
                        .and_then(Value::as_str)
                        .map(Into::into),
                })
            })
            .collect())
    }

    /// Raw persisted messages for one conversation, used to reload history
    /// after a reconnect (the socket itself does not replay missed events).
    pub async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Value>, ApiError> {
        let body = self
            .get_json(&format!("/api/conversations/{conversation_id}/messages"))
            .await?;
        Ok(body
            .get("data")
            .and_then(Value::as_array)
            .or_else(|| body.as_array())
            .cloned()
            .unwrap_or_default())
    }

    pub async fn post_reaction(
        &self,
        message_id: &str,
        reaction: &str,
    ) -> Result<(), ApiError> {
        self.post_json(
            &format!("/api/messages/{message_id}/reactions"),
            &serde_json::json!({ "reaction": reaction }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactApi for RestClient {
    async fn create_artifact(
        &self,
        kind: ArtifactKind,
        payload: Value,
    ) -> Result<SavedArtifact, ApiError> {
        let body = self
            .post_json(&format!("/api/{}", artifact_path(kind)), &payload)
            .await?;
        SavedArtifact::from_response(body)
    }

    async fn list_epics(&self, project_id: &str) -> Result<RefList, ApiError> {
        let body = self
            .get_json(&format!("/api/projects/{project_id}/epics"))
            .await?;
        Ok(parse_reference_payload(&body))
    }

    async fn list_features(&self, project_id: &str) -> Result<RefList, ApiError> {
        let body = self
            .get_json(&format!("/api/projects/{project_id}/features"))
            .await?;
        Ok(parse_reference_payload(&body))
    }
}

#[async_trait]
impl ReferenceApi for RestClient {
    async fn fetch_reference(
        &self,
        kind: RefKind,
        project_id: &str,
    ) -> Result<RefList, ApiError> {
        let body = self
            .get_json(&format!(
                "/api/projects/{project_id}/{}",
                kind.path_segment()
            ))
            .await?;
        Ok(parse_reference_payload(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_paths() {
        assert_eq!(artifact_path(ArtifactKind::WorkItem), "work-items");
        assert_eq!(artifact_path(ArtifactKind::UserStory), "user-stories");
        assert_eq!(artifact_path(ArtifactKind::Project), "projects");
    }

    #[test]
    fn entity_normalizes_numeric_id_and_name_aliases() {
        let member = RefEntity::from_value(&serde_json::json!({
            "id": 42, "display_name": "Ada", "role": "admin"
        }))
        .unwrap();
        assert_eq!(member.id, "42");
        assert_eq!(member.name, "Ada");
        assert_eq!(member.extra["role"], "admin");

        let label = RefEntity::from_value(&serde_json::json!({
            "id": "l1", "name": "bug", "color": "#d73a4a"
        }))
        .unwrap();
        assert_eq!(label.name, "bug");
    }

    #[test]
    fn entity_without_id_is_skipped() {
        assert!(RefEntity::from_value(&serde_json::json!({"name": "orphan"})).is_none());
        assert!(RefEntity::from_value(&serde_json::json!("just a string")).is_none());
    }

    #[test]
    fn flat_reference_payload() {
        let list = parse_reference_payload(&serde_json::json!({
            "data": [
                {"id": "m1", "name": "alpha"},
                {"id": "m2", "name": "beta"},
                "garbage"
            ]
        }));
        assert_eq!(list.data.len(), 2);
        assert_eq!(list.data[1].name, "beta");
    }

    #[test]
    fn grouped_cycles_flatten_with_group_tag() {
        let list = parse_reference_payload(&serde_json::json!({
            "UPCOMING": [{"id": "c1", "name": "Sprint 12"}],
            "ACTIVE": [{"id": "c2", "name": "Sprint 11"}],
            "COMPLETED": []
        }));
        assert_eq!(list.data.len(), 2);
        let active = list.data.iter().find(|e| e.id == "c2").unwrap();
        assert_eq!(active.extra["group"], "ACTIVE");
    }

    #[test]
    fn saved_artifact_requires_id() {
        let ok = SavedArtifact::from_response(serde_json::json!({
            "id": "w9", "title": "Fix login", "link": "https://app/w9"
        }))
        .unwrap();
        assert_eq!(ok.id, "w9");
        assert_eq!(ok.link.as_deref(), Some("https://app/w9"));

        let err = SavedArtifact::from_response(serde_json::json!({"title": "no id"}));
        assert!(matches!(err, Err(ApiError::InvalidResponse(_))));
    }

    #[test]
    fn error_display() {
        let err = ApiError::Api {
            status: 422,
            message: "title is required".into(),
        };
        assert!(err.to_string().contains("422"));
        assert!(err.to_string().contains("title is required"));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = RestClient::new("https://api.example.com/".into(), "t".into());
        assert_eq!(client.base_url, "https://api.example.com");
    }
}
