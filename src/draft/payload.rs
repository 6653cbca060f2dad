//! REST create payload builders, one per artifact kind.
//!
//! Field naming is a fixed, independently versioned contract per entity:
//! work items, cycles, modules, features and user stories post snake_case
//! bodies; pages, epics and projects post nested camelCase bodies with
//! `business`/`project` stub objects whose names the backend fills in.
//! Do not try to unify these.

use serde_json::{json, Map, Value};

use crate::chat::ArtifactKind;
use crate::config::Identity;

use super::SelectedRefs;

/// Assemble the create body for one draft.
pub fn build_payload(
    kind: ArtifactKind,
    fields: &Map<String, Value>,
    refs: &SelectedRefs,
    identity: &Identity,
) -> Value {
    match kind {
        ArtifactKind::WorkItem => work_item(fields, refs, identity),
        ArtifactKind::Page => page(fields, refs, identity),
        ArtifactKind::Epic => epic(fields, refs, identity),
        ArtifactKind::Cycle => cycle(fields, refs, identity),
        ArtifactKind::Module => module(fields, refs, identity),
        ArtifactKind::Feature => feature(fields, refs, identity),
        ArtifactKind::UserStory => user_story(fields, refs, identity),
        ArtifactKind::Project => project(fields, refs, identity),
    }
}

fn base(fields: &Map<String, Value>) -> Map<String, Value> {
    fields.clone()
}

fn set_opt(body: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        body.insert(key.into(), Value::String(v.clone()));
    }
}

fn set_ids(body: &mut Map<String, Value>, key: &str, ids: &[String]) {
    if !ids.is_empty() {
        body.insert(
            key.into(),
            Value::Array(ids.iter().cloned().map(Value::String).collect()),
        );
    }
}

fn work_item(fields: &Map<String, Value>, refs: &SelectedRefs, identity: &Identity) -> Value {
    let mut body = base(fields);
    set_opt(&mut body, "project_id", &refs.project);
    set_ids(&mut body, "assignee_ids", &refs.assignees);
    set_ids(&mut body, "label_ids", &refs.labels);
    set_opt(&mut body, "cycle_id", &refs.cycle);
    set_opt(&mut body, "state_id", &refs.sub_state);
    set_opt(&mut body, "module_id", &refs.module);
    body.insert("created_by".into(), Value::String(identity.member_id.clone()));
    Value::Object(body)
}

fn cycle(fields: &Map<String, Value>, refs: &SelectedRefs, identity: &Identity) -> Value {
    let mut body = base(fields);
    set_opt(&mut body, "project_id", &refs.project);
    if let Some((start, end)) = &refs.date_range {
        body.insert("start_date".into(), Value::String(start.clone()));
        body.insert("end_date".into(), Value::String(end.clone()));
    }
    body.insert("created_by".into(), Value::String(identity.member_id.clone()));
    Value::Object(body)
}

fn module(fields: &Map<String, Value>, refs: &SelectedRefs, identity: &Identity) -> Value {
    let mut body = base(fields);
    set_opt(&mut body, "project_id", &refs.project);
    set_ids(&mut body, "member_ids", &refs.assignees);
    if let Some((start, end)) = &refs.date_range {
        body.insert("start_date".into(), Value::String(start.clone()));
        body.insert("target_date".into(), Value::String(end.clone()));
    }
    body.insert("created_by".into(), Value::String(identity.member_id.clone()));
    Value::Object(body)
}

fn feature(fields: &Map<String, Value>, refs: &SelectedRefs, identity: &Identity) -> Value {
    let mut body = base(fields);
    set_opt(&mut body, "project_id", &refs.project);
    set_opt(&mut body, "epic_id", &refs.epic);
    body.insert("created_by".into(), Value::String(identity.member_id.clone()));
    Value::Object(body)
}

fn user_story(fields: &Map<String, Value>, refs: &SelectedRefs, identity: &Identity) -> Value {
    let mut body = base(fields);
    set_opt(&mut body, "project_id", &refs.project);
    set_opt(&mut body, "feature_id", &refs.feature);
    body.insert("created_by".into(), Value::String(identity.member_id.clone()));
    Value::Object(body)
}

// Stub sub-objects carry an empty name; the backend populates it.

fn page(fields: &Map<String, Value>, refs: &SelectedRefs, identity: &Identity) -> Value {
    let mut body = base(fields);
    if let Some(project) = &refs.project {
        body.insert("project".into(), json!({ "id": project, "name": "" }));
    }
    body.insert(
        "business".into(),
        json!({ "id": identity.business_id, "name": "" }),
    );
    body.insert(
        "createdBy".into(),
        json!({ "id": identity.member_id, "name": identity.display_name }),
    );
    Value::Object(body)
}

fn epic(fields: &Map<String, Value>, refs: &SelectedRefs, identity: &Identity) -> Value {
    let mut body = base(fields);
    set_opt(&mut body, "projectId", &refs.project);
    body.insert("businessId".into(), Value::String(identity.business_id.clone()));
    if let Some((start, end)) = &refs.date_range {
        body.insert("startDate".into(), Value::String(start.clone()));
        body.insert("endDate".into(), Value::String(end.clone()));
    }
    body.insert(
        "createdBy".into(),
        json!({ "id": identity.member_id, "name": identity.display_name }),
    );
    Value::Object(body)
}

fn project(fields: &Map<String, Value>, _refs: &SelectedRefs, identity: &Identity) -> Value {
    let mut body = base(fields);
    body.insert(
        "business".into(),
        json!({ "id": identity.business_id, "name": "" }),
    );
    body.insert("created_by".into(), Value::String(identity.member_id.clone()));
    Value::Object(body)
}
