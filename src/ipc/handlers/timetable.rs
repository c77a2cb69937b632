use crate::ipc::error::{err, ok, ok_serialized, timetable_err};
use crate::ipc::types::{AppState, Request};
use crate::timetable::error::TimetableError;
use crate::timetable::service;
use crate::timetable::validate::EntryDraft;
use crate::timetable::views::day_labels;
use serde_json::{json, Value};

fn required_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(err(&req.id, "bad_params", format!("missing {key}"), None)),
    }
}

/// Adds the weekday header row that every grid-shaped response carries.
fn with_days<T: serde::Serialize>(req: &Request, view: &T) -> Value {
    let mut resp = ok_serialized(&req.id, view);
    if let Some(result) = resp.get_mut("result").and_then(|r| r.as_object_mut()) {
        result.insert("days".into(), json!(day_labels()));
    }
    resp
}

fn parse_draft(req: &Request) -> Result<EntryDraft, TimetableError> {
    // The body may come wrapped as `{entry: {...}}` or flat in params.
    let body = req.params.get("entry").unwrap_or(&req.params).clone();
    serde_json::from_value(body).map_err(|e| TimetableError::validation("entry", e.to_string()))
}

fn handle_class(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service::class_timetable(store, class_id) {
        Ok(view) => with_days(req, &view),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

fn handle_teacher(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service::teacher_timetable(store, teacher_id) {
        Ok(view) => with_days(req, &view),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

fn handle_student(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service::student_timetable(store, student_id) {
        Ok(view) => with_days(req, &view),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match parse_draft(req).and_then(|draft| service::submit_entry(store, &draft)) {
        Ok(created) => ok_serialized(&req.id, &created),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

fn handle_validate(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let updating = req.params.get("entryId").and_then(|v| v.as_str());
    match parse_draft(req).and_then(|draft| service::check_entry(store, &draft, updating)) {
        Ok(_) => ok(&req.id, json!({ "valid": true })),
        // Rejections are the expected answer here, not a failed request.
        Err(e @ (TimetableError::Validation(_) | TimetableError::Conflict { .. })) => ok(
            &req.id,
            json!({ "valid": false, "code": e.code(), "details": e.details() }),
        ),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let entry_id = match required_str(req, "entryId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    match service::update_entry(store, entry_id, patch) {
        Ok(updated) => ok_serialized(&req.id, &updated),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let entry_id = match required_str(req, "entryId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service::delete_entry(store, entry_id) {
        Ok(deleted) => ok_serialized(&req.id, &deleted),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

fn handle_history(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let entry_id = match required_str(req, "entryId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service::entry_history(store, entry_id) {
        Ok(revisions) => ok_serialized(&req.id, &json!({ "revisions": revisions })),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "timetable.class" => Some(handle_class(state, req)),
        "timetable.teacher" => Some(handle_teacher(state, req)),
        "timetable.student" => Some(handle_student(state, req)),
        "timetable.create" => Some(handle_create(state, req)),
        "timetable.validate" => Some(handle_validate(state, req)),
        "timetable.update" => Some(handle_update(state, req)),
        "timetable.delete" => Some(handle_delete(state, req)),
        "timetable.history" => Some(handle_history(state, req)),
        _ => None,
    }
}
