use crate::ipc::error::{err, ok, timetable_err};
use crate::ipc::types::{AppState, Request};
use crate::store::TimetableStore;
use crate::timetable::error::TimetableError;
use serde_json::{json, Value};

/// Trimmed, non-empty `name` param.
fn name_param(req: &Request) -> Result<String, Value> {
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return Err(err(&req.id, "bad_params", "missing name", None)),
    };
    if name.is_empty() {
        return Err(err(&req.id, "bad_params", "name must not be empty", None));
    }
    Ok(name)
}

fn opt_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };
    match store.classes() {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => timetable_err(&req.id, &req.method, &e.into()),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store.create_class(&name, opt_str(req, "levelName")) {
        Ok(class) => {
            tracing::info!(class_id = %class.id, "class created");
            ok(&req.id, json!({ "classId": class.id, "class": class }))
        }
        Err(e) => timetable_err(&req.id, &req.method, &e.into()),
    }
}

fn handle_classes_set_level(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(class_id) = opt_str(req, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    // A null or absent levelName detaches the class from its level.
    let level = opt_str(req, "levelName");
    match store.set_class_level(class_id, level) {
        Ok(true) => ok(&req.id, json!({ "classId": class_id, "levelName": level })),
        Ok(false) => timetable_err(&req.id, &req.method, &TimetableError::not_found("class", class_id)),
        Err(e) => timetable_err(&req.id, &req.method, &e.into()),
    }
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(class_id) = opt_str(req, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    match store.delete_class(class_id) {
        Ok(true) => {
            tracing::info!(class_id, "class deleted");
            ok(&req.id, json!({ "ok": true }))
        }
        Ok(false) => timetable_err(&req.id, &req.method, &TimetableError::not_found("class", class_id)),
        Err(e) => timetable_err(&req.id, &req.method, &e.into()),
    }
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return ok(&req.id, json!({ "teachers": [] }));
    };
    match store.teachers() {
        Ok(teachers) => ok(&req.id, json!({ "teachers": teachers })),
        Err(e) => timetable_err(&req.id, &req.method, &e.into()),
    }
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store.create_teacher(&name) {
        Ok(teacher) => ok(&req.id, json!({ "teacherId": teacher.id, "teacher": teacher })),
        Err(e) => timetable_err(&req.id, &req.method, &e.into()),
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return ok(&req.id, json!({ "subjects": [] }));
    };
    match store.subjects() {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => timetable_err(&req.id, &req.method, &e.into()),
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let default_teacher = opt_str(req, "defaultTeacherId");
    let result = (|| -> Result<_, TimetableError> {
        if let Some(t) = default_teacher {
            if !store.teachers()?.iter().any(|x| x.id == t) {
                return Err(TimetableError::not_found("teacher", t));
            }
        }
        Ok(store.create_subject(&name, default_teacher)?)
    })();
    match result {
        Ok(subject) => ok(&req.id, json!({ "subjectId": subject.id, "subject": subject })),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    match store.students(opt_str(req, "classId")) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => timetable_err(&req.id, &req.method, &e.into()),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(class_id) = opt_str(req, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    let result = (|| -> Result<_, TimetableError> {
        if store.class(class_id)?.is_none() {
            return Err(TimetableError::not_found("class", class_id));
        }
        Ok(store.create_student(&name, class_id)?)
    })();
    match result {
        Ok(student) => ok(&req.id, json!({ "studentId": student.id, "student": student })),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.setLevel" => Some(handle_classes_set_level(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        _ => None,
    }
}
