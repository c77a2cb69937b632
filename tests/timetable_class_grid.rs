mod test_support;

use serde_json::json;
use test_support::{
    default_settings, request_err, request_ok, spawn_sidecar, str_field, temp_dir,
};

fn shape(day: &serde_json::Value) -> Vec<(String, u64, String, String)> {
    day.as_array()
        .expect("day slots")
        .iter()
        .map(|s| {
            (
                str_field(s, "type"),
                s.get("period").and_then(|v| v.as_u64()).expect("period"),
                str_field(s, "startTime"),
                str_field(s, "endTime"),
            )
        })
        .collect()
}

fn slot(kind: &str, period: u64, start: &str, end: &str) -> (String, u64, String, String) {
    (kind.to_string(), period, start.to_string(), end.to_string())
}

#[test]
fn class_grid_interleaves_breaks_by_cadence_and_anchor() {
    let workspace = temp_dir("timetabled-class-grid");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = str_field(
        &request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "7A" })),
        "classId",
    );
    let anchored = str_field(
        &request_ok(&mut stdin, &mut reader, "3", "classes.create", json!({ "name": "7B" })),
        "classId",
    );

    // No settings yet: the grid cannot be rendered.
    let err = request_err(&mut stdin, &mut reader, "4", "timetable.class", json!({ "classId": class_id }));
    assert_eq!(str_field(&err, "code"), "configuration_incomplete");

    let mut settings = default_settings();
    settings["classWiseOverrides"] = json!([{
        "classId": anchored,
        "breakTime": { "startTime": "10:30", "duration": 15 }
    }]);
    let _ = request_ok(&mut stdin, &mut reader, "5", "settings.save", json!({ "settings": settings }));

    let view = request_ok(&mut stdin, &mut reader, "6", "timetable.class", json!({ "classId": class_id }));
    assert_eq!(view["class"]["name"], "7A");
    assert_eq!(view["periodConfig"]["totalPeriods"], 7);
    assert_eq!(view["days"].as_array().map(|d| d.len()), Some(6));
    assert_eq!(view["days"][0], json!({ "day": "Mon", "dayName": "Monday" }));
    assert!(view["warnings"].as_array().expect("warnings").is_empty());
    assert_eq!(
        shape(&view["timetable"]["Mon"]),
        vec![
            slot("period", 1, "08:00", "08:40"),
            slot("period", 2, "08:40", "09:20"),
            slot("period", 3, "09:20", "10:00"),
            slot("break", 3, "10:00", "10:20"),
            slot("period", 4, "10:20", "11:00"),
            slot("period", 5, "11:00", "11:40"),
            slot("period", 6, "11:40", "12:20"),
            slot("break", 6, "12:20", "12:40"),
            slot("period", 7, "12:40", "13:20"),
        ]
    );
    // Every day of the week shares the template.
    assert_eq!(shape(&view["timetable"]["Sat"]), shape(&view["timetable"]["Mon"]));

    let view = request_ok(&mut stdin, &mut reader, "7", "timetable.class", json!({ "classId": anchored }));
    assert_eq!(view["effectiveConfig"]["breakTime"]["startTime"], "10:30");
    assert_eq!(view["effectiveConfig"]["sources"]["breakDuration"], "class");
    assert_eq!(view["effectiveConfig"]["sources"]["breakAfterPeriods"], "default");
    assert_eq!(
        shape(&view["timetable"]["Wed"]),
        vec![
            slot("period", 1, "08:00", "08:40"),
            slot("period", 2, "08:40", "09:20"),
            slot("period", 3, "09:20", "10:00"),
            slot("break", 3, "10:30", "10:45"),
            slot("period", 4, "10:45", "11:25"),
            slot("period", 5, "11:25", "12:05"),
            slot("period", 6, "12:05", "12:45"),
            slot("break", 6, "12:45", "13:00"),
            slot("period", 7, "13:00", "13:40"),
        ]
    );

    let err = request_err(&mut stdin, &mut reader, "8", "timetable.class", json!({ "classId": "missing" }));
    assert_eq!(str_field(&err, "code"), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn day_running_past_end_time_is_a_soft_warning() {
    let workspace = temp_dir("timetabled-class-grid-overrun");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = str_field(
        &request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "9C" })),
        "classId",
    );
    let mut settings = default_settings();
    settings["defaultSchoolTiming"]["endTime"] = json!("12:00");
    let _ = request_ok(&mut stdin, &mut reader, "3", "settings.save", json!({ "settings": settings }));

    let view = request_ok(&mut stdin, &mut reader, "4", "timetable.class", json!({ "classId": class_id }));
    // All seven periods are still rendered.
    let periods = view["timetable"]["Thu"]
        .as_array()
        .expect("slots")
        .iter()
        .filter(|s| s["type"] == "period")
        .count();
    assert_eq!(periods, 7);
    let warnings = view["warnings"].as_array().expect("warnings");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["kind"], "exceedsEndTime");
    assert_eq!(warnings[0]["lastPeriodEnd"], "13:20");
    assert_eq!(warnings[0]["endTime"], "12:00");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
