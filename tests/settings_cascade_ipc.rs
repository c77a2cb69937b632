mod test_support;

use serde_json::json;
use test_support::{
    default_settings, request_err, request_ok, spawn_sidecar, str_field, temp_dir,
};

fn preview_for<'a>(preview: &'a serde_json::Value, class_id: &str) -> &'a serde_json::Value {
    preview
        .get("classes")
        .and_then(|v| v.as_array())
        .and_then(|arr| {
            arr.iter()
                .find(|c| c.get("class").and_then(|k| k.get("id")).and_then(|v| v.as_str()) == Some(class_id))
        })
        .expect("class preview")
}

#[test]
fn level_and_class_tiers_cascade_field_by_field() {
    let workspace = temp_dir("timetabled-settings-cascade");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let plain = str_field(
        &request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "5A" })),
        "classId",
    );
    let senior = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "classes.create",
            json!({ "name": "11A", "levelName": "Senior" }),
        ),
        "classId",
    );
    let special = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "classes.create",
            json!({ "name": "11B", "levelName": "Senior" }),
        ),
        "classId",
    );

    let mut settings = default_settings();
    settings["classLevels"] = json!([{
        "name": "Senior",
        "timings": { "startTime": "07:30", "periodConfig": { "totalPeriods": 8 } }
    }]);
    settings["classWiseOverrides"] = json!([{
        "classId": special,
        "periodConfig": { "periodDuration": 45 }
    }]);
    let saved = request_ok(&mut stdin, &mut reader, "5", "settings.save", json!({ "settings": settings }));
    let settings_id = saved
        .get("settings")
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_str())
        .expect("settings id")
        .to_string();

    let preview = request_ok(&mut stdin, &mut reader, "6", "settings.preview", json!({}));

    let p = preview_for(&preview, &plain);
    assert_eq!(p["effectiveConfig"]["startTime"], "08:00");
    assert_eq!(p["effectiveConfig"]["periodConfig"]["totalPeriods"], 7);
    assert_eq!(p["effectiveConfig"]["sources"]["startTime"], "default");

    let s = preview_for(&preview, &senior);
    assert_eq!(s["effectiveConfig"]["startTime"], "07:30");
    assert_eq!(s["effectiveConfig"]["endTime"], "14:00");
    assert_eq!(s["effectiveConfig"]["periodConfig"]["totalPeriods"], 8);
    assert_eq!(s["effectiveConfig"]["periodConfig"]["periodDuration"], 40);
    assert_eq!(s["effectiveConfig"]["sources"]["totalPeriods"], "level");
    assert_eq!(s["slots"][0]["startTime"], "07:30");

    let x = preview_for(&preview, &special);
    assert_eq!(x["effectiveConfig"]["startTime"], "07:30");
    assert_eq!(x["effectiveConfig"]["periodConfig"]["periodDuration"], 45);
    assert_eq!(x["effectiveConfig"]["periodConfig"]["totalPeriods"], 8);
    assert_eq!(x["effectiveConfig"]["sources"]["periodDuration"], "class");
    assert_eq!(x["slots"][0]["endTime"], "08:15");
    // 8 x 45 + 2 x 20 from 07:30 runs to 14:10, past the 14:00 end.
    let warnings = x["warnings"].as_array().expect("warnings");
    assert!(warnings.iter().any(|w| w["kind"] == "exceedsEndTime" && w["lastPeriodEnd"] == "14:10"));

    // Tier patch: shorten the senior day, then drop the override.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "settings.update",
        json!({ "tier": "classLevel", "name": "Senior", "patch": { "periodConfig": { "totalPeriods": 6 } } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "settings.update",
        json!({ "tier": "classOverride", "classId": special, "remove": true }),
    );
    let preview = request_ok(&mut stdin, &mut reader, "9", "settings.preview", json!({}));
    let x = preview_for(&preview, &special);
    assert_eq!(x["effectiveConfig"]["periodConfig"]["periodDuration"], 40);
    assert_eq!(x["effectiveConfig"]["periodConfig"]["totalPeriods"], 6);
    assert_eq!(x["effectiveConfig"]["startTime"], "07:30");

    // PUT semantics: the id must match the stored document.
    let err = request_err(
        &mut stdin,
        &mut reader,
        "10",
        "settings.save",
        json!({ "id": "nope", "settings": default_settings() }),
    );
    assert_eq!(str_field(&err, "code"), "not_found");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "settings.save",
        json!({ "id": settings_id, "settings": default_settings() }),
    );
    let got = request_ok(&mut stdin, &mut reader, "12", "settings.get", json!({}));
    assert_eq!(got["settings"]["id"], settings_id.as_str());
    assert!(got["settings"]["classLevels"].as_array().map_or(true, |a| a.is_empty()));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_settings_are_rejected_with_field_errors() {
    let workspace = temp_dir("timetabled-settings-invalid");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let mut settings = default_settings();
    settings["defaultPeriodConfig"]["periodDuration"] = json!(0);
    let err = request_err(&mut stdin, &mut reader, "2", "settings.save", json!({ "settings": settings }));
    assert_eq!(str_field(&err, "code"), "validation_failed");
    let fields = err["details"]["fieldErrors"].as_array().expect("fieldErrors");
    assert!(!fields.is_empty());

    let mut settings = default_settings();
    settings["defaultSchoolTiming"]["startTime"] = json!("25:99");
    let err = request_err(&mut stdin, &mut reader, "3", "settings.save", json!({ "settings": settings }));
    assert_eq!(str_field(&err, "code"), "validation_failed");

    let err = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "settings.update",
        json!({ "tier": "defaultSchoolTiming", "patch": { "lunchTime": "12:00" } }),
    );
    assert_eq!(str_field(&err, "code"), "validation_failed");

    let err = request_err(&mut stdin, &mut reader, "5", "settings.update", json!({ "tier": "weekly", "patch": {} }));
    assert_eq!(str_field(&err, "code"), "bad_params");

    // Nothing was persisted.
    let got = request_ok(&mut stdin, &mut reader, "6", "settings.get", json!({}));
    assert!(got["settings"].is_null());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
