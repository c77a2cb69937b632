use crate::ipc::error::{err, ok, ok_serialized, timetable_err};
use crate::ipc::types::{AppState, Request};
use crate::store::TimetableStore;
use crate::timetable::error::TimetableError;
use crate::timetable::model::TimetableSettings;
use crate::timetable::service;
use serde_json::{json, Map, Value};

/// One independently editable tier of the settings document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SettingsTier {
    DefaultSchoolTiming,
    DefaultPeriodConfig,
    ClassLevel,
    ClassOverride,
}

impl SettingsTier {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "defaultSchoolTiming" => Some(Self::DefaultSchoolTiming),
            "defaultPeriodConfig" => Some(Self::DefaultPeriodConfig),
            "classLevel" => Some(Self::ClassLevel),
            "classOverride" => Some(Self::ClassOverride),
            _ => None,
        }
    }

    fn allowed_keys(self) -> &'static [&'static str] {
        match self {
            Self::DefaultSchoolTiming => &["startTime", "endTime"],
            Self::DefaultPeriodConfig => &[
                "periodDuration",
                "totalPeriods",
                "breakAfterPeriods",
                "breakDuration",
            ],
            Self::ClassLevel | Self::ClassOverride => {
                &["startTime", "endTime", "breakTime", "periodConfig"]
            }
        }
    }
}

#[derive(Debug)]
struct TierTarget<'a> {
    tier: SettingsTier,
    /// Level name or class id, for the list-valued tiers.
    key: Option<&'a str>,
}

fn as_object_mut<'v>(v: &'v mut Value, field: &str) -> Result<&'v mut Map<String, Value>, TimetableError> {
    if v.is_null() {
        *v = Value::Object(Map::new());
    }
    v.as_object_mut()
        .ok_or_else(|| TimetableError::validation(field, "must be an object"))
}

/// Keys of the nested objects inside a level or override.
fn nested_keys(key: &str) -> Option<&'static [&'static str]> {
    match key {
        "periodConfig" => Some(&[
            "periodDuration",
            "totalPeriods",
            "breakAfterPeriods",
            "breakDuration",
        ]),
        "breakTime" => Some(&["startTime", "duration"]),
        _ => None,
    }
}

/// Merges `patch` into `obj`. A `null` value clears the key; `periodConfig`
/// and `breakTime` objects are merged key by key.
fn merge_keys(
    obj: &mut Map<String, Value>,
    patch: &Map<String, Value>,
    allowed: &[&str],
) -> Result<(), TimetableError> {
    for (k, v) in patch {
        if !allowed.contains(&k.as_str()) {
            return Err(TimetableError::validation(k.as_str(), "unknown field"));
        }
        match (v, nested_keys(k)) {
            (Value::Null, _) => {
                obj.remove(k);
            }
            (Value::Object(inner), Some(inner_allowed)) => {
                let section = obj.entry(k.clone()).or_insert(Value::Null);
                let section = as_object_mut(section, k)?;
                for ik in inner.keys() {
                    if !inner_allowed.contains(&ik.as_str()) {
                        return Err(TimetableError::validation(format!("{k}.{ik}"), "unknown field"));
                    }
                }
                merge_keys(section, inner, inner_allowed)?;
                if section.is_empty() {
                    obj.remove(k);
                }
            }
            _ => {
                obj.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(())
}

/// Applies a patch (or removal) to one tier of a settings document in its JSON form.
fn merge_tier_patch(
    doc: &mut Value,
    target: &TierTarget<'_>,
    patch: &Map<String, Value>,
    remove: bool,
) -> Result<(), TimetableError> {
    let root = as_object_mut(doc, "settings")?;
    let allowed = target.tier.allowed_keys();
    match target.tier {
        SettingsTier::DefaultSchoolTiming | SettingsTier::DefaultPeriodConfig => {
            let field = if target.tier == SettingsTier::DefaultSchoolTiming {
                "defaultSchoolTiming"
            } else {
                "defaultPeriodConfig"
            };
            if remove {
                return Err(TimetableError::validation(field, "default tiers cannot be removed"));
            }
            let section = root.entry(field.to_string()).or_insert(Value::Null);
            merge_keys(as_object_mut(section, field)?, patch, allowed)
        }
        SettingsTier::ClassLevel | SettingsTier::ClassOverride => {
            let (list_field, key_field) = if target.tier == SettingsTier::ClassLevel {
                ("classLevels", "name")
            } else {
                ("classWiseOverrides", "classId")
            };
            let Some(key) = target.key.map(str::trim).filter(|k| !k.is_empty()) else {
                return Err(TimetableError::validation(key_field, "is required for this tier"));
            };
            let list = root
                .entry(list_field.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            let Some(items) = list.as_array_mut() else {
                return Err(TimetableError::validation(list_field, "must be an array"));
            };
            let pos = items
                .iter()
                .position(|it| it.get(key_field).and_then(|v| v.as_str()) == Some(key));
            if remove {
                return match pos {
                    Some(i) => {
                        items.remove(i);
                        Ok(())
                    }
                    None => Err(TimetableError::not_found(
                        if target.tier == SettingsTier::ClassLevel { "classLevel" } else { "classOverride" },
                        key,
                    )),
                };
            }
            let idx = match pos {
                Some(i) => i,
                None => {
                    items.push(json!({ key_field: key }));
                    items.len() - 1
                }
            };
            let item = as_object_mut(&mut items[idx], list_field)?;
            if target.tier == SettingsTier::ClassLevel {
                // A level keeps its rules under `timings`.
                let timings = item.entry("timings".to_string()).or_insert(Value::Null);
                merge_keys(as_object_mut(timings, "timings")?, patch, allowed)
            } else {
                merge_keys(item, patch, allowed)
            }
        }
    }
}

fn parse_settings(v: Value, field: &str) -> Result<TimetableSettings, TimetableError> {
    serde_json::from_value(v).map_err(|e| TimetableError::validation(field, e.to_string()))
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match store.load_settings() {
        Ok(settings) => ok(&req.id, json!({ "settings": settings })),
        Err(e) => timetable_err(&req.id, &req.method, &e.into()),
    }
}

fn handle_settings_save(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(raw) = req.params.get("settings").cloned() else {
        return err(&req.id, "bad_params", "missing settings", None);
    };
    let result = (|| -> Result<TimetableSettings, TimetableError> {
        let mut settings = parse_settings(raw, "settings")?;
        // `PUT /settings/:id` semantics: the id must name the stored document.
        if let Some(id) = req.params.get("id").and_then(|v| v.as_str()) {
            let current = store.load_settings()?;
            if current.as_ref().and_then(|s| s.id.as_deref()) != Some(id) {
                return Err(TimetableError::not_found("settings", id));
            }
            settings.id = Some(id.to_string());
        }
        service::save_settings(store, settings)
    })();
    match result {
        Ok(saved) => ok(&req.id, json!({ "settings": saved })),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(tier) = req
        .params
        .get("tier")
        .and_then(|v| v.as_str())
        .and_then(SettingsTier::parse)
    else {
        return err(
            &req.id,
            "bad_params",
            "tier must be one of: defaultSchoolTiming, defaultPeriodConfig, classLevel, classOverride",
            None,
        );
    };
    let remove = req.params.get("remove").and_then(|v| v.as_bool()).unwrap_or(false);
    let empty = Map::new();
    let patch = match req.params.get("patch") {
        Some(Value::Object(p)) => p,
        None if remove => &empty,
        _ => return err(&req.id, "bad_params", "patch must be an object", None),
    };
    let key = match tier {
        SettingsTier::ClassLevel => req.params.get("name").and_then(|v| v.as_str()),
        SettingsTier::ClassOverride => req.params.get("classId").and_then(|v| v.as_str()),
        _ => None,
    };
    let target = TierTarget { tier, key };

    let result = (|| -> Result<TimetableSettings, TimetableError> {
        let current = store.load_settings()?.unwrap_or_default();
        let mut doc = serde_json::to_value(&current)
            .map_err(|e| TimetableError::Transport(e.to_string()))?;
        merge_tier_patch(&mut doc, &target, patch, remove)?;
        service::save_settings(store, parse_settings(doc, "patch")?)
    })();
    match result {
        Ok(saved) => {
            tracing::debug!(tier = ?target.tier, key = ?target.key, remove, "settings tier updated");
            ok(&req.id, json!({ "settings": saved }))
        }
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

fn handle_settings_preview(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let result = (|| -> Result<Vec<service::ClassPreview>, TimetableError> {
        // An unsaved draft may be previewed; otherwise the stored document is used.
        let settings = match req.params.get("settings") {
            Some(raw) => parse_settings(raw.clone(), "settings")?,
            None => store.load_settings()?.unwrap_or_default(),
        };
        service::preview_settings(store, &settings)
    })();
    match result {
        Ok(classes) => ok_serialized(&req.id, &json!({ "classes": classes })),
        Err(e) => timetable_err(&req.id, &req.method, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.save" => Some(handle_settings_save(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        "settings.preview" => Some(handle_settings_preview(state, req)),
        _ => None,
    }
}
