//! Cascading timing resolution.
//!
//! Three tiers feed one class's effective configuration, most specific first:
//! the class-wise override, the class level's timings, then the school
//! defaults. Every field is resolved on its own, so a tier may set a single
//! field and inherit the rest.

use crate::timetable::clock::ClockTime;
use crate::timetable::error::TimetableError;
use crate::timetable::model::{BreakTime, ClassLevel, ClassOverride, PeriodConfig, TimetableSettings};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    Default,
    Level,
    Class,
}

/// One tier flattened to the fields the resolver cascades.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierRules {
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    pub period_duration: Option<u32>,
    pub total_periods: Option<u32>,
    pub break_after_periods: Option<u32>,
    pub break_duration: Option<u32>,
    pub break_start: Option<ClockTime>,
}

impl TierRules {
    fn with_period_config(mut self, pc: Option<&PeriodConfig>) -> Self {
        if let Some(pc) = pc {
            self.period_duration = pc.period_duration;
            self.total_periods = pc.total_periods;
            self.break_after_periods = pc.break_after_periods;
            self.break_duration = pc.break_duration;
        }
        self
    }

    // `breakTime.duration` is the more specific spelling within a tier.
    fn with_break_time(mut self, bt: Option<&BreakTime>) -> Self {
        if let Some(bt) = bt {
            self.break_start = bt.start_time;
            self.break_duration = bt.duration.or(self.break_duration);
        }
        self
    }

    fn specifies_break(&self) -> bool {
        self.break_start.is_some() || self.break_duration.is_some()
    }

    pub fn from_defaults(settings: &TimetableSettings) -> Self {
        TierRules {
            start_time: settings.default_school_timing.start_time,
            end_time: settings.default_school_timing.end_time,
            ..Default::default()
        }
        .with_period_config(Some(&settings.default_period_config))
    }

    pub fn from_level(level: &ClassLevel) -> Self {
        let Some(t) = level.timings.as_ref() else {
            return TierRules::default();
        };
        TierRules {
            start_time: t.start_time,
            end_time: t.end_time,
            ..Default::default()
        }
        .with_period_config(t.period_config.as_ref())
        .with_break_time(t.break_time.as_ref())
    }

    pub fn from_class(o: &ClassOverride) -> Self {
        TierRules {
            start_time: o.start_time,
            end_time: o.end_time,
            ..Default::default()
        }
        .with_period_config(o.period_config.as_ref())
        .with_break_time(o.break_time.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePeriodConfig {
    pub period_duration: u32,
    pub total_periods: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_after_periods: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_duration: Option<u32>,
}

/// Present only when the deciding break tier pins the break to a clock time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveBreakTime {
    pub start_time: ClockTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveClassConfig {
    pub class_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_name: Option<String>,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_time: Option<EffectiveBreakTime>,
    pub period_config: EffectivePeriodConfig,
    /// Which tier supplied each resolved field.
    pub sources: BTreeMap<&'static str, Tier>,
}

impl EffectiveClassConfig {
    pub fn break_duration(&self) -> Option<u32> {
        self.period_config.break_duration
    }
}

struct Cascade<'a> {
    tiers: Vec<(Tier, &'a TierRules)>,
    sources: BTreeMap<&'static str, Tier>,
}

impl<'a> Cascade<'a> {
    fn pick<T: Copy>(&mut self, field: &'static str, get: impl Fn(&TierRules) -> Option<T>) -> Option<T> {
        for (tier, rules) in &self.tiers {
            if let Some(v) = get(rules) {
                self.sources.insert(field, *tier);
                return Some(v);
            }
        }
        None
    }
}

fn incomplete(class_id: &str, field: &str) -> TimetableError {
    TimetableError::ConfigurationIncomplete {
        class_id: class_id.to_string(),
        field: field.to_string(),
    }
}

/// Resolves one class's effective configuration from the settings snapshot.
///
/// An unknown `class_level_name` contributes nothing. Missing mandatory
/// defaults fail with `ConfigurationIncomplete` instead of being guessed.
pub fn resolve(
    settings: &TimetableSettings,
    class_id: &str,
    class_level_name: Option<&str>,
) -> Result<EffectiveClassConfig, TimetableError> {
    let defaults = TierRules::from_defaults(settings);
    if defaults.start_time.is_none() {
        return Err(incomplete(class_id, "defaultSchoolTiming.startTime"));
    }
    if defaults.end_time.is_none() {
        return Err(incomplete(class_id, "defaultSchoolTiming.endTime"));
    }
    if defaults.period_duration.is_none() {
        return Err(incomplete(class_id, "defaultPeriodConfig.periodDuration"));
    }
    if defaults.total_periods.is_none() {
        return Err(incomplete(class_id, "defaultPeriodConfig.totalPeriods"));
    }

    let level = class_level_name.and_then(|name| settings.level(name));
    if class_level_name.is_some() && level.is_none() {
        tracing::debug!(class_id, level = ?class_level_name, "class level not in settings; ignoring");
    }
    let level_rules = level.map(TierRules::from_level);
    let class_rules = settings.class_override(class_id).map(TierRules::from_class);

    let mut tiers: Vec<(Tier, &TierRules)> = Vec::with_capacity(3);
    if let Some(r) = class_rules.as_ref() {
        tiers.push((Tier::Class, r));
    }
    if let Some(r) = level_rules.as_ref() {
        tiers.push((Tier::Level, r));
    }
    tiers.push((Tier::Default, &defaults));

    // The most specific tier that says anything about the break decides
    // whether it is anchored to a clock time or placed by accumulation.
    let anchor = tiers
        .iter()
        .find(|(_, r)| r.specifies_break())
        .and_then(|(tier, r)| r.break_start.map(|t| (*tier, t)));

    let mut c = Cascade {
        tiers,
        sources: BTreeMap::new(),
    };
    let start_time = c.pick("startTime", |r| r.start_time);
    let end_time = c.pick("endTime", |r| r.end_time);
    let period_duration = c.pick("periodDuration", |r| r.period_duration);
    let total_periods = c.pick("totalPeriods", |r| r.total_periods);
    let break_after_periods = c.pick("breakAfterPeriods", |r| r.break_after_periods);
    let break_duration = c.pick("breakDuration", |r| r.break_duration);

    let (Some(start_time), Some(end_time), Some(period_duration), Some(total_periods)) =
        (start_time, end_time, period_duration, total_periods)
    else {
        // Defaults were checked above; unreachable unless a tier is inconsistent.
        return Err(incomplete(class_id, "defaultPeriodConfig"));
    };
    if period_duration == 0 {
        return Err(incomplete(class_id, "periodConfig.periodDuration must be positive"));
    }
    if total_periods == 0 {
        return Err(incomplete(class_id, "periodConfig.totalPeriods must be positive"));
    }

    let mut sources = c.sources;
    let break_time = anchor.map(|(tier, start_time)| {
        sources.insert("breakStartTime", tier);
        EffectiveBreakTime {
            start_time,
            duration: break_duration,
        }
    });

    Ok(EffectiveClassConfig {
        class_id: class_id.to_string(),
        level_name: level.map(|l| l.name.clone()),
        start_time,
        end_time,
        break_time,
        period_config: EffectivePeriodConfig {
            period_duration,
            total_periods,
            break_after_periods: break_after_periods.filter(|n| *n > 0),
            break_duration,
        },
        sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::model::{LevelTimings, SchoolTiming};

    fn t(s: &str) -> ClockTime {
        s.parse().expect("time")
    }

    fn base_settings() -> TimetableSettings {
        TimetableSettings {
            id: None,
            default_school_timing: SchoolTiming {
                start_time: Some(t("08:00")),
                end_time: Some(t("14:00")),
            },
            default_period_config: PeriodConfig {
                period_duration: Some(40),
                total_periods: Some(7),
                break_after_periods: Some(3),
                break_duration: Some(20),
            },
            class_levels: vec![ClassLevel {
                name: "Senior".into(),
                timings: Some(LevelTimings {
                    start_time: Some(t("07:30")),
                    end_time: None,
                    break_time: None,
                    period_config: Some(PeriodConfig {
                        total_periods: Some(8),
                        ..Default::default()
                    }),
                }),
            }],
            class_wise_overrides: Vec::new(),
        }
    }

    #[test]
    fn no_level_no_override_returns_defaults() {
        let s = base_settings();
        let cfg = resolve(&s, "c1", None).expect("resolve");
        assert_eq!(cfg.start_time, t("08:00"));
        assert_eq!(cfg.end_time, t("14:00"));
        assert_eq!(
            cfg.period_config,
            EffectivePeriodConfig {
                period_duration: 40,
                total_periods: 7,
                break_after_periods: Some(3),
                break_duration: Some(20),
            }
        );
        assert!(cfg.break_time.is_none());
        assert!(cfg.sources.values().all(|tier| *tier == Tier::Default));
    }

    #[test]
    fn class_override_of_break_duration_only_inherits_everything_else() {
        let mut s = base_settings();
        s.class_wise_overrides.push(ClassOverride {
            class_id: "c1".into(),
            period_config: Some(PeriodConfig {
                break_duration: Some(30),
                ..Default::default()
            }),
            ..Default::default()
        });
        let cfg = resolve(&s, "c1", Some("Senior")).expect("resolve");
        assert_eq!(cfg.period_config.break_duration, Some(30));
        assert_eq!(cfg.start_time, t("07:30"));
        assert_eq!(cfg.end_time, t("14:00"));
        assert_eq!(cfg.period_config.period_duration, 40);
        assert_eq!(cfg.period_config.total_periods, 8);
        assert_eq!(cfg.sources.get("breakDuration"), Some(&Tier::Class));
        assert_eq!(cfg.sources.get("startTime"), Some(&Tier::Level));
        assert_eq!(cfg.sources.get("totalPeriods"), Some(&Tier::Level));
        assert_eq!(cfg.sources.get("periodDuration"), Some(&Tier::Default));
    }

    #[test]
    fn unknown_level_is_ignored() {
        let s = base_settings();
        let cfg = resolve(&s, "c1", Some("Nursery")).expect("resolve");
        assert_eq!(cfg.level_name, None);
        assert_eq!(cfg.period_config.total_periods, 7);
    }

    #[test]
    fn missing_default_field_is_configuration_incomplete() {
        let mut s = base_settings();
        s.default_period_config.total_periods = None;
        let e = resolve(&s, "c1", None).expect_err("must fail");
        match e {
            TimetableError::ConfigurationIncomplete { class_id, field } => {
                assert_eq!(class_id, "c1");
                assert_eq!(field, "defaultPeriodConfig.totalPeriods");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let mut s = base_settings();
        s.default_school_timing.start_time = None;
        assert_eq!(
            resolve(&s, "c1", None).expect_err("must fail").code(),
            "configuration_incomplete"
        );
    }

    #[test]
    fn level_anchored_break_wins_over_default_duration_style() {
        let mut s = base_settings();
        s.class_levels[0].timings.as_mut().expect("timings").break_time = Some(BreakTime {
            start_time: Some(t("10:15")),
            duration: None,
        });
        let cfg = resolve(&s, "c1", Some("Senior")).expect("resolve");
        let bt = cfg.break_time.expect("anchored break");
        assert_eq!(bt.start_time, t("10:15"));
        // Duration still cascades from the default tier.
        assert_eq!(bt.duration, Some(20));
        assert_eq!(cfg.sources.get("breakStartTime"), Some(&Tier::Level));
    }

    #[test]
    fn duration_only_class_tier_discards_level_anchor() {
        let mut s = base_settings();
        s.class_levels[0].timings.as_mut().expect("timings").break_time = Some(BreakTime {
            start_time: Some(t("10:15")),
            duration: Some(15),
        });
        s.class_wise_overrides.push(ClassOverride {
            class_id: "c1".into(),
            break_time: Some(BreakTime {
                start_time: None,
                duration: Some(25),
            }),
            ..Default::default()
        });
        let cfg = resolve(&s, "c1", Some("Senior")).expect("resolve");
        assert!(cfg.break_time.is_none());
        assert_eq!(cfg.break_duration(), Some(25));
    }
}
