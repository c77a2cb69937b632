use crate::timetable::clock::{ClockTime, Day};
use crate::timetable::model::TimetableEntry;
use crate::timetable::resolver::EffectiveClassConfig;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Period,
    Break,
}

/// One cell of a day's grid. A break carries the number of the period it follows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySlot {
    #[serde(rename = "type")]
    pub kind: SlotKind,
    pub period: u32,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<TimetableEntry>,
}

impl WeeklySlot {
    pub fn is_period(&self) -> bool {
        self.kind == SlotKind::Period
    }
}

/// Soft problems with a built grid. Surfaced to the settings editor, never fatal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GridWarning {
    #[serde(rename_all = "camelCase")]
    ExceedsEndTime {
        last_period_end: ClockTime,
        end_time: ClockTime,
        overrun_minutes: u32,
    },
    #[serde(rename_all = "camelCase")]
    BreakAnchorOverlap {
        after_period: u32,
        anchor: ClockTime,
        previous_end: ClockTime,
    },
    #[serde(rename_all = "camelCase")]
    CrossesMidnight { period: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySkeleton {
    pub slots: Vec<WeeklySlot>,
    pub warnings: Vec<GridWarning>,
}

/// A class's six-day grid. Serialises as `{ "Mon": [...], ..., "Sat": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WeeklyGrid {
    pub days: BTreeMap<Day, Vec<WeeklySlot>>,
}

impl WeeklyGrid {
    pub fn day(&self, day: Day) -> &[WeeklySlot] {
        self.days.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entries(&self) -> impl Iterator<Item = &TimetableEntry> {
        self.days
            .values()
            .flat_map(|slots| slots.iter())
            .filter_map(|s| s.entry.as_ref())
    }
}

/// Expands an effective configuration into one day's ordered slot template.
pub fn build_day(cfg: &EffectiveClassConfig) -> DaySkeleton {
    let pc = &cfg.period_config;
    let mut slots = Vec::with_capacity(pc.total_periods as usize + 2);
    let mut warnings = Vec::new();

    let break_duration = cfg.break_duration().filter(|d| *d > 0);
    let mut pending_anchor = cfg.break_time.as_ref().map(|b| b.start_time);
    let mut clock = cfg.start_time;

    for period in 1..=pc.total_periods {
        let Some(end) = clock.plus_minutes(pc.period_duration) else {
            warnings.push(GridWarning::CrossesMidnight { period });
            break;
        };
        slots.push(WeeklySlot {
            kind: SlotKind::Period,
            period,
            start_time: clock,
            end_time: end,
            entry: None,
        });
        clock = end;

        if period == pc.total_periods {
            break;
        }
        let Some(duration) = break_duration else {
            continue;
        };
        let due = match (pc.break_after_periods, pending_anchor) {
            (Some(n), _) => period % n == 0,
            // Anchored without a cadence: one break, before the first
            // period that would run past the anchor.
            (None, Some(anchor)) => clock.plus_minutes(pc.period_duration).map_or(true, |next| next > anchor),
            (None, None) => false,
        };
        if !due {
            continue;
        }

        let start = match pending_anchor.take() {
            Some(anchor) if anchor >= clock => anchor,
            Some(anchor) => {
                warnings.push(GridWarning::BreakAnchorOverlap {
                    after_period: period,
                    anchor,
                    previous_end: clock,
                });
                clock
            }
            None => clock,
        };
        let Some(break_end) = start.plus_minutes(duration) else {
            warnings.push(GridWarning::CrossesMidnight { period });
            break;
        };
        slots.push(WeeklySlot {
            kind: SlotKind::Break,
            period,
            start_time: start,
            end_time: break_end,
            entry: None,
        });
        clock = break_end;
    }

    if let Some(last) = slots.iter().rev().find(|s| s.is_period()) {
        if last.end_time > cfg.end_time {
            warnings.push(GridWarning::ExceedsEndTime {
                last_period_end: last.end_time,
                end_time: cfg.end_time,
                overrun_minutes: last.end_time.minutes_since_midnight()
                    - cfg.end_time.minutes_since_midnight(),
            });
        }
    }

    DaySkeleton { slots, warnings }
}

/// Replicates the day template across the six-day week.
pub fn build_grid(cfg: &EffectiveClassConfig) -> (WeeklyGrid, Vec<GridWarning>) {
    let day = build_day(cfg);
    let days = Day::ALL
        .into_iter()
        .map(|d| (d, day.slots.clone()))
        .collect();
    (WeeklyGrid { days }, day.warnings)
}
