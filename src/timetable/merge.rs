use crate::timetable::clock::Day;
use crate::timetable::grid::WeeklyGrid;
use crate::timetable::model::TimetableEntry;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IntegrityIssue {
    PeriodOutOfRange,
    ForeignClass,
    DuplicateSlot,
}

/// An entry the merger refused to place. The entry is dropped from the grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityWarning {
    pub issue: IntegrityIssue,
    pub entry_id: String,
    pub class_id: String,
    pub day: Day,
    pub period: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_periods: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub grid: WeeklyGrid,
    pub warnings: Vec<IntegrityWarning>,
}

/// Places each entry on its `(day, period)` slot of one class's grid.
///
/// Break slots never receive an entry. The first entry for a slot wins; any
/// later one, and any entry outside `1..=total_periods`, is reported.
pub fn merge(
    mut grid: WeeklyGrid,
    class_id: &str,
    total_periods: u32,
    entries: &[TimetableEntry],
) -> MergeOutcome {
    let mut warnings = Vec::new();
    let mut placed: HashSet<(Day, u32)> = HashSet::new();

    for entry in entries {
        let warn = |issue: IntegrityIssue| IntegrityWarning {
            issue,
            entry_id: entry.id.clone(),
            class_id: entry.class_id.clone(),
            day: entry.day,
            period: entry.period,
            total_periods: (issue == IntegrityIssue::PeriodOutOfRange).then_some(total_periods),
        };
        if entry.class_id != class_id {
            warnings.push(warn(IntegrityIssue::ForeignClass));
            continue;
        }
        if entry.period == 0 || entry.period > total_periods {
            warnings.push(warn(IntegrityIssue::PeriodOutOfRange));
            continue;
        }
        if !placed.insert(entry.slot_key()) {
            warnings.push(warn(IntegrityIssue::DuplicateSlot));
            continue;
        }
        let slot = grid.days.get_mut(&entry.day).and_then(|slots| {
            slots
                .iter_mut()
                .find(|s| s.is_period() && s.period == entry.period)
        });
        match slot {
            Some(slot) => slot.entry = Some(entry.clone()),
            // The grid was truncated (e.g. crossing midnight) before this period.
            None => warnings.push(warn(IntegrityIssue::PeriodOutOfRange)),
        }
    }

    for w in &warnings {
        tracing::warn!(
            entry_id = %w.entry_id,
            class_id = %w.class_id,
            day = %w.day,
            period = w.period,
            issue = ?w.issue,
            "timetable entry dropped from grid"
        );
    }

    MergeOutcome { grid, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::grid::{build_grid, SlotKind};
    use crate::timetable::resolver::{EffectiveClassConfig, EffectivePeriodConfig};
    use std::collections::BTreeMap;

    fn grid() -> WeeklyGrid {
        let cfg = EffectiveClassConfig {
            class_id: "c1".into(),
            level_name: None,
            start_time: "08:00".parse().expect("time"),
            end_time: "14:00".parse().expect("time"),
            break_time: None,
            period_config: EffectivePeriodConfig {
                period_duration: 40,
                total_periods: 5,
                break_after_periods: Some(2),
                break_duration: Some(10),
            },
            sources: BTreeMap::new(),
        };
        build_grid(&cfg).0
    }

    fn entry(id: &str, class_id: &str, day: Day, period: u32) -> TimetableEntry {
        TimetableEntry {
            id: id.into(),
            class_id: class_id.into(),
            day,
            period,
            subject_id: "math".into(),
            teacher_id: "t1".into(),
            room: None,
            notes: None,
            is_substitute: false,
            original_teacher_id: None,
            updated_at: None,
        }
    }

    #[test]
    fn entries_land_on_matching_period_slots_only() {
        let entries = vec![entry("a", "c1", Day::Mon, 2), entry("b", "c1", Day::Fri, 3)];
        let out = merge(grid(), "c1", 5, &entries);
        assert!(out.warnings.is_empty());

        let mon = out.grid.day(Day::Mon);
        let p2 = mon.iter().find(|s| s.is_period() && s.period == 2).expect("p2");
        assert_eq!(p2.entry.as_ref().map(|e| e.id.as_str()), Some("a"));
        // The break after period 2 shares its number but stays empty.
        let brk = mon
            .iter()
            .find(|s| s.kind == SlotKind::Break && s.period == 2)
            .expect("break");
        assert!(brk.entry.is_none());
        assert!(out.grid.day(Day::Tue).iter().all(|s| s.entry.is_none()));
        assert_eq!(out.grid.entries().count(), 2);
    }

    #[test]
    fn out_of_range_and_foreign_entries_are_dropped_and_flagged() {
        let entries = vec![
            entry("ok", "c1", Day::Mon, 1),
            entry("high", "c1", Day::Mon, 6),
            entry("zero", "c1", Day::Tue, 0),
            entry("other", "c2", Day::Mon, 1),
            entry("dup", "c1", Day::Mon, 1),
        ];
        let out = merge(grid(), "c1", 5, &entries);
        let issues: Vec<(&str, IntegrityIssue)> = out
            .warnings
            .iter()
            .map(|w| (w.entry_id.as_str(), w.issue))
            .collect();
        assert_eq!(
            issues,
            vec![
                ("high", IntegrityIssue::PeriodOutOfRange),
                ("zero", IntegrityIssue::PeriodOutOfRange),
                ("other", IntegrityIssue::ForeignClass),
                ("dup", IntegrityIssue::DuplicateSlot),
            ]
        );
        assert_eq!(out.warnings[0].total_periods, Some(5));
        assert_eq!(out.grid.entries().count(), 1);
    }

    #[test]
    fn periods_cut_off_at_midnight_are_flagged() {
        let cfg = EffectiveClassConfig {
            class_id: "c1".into(),
            level_name: None,
            start_time: "21:30".parse().expect("time"),
            end_time: "23:59".parse().expect("time"),
            break_time: None,
            period_config: EffectivePeriodConfig {
                period_duration: 40,
                total_periods: 7,
                break_after_periods: None,
                break_duration: None,
            },
            sources: BTreeMap::new(),
        };
        // 21:30 + 3 x 40 reaches 23:30; period 4 would cross midnight.
        let (truncated, _) = build_grid(&cfg);
        let entries = vec![entry("late", "c1", Day::Wed, 3), entry("lost", "c1", Day::Wed, 4)];
        let out = merge(truncated, "c1", 7, &entries);
        assert_eq!(out.grid.entries().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["late"]);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].entry_id, "lost");
        assert_eq!(out.warnings[0].issue, IntegrityIssue::PeriodOutOfRange);
        assert_eq!(out.warnings[0].total_periods, Some(7));
    }
}
