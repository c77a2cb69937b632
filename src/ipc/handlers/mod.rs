pub mod core;
pub mod roster;
pub mod settings;
pub mod timetable;
