//! Timetable core: cascading timing resolution, grid construction, entry
//! merging and the derived class, teacher and student views.

pub mod clock;
pub mod error;
pub mod grid;
pub mod lifecycle;
pub mod merge;
pub mod model;
pub mod resolver;
pub mod service;
pub mod validate;
pub mod views;
