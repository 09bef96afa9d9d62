//! Read-only access to historical course data.

pub mod db;
pub mod models;

pub use db::{CourseDb, MAX_PAGE_SIZE};
pub use models::{
    CourseDetail, CourseFeatureSummary, CourseInfo, CourseSummary, GradeShare, GradingStructure,
};
