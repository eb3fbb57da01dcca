pub mod report;
pub mod theme;
