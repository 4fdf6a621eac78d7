pub mod diagnosis;
pub mod report;
pub mod session;
