pub mod display;
pub mod executor;
pub mod report;
pub mod reporter;
pub mod result;
pub mod timeout;
