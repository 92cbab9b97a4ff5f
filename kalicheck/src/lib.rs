pub mod app;
pub mod cli;
pub mod exit_codes;

mod cases;
mod logging;
mod report;
mod tools;
