pub mod schemas;
pub mod setup;
pub mod ui;
