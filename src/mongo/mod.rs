pub mod aggregation;
pub mod client;
pub mod cursor_engine;
pub mod sort;
pub mod stage;
