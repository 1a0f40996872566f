pub mod filter;
pub mod task;
pub mod theme;
