pub mod builder;
pub mod logic;
pub mod mapping;
pub mod types;
