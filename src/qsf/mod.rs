pub mod flow;
pub mod parse;
pub mod types;
