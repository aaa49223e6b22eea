pub mod exec;
pub mod simple;
