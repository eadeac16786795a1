pub mod mount;
pub mod strategies;
