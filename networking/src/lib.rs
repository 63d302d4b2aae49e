pub mod sync;
pub mod types;
