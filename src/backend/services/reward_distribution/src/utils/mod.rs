pub mod errors;
pub mod micheline;
