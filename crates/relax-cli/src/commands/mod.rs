pub mod jw;
pub mod results;
pub mod state;
pub mod structure;
