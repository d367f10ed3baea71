pub mod auto;
pub mod checks;
pub mod domains;
pub mod error;
pub mod state;
