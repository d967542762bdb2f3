pub mod handlers;
pub mod presence;
