pub mod health;
pub mod history;
pub mod messages;
pub mod rooms;
pub mod search;
