pub mod conversation;
pub mod paper;
