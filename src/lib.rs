pub mod auth;
pub mod chat;
pub mod core;
pub mod documents;
pub mod main_module;
pub mod manuals;
pub mod reminders;
pub mod reports;
pub mod security;
pub mod tickets;
pub mod users;
pub mod workflows;
