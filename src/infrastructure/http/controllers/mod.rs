pub mod chat;
pub mod devices;
pub mod staff;
