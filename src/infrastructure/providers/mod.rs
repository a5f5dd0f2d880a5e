pub mod push_provider;

pub use push_provider::*;
