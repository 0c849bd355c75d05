pub mod code;
pub mod factory;
