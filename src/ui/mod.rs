pub mod clipboard;
pub mod layout;
pub mod observations;
