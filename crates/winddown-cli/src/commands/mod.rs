pub mod daemon;
pub mod helpers;
pub mod settings;
