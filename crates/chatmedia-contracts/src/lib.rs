pub mod config;
pub mod events;
pub mod locale;
pub mod media;
pub mod messages;
pub mod pressure;
