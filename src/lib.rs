pub mod config;
pub mod db;
pub mod jobs;
pub mod logging;
pub mod model;
pub mod notifications;
pub mod output;
pub mod paths;
pub mod prefs;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod validate;
pub mod watch;
pub mod worker;
