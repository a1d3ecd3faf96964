pub mod capture;
pub mod client;
pub mod cohorts;
pub mod config;
pub mod decide;
pub mod definitions;
pub mod errors;
pub mod flag_request;
pub mod flags;
pub mod poller;
pub mod properties;

// Integration tests use the doubles too, so this isn't behind #[cfg(test)]
pub mod test_utils;
