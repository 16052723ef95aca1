pub mod analysis_cache;
pub mod billing;
pub mod mailer;
pub mod session;
pub mod storage;
pub mod token;
pub mod usage;
pub mod vision;
