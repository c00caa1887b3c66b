mod config_ort;
mod filesystem_access;
mod history;
mod time_calc;

pub use config_ort::ConfigOrt;
pub use filesystem_access::FsAccess;
pub use history::*;
pub use time_calc::TimeCalc;

pub(crate) const CROSS_MARK: &str = "❌";
