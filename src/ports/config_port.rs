//! Configuration access port trait.

use crate::domain::error::SmartExpertError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// `default` when the key is absent; `ConfigInvalid` when it is not an integer.
    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, SmartExpertError>;
}
