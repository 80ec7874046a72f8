//! Configuration access port trait.

use crate::domain::error::SticklabError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Like `get_string`, but a missing key is a `ConfigMissing` error.
    fn require_string(&self, section: &str, key: &str) -> Result<String, SticklabError> {
        self.get_string(section, key)
            .ok_or_else(|| SticklabError::ConfigMissing {
                section: section.into(),
                key: key.into(),
            })
    }
}
