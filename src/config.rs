//! Key/value configuration items
//!
//! A [`Config`] is deliberately weakly typed: the wire carries only a key and
//! an opaque byte buffer. The typed setters and getters here agree on a byte
//! layout so that a value written by one client reads back the same way:
//!
//! - integers: 4 bytes, big-endian
//! - floats and doubles: native-endian bytes
//! - strings: UTF-8 bytes followed by a NUL

/// A keyed configuration value
///
/// A config without a value is a key-only probe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    key: String,
    value: Option<Vec<u8>>,
}

impl Config {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Create a config holding raw bytes
    pub fn with_value(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn value_size(&self) -> usize {
        self.value.as_ref().map_or(0, Vec::len)
    }

    pub fn set_value(&mut self, value: Option<Vec<u8>>) {
        if let Some(value) = &value {
            if u32::try_from(value.len()).is_err() {
                tracing::warn!(
                    key = %self.key,
                    size = value.len(),
                    "config value is too large to survive the network"
                );
            }
        }
        self.value = value;
    }

    pub fn take_value(&mut self) -> Option<Vec<u8>> {
        self.value.take()
    }

    pub fn set_value_int(&mut self, value: u32) {
        self.value = Some(value.to_be_bytes().to_vec());
    }

    pub fn set_value_float(&mut self, value: f32) {
        self.value = Some(value.to_ne_bytes().to_vec());
    }

    pub fn set_value_double(&mut self, value: f64) {
        self.value = Some(value.to_ne_bytes().to_vec());
    }

    pub fn set_value_string(&mut self, value: &str) {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        self.value = Some(bytes);
    }

    pub fn value_int(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.value()?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    pub fn value_float(&self) -> Option<f32> {
        let bytes: [u8; 4] = self.value()?.try_into().ok()?;
        Some(f32::from_ne_bytes(bytes))
    }

    pub fn value_double(&self) -> Option<f64> {
        let bytes: [u8; 8] = self.value()?.try_into().ok()?;
        Some(f64::from_ne_bytes(bytes))
    }

    /// Read the value as a string, up to the first NUL
    pub fn value_string(&self) -> Option<&str> {
        let bytes = self.value()?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end]).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_is_big_endian() {
        let mut config = Config::new("volume");
        config.set_value_int(75);
        assert_eq!(config.value(), Some(&[0, 0, 0, 75][..]));
        assert_eq!(config.value_int(), Some(75));
        assert_eq!(config.value_double(), None);
    }

    #[test]
    fn test_string_value() {
        let mut config = Config::new("name");
        config.set_value_string("hello");
        assert_eq!(config.value_size(), 6);
        assert_eq!(config.value_string(), Some("hello"));
    }

    #[test]
    fn test_floats() {
        let mut config = Config::new("gain");
        config.set_value_float(0.5);
        assert_eq!(config.value_float(), Some(0.5));
        config.set_value_double(-3.25);
        assert_eq!(config.value_double(), Some(-3.25));
        assert_eq!(config.value_float(), None);
    }

    #[test]
    fn test_probe_has_no_value() {
        let config = Config::new("probe");
        assert_eq!(config.value(), None);
        assert_eq!(config.value_size(), 0);
        assert_eq!(config.value_int(), None);
        assert_eq!(config.value_string(), None);
    }
}
