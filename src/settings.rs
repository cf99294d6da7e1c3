//! HTTP/2 settings management
//!
//! This module implements HTTP/2 SETTINGS parameters as defined in
//! RFC 7540 Section 6.5.

use crate::error::{Error, Result};
use std::fmt;

/// HTTP/2 settings parameters (RFC 7540 Section 6.5.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SettingsParameter {
    /// SETTINGS_HEADER_TABLE_SIZE (0x1)
    /// Maximum size of the peer's header compression table
    HeaderTableSize = 0x1,

    /// SETTINGS_ENABLE_PUSH (0x2)
    /// Used to disable server push
    EnablePush = 0x2,

    /// SETTINGS_MAX_CONCURRENT_STREAMS (0x3)
    /// Maximum number of concurrent streams
    MaxConcurrentStreams = 0x3,

    /// SETTINGS_INITIAL_WINDOW_SIZE (0x4)
    /// Initial window size for stream-level flow control
    InitialWindowSize = 0x4,

    /// SETTINGS_MAX_FRAME_SIZE (0x5)
    /// Size of the largest frame payload the sender accepts
    MaxFrameSize = 0x5,

    /// SETTINGS_MAX_HEADER_LIST_SIZE (0x6)
    /// Advisory maximum size of a header list
    MaxHeaderListSize = 0x6,
}

impl SettingsParameter {
    /// Convert to u16
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Create from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1 => Some(SettingsParameter::HeaderTableSize),
            0x2 => Some(SettingsParameter::EnablePush),
            0x3 => Some(SettingsParameter::MaxConcurrentStreams),
            0x4 => Some(SettingsParameter::InitialWindowSize),
            0x5 => Some(SettingsParameter::MaxFrameSize),
            0x6 => Some(SettingsParameter::MaxHeaderListSize),
            _ => None,
        }
    }

    /// Get parameter name
    pub fn name(&self) -> &'static str {
        match self {
            SettingsParameter::HeaderTableSize => "HEADER_TABLE_SIZE",
            SettingsParameter::EnablePush => "ENABLE_PUSH",
            SettingsParameter::MaxConcurrentStreams => "MAX_CONCURRENT_STREAMS",
            SettingsParameter::InitialWindowSize => "INITIAL_WINDOW_SIZE",
            SettingsParameter::MaxFrameSize => "MAX_FRAME_SIZE",
            SettingsParameter::MaxHeaderListSize => "MAX_HEADER_LIST_SIZE",
        }
    }
}

impl fmt::Display for SettingsParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u16())
    }
}

/// HTTP/2 settings
///
/// Fields are `None` when a value was never transmitted; the `get_*`
/// accessors substitute the RFC 7540 Section 6.5.2 defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Header table size (default: 4096)
    pub header_table_size: Option<u32>,

    /// Enable server push (default: true)
    pub enable_push: Option<bool>,

    /// Maximum concurrent streams (default: unlimited)
    pub max_concurrent_streams: Option<u32>,

    /// Initial window size (default: 65535)
    pub initial_window_size: Option<u32>,

    /// Maximum frame size (default: 16384, range: 16384-16777215)
    pub max_frame_size: Option<u32>,

    /// Maximum header list size (default: unlimited)
    pub max_header_list_size: Option<u32>,
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Settings {
            header_table_size: None,
            enable_push: None,
            max_concurrent_streams: None,
            initial_window_size: None,
            max_frame_size: None,
            max_header_list_size: None,
        }
    }

    /// Get header table size (with default)
    pub fn get_header_table_size(&self) -> u32 {
        self.header_table_size.unwrap_or(4096)
    }

    /// Get enable push (with default)
    pub fn get_enable_push(&self) -> bool {
        self.enable_push.unwrap_or(true)
    }

    /// Get max concurrent streams (None = unlimited)
    pub fn get_max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    /// Get initial window size (with default)
    pub fn get_initial_window_size(&self) -> u32 {
        self.initial_window_size.unwrap_or(65535)
    }

    /// Get max frame size (with default)
    pub fn get_max_frame_size(&self) -> u32 {
        self.max_frame_size.unwrap_or(16384)
    }

    /// Get max header list size (None = unlimited)
    pub fn get_max_header_list_size(&self) -> Option<u32> {
        self.max_header_list_size
    }

    /// Apply a single raw (identifier, value) pair, validating per
    /// RFC 7540 Section 6.5.2. Unknown identifiers are ignored. Parameters
    /// of a SETTINGS frame must be applied in wire order, so later
    /// duplicates overwrite earlier ones.
    pub fn apply_raw(&mut self, id: u16, value: u32) -> Result<()> {
        let Some(param) = SettingsParameter::from_u16(id) else {
            log::debug!("ignoring unknown settings parameter 0x{:x}={}", id, value);
            return Ok(());
        };

        match param {
            SettingsParameter::HeaderTableSize => self.header_table_size = Some(value),
            SettingsParameter::EnablePush => match value {
                0 => self.enable_push = Some(false),
                1 => self.enable_push = Some(true),
                v => {
                    return Err(Error::Protocol(format!("ENABLE_PUSH must be 0 or 1, got {}", v)))
                }
            },
            SettingsParameter::MaxConcurrentStreams => self.max_concurrent_streams = Some(value),
            SettingsParameter::InitialWindowSize => {
                if value > 0x7FFF_FFFF {
                    return Err(Error::FlowControl(format!(
                        "initial window size {} exceeds maximum (2^31-1)",
                        value
                    )));
                }
                self.initial_window_size = Some(value);
            }
            SettingsParameter::MaxFrameSize => {
                if !(16384..=16_777_215).contains(&value) {
                    return Err(Error::Protocol(format!(
                        "max frame size {} outside valid range (16384-16777215)",
                        value
                    )));
                }
                self.max_frame_size = Some(value);
            }
            SettingsParameter::MaxHeaderListSize => self.max_header_list_size = Some(value),
        }

        Ok(())
    }

    /// Validate settings values, as when building our own preferences
    pub fn validate(&self) -> Result<()> {
        if let Some(initial_window_size) = self.initial_window_size {
            if initial_window_size > 0x7FFF_FFFF {
                return Err(Error::InvalidSettings(format!(
                    "initial window size {} exceeds maximum (2^31-1)",
                    initial_window_size
                )));
            }
        }

        if let Some(max_frame_size) = self.max_frame_size {
            if !(16384..=16_777_215).contains(&max_frame_size) {
                return Err(Error::InvalidSettings(format!(
                    "max frame size {} outside valid range (16384-16777215)",
                    max_frame_size
                )));
            }
        }

        Ok(())
    }

    /// Merge settings from another Settings object
    /// (values present in `other` override values in `self`)
    pub fn merge(&mut self, other: &Settings) {
        if other.header_table_size.is_some() {
            self.header_table_size = other.header_table_size;
        }
        if other.enable_push.is_some() {
            self.enable_push = other.enable_push;
        }
        if other.max_concurrent_streams.is_some() {
            self.max_concurrent_streams = other.max_concurrent_streams;
        }
        if other.initial_window_size.is_some() {
            self.initial_window_size = other.initial_window_size;
        }
        if other.max_frame_size.is_some() {
            self.max_frame_size = other.max_frame_size;
        }
        if other.max_header_list_size.is_some() {
            self.max_header_list_size = other.max_header_list_size;
        }
    }

    /// The transmitted (identifier, value) pairs, in identifier order
    pub fn to_entries(&self) -> Vec<(u16, u32)> {
        let mut entries = Vec::new();
        if let Some(v) = self.header_table_size {
            entries.push((SettingsParameter::HeaderTableSize.as_u16(), v));
        }
        if let Some(v) = self.enable_push {
            entries.push((SettingsParameter::EnablePush.as_u16(), v as u32));
        }
        if let Some(v) = self.max_concurrent_streams {
            entries.push((SettingsParameter::MaxConcurrentStreams.as_u16(), v));
        }
        if let Some(v) = self.initial_window_size {
            entries.push((SettingsParameter::InitialWindowSize.as_u16(), v));
        }
        if let Some(v) = self.max_frame_size {
            entries.push((SettingsParameter::MaxFrameSize.as_u16(), v));
        }
        if let Some(v) = self.max_header_list_size {
            entries.push((SettingsParameter::MaxHeaderListSize.as_u16(), v));
        }
        entries
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::new()
    }
}

/// Builder for HTTP/2 settings
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Create a new settings builder
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings::new(),
        }
    }

    /// Set header table size
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.settings.header_table_size = Some(size);
        self
    }

    /// Set enable push
    pub fn enable_push(mut self, enable: bool) -> Self {
        self.settings.enable_push = Some(enable);
        self
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings.max_concurrent_streams = Some(max);
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings.initial_window_size = Some(size);
        self
    }

    /// Set max frame size
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings.max_frame_size = Some(size);
        self
    }

    /// Set max header list size
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.settings.max_header_list_size = Some(size);
        self
    }

    /// Build the settings
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_parameter_conversion() {
        assert_eq!(SettingsParameter::HeaderTableSize.as_u16(), 0x1);
        assert_eq!(SettingsParameter::EnablePush.as_u16(), 0x2);
        assert_eq!(SettingsParameter::MaxHeaderListSize.as_u16(), 0x6);

        assert_eq!(
            SettingsParameter::from_u16(0x1),
            Some(SettingsParameter::HeaderTableSize)
        );
        assert_eq!(
            SettingsParameter::from_u16(0x4),
            Some(SettingsParameter::InitialWindowSize)
        );
        assert_eq!(SettingsParameter::from_u16(0xff), None);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::new();
        assert_eq!(settings.get_header_table_size(), 4096);
        assert!(settings.get_enable_push());
        assert_eq!(settings.get_max_concurrent_streams(), None);
        assert_eq!(settings.get_initial_window_size(), 65535);
        assert_eq!(settings.get_max_frame_size(), 16384);
        assert_eq!(settings.get_max_header_list_size(), None);
    }

    #[test]
    fn test_settings_builder() {
        let settings = SettingsBuilder::new()
            .header_table_size(8192)
            .enable_push(false)
            .max_concurrent_streams(100)
            .initial_window_size(65535)
            .build()
            .unwrap();

        assert_eq!(settings.get_header_table_size(), 8192);
        assert!(!settings.get_enable_push());
        assert_eq!(settings.get_max_concurrent_streams(), Some(100));
        assert_eq!(settings.get_initial_window_size(), 65535);
    }

    #[test]
    fn test_settings_validation() {
        let settings = SettingsBuilder::new()
            .initial_window_size(65535)
            .max_frame_size(16384)
            .build();
        assert!(settings.is_ok());

        let settings = SettingsBuilder::new()
            .initial_window_size(0x8000_0000) // 2^31
            .build();
        assert!(settings.is_err());

        let settings = SettingsBuilder::new().max_frame_size(1024).build();
        assert!(settings.is_err());

        let settings = SettingsBuilder::new().max_frame_size(16_777_216).build();
        assert!(settings.is_err());
    }

    #[test]
    fn test_apply_raw() {
        let mut settings = Settings::new();
        settings.apply_raw(0x1, 8192).unwrap();
        settings.apply_raw(0x2, 0).unwrap();
        settings.apply_raw(0x4, 1024).unwrap();
        // Unknown identifiers are ignored per RFC 7540.
        settings.apply_raw(0x99, 7).unwrap();

        assert_eq!(settings.get_header_table_size(), 8192);
        assert!(!settings.get_enable_push());
        assert_eq!(settings.get_initial_window_size(), 1024);
    }

    #[test]
    fn test_apply_raw_enable_push_invalid() {
        let mut settings = Settings::new();
        let result = settings.apply_raw(0x2, 2);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_apply_raw_window_size_overflow() {
        let mut settings = Settings::new();
        let result = settings.apply_raw(0x4, 0x8000_0000);
        assert!(matches!(result, Err(Error::FlowControl(_))));
    }

    #[test]
    fn test_apply_raw_frame_size_range() {
        let mut settings = Settings::new();
        assert!(settings.apply_raw(0x5, 1024).is_err());
        assert!(settings.apply_raw(0x5, 16_777_216).is_err());
        assert!(settings.apply_raw(0x5, 65536).is_ok());
        assert_eq!(settings.get_max_frame_size(), 65536);
    }

    #[test]
    fn test_settings_merge() {
        let mut settings1 = SettingsBuilder::new()
            .header_table_size(4096)
            .enable_push(true)
            .build()
            .unwrap();

        let settings2 = SettingsBuilder::new()
            .header_table_size(8192)
            .max_concurrent_streams(100)
            .build()
            .unwrap();

        settings1.merge(&settings2);

        assert_eq!(settings1.get_header_table_size(), 8192); // Overridden
        assert!(settings1.get_enable_push()); // Unchanged
        assert_eq!(settings1.get_max_concurrent_streams(), Some(100)); // Added
    }

    #[test]
    fn test_to_entries() {
        let settings = SettingsBuilder::new()
            .header_table_size(4096)
            .enable_push(false)
            .initial_window_size(65535)
            .build()
            .unwrap();

        assert_eq!(
            settings.to_entries(),
            vec![(0x1, 4096), (0x2, 0), (0x4, 65535)]
        );
    }
}
