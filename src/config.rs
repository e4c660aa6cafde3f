//! Assembly configuration

use crate::common::error::{Error, Result};

/// Switches that shape how a method body is assembled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Trace every emitted instruction through `log::trace!`
    pub debug_code: bool,
    /// Allow the implicit short<->char and byte->char conversions
    pub narrow_reinterpretation: bool,
    /// Append `return` to void bodies that fall off their end
    pub implicit_void_return: bool,
    /// Upper bound on encoded code length, in bytes
    pub max_code_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_code: false,
            narrow_reinterpretation: true,
            implicit_void_return: true,
            max_code_length: Self::CODE_LENGTH_LIMIT,
        }
    }
}

impl Config {
    pub const DEBUG_CODE_VAR: &'static str = "JFLUENT_DEBUG_CODE";
    pub const NARROW_REINTERPRET_VAR: &'static str = "JFLUENT_NARROW_REINTERPRET";
    pub const IMPLICIT_RETURN_VAR: &'static str = "JFLUENT_IMPLICIT_RETURN";
    pub const MAX_CODE_LENGTH_VAR: &'static str = "JFLUENT_MAX_CODE_LENGTH";

    /// The class-file format caps a method's code at this many bytes
    pub const CODE_LENGTH_LIMIT: usize = 65535;

    /// Build a configuration from the defaults overridden by `JFLUENT_*` variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup(Self::DEBUG_CODE_VAR) {
            config.debug_code = parse_flag(Self::DEBUG_CODE_VAR, &v)?;
        }
        if let Some(v) = lookup(Self::NARROW_REINTERPRET_VAR) {
            config.narrow_reinterpretation = parse_flag(Self::NARROW_REINTERPRET_VAR, &v)?;
        }
        if let Some(v) = lookup(Self::IMPLICIT_RETURN_VAR) {
            config.implicit_void_return = parse_flag(Self::IMPLICIT_RETURN_VAR, &v)?;
        }
        if let Some(v) = lookup(Self::MAX_CODE_LENGTH_VAR) {
            config.max_code_length = parse_code_length(&v)?;
        }
        Ok(config)
    }

    pub fn with_debug_code(mut self, on: bool) -> Self {
        self.debug_code = on;
        self
    }

    pub fn with_narrow_reinterpretation(mut self, on: bool) -> Self {
        self.narrow_reinterpretation = on;
        self
    }

    pub fn with_max_code_length(mut self, limit: usize) -> Self {
        self.max_code_length = limit.min(Self::CODE_LENGTH_LIMIT);
        self
    }
}

fn parse_code_length(value: &str) -> Result<usize> {
    let invalid = || {
        Error::invalid_input(format!(
            "{}: expected a byte count in 1..={}, got '{}'",
            Config::MAX_CODE_LENGTH_VAR,
            Config::CODE_LENGTH_LIMIT,
            value.trim()
        ))
    };
    match value.trim().parse::<usize>() {
        Ok(n) if (1..=Config::CODE_LENGTH_LIMIT).contains(&n) => Ok(n),
        _ => Err(invalid()),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::invalid_input(format!("{}: expected a boolean, got '{}'", key, other))),
    }
}
