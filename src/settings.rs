// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Host-owned configuration.
//!
//! Settings are ordinary values: the host constructs (or deserializes) them,
//! and each compilation unit captures an immutable snapshot that is threaded
//! through the analyzer and the governor. Changing settings never
//! retroactively affects already-compiled expressions.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Setting key gating whether pattern literals are permitted at all.
pub const SETTING_REGEX_ENABLED: &str = "quill.regex.enabled";

/// Setting key for the governor's budget multiplier.
pub const SETTING_REGEX_LIMIT_FACTOR: &str = "quill.regex.limit_factor";

/// The governor's budget multiplier: a finite factor, or the disabled
/// sentinel that makes matching unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitFactor {
    Factor(u32),
    Unlimited,
}

impl Default for LimitFactor {
    fn default() -> Self {
        LimitFactor::Factor(6)
    }
}

impl LimitFactor {
    /// Validate a host-supplied factor. Zero and negative values are
    /// meaningless and rejected.
    pub fn from_factor(factor: i64) -> Result<LimitFactor> {
        if factor <= 0 {
            bail!("[{SETTING_REGEX_LIMIT_FACTOR}] must be positive, got [{factor}]");
        }
        if factor > u32::MAX as i64 {
            bail!("[{SETTING_REGEX_LIMIT_FACTOR}] is too large, got [{factor}]");
        }
        Ok(LimitFactor::Factor(factor as u32))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_regex_enabled")]
    regex_enabled: bool,
    #[serde(default)]
    regex_limit_factor: LimitFactor,
}

fn default_regex_enabled() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            regex_enabled: true,
            regex_limit_factor: LimitFactor::default(),
        }
    }

    /// Gate pattern literals entirely; compilation of a script containing a
    /// pattern fails when disabled.
    pub fn with_regex_enabled(mut self, enabled: bool) -> Settings {
        self.regex_enabled = enabled;
        self
    }

    pub fn with_limit_factor(mut self, factor: i64) -> Result<Settings> {
        self.regex_limit_factor = LimitFactor::from_factor(factor)?;
        Ok(self)
    }

    /// Disable governance: matching becomes unbounded.
    pub fn with_unlimited_regex(mut self) -> Settings {
        self.regex_limit_factor = LimitFactor::Unlimited;
        self
    }

    pub fn regex_enabled(&self) -> bool {
        self.regex_enabled
    }

    pub fn regex_limit_factor(&self) -> LimitFactor {
        self.regex_limit_factor
    }
}
