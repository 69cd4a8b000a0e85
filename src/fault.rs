// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The uniform, serializable fault model.
//!
//! Both the analyzer and the governor report failures as a [`ScriptFault`]:
//! message, cause, script call stack, source text, language tag and an
//! optional position. Faults are constructed at the failure site, propagated
//! unchanged to the host boundary, and round-trip losslessly through a
//! serialized byte form for cross-process transport.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source position attached to a fault: line, column offset within the
/// line, and absolute offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: u32) -> Position {
        Position {
            line,
            column,
            offset,
        }
    }
}

/// The generic causal error carried by a fault. Whatever error caused the
/// failure is re-wrapped so that at least its message survives transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{reason}")]
pub struct FaultCause {
    reason: String,
}

impl FaultCause {
    pub fn new(reason: impl Into<String>) -> FaultCause {
        FaultCause {
            reason: reason.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.reason
    }
}

impl From<anyhow::Error> for FaultCause {
    fn from(e: anyhow::Error) -> FaultCause {
        FaultCause::new(e.to_string())
    }
}

impl From<&str> for FaultCause {
    fn from(s: &str) -> FaultCause {
        FaultCause::new(s)
    }
}

impl From<String> for FaultCause {
    fn from(s: String) -> FaultCause {
        FaultCause::new(s)
    }
}

/// A structured script failure.
///
/// All fields except `position` are required: the constructor takes each by
/// value, and the wire format rejects records with any of them absent. The
/// script stack is exposed read-only; there is no way to grow or reorder it
/// through a constructed fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{reason}")]
pub struct ScriptFault {
    reason: String,
    #[source]
    caused_by: FaultCause,
    script_stack: Vec<String>,
    script: String,
    lang: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<Position>,
}

impl ScriptFault {
    pub fn new(
        message: impl Into<String>,
        cause: impl Into<FaultCause>,
        script_stack: Vec<String>,
        script: impl Into<String>,
        lang: impl Into<String>,
    ) -> ScriptFault {
        ScriptFault {
            reason: message.into(),
            caused_by: cause.into(),
            script_stack,
            script: script.into(),
            lang: lang.into(),
            position: None,
        }
    }

    pub fn with_position(mut self, position: Position) -> ScriptFault {
        self.position = Some(position);
        self
    }

    pub fn message(&self) -> &str {
        &self.reason
    }

    pub fn cause(&self) -> &FaultCause {
        &self.caused_by
    }

    /// The script call stack, ordered innermost first. Read-only.
    pub fn script_stack(&self) -> &[String] {
        &self.script_stack
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Serialize for cross-process transport. [`ScriptFault::from_bytes`]
    /// reconstructs an equal fault, position included.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Reconstruct a fault from its byte form. A record missing any
    /// required field is rejected here, mirroring the constructor's
    /// requirements.
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<ScriptFault> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Structured diagnostic rendering: every field is an independently
    /// locatable element of the produced JSON.
    pub fn to_json_string(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
