// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The resource governor around pattern matching.
//!
//! Every top-level matching operation derives a fresh budget of
//! `input length × limit factor` character inspections from the settings
//! snapshot captured when the pattern was compiled. The governor wraps the
//! matching engine itself, not any particular call syntax, so stored
//! patterns, dynamically typed handles and first-class function references
//! are all governed alike. A blown budget is a recoverable flow-control
//! signal: nothing persists across calls and no state stays "open".

use crate::fault::{FaultCause, ScriptFault};
use crate::pattern::{Meter, Program};
use crate::settings::{LimitFactor, Settings, SETTING_REGEX_ENABLED};

use anyhow::{bail, Result};
use thiserror::Error;

// Longest prefix of the offending input quoted in a budget fault. Bounded so
// operators can diagnose the pattern without unbounded data reaching logs.
const SNIPPET_LIMIT: usize = 64;

/// A matching call that inspected more characters than its budget allows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "[scripting] regular expression considered too many characters, \
     pattern: [{pattern}], limit factor: [{factor}], char limit: [{limit}], \
     count: [{count}], snippet: [{snippet}]; this limit can be changed by the \
     [quill.regex.limit_factor] setting"
)]
pub struct BudgetError {
    pub pattern: String,
    pub factor: u32,
    pub limit: u64,
    pub count: u64,
    pub snippet: String,
}

impl BudgetError {
    /// Wrap into the uniform fault model for transport to the host.
    pub fn to_fault(&self, script: impl Into<String>, lang: impl Into<String>) -> ScriptFault {
        ScriptFault::new(
            self.to_string(),
            FaultCause::new("regular expression budget exceeded"),
            vec![format!("pattern [{}]", self.pattern)],
            script,
            lang,
        )
    }
}

fn snippet(input: &[char]) -> String {
    if input.len() > SNIPPET_LIMIT {
        let mut s: String = input[..SNIPPET_LIMIT - 3].iter().collect();
        s.push_str("...");
        s
    } else {
        input.iter().collect()
    }
}

/// A compiled pattern bound to the settings snapshot of its compilation
/// unit. All matching entry points live here, which is what makes the
/// governor impossible to bypass through indirection.
#[derive(Debug, Clone)]
pub struct GovernedPattern {
    program: Program,
    limit: LimitFactor,
}

impl GovernedPattern {
    /// Compile a pattern under the given settings. Fails when pattern
    /// literals are disabled or the pattern is malformed.
    pub fn compile(pattern: &str, settings: &Settings) -> Result<GovernedPattern> {
        if !settings.regex_enabled() {
            bail!(
                "regexes are disabled; set [{SETTING_REGEX_ENABLED}] to [true] to allow them, \
                 keeping in mind that regexes escape the bounded-cost guarantees of scripts"
            );
        }
        let program = Program::compile(pattern)?;
        Ok(GovernedPattern {
            program,
            limit: settings.regex_limit_factor(),
        })
    }

    pub fn source(&self) -> &str {
        self.program.source()
    }

    fn meter(&self, input_len: usize) -> Meter {
        match self.limit {
            LimitFactor::Factor(factor) => Meter::new(Some(input_len as u64 * factor as u64)),
            LimitFactor::Unlimited => Meter::new(None),
        }
    }

    fn budget_error(&self, input: &[char], count: u64) -> BudgetError {
        let (factor, limit) = match self.limit {
            LimitFactor::Factor(factor) => (factor, input.len() as u64 * factor as u64),
            // Unreachable in practice: an unlimited meter never exhausts.
            LimitFactor::Unlimited => (0, 0),
        };
        BudgetError {
            pattern: self.program.source().to_string(),
            factor,
            limit,
            count,
            snippet: snippet(input),
        }
    }

    /// Whether the entire input matches the pattern.
    pub fn is_match(&self, input: &str) -> Result<bool, BudgetError> {
        let chars: Vec<char> = input.chars().collect();
        let mut meter = self.meter(chars.len());
        self.program
            .run_at(&chars, 0, true, &mut meter)
            .map(|end| end.is_some())
            .map_err(|_| self.budget_error(&chars, meter.count()))
    }

    /// Leftmost match anywhere in the input, as `(start, end)` character
    /// positions.
    pub fn find(&self, input: &str) -> Result<Option<(usize, usize)>, BudgetError> {
        let chars: Vec<char> = input.chars().collect();
        let mut meter = self.meter(chars.len());
        self.program
            .find_at(&chars, 0, &mut meter)
            .map_err(|_| self.budget_error(&chars, meter.count()))
    }

    /// Split the input around matches of the pattern. A positive `limit`
    /// caps the number of pieces (the last piece carries the remainder);
    /// `limit == 0` applies the pattern as often as possible and discards
    /// trailing empty pieces.
    pub fn split(&self, input: &str, limit: usize) -> Result<Vec<String>, BudgetError> {
        let chars: Vec<char> = input.chars().collect();
        let mut meter = self.meter(chars.len());
        let mut pieces: Vec<String> = vec![];
        let mut start = 0usize;
        let mut search = 0usize;

        while search <= chars.len() && (limit == 0 || pieces.len() + 1 < limit) {
            let found = self
                .program
                .find_at(&chars, search, &mut meter)
                .map_err(|_| self.budget_error(&chars, meter.count()))?;
            match found {
                Some((ms, me)) => {
                    pieces.push(chars[start..ms].iter().collect());
                    start = me;
                    // A zero-width match must not stall the scan.
                    search = if me == ms { me + 1 } else { me };
                }
                None => break,
            }
        }
        pieces.push(chars[start..].iter().collect());

        if limit == 0 {
            while pieces.last().is_some_and(|p| p.is_empty()) {
                pieces.pop();
            }
        }
        Ok(pieces)
    }
}
