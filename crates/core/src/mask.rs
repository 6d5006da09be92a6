//! Oxygen therapy text mining.
//!
//! Inpatient treatment orders record oxygen therapy as free text ("S/M 10L/MIN",
//! "O2 nasal 3l/min use"). The mart holds one entry per delivery device, each with an
//! ordered list of regular expressions, and pulls the flow-rate magnitude out of the first
//! expression that matches.

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::error::ScoringResult;

/// One measurement a device's order text can carry, with the expressions that
/// recognize it. Expressions run in list order; capture group 1 must be the
/// bare 1–2 digit magnitude. Keep prefix wildcards lazy: a greedy prefix
/// backtracks from the right and captures only the last digit of a two-digit
/// magnitude.
#[derive(Debug)]
pub struct MaskPattern {
    unit: String,
    regexes: Vec<Regex>,
}

impl MaskPattern {
    /// Compile a pattern list.
    ///
    /// All expressions compile case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::Pattern` when an expression does not compile.
    pub fn new(unit: &str, patterns: &[&str]) -> ScoringResult<Self> {
        let mut regexes = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            regexes.push(RegexBuilder::new(pattern).case_insensitive(true).build()?);
        }
        Ok(Self {
            unit: unit.to_string(),
            regexes,
        })
    }
}

/// One oxygen delivery device and the patterns that recognize its orders.
#[derive(Debug)]
pub struct MaskType {
    device: String,
    priority: i32,
    patterns: Vec<MaskPattern>,
}

impl MaskType {
    pub fn new(device: &str, priority: i32, patterns: Vec<MaskPattern>) -> Self {
        Self {
            device: device.to_string(),
            priority,
            patterns,
        }
    }
}

/// What mining found in one order text.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MiningResult {
    pub unit: String,
    pub value: u32,
    pub device: String,
}

/// The device registry. Built once at startup, read-only afterwards.
#[derive(Debug, Default)]
pub struct MaskMart {
    masks: Vec<MaskType>,
}

impl MaskMart {
    /// Register a device, keeping the registry ordered by priority ascending.
    /// Devices sharing a priority stay in registration order.
    pub fn register(&mut self, mask: MaskType) {
        let position = self
            .masks
            .partition_point(|existing| existing.priority <= mask.priority);
        self.masks.insert(position, mask);
    }

    /// Mine an order text for a device mention and its measurement magnitude.
    ///
    /// This is a single-match engine: the first expression that matches, in
    /// registry order, settles the result. A device-switch narrative such as
    /// `"MASK 10L/MIN->N/C 3L/MIN"` therefore reports only the first device.
    pub fn treatment_mining(&self, text: &str) -> Option<MiningResult> {
        for mask in &self.masks {
            for pattern in &mask.patterns {
                for regex in &pattern.regexes {
                    let Some(captures) = regex.captures(text) else {
                        continue;
                    };
                    let Some(value) = captures
                        .get(1)
                        .and_then(|digits| digits.as_str().parse().ok())
                    else {
                        continue;
                    };
                    return Some(MiningResult {
                        unit: pattern.unit.clone(),
                        value,
                        device: mask.device.clone(),
                    });
                }
            }
        }
        None
    }

    /// The production device set: simple masks first, nasal cannulas second.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::Pattern` when a built-in expression does not compile.
    pub fn standard() -> ScoringResult<Self> {
        let mut mart = Self::default();
        mart.register(MaskType::new(
            "Simple Mask",
            0,
            vec![MaskPattern::new(
                "flow_rate",
                &[
                    r"s-m.*?(\d{1,2}) * l",
                    r"sm.*?(\d{1,2})l/(m)",
                    r"s'm.*?(\d{1,2})l/ min",
                    r"simpo.*mask.*?(\d{1,2}) *?l/min",
                    r"s/m.*?(\d{1,2})(l ?(/min)?[^a-z]|liter|lpm)",
                    r"mask.*?(\d{1,2}) *?l",
                ],
            )?],
        ));
        mart.register(MaskType::new(
            "Nasal Cannula",
            1,
            vec![MaskPattern::new(
                "flow_rate",
                &[
                    r"cannula.*?(\d{1,2}).{0,2}l ?(/min)?",
                    r"nasal.*?(\d{1,2})[ _]{0,3}[^a-z]*(l ?(/min)?[^a-z]|liter|lpm)",
                    r"n/c.*?(\d{1,2})l/min",
                    r"nc.*?(\d{1,2})l/min",
                ],
            )?],
        ));
        Ok(mart)
    }
}
