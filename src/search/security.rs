//! Denylist screening of query text.
//!
//! This is a best-effort heuristic. It has false positives (prose that
//! mentions "union select") and false negatives (novel phrasing). Stores
//! must still use parameterized queries.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Category of a denylist match. Only the class is ever reported, never
/// the text that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternClass {
    SqlStatement,
    ScriptInjection,
    CodeExecution,
    ControlCharacter,
    PathTraversal,
    DangerousProtocol,
}

impl PatternClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlStatement => "sql_statement",
            Self::ScriptInjection => "script_injection",
            Self::CodeExecution => "code_execution",
            Self::ControlCharacter => "control_character",
            Self::PathTraversal => "path_traversal",
            Self::DangerousProtocol => "dangerous_protocol",
        }
    }
}

impl fmt::Display for PatternClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of pattern classes and the regex that detects each.
pub struct DenyList {
    patterns: Vec<(PatternClass, Regex)>,
}

impl DenyList {
    fn compile(entries: &[(PatternClass, &str)]) -> Self {
        let patterns = entries
            .iter()
            .map(|(class, pattern)| (*class, Regex::new(pattern).expect("Invalid regex")))
            .collect();
        Self { patterns }
    }

    /// First matching pattern class, if any.
    pub fn scan(&self, text: &str) -> Option<PatternClass> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(class, _)| *class)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

const SQL_STATEMENT: &str =
    r"(?i)(union\s+select|drop\s+table|delete\s+from|insert\s+into|update\s+\S+\s+set|update\s+set)";
const SCRIPT_INJECTION: &str = r"(?i)(<\s*script|script\s*>|javascript:|vbscript:)";
const CODE_EXECUTION: &str = r"(?i)(exec\s*\(|eval\s*\(|system\s*\()";
const CONTROL_CHARACTER: &str = r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]";
const PATH_TRAVERSAL: &str = r"(\.\./|\.\.\\)";
const DANGEROUS_PROTOCOL: &str = r"(?i)(file://|ftp://)";

/// Checked when a `SearchQuery` is constructed.
pub static BASE_DENYLIST: LazyLock<DenyList> = LazyLock::new(|| {
    DenyList::compile(&[
        (PatternClass::SqlStatement, SQL_STATEMENT),
        (PatternClass::ScriptInjection, SCRIPT_INJECTION),
        (PatternClass::CodeExecution, CODE_EXECUTION),
        (PatternClass::ControlCharacter, CONTROL_CHARACTER),
    ])
});

/// Checked again by the engine before any collaborator call.
pub static EXTENDED_DENYLIST: LazyLock<DenyList> = LazyLock::new(|| {
    DenyList::compile(&[
        (PatternClass::SqlStatement, SQL_STATEMENT),
        (PatternClass::ScriptInjection, SCRIPT_INJECTION),
        (PatternClass::CodeExecution, CODE_EXECUTION),
        (PatternClass::ControlCharacter, CONTROL_CHARACTER),
        (PatternClass::PathTraversal, PATH_TRAVERSAL),
        (PatternClass::DangerousProtocol, DANGEROUS_PROTOCOL),
    ])
});
