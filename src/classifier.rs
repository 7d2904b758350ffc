use crate::model::{
    truncate_chars, Category, DiagnosticRecord, Severity, StackFrame, DEFAULT_PLATFORM_PREFIXES,
};
use crate::rules::{self, Rule};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

const MESSAGE_MAX: usize = 1_000;

static RE_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*at\s+([\w$.<>/]+)\.([\w$<>-]+)\(([^)\n]*)\)(?:\s*~?\[([^\]\n]*)\])?").unwrap()
});

static RE_CAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Caused by:\s*([\w$.]+)(?::[ \t]*([^\n]*))?").unwrap()
});

// `pkg.Qualified$Inner.FooException: message`, anywhere on a line. A bare
// `Error`/`Exception` counts only when a message follows it.
static RE_EXCEPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<class>(?:[A-Za-z_$][\w$]*\.)*(?:[A-Z][\w$]*)?(?:Exception|Error))\b(?::[ \t]*(?P<msg>[^\n]*))?").unwrap()
});

pub fn extract_stack_frames(text: &str) -> Vec<StackFrame> {
    RE_FRAME
        .captures_iter(text)
        .map(|c| StackFrame {
            module: c[1].to_string(),
            function: c[2].to_string(),
            location: c[3].trim().to_string(),
            artifact: c.get(4).map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty()),
        })
        .collect()
}

/// Every `Caused by:` in encounter order; the root cause is last.
pub fn extract_cause_chain(text: &str) -> Vec<String> {
    RE_CAUSE
        .captures_iter(text)
        .map(|c| {
            let class = &c[1];
            match c.get(2).map(|m| m.as_str().trim()).filter(|m| !m.is_empty()) {
                Some(msg) => format!("{class}: {msg}"),
                None => class.to_string(),
            }
        })
        .collect()
}

fn is_detail_line(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("at ") || t.starts_with("Caused by:") || t.starts_with("Suppressed:") || t.starts_with("...")
}

/// Generic `ClassName: message` fallback. Lines carrying a message win over
/// bare class names; frame and cause lines are not considered.
pub fn find_exception(text: &str) -> Option<(String, String)> {
    let mut bare: Option<String> = None;
    for line in text.lines().filter(|l| !is_detail_line(l)) {
        for caps in RE_EXCEPTION.captures_iter(line) {
            let class = caps["class"].to_string();
            match caps.name("msg").map(|m| m.as_str().trim()) {
                Some(msg) if !msg.is_empty() => return Some((class, msg.to_string())),
                _ if matches!(class.as_str(), "Error" | "Exception") => {}
                _ => {
                    bare.get_or_insert(class);
                }
            }
        }
    }
    bare.map(|c| (c, String::new()))
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
    platform_prefixes: Vec<&'static str>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self::with_rules(rules::default_rules())
    }

    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules, platform_prefixes: DEFAULT_PLATFORM_PREFIXES.to_vec() }
    }

    pub fn with_platform_prefixes(mut self, prefixes: Vec<&'static str>) -> Self {
        self.platform_prefixes = prefixes;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn parse(&self, text: &str, source: &str) -> Option<DiagnosticRecord> {
        self.parse_at(text, source, Utc::now())
    }

    /// Classifies one completed block. `None` means "ignore this block".
    pub fn parse_at(&self, text: &str, source: &str, at: DateTime<Utc>) -> Option<DiagnosticRecord> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let severity = Severity::scan(trimmed);
        let matched = rules::first_match(&self.rules, trimmed);

        let from_rule = matched.as_ref().and_then(|(_, caps)| {
            let class = caps.name("class").map(|m| m.as_str().trim()).filter(|c| !c.is_empty())?;
            let msg = caps.name("msg").map(|m| m.as_str().trim()).unwrap_or("");
            Some((class.to_string(), msg.to_string()))
        });
        let exception = from_rule.or_else(|| find_exception(trimmed));

        let category = match (&matched, &exception) {
            (Some((rule, _)), _) => rule.category,
            (None, Some((class, _))) => rules::infer_generic_category(class),
            (None, None) => {
                debug!(source, "block matched no rule and carries no exception signature");
                return None;
            }
        };

        let (class, message) = match exception {
            Some((class, msg)) => (Some(class), msg),
            None => {
                if !matches!(severity, Severity::Error | Severity::Critical) {
                    debug!(source, ?category, ?severity, "rule-only match below error severity");
                    return None;
                }
                (None, first_line(trimmed).unwrap_or_default().to_string())
            }
        };

        let mut builder = DiagnosticRecord::builder(source, category)
            .severity(severity)
            .observed_at(at)
            .message(truncate_chars(&message, MESSAGE_MAX))
            .stack_frames(extract_stack_frames(trimmed))
            .cause_chain(extract_cause_chain(trimmed))
            .raw_text(trimmed)
            .platform_prefixes(&self.platform_prefixes);
        if let Some(class) = class {
            builder = builder.exception_class(class);
        }
        match builder.build() {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(source, error = %e, "discarding unbuildable block");
                None
            }
        }
    }
}
