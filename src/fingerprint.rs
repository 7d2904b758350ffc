use crate::masking::normalize_message;
use crate::model::{DiagnosticRecord, StackFrame};
use sha2::{Digest, Sha256};

/// `com.acme.OrderException` -> `OrderException`.
pub fn short_class(class: &str) -> &str {
    let class = class.trim();
    class
        .rsplit(|c| c == '.' || c == '$')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(class)
}

/// Canonical identity string. Frame locations (file and line) are left out
/// so rebuilds that shift line numbers keep merging into one record.
pub fn signature(class: Option<&str>, top_frame: Option<&StackFrame>, message: &str) -> String {
    let class = class.map(short_class).unwrap_or("");
    let site = top_frame.map(StackFrame::call_site).unwrap_or_default();
    format!("{}|{}|{}", class, site, normalize_message(message))
}

pub fn hash_signature(signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn compute(class: Option<&str>, top_frame: Option<&StackFrame>, message: &str) -> String {
    hash_signature(&signature(class, top_frame, message))
}

pub fn fingerprint(record: &DiagnosticRecord) -> String {
    compute(record.exception_class(), record.top_frame(), record.message())
}
