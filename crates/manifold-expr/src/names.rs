//! Kubernetes-style name generation.
//!
//! Rendered resources frequently need names derived from user-controlled
//! strings. [`generate_name`] sanitizes its input to DNS-subdomain form and
//! appends an eight-character FNV-1a suffix computed over the unsanitized
//! input, so distinct inputs that sanitize to the same string still get
//! distinct names.

use once_cell::sync::Lazy;
use regex::Regex;

/// Length limit for most resource names (DNS subdomain).
pub const MAX_RESOURCE_NAME_LEN: usize = 253;

/// Length limit for namespace-like names (DNS label).
pub const MAX_NAMESPACE_NAME_LEN: usize = 63;

/// Runs of characters that are invalid in a DNS subdomain name.
static INVALID_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9.-]+").expect("static pattern"));

/// 32-bit FNV-1a digest of a string.
pub fn fnv1a_32(input: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in input.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Eight-character lowercase-hex FNV-1a digest. Deterministic.
pub fn hash_hex(input: &str) -> String {
    format!("{:08x}", fnv1a_32(input))
}

/// Build a DNS-subdomain-safe name from parts, truncated to `limit` with an
/// eight-character hash suffix.
///
/// Parts are joined with hyphens; the hash is computed over the joined,
/// unsanitized input.
pub fn generate_name(parts: &[String], limit: usize) -> String {
    let joined = parts.join("-");
    let suffix = hash_hex(&joined);

    let sanitized = sanitize_dns_subdomain(&joined);
    // Reserve room for "-" + 8 hash chars.
    let max_base = limit.saturating_sub(suffix.len() + 1);
    let mut base: String = sanitized.chars().take(max_base).collect();
    while base.ends_with('-') || base.ends_with('.') {
        base.pop();
    }

    if base.is_empty() {
        suffix
    } else {
        format!("{}-{}", base, suffix)
    }
}

/// Lowercase and reduce to the DNS-subdomain alphabet: runs of invalid
/// characters collapse to a single hyphen, leading/trailing separators are
/// trimmed.
fn sanitize_dns_subdomain(input: &str) -> String {
    let lowered = input.to_lowercase();
    let replaced = INVALID_RUN.replace_all(&lowered, "-");
    replaced.trim_matches(|c| c == '-' || c == '.').to_string()
}
