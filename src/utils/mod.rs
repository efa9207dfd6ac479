pub mod time;

/// Constant-time string comparison for secrets supplied by callers
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    use subtle::ConstantTimeEq;
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
