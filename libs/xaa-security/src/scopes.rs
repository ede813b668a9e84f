//! Scope helpers.
//!
//! Scopes travel either as a space-delimited `scope` string (RFC 8693 / RFC 9068)
//! or as a JSON array (`scp`, as issued by several identity providers).

/// Split a space-delimited scope string into individual scopes.
///
/// Repeated whitespace is ignored and duplicates are dropped while keeping the
/// first-seen order.
#[must_use]
pub fn parse_scope_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for scope in raw.split_whitespace() {
        if !out.iter().any(|s| s == scope) {
            out.push(scope.to_owned());
        }
    }
    out
}

/// Return the required scopes that are not present in `granted`.
///
/// Comparison is exact and case-sensitive.
#[must_use]
pub fn missing_scopes<S: AsRef<str>>(granted: &[String], required: &[S]) -> Vec<String> {
    required
        .iter()
        .map(AsRef::as_ref)
        .filter(|req| !granted.iter().any(|g| g == req))
        .map(str::to_owned)
        .collect()
}
