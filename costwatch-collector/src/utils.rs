pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Set and non-empty.
pub fn env_flag(key: &str) -> bool {
    std::env::var(key).map(|v| !v.trim().is_empty() && v != "0").unwrap_or(false)
}

/// Comma-separated list with blanks dropped: `"us-east-1, ,eu-west-1"`.
pub fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
