//! Shared guardrails for query payload bounds and result limits.

pub const MAX_QUERY_LENGTH: usize = 512;
pub const MAX_SEARCH_LIMIT: usize = 100;

pub fn clamp_int(value: usize, minimum: usize, maximum: usize) -> usize {
    value.max(minimum).min(maximum)
}

/// Clamp a result limit. Zero stays zero.
pub fn clamp_limit(value: usize, maximum: usize) -> usize {
    clamp_int(value, 0, maximum)
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Trim and cut the query to `MAX_QUERY_LENGTH` bytes on a char boundary.
pub fn truncate_query(query: &str) -> String {
    let stripped = query.trim();
    if stripped.len() <= MAX_QUERY_LENGTH {
        return stripped.to_string();
    }
    let mut end = MAX_QUERY_LENGTH;
    while !stripped.is_char_boundary(end) {
        end -= 1;
    }
    stripped[..end].to_string()
}
