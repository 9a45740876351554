use crate::types::filter_rule::check_pattern;

pub fn check_filter_pattern(pattern: &str) -> Result<String, String> {
    check_pattern(pattern)?;
    Ok(pattern.to_string())
}
