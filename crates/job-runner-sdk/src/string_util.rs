/// String helpers shared by configuration code.
pub struct StringUtil;

impl StringUtil {
    /// Convert a string to a boolean.
    ///
    /// Valid true values: `"1"`, `"true"`, `"yes"`, `"on"` (case-insensitive).
    /// Valid false values: `"0"`, `"false"`, `"no"`, `"off"` (case-insensitive).
    /// Returns `None` for unrecognized values.
    pub fn convert_to_bool(value: &str) -> Option<bool> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Parse a non-negative whole number of seconds, tolerating surrounding whitespace.
    pub fn convert_to_seconds(value: &str) -> Option<u64> {
        value.trim().parse::<u64>().ok()
    }
}
