/// Validates a subscription filter against the MQTT 3.1.1 wildcard rules:
/// `#` only as the final segment, `+` only as a whole segment, non-empty,
/// valid UTF-8 (guaranteed here since we take a `&str`).
pub fn valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }

    let segments: Vec<&str> = filter.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.contains('#') && (*segment != "#" || i != segments.len() - 1) {
            return false;
        }
        if segment.contains('+') && *segment != "+" {
            return false;
        }
    }

    true
}
