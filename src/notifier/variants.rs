//! Address format variants.
//!
//! Twilio is picky about number formats and the exact rules differ between
//! channels and account setups, so each raw configured address expands into
//! an ordered list of candidate encodings of the same logical endpoint. The
//! canonical prefixed form always comes first.

/// Strip whitespace, parentheses and dashes from a raw address string.
pub fn sanitize_raw(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | '-'))
        .collect()
}

/// Ordered WhatsApp candidate encodings for one raw address.
///
/// Produces `whatsapp:+digits` then `whatsapp:digits`; destinations also get
/// the bare `+digits` form as a last resort, which some accounts require.
pub fn whatsapp_variants(raw: &str, is_source: bool) -> Vec<String> {
    let stripped = raw.strip_prefix("whatsapp:").unwrap_or(raw);
    let sanitized = sanitize_raw(stripped);
    let with_plus = if sanitized.starts_with('+') {
        sanitized.clone()
    } else {
        format!("+{sanitized}")
    };
    let without_plus = with_plus.trim_start_matches('+').to_owned();

    let mut variants = vec![
        format!("whatsapp:{with_plus}"),
        format!("whatsapp:{without_plus}"),
    ];
    if !is_source {
        variants.push(with_plus);
    }
    variants
}

/// Ordered SMS candidate encodings: `+digits` then bare digits.
pub fn sms_variants(raw: &str) -> Vec<String> {
    let sanitized = sanitize_raw(raw);
    let with_plus = if sanitized.starts_with('+') {
        sanitized.clone()
    } else {
        format!("+{sanitized}")
    };
    let without_plus = with_plus.trim_start_matches('+').to_owned();
    vec![with_plus, without_plus]
}

/// Mask an address for logging: channel prefix and `+` survive, digits are
/// hidden except the last four.
pub fn mask_for_logs(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "(empty)".to_owned();
    }
    let prefix = if trimmed.starts_with("whatsapp:") {
        "whatsapp:"
    } else {
        ""
    };
    let plus = if trimmed.contains('+') { "+" } else { "" };
    let last4: String = {
        let chars: Vec<char> = trimmed.chars().collect();
        chars[chars.len().saturating_sub(4)..].iter().collect()
    };
    format!("{prefix}{plus}***{last4}")
}
