//! Session identifier lookup in a cookie string.

use percent_encoding::percent_decode_str;

/// Cookie name the completion backend uses to correlate requests.
pub const SESSION_COOKIE_NAME: &str = "session_id";

/// Find `name` in a `Cookie`-header style string (`a=1; b=2`).
///
/// The whole string is percent-decoded before splitting, so encoded
/// separators inside values behave as they would in a browser cookie jar.
pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    let decoded = percent_decode_str(cookies).decode_utf8_lossy();
    let prefix = format!("{name}=");
    decoded
        .split(';')
        .map(|pair| pair.trim_start_matches(' '))
        .find_map(|pair| pair.strip_prefix(prefix.as_str()))
        .map(str::to_string)
}

pub fn session_from_cookies(cookies: &str) -> Option<String> {
    cookie_value(cookies, SESSION_COOKIE_NAME).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_session_among_other_cookies() {
        let jar = "theme=dark; session_id=abc123; lang=en";
        assert_eq!(session_from_cookies(jar).as_deref(), Some("abc123"));
    }

    #[test]
    fn decodes_percent_encoded_values() {
        let jar = "session_id=a%2Fb%3Dc";
        assert_eq!(session_from_cookies(jar).as_deref(), Some("a/b=c"));
    }

    #[test]
    fn missing_or_empty_session_is_none() {
        assert_eq!(session_from_cookies("theme=dark"), None);
        assert_eq!(session_from_cookies("session_id="), None);
        assert_eq!(session_from_cookies(""), None);
        // prefix match must be on the whole name
        assert_eq!(session_from_cookies("old_session_id=1"), None);
    }
}
