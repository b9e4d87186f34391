/// Command parsing — turns one raw input line into a routing directive.
///
/// Two forms are recognized, both with an exact, case-sensitive prefix:
///
///   `/msg <nickname> <text>` — direct message to one recipient
///   `/all <text>`            — broadcast to every connected session
///
/// Anything else is not a directive and the caller drops it silently;
/// malformed variants (`/msg` with no recipient/payload separator) are
/// treated the same way rather than faulting.

/// A parsed, actionable command from one line of client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Deliver to the first session whose nickname matches `recipient`,
    /// or spool for later if none is connected.
    Direct { recipient: String, text: String },
    /// Deliver to every connected session, sender included.
    Broadcast { text: String },
}

/// Parse one line (terminator already stripped by the codec).
///
/// The sender identity is not part of the parsed value — the session
/// worker attaches its own nickname when handing the directive to the
/// router.
pub fn parse(line: &str) -> Option<Directive> {
    if let Some(rest) = line.strip_prefix("/msg ") {
        let (recipient, text) = rest.split_once(' ')?;
        Some(Directive::Direct {
            recipient: recipient.to_owned(),
            text: text.to_owned(),
        })
    } else if let Some(rest) = line.strip_prefix("/all ") {
        Some(Directive::Broadcast {
            text: rest.to_owned(),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ── Recognized forms ─────────────────────────────────────────

    #[test]
    fn parse_broadcast() {
        assert_eq!(
            parse("/all hello world"),
            Some(Directive::Broadcast {
                text: "hello world".into()
            })
        );
    }

    #[test]
    fn parse_direct() {
        assert_eq!(
            parse("/msg bob hi there"),
            Some(Directive::Direct {
                recipient: "bob".into(),
                text: "hi there".into()
            })
        );
    }

    #[test]
    fn direct_payload_keeps_internal_spaces() {
        assert_eq!(
            parse("/msg bob one two  three"),
            Some(Directive::Direct {
                recipient: "bob".into(),
                text: "one two  three".into()
            })
        );
    }

    #[test]
    fn direct_payload_may_be_empty() {
        // "/msg bob " — the separator is present, the remainder is empty.
        assert_eq!(
            parse("/msg bob "),
            Some(Directive::Direct {
                recipient: "bob".into(),
                text: String::new()
            })
        );
    }

    #[test]
    fn broadcast_payload_may_be_empty() {
        assert_eq!(
            parse("/all "),
            Some(Directive::Broadcast {
                text: String::new()
            })
        );
    }

    // ── Ignored input ────────────────────────────────────────────

    #[test]
    fn plain_text_is_not_a_directive() {
        assert_eq!(parse("hello"), None);
    }

    #[test]
    fn empty_line_is_not_a_directive() {
        assert_eq!(parse(""), None);
    }

    #[test]
    fn prefixes_are_case_sensitive() {
        assert_eq!(parse("/MSG bob hi"), None);
        assert_eq!(parse("/All hi"), None);
    }

    #[test]
    fn prefix_requires_trailing_space() {
        assert_eq!(parse("/all"), None);
        assert_eq!(parse("/msg"), None);
        assert_eq!(parse("/allhello"), None);
    }

    #[test]
    fn malformed_direct_is_ignored() {
        // No separator after the recipient token — fail gracefully.
        assert_eq!(parse("/msg bob"), None);
    }
}
