//! IRC line parsing.
//!
//! Only what the IRC service needs: source prefix, command and parameters
//! of a single line, plus the target/text helpers used when a
//! PRIVMSG is turned into a [`Message`](crate::message::Message).

/// CTCP delimiter wrapped around client-to-client requests.
pub const CTCP_DELIM: char = '\x01';

/// Check whether `name` is an IRC channel name.
///
/// Channels start with `#`, `&`, `+` or `!`; everything else is a nick.
#[must_use]
pub fn is_channel_name(name: &str) -> bool {
    matches!(name.chars().next(), Some('#' | '&' | '+' | '!'))
        && !name.contains([' ', ',', '\x07', '\0'])
}

/// One parsed IRC protocol line.
///
/// IRCv3 message tags are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    /// Source prefix without the leading colon, e.g. `nick!user@host`.
    pub prefix: Option<String>,
    /// Command or numeric, upper-cased.
    pub command: String,
    /// Parameters; the trailing parameter is the last element.
    pub params: Vec<String>,
}

impl Line {
    /// Parse a raw line. Returns `None` for blank lines or a missing command.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut rest = raw.trim_end_matches(['\r', '\n']);

        if let Some(tagged) = rest.strip_prefix('@') {
            let (_, remainder) = tagged.split_once(' ')?;
            rest = remainder.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(sourced) = rest.strip_prefix(':') {
            let (source, remainder) = sourced.split_once(' ')?;
            prefix = Some(source.to_string());
            rest = remainder.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, remainder)) => (command, remainder),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, remainder)) => {
                    params.push(param.to_string());
                    rest = remainder;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick portion of the source prefix, empty for server-originated lines.
    #[must_use]
    pub fn nick(&self) -> &str {
        self.prefix
            .as_deref()
            .map_or("", |p| p.split(['!', '@']).next().unwrap_or_default())
    }

    /// Text of the message: the last parameter.
    #[must_use]
    pub fn text(&self) -> &str {
        self.params.last().map_or("", String::as_str)
    }

    /// Conversation this line belongs to.
    ///
    /// For PRIVMSG and NOTICE sent straight to us (not to a channel) this is
    /// the sender's nick, so replies go back to them. Otherwise it is the
    /// first parameter.
    #[must_use]
    pub fn target(&self) -> &str {
        let first = self.params.first().map_or("", String::as_str);
        match self.command.as_str() {
            "PRIVMSG" | "NOTICE" if !is_channel_name(first) => self.nick(),
            _ => first,
        }
    }

    /// CTCP command and argument, when the text is a CTCP request.
    #[must_use]
    pub fn ctcp(&self) -> Option<(&str, &str)> {
        let body = self.text().strip_prefix(CTCP_DELIM)?;
        let body = body.strip_suffix(CTCP_DELIM).unwrap_or(body);
        Some(body.split_once(' ').unwrap_or((body, "")))
    }
}
