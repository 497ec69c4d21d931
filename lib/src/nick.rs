//! Nickname Composer.
//!
//! A display name is made of up to four parts:
//!
//! ```text
//! ![TAG] base | Account Name.1234
//! ^ ^^^^^      ^^^^^^^^^^^^^^^^^^
//! marker, guild tag, account suffix
//! ```
//!
//! Composition always fits the result into the platform's length budget,
//! counted in characters. When an account suffix does not fit, the base is
//! trimmed from the right down to a floor, then the account name is trimmed
//! from the left so its `.1234` discriminator survives. A guild prefix takes
//! priority over everything after it.
//!
//! Parsing a composed name and composing it again yields the same name.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest nickname the chat platform accepts.
pub const MAX_NICK_LEN: usize = 32;

/// Shortest the base name is trimmed to when making room for a suffix.
pub const MIN_BASE_LEN: usize = 4;

const SEPARATOR: &str = " | ";

static ACCOUNT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*) \| (.*\.\d{4})$").expect("account suffix pattern"));

static GUILD_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\S{0,4})\] ?").expect("guild tag pattern"));

/// A display name split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NickParts<'a> {
    /// Leading `!` opt-out marker
    pub marker: bool,
    /// Guild tag without brackets
    pub tag: Option<&'a str>,
    /// The user's own name
    pub base: &'a str,
    /// Account name, possibly truncated from the left
    pub account: Option<&'a str>,
}

impl<'a> NickParts<'a> {
    /// Split a display name.
    pub fn parse(name: &'a str) -> Self {
        let (marker, tag, rest) = split_guild_tag(name);
        let (base, account) = split_account_suffix(rest);
        Self {
            marker,
            tag,
            base,
            account,
        }
    }
}

/// Split off a leading `!` marker and `[TAG]` prefix.
pub fn split_guild_tag(name: &str) -> (bool, Option<&str>, &str) {
    let (marker, rest) = match name.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, name),
    };
    match GUILD_TAG.captures(rest) {
        Some(caps) => {
            let whole = caps.get(0).map_or(0, |m| m.end());
            let tag = caps.get(1).map(|m| m.as_str());
            (marker, tag, &rest[whole..])
        }
        None => (marker, None, rest),
    }
}

/// Split off a trailing ` | Account.1234` suffix.
pub fn split_account_suffix(name: &str) -> (&str, Option<&str>) {
    match ACCOUNT_SUFFIX.captures(name) {
        Some(caps) => match (caps.get(1), caps.get(2)) {
            (Some(base), Some(account)) => (base.as_str(), Some(account.as_str())),
            _ => (name, None),
        },
        None => (name, None),
    }
}

/// Remove any guild tag, keeping the `!` marker.
pub fn strip_guild_tag(name: &str) -> String {
    let (marker, _, rest) = split_guild_tag(name);
    if marker {
        format!("!{rest}")
    } else {
        rest.to_string()
    }
}

/// Remove any account suffix.
pub fn strip_account_suffix(name: &str) -> &str {
    split_account_suffix(name).0
}

/// Whether the name ends in a suffix taken from one of the accounts.
///
/// The suffix may be a left-truncated account name.
pub fn has_account_suffix<'a>(name: &str, accounts: impl IntoIterator<Item = &'a str>) -> bool {
    match split_account_suffix(name).1 {
        Some(suffix) => accounts.into_iter().any(|acc| acc.ends_with(suffix)),
        None => false,
    }
}

/// Fits names into a length budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NickComposer {
    max_len: usize,
    min_base_len: usize,
}

impl Default for NickComposer {
    fn default() -> Self {
        Self {
            max_len: MAX_NICK_LEN,
            min_base_len: MIN_BASE_LEN,
        }
    }
}

impl NickComposer {
    /// Composer with the platform defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the length budget
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Set the floor the base is trimmed to
    pub fn with_min_base_len(mut self, min_base_len: usize) -> Self {
        self.min_base_len = min_base_len;
        self
    }

    /// Length budget
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// `"{base} | {account}"`, replacing any previous suffix.
    pub fn account_suffix(&self, base: &str, account: &str) -> String {
        self.compose(&NickParts {
            marker: false,
            tag: None,
            base: strip_account_suffix(base),
            account: Some(account),
        })
    }

    /// `"[{tag}] {base}"`, replacing any previous tag and keeping a `!` marker.
    pub fn guild_prefix(&self, base: &str, tag: &str) -> String {
        let (marker, _, rest) = split_guild_tag(base);
        self.compose(&NickParts {
            marker,
            tag: Some(tag),
            base: rest,
            account: None,
        })
    }

    /// Join parts into a name within the budget.
    ///
    /// The prefix width is reserved before the account suffix is fitted.
    pub fn compose(&self, parts: &NickParts<'_>) -> String {
        let marker = if parts.marker { "!" } else { "" };
        let prefix = match parts.tag {
            Some(tag) => format!("{marker}[{tag}] "),
            None => marker.to_string(),
        };
        let budget = self.max_len.saturating_sub(char_len(&prefix));

        let body = match parts.account {
            Some(account) => self.fit_suffix(parts.base, account, budget),
            None => truncate(parts.base, budget).to_string(),
        };

        truncate(&format!("{prefix}{body}"), self.max_len).to_string()
    }

    fn fit_suffix(&self, base: &str, account: &str, budget: usize) -> String {
        let base_len = char_len(base);
        let account_len = char_len(account);
        let mut overhead = (base_len + account_len + SEPARATOR.len()).saturating_sub(budget);

        let mut base = base;
        if overhead > 0 && base_len > self.min_base_len {
            let trim = overhead.min(base_len - self.min_base_len);
            base = truncate(base, base_len - trim);
            overhead -= trim;
        }

        let mut account = account;
        if overhead > 0 {
            account = skip_chars(account, overhead.min(account_len));
        }

        format!("{base}{SEPARATOR}{account}")
    }
}

/// [`NickComposer::account_suffix`] with the platform defaults.
pub fn compose_account_suffix(base: &str, account: &str) -> String {
    NickComposer::default().account_suffix(base, account)
}

/// [`NickComposer::guild_prefix`] with the platform defaults.
pub fn compose_guild_prefix(base: &str, tag: &str) -> String {
    NickComposer::default().guild_prefix(base, tag)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn skip_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}
