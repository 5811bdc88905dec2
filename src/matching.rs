//! Hostmask matching.
//!
//! Two matchers are used by access lists and account access masks:
//! glob matching with `*`/`?` under IRC case folding, and CIDR matching
//! where the host part of a mask is a network such as `192.0.2.0/24`.

use crate::casemap::irc_lower_char;
use ipnet::IpNet;
use std::net::IpAddr;

/// Match `text` against a glob `pattern` with IRC case-insensitivity.
///
/// `*` matches any run of characters (including none) and `?` matches
/// exactly one.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(irc_lower_char).collect();
    let text: Vec<char> = text.chars().map(irc_lower_char).collect();

    let mut p = 0;
    let mut t = 0;
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star_p {
            // backtrack: let the last star swallow one more character
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}

/// Match `text` (`[nick!]user@address`) against a CIDR mask.
///
/// The part of the mask before the last `@` is glob-matched against the
/// corresponding part of `text`; the part after it must parse as a
/// network containing the address in `text`. Masks without a network
/// part never match.
pub fn match_cidr(mask: &str, text: &str) -> bool {
    let Some((mask_left, mask_net)) = mask.rsplit_once('@') else {
        return false;
    };
    let Some((text_left, text_addr)) = text.rsplit_once('@') else {
        return false;
    };

    let Ok(net) = mask_net.parse::<IpNet>() else {
        return false;
    };
    let Ok(addr) = text_addr.parse::<IpAddr>() else {
        return false;
    };

    net.contains(&addr) && wildcard_match(mask_left, text_left)
}

/// Match with either the glob or the CIDR rule.
pub fn mask_matches(mask: &str, text: &str) -> bool {
    wildcard_match(mask, text) || match_cidr(mask, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_basics() {
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("*!*@*.example.net", "nick!ident@host.example.net"));
        assert!(wildcard_match("a?c", "abc"));
        assert!(!wildcard_match("a?c", "ac"));
        assert!(!wildcard_match("*.example.net", "example.org"));
    }

    #[test]
    fn glob_folds_case() {
        assert!(wildcard_match("*!*@HOST[1]", "n!u@host{1}"));
    }

    #[test]
    fn glob_backtracks() {
        assert!(wildcard_match("*ab*cd", "xxabyyabzzcd"));
        assert!(!wildcard_match("*ab*cd", "xxabyyabzzc"));
    }

    #[test]
    fn cidr_v4() {
        assert!(match_cidr("*@192.0.2.0/24", "ident@192.0.2.77"));
        assert!(match_cidr("*!bob@10.0.0.0/8", "nick!bob@10.1.2.3"));
        assert!(!match_cidr("*!bob@10.0.0.0/8", "nick!eve@10.1.2.3"));
        assert!(!match_cidr("*@192.0.2.0/24", "ident@198.51.100.1"));
    }

    #[test]
    fn cidr_v6_and_garbage() {
        assert!(match_cidr("*@2001:db8::/32", "u@2001:db8::1"));
        assert!(!match_cidr("*@not-a-net", "u@192.0.2.1"));
        assert!(!match_cidr("*@192.0.2.0/24", "u@some.host"));
    }
}
