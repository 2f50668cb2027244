//! Hostlist expansion/compression: `prefix[1-3,5,7-9]suffix` <->
//! an enumerated `Vec<String>`, preserving ordering when requested.
//! Self-contained: node names never flow through the bracket grammar
//! anywhere else in the resource table.

use crate::error::{invalid_input, Result};
use std::fmt::Write as _;

/// Expands a single bracketed hostlist expression into the ordered
/// list of concrete names. Non-bracketed input is returned as a
/// single-element list.
pub fn expand(pattern: &str) -> Result<Vec<String>> {
    let Some(open) = pattern.find('[') else {
        return Ok(vec![pattern.to_string()]);
    };
    let Some(close) = pattern[open..].find(']') else {
        return Err(invalid_input(format!("unterminated hostlist bracket in `{pattern}`")));
    };
    let close = open + close;
    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let body = &pattern[open + 1..close];

    let mut out = Vec::new();
    for part in body.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((a, b)) = part.split_once('-') {
            let width = a.len().max(b.len());
            let a_padded_zero = a.starts_with('0') && a.len() > 1;
            let lo: u64 = a
                .parse()
                .map_err(|_| invalid_input(format!("bad hostlist range start `{a}`")))?;
            let hi: u64 = b
                .parse()
                .map_err(|_| invalid_input(format!("bad hostlist range end `{b}`")))?;
            if lo > hi {
                return Err(invalid_input(format!("hostlist range `{part}` is not ascending")));
            }
            for n in lo..=hi {
                let mut numeral = String::new();
                if a_padded_zero {
                    let _ = write!(numeral, "{n:0width$}");
                } else {
                    let _ = write!(numeral, "{n}");
                }
                out.push(format!("{prefix}{numeral}{suffix}"));
            }
        } else {
            out.push(format!("{prefix}{part}{suffix}"));
        }
    }
    Ok(out)
}

/// Inverse of [`expand`]: groups a list of names sharing one
/// alphabetic prefix/suffix around a numeric field into the bracket
/// form, preserving the input order of the first occurrence of each
/// run. Names that don't fit the `prefix<digits>suffix` shape are
/// passed through as their own singleton group, comma-joined with the
/// rest.
pub fn compress(names: &[String]) -> String {
    let mut groups: Vec<(String, String, Vec<String>)> = Vec::new();
    for name in names {
        let Some((prefix, digits, suffix)) = split_numeric(name) else {
            groups.push((name.clone(), String::new(), vec![String::new()]));
            continue;
        };
        if let Some(group) = groups
            .iter_mut()
            .find(|(p, s, _)| *p == prefix && *s == suffix)
        {
            group.2.push(digits);
        } else {
            groups.push((prefix, suffix, vec![digits]));
        }
    }

    let mut parts = Vec::new();
    for (prefix, suffix, digits) in groups {
        if digits.len() == 1 && digits[0].is_empty() {
            parts.push(prefix);
            continue;
        }
        if digits.len() == 1 {
            parts.push(format!("{prefix}{}{suffix}", digits[0]));
            continue;
        }
        let ranges = ranges_from_numerals(&digits);
        parts.push(format!("{prefix}[{}]{suffix}", ranges.join(",")));
    }
    parts.join(",")
}

/// Splits `"node007"` into `("node", "007", "")`. Returns `None` if
/// the name has no trailing digit run.
fn split_numeric(name: &str) -> Option<(String, String, String)> {
    let digit_start = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    let prefix = &name[..digit_start];
    let digits = &name[digit_start..];
    Some((prefix.to_string(), digits.to_string(), String::new()))
}

fn ranges_from_numerals(numerals: &[String]) -> Vec<String> {
    let mut values: Vec<(u64, usize)> = numerals
        .iter()
        .map(|s| (s.parse::<u64>().unwrap_or(0), s.len()))
        .collect();
    values.sort_unstable();
    let mut out = Vec::new();
    let mut i = 0;
    while i < values.len() {
        let (start, width) = values[i];
        let mut end = start;
        let mut j = i + 1;
        while j < values.len() && values[j].0 == end + 1 {
            end = values[j].0;
            j += 1;
        }
        if start == end {
            out.push(format!("{start:0width$}"));
        } else {
            out.push(format!("{start:0width$}-{end:0width$}"));
        }
        i = j;
    }
    out
}
