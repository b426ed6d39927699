//! OCR line cleanup
//!
//! Card fronts print the player name next to a fielding position and OCR
//! happily reads both. These helpers strip what is not part of the name.

use regex::Regex;

lazy_static::lazy_static! {
    /// One or more trailing position tokens, including common OCR misreads
    /// (`28`/`18`/`38` for `2B`/`1B`/`3B`).
    static ref POSITION_SUFFIX_RE: Regex = Regex::new(
        r"(?i)(?:\s+\b(?:2B|28|1B|18|3B|38|SS|LF|CF|RF|C|P|Pitcher|Catcher|First\s+Base|Second\s+Base|Third\s+Base|Shortstop|Left\s+Field|Center\s+Field|Right\s+Field)\b)+\s*$"
    ).unwrap();

    /// Generational suffix left dangling after cutting at its period
    static ref NAME_SUFFIX_RE: Regex = Regex::new(r"(?i)\s+\b(?:Jr|Sr|II|III|IV)\s*$").unwrap();
}

/// Turn a raw OCR line into a candidate player name.
///
/// Whitespace-only input comes back trimmed and is not matchable.
pub fn cleanup_string(raw: &str) -> String {
    let mut working = raw.trim();

    if working.is_empty() {
        return working.to_string();
    }

    // Initials at position 0 are kept; anything from the first later period on is dropped
    if let Some((period, _)) = working.char_indices().skip(1).find(|&(_, c)| c == '.') {
        working = &working[..period];
        if let Some(m) = NAME_SUFFIX_RE.find(working) {
            working = &working[..m.start()];
        }
    }

    POSITION_SUFFIX_RE.replace(working, "").trim_end().to_string()
}
