// Output cleaner - normalize accepted generation text into a bounded list
//
// Splitting rule (stable, documented): the raw text splits on newlines.
// Each line is stripped of markdown list prefixes and inline markdown
// decoration, whitespace-collapsed, deduplicated, then the list is cut to
// max_parts and every entry to max_part_length CHARACTERS (code points,
// not bytes - answers are routinely multi-byte script text). Never errors,
// and cleaning an already-clean answer with the same limits is a no-op.

use regex::Regex;

use loglens_core::{CleanedAnswer, ShapeLimits};

pub struct OutputCleaner {
    limits: ShapeLimits,
    bullet: Regex,
    ordered: Regex,
    bold: Regex,
    underline: Regex,
    strike: Regex,
    inline_code: Regex,
    image: Regex,
    link: Regex,
    spaces: Regex,
    numbering_only: Regex,
}

impl OutputCleaner {
    pub fn new(limits: ShapeLimits) -> Self {
        Self {
            limits,
            bullet: Regex::new(r"^\s*([\-\*•·]\s*)+").unwrap(),
            ordered: Regex::new(r"^\s*\d+[\.、)]\s+").unwrap(),
            bold: Regex::new(r"\*\*(.+?)\*\*").unwrap(),
            underline: Regex::new(r"__(.+?)__").unwrap(),
            strike: Regex::new(r"~~(.+?)~~").unwrap(),
            inline_code: Regex::new(r"`([^`]*)`").unwrap(),
            image: Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap(),
            link: Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap(),
            spaces: Regex::new(r"\s+").unwrap(),
            numbering_only: Regex::new(r"^\d+[\.、)]?$").unwrap(),
        }
    }

    pub fn limits(&self) -> ShapeLimits {
        self.limits
    }

    /// Always returns a valid bounded answer, whatever the input looks like.
    pub fn clean(&self, raw: &str) -> CleanedAnswer {
        let mut parts: Vec<String> = Vec::new();

        for line in raw.lines() {
            if parts.len() >= self.limits.max_parts {
                break; // drop trailing excess, keep order
            }

            let mut s = line.trim().to_string();
            if s.is_empty() {
                continue;
            }

            // list markers, possibly doubled up ("1. 1. foo")
            s = self.bullet.replace(&s, "").into_owned();
            s = self.ordered.replace(&s, "").into_owned();
            s = self.ordered.replace(&s, "").into_owned();

            // inline markdown decoration
            s = self.bold.replace_all(&s, "$1").into_owned();
            s = self.underline.replace_all(&s, "$1").into_owned();
            s = self.strike.replace_all(&s, "$1").into_owned();
            s = self.inline_code.replace_all(&s, "$1").into_owned();
            s = self.image.replace_all(&s, "$1").into_owned();
            s = self.link.replace_all(&s, "$1").into_owned();

            // horizontal rules and squeezed whitespace
            s = s.replace("---", " ");
            s = self.spaces.replace_all(s.trim(), " ").into_owned();

            // character-counted truncation, never byte-indexed
            if s.chars().count() > self.limits.max_part_length {
                s = s.chars().take(self.limits.max_part_length).collect();
                s = s.trim_end().to_string();
            }

            if s.is_empty() || self.numbering_only.is_match(&s) {
                continue;
            }
            if parts.contains(&s) {
                continue; // first occurrence wins
            }
            parts.push(s);
        }

        CleanedAnswer { parts }
    }
}
