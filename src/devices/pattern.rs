// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Widest field a placeholder may ask for; a u64 needs at most 20 digits.
pub const MAX_PATTERN_WIDTH: usize = 32;

/// A filename template with a single printf-style integer placeholder.
///
/// Accepted placeholders are `%d`, `%Nd` and `%0Nd`; `%%` is a literal
/// percent sign. A name matches when it renders back to itself, so
/// `frame-%03d.png` accepts `frame-007.png` and `frame-1234.png` but not
/// `frame-7.png` or `frame-0007.png`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePattern {
    source: String,
    prefix: String,
    suffix: String,
    width: usize,
    zero_pad: bool,
}

impl FilenamePattern {
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut placeholder: Option<(usize, bool)> = None;
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            let target = if placeholder.is_some() {
                &mut suffix
            } else {
                &mut prefix
            };
            if c != '%' {
                target.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                target.push('%');
                continue;
            }
            if placeholder.is_some() {
                return Err("only one placeholder is allowed".to_string());
            }

            let zero_pad = chars.peek() == Some(&'0');
            if zero_pad {
                chars.next();
            }
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            match chars.next() {
                Some('d') => {}
                Some(other) => return Err(format!("unsupported conversion '%{}'", other)),
                None => return Err("dangling '%' at end of pattern".to_string()),
            }
            let width = if digits.is_empty() {
                0
            } else {
                digits
                    .parse()
                    .map_err(|_| format!("width '{}' is out of range", digits))?
            };
            if width > MAX_PATTERN_WIDTH {
                return Err(format!(
                    "width {} exceeds the maximum of {}",
                    width, MAX_PATTERN_WIDTH
                ));
            }
            placeholder = Some((width, zero_pad));
        }

        let (width, zero_pad) = placeholder.ok_or_else(|| "missing '%d' placeholder".to_string())?;
        if prefix.contains('/') || suffix.contains('/') {
            return Err("pattern must not contain '/'".to_string());
        }
        Ok(Self {
            source: source.to_string(),
            prefix,
            suffix,
            width,
            zero_pad,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render the name for `index`.
    pub fn render(&self, index: u64) -> String {
        let number = if self.zero_pad {
            format!("{:0width$}", index, width = self.width)
        } else {
            format!("{:width$}", index, width = self.width)
        };
        format!("{}{}{}", self.prefix, number, self.suffix)
    }

    /// The index a name was generated from, or `None` if it does not fit.
    pub fn index_of(&self, name: &str) -> Option<u64> {
        let middle = name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        let index: u64 = middle.trim_start_matches(' ').parse().ok()?;
        (self.render(index) == name).then_some(index)
    }
}

impl fmt::Display for FilenamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_padded_pattern_renders_and_matches() {
        let pattern = FilenamePattern::parse("%03d.bin").unwrap();
        assert_eq!(pattern.render(0), "000.bin");
        assert_eq!(pattern.render(1234), "1234.bin");
        assert_eq!(pattern.index_of("002.bin"), Some(2));
        assert_eq!(pattern.index_of("1234.bin"), Some(1234));
        assert_eq!(pattern.index_of("2.bin"), None);
        assert_eq!(pattern.index_of("0002.bin"), None);
        assert_eq!(pattern.index_of("abc.bin"), None);
    }

    #[test]
    fn plain_placeholder_rejects_leading_zeros() {
        let pattern = FilenamePattern::parse("frame-%d.png").unwrap();
        assert_eq!(pattern.index_of("frame-7.png"), Some(7));
        assert_eq!(pattern.index_of("frame-07.png"), None);
        assert_eq!(pattern.index_of("frame-7.jpg"), None);
    }

    #[test]
    fn literal_percent_is_preserved() {
        let pattern = FilenamePattern::parse("100%%-%d").unwrap();
        assert_eq!(pattern.render(3), "100%-3");
        assert_eq!(pattern.index_of("100%-3"), Some(3));
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        assert!(FilenamePattern::parse("out.bin").is_err());
        assert!(FilenamePattern::parse("%d-%d").is_err());
        assert!(FilenamePattern::parse("%s.bin").is_err());
        assert!(FilenamePattern::parse("out%").is_err());
        assert!(FilenamePattern::parse("sub/%d").is_err());
    }

    #[test]
    fn placeholder_width_is_bounded() {
        let widest = format!("%0{}d", MAX_PATTERN_WIDTH);
        let pattern = FilenamePattern::parse(&widest).unwrap();
        assert_eq!(pattern.render(7).len(), MAX_PATTERN_WIDTH);

        assert!(FilenamePattern::parse("%33d").is_err());
        assert!(FilenamePattern::parse("%1000000000d.bin").is_err());
        assert!(FilenamePattern::parse("%99999999999999999999999d").is_err());
    }
}
