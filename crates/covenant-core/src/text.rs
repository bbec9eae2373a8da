//! Document text handling: HTML to visible text, word counts, truncation.

use std::fmt;
use std::str::FromStr;

use scraper::{Html, Node};
use serde::{Deserialize, Serialize};

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Convert an HTML document into its visible text.
///
/// Parses the document, drops `script`, `style`, `noscript` and `template`
/// subtrees and comments, joins the remaining text nodes with spaces, and
/// collapses whitespace (including decoded `&nbsp;`) to single spaces.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            parts.push(text);
        }
    }
    parts
        .iter()
        .flat_map(|p| p.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Number of whitespace-separated words in `text`.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// ── Truncation ──

/// Unit in which a truncation budget is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    /// Keep the first N whitespace-separated words, re-joined with single spaces.
    Words,
    /// Keep the first N Unicode scalar values.
    Chars,
}

impl fmt::Display for TruncationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Words => "words",
            Self::Chars => "chars",
        })
    }
}

impl FromStr for TruncationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "words" | "word" => Ok(Self::Words),
            "chars" | "char" | "characters" => Ok(Self::Chars),
            other => Err(format!("unknown truncation strategy {other:?} (expected words|chars)")),
        }
    }
}

/// A leading-window truncation policy: strategy plus budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    pub strategy: TruncationStrategy,
    pub budget: usize,
}

/// Output of [`Truncation::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub text: String,
    /// Size of the full input in the strategy's unit.
    pub total: usize,
    pub truncated: bool,
}

impl Truncation {
    pub fn words(budget: usize) -> Self {
        Self {
            strategy: TruncationStrategy::Words,
            budget,
        }
    }

    pub fn chars(budget: usize) -> Self {
        Self {
            strategy: TruncationStrategy::Chars,
            budget,
        }
    }

    /// Keep the leading `budget` units of `text`.
    pub fn apply(&self, text: &str) -> Truncated {
        match self.strategy {
            TruncationStrategy::Words => {
                let words: Vec<&str> = text.split_whitespace().collect();
                let total = words.len();
                let kept = total.min(self.budget);
                Truncated {
                    text: words[..kept].join(" "),
                    total,
                    truncated: total > self.budget,
                }
            }
            TruncationStrategy::Chars => {
                let total = text.chars().count();
                let head = match text.char_indices().nth(self.budget) {
                    Some((idx, _)) => &text[..idx],
                    None => text,
                };
                Truncated {
                    text: head.to_string(),
                    total,
                    truncated: total > self.budget,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_scripts_and_styles() {
        let html = "<html><head><style>.x{color:red}</style><script>var a = 1;</script></head>\
                    <body><p>ISDA <b>Master</b> Agreement</p><!-- hidden --></body></html>";
        assert_eq!(html_to_text(html), "ISDA Master Agreement");
    }

    #[test]
    fn decodes_entities_and_collapses_whitespace() {
        let html = "<body>&nbsp;Smith &amp; Jones&#44;\n\n  Inc. &#x2014; &lt;Party&gt; &bogus;</body>";
        assert_eq!(html_to_text(html), "Smith & Jones, Inc. \u{2014} <Party> &bogus;");
    }

    #[test]
    fn decodes_named_entities_beyond_basics() {
        let html = "<p>Soci&eacute;t&eacute; G&eacute;n&eacute;rale &mdash; Master</p>";
        assert_eq!(html_to_text(html), "Soci\u{e9}t\u{e9} G\u{e9}n\u{e9}rale \u{2014} Master");
    }

    #[test]
    fn quoted_angle_bracket_in_attribute_stays_in_tag() {
        let html = r#"<table><tr><td title="a > b">ISDA</td></tr></table>"#;
        assert_eq!(html_to_text(html), "ISDA");
    }

    #[test]
    fn multiline_script_removed() {
        let html = "<SCRIPT type=\"text/javascript\">\nif (a < b) {\n  x();\n}\n</SCRIPT>Body";
        assert_eq!(html_to_text(html), "Body");
    }

    #[test]
    fn empty_document() {
        assert_eq!(html_to_text(""), "");
        assert_eq!(html_to_text("<html><body></body></html>"), "");
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn word_count_counts_words() {
        assert_eq!(word_count(" a\n b \t c "), 3);
    }

    #[test]
    fn words_truncates_to_exact_budget() {
        let text = (1..=1000).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let out = Truncation::words(900).apply(&text);
        assert_eq!(word_count(&out.text), 900);
        assert_eq!(out.total, 1000);
        assert!(out.truncated);
        assert!(out.text.starts_with("w1 w2 w3"));
        assert!(out.text.ends_with("w900"));
    }

    #[test]
    fn words_under_budget_is_unchanged() {
        let out = Truncation::words(10).apply("one  two\nthree");
        assert_eq!(out.text, "one two three");
        assert_eq!(out.total, 3);
        assert!(!out.truncated);
    }

    #[test]
    fn chars_truncates_on_char_boundary() {
        let out = Truncation::chars(4).apply("Zürich AG");
        assert_eq!(out.text, "Züri");
        assert_eq!(out.text.chars().count(), 4);
        assert_eq!(out.total, 9);
        assert!(out.truncated);
    }

    #[test]
    fn strategy_parses_and_displays() {
        assert_eq!("words".parse::<TruncationStrategy>(), Ok(TruncationStrategy::Words));
        assert_eq!("CHARS".parse::<TruncationStrategy>(), Ok(TruncationStrategy::Chars));
        assert!("tokens".parse::<TruncationStrategy>().is_err());
        assert_eq!(TruncationStrategy::Chars.to_string(), "chars");
    }
}
