use regex::Regex;
use std::sync::OnceLock;

fn break_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"(?i)<\s*/?\s*(br|p|div|li|ul|ol|tr|td|th|table|h[1-6])\b[^>]*>").expect("regex")
  })
}

fn markup_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("regex"))
}

/// Strips markup tags, a handful of common entities and line breaks from
/// vendor display text, collapsing whitespace runs. Inline tags vanish without
/// a trace; line breaks and block-level tags separate words.
pub fn strip_markup(input: &str) -> String {
  let spaced = break_re().replace_all(input, " ");
  let no_tags = markup_re().replace_all(&spaced, "");
  no_tags
    .replace("&nbsp;", " ")
    .replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&quot;", "\"")
    .replace("&#39;", "'")
    .replace("&amp;", "&")
    .replace(['\n', '\r'], " ")
    .split_whitespace()
    .collect::<Vec<&str>>()
    .join(" ")
}

/// Orders vendor ids numerically where possible; non-numeric ids sort after
/// numeric ones, lexically.
pub fn compare_ids(a: &str, b: &str) -> std::cmp::Ordering {
  match (a.parse::<u64>(), b.parse::<u64>()) {
    (Ok(x), Ok(y)) => x.cmp(&y),
    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
    (Err(_), Err(_)) => a.cmp(b),
  }
}
