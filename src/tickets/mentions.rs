use once_cell::sync::Lazy;
use regex::Regex;

// `@name`, `@first.last` or `@user@example.com`, not preceded by a word character
static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\w@])@([\w.+-]+(?:@[\w-]+(?:\.[\w-]+)*)?)").expect("Invalid mention regex")
});

const TRAILING: &[char] = &['.', '-', '+', '_'];

/// Lowercased mention handles in order of first appearance.
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut mentions: Vec<String> = Vec::new();
    for caps in MENTION_RE.captures_iter(text) {
        let Some(handle) = caps.get(1) else { continue };
        let handle = handle.as_str().trim_end_matches(TRAILING).to_lowercase();
        if handle.is_empty() || mentions.contains(&handle) {
            continue;
        }
        mentions.push(handle);
    }
    mentions
}
