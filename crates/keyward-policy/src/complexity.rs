//! Character category counting.

use std::sync::LazyLock;

use regex::Regex;

/// Lowercase Latin, uppercase Latin, digits, and anything that is neither
/// of those nor whitespace.
static CATEGORIES: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [r"[a-z]", r"[A-Z]", r"[0-9]", r"[^a-zA-Z0-9\s]"]
        .map(|p| Regex::new(p).expect("category pattern is a valid regex"))
});

/// Number of categories (0 to 4) present in `input`.
pub fn count_character_categories(input: &str) -> usize {
    CATEGORIES.iter().filter(|re| re.is_match(input)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_each_category_once() {
        assert_eq!(count_character_categories(""), 0);
        assert_eq!(count_character_categories("abc"), 1);
        assert_eq!(count_character_categories("abc123"), 2);
        assert_eq!(count_character_categories("aB3"), 3);
        assert_eq!(count_character_categories("aB3!"), 4);
    }

    #[test]
    fn whitespace_is_not_a_symbol() {
        assert_eq!(count_character_categories("a b\tc"), 1);
    }

    #[test]
    fn non_latin_letters_count_as_symbols() {
        assert_eq!(count_character_categories("abcé"), 2);
    }
}
