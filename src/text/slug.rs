//! Cyrillic-aware slug generation.

use uuid::Uuid;

fn transliterate(ch: char) -> Option<&'static str> {
    Some(match ch {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'ґ' => "g",
        'д' => "d",
        'е' => "e",
        'є' => "ye",
        'ж' => "zh",
        'з' => "z",
        'и' => "y",
        'і' => "i",
        'ї' => "yi",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ь' => "",
        'ю' => "yu",
        'я' => "ya",
        'э' => "e",
        'ы' => "y",
        'ъ' => "",
        'ё' => "yo",
        _ => return None,
    })
}

/// Slugify `text` into at most `max_len` ASCII characters.
///
/// Cyrillic is transliterated, other non-ASCII characters and punctuation are dropped,
/// and runs of whitespace or hyphens become a single hyphen. The result may be empty.
pub fn safe_slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    let mut push = |c: char, slug: &mut String| {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    };

    for ch in text.to_lowercase().chars() {
        match transliterate(ch) {
            Some(latin) => latin.chars().for_each(|c| push(c, &mut slug)),
            None => push(ch, &mut slug),
        }
    }

    slug.truncate(max_len);
    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Like [`safe_slugify`], but an empty result becomes `item-<uuid8>`.
pub fn slug_or_fallback(text: &str, max_len: usize) -> String {
    let slug = safe_slugify(text, max_len);
    if slug.is_empty() {
        with_unique_suffix("item", max_len)
    } else {
        slug
    }
}

/// Append an 8 character random suffix, shortening `base` so the result fits `max_len`.
pub fn with_unique_suffix(base: &str, max_len: usize) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_string();
    let keep = max_len.saturating_sub(suffix.len() + 1);
    let mut head = base.to_string();
    head.truncate(keep);
    let head = head.trim_end_matches(|c| c == '-' || c == '_');

    if head.is_empty() {
        suffix[..suffix.len().min(max_len)].to_string()
    } else {
        format!("{}-{}", head, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transliterates_ukrainian() {
        assert_eq!(safe_slugify("Політика", 50), "polityka");
        assert_eq!(safe_slugify("Збройні сили України", 50), "zbroyni-syly-ukrayiny");
        assert_eq!(safe_slugify("Інтерв'ю", 50), "intervyu");
    }

    #[test]
    fn matches_latin_slug_rules() {
        assert_eq!(safe_slugify("Hello World", 50), "hello-world");
        assert_eq!(safe_slugify("Test - Article!", 50), "test-article");
        assert_eq!(safe_slugify("  --Trump-Xi 'situationship'-- ", 50), "trump-xi-situationship");
    }

    #[test]
    fn is_deterministic_and_bounded() {
        let title = "Дуже довгий заголовок новини про події в Україні та світі ".repeat(10);
        let first = safe_slugify(&title, 50);
        assert_eq!(first, safe_slugify(&title, 50));
        assert!(first.len() <= 50);
        assert!(!first.ends_with('-'));
    }

    #[test]
    fn same_label_variants_share_a_slug() {
        assert_eq!(safe_slugify("Політика ", 50), safe_slugify("політика", 50));
    }

    #[test]
    fn empty_results_fall_back_to_a_suffix() {
        assert_eq!(safe_slugify("!!! ???", 50), "");
        let fallback = slug_or_fallback("!!! ???", 50);
        assert!(fallback.starts_with("item-"));
        assert_eq!(fallback.len(), 13);
    }

    #[test]
    fn suffix_keeps_within_capacity() {
        let base = "a".repeat(50);
        let slug = with_unique_suffix(&base, 50);
        assert_eq!(slug.len(), 50);
        assert!(slug.starts_with(&"a".repeat(41)));
        assert_ne!(with_unique_suffix("news", 50), with_unique_suffix("news", 50));
    }
}
