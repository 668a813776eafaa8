//! Display-name helpers for hyphenated identifiers.

/// Turn a hyphenated identifier into a display name.
///
/// `pollo-asado` becomes `Pollo Asado`. Applying it to its own output
/// returns the same string.
pub fn format_dish_name(name: &str) -> String {
    name.split('-')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Derive a stable id from a human name: lowercased, whitespace runs become `-`
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_dish_name() {
        assert_eq!(format_dish_name("pollo-asado"), "Pollo Asado");
        assert_eq!(format_dish_name("tacos"), "Tacos");
        assert_eq!(format_dish_name(""), "");
    }

    #[test]
    fn test_format_dish_name_is_idempotent() {
        for input in ["pollo-asado", "chiles-en-nogada", "Mole", "ñoquis-de-papa"] {
            let once = format_dish_name(input);
            assert_eq!(format_dish_name(&once), once);
        }
    }

    #[test]
    fn test_format_dish_name_keeps_rest_of_word() {
        assert_eq!(format_dish_name("bbq-RIBS"), "Bbq RIBS");
        assert_eq!(format_dish_name("ñoquis"), "Ñoquis");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Pollo Asado"), "pollo-asado");
        assert_eq!(slugify("  Chiles   en Nogada "), "chiles-en-nogada");
        assert_eq!(slugify("Mexicana"), "mexicana");
        assert_eq!(slugify(""), "");
    }
}
