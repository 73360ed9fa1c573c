/// Comparable key for listing text and requested titles: lowercase, no whitespace.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|character| !character.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
