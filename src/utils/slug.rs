/// Lowercase `text` and squeeze every run of characters outside `[a-z0-9]`
/// into a single `-`, trimming dashes at both ends.
///
/// ```rust,no_run
/// use quire::utils::slugify;
///
/// assert_eq!(slugify("The Hacker's Guide, Vol. 2"), "the-hacker-s-guide-vol-2");
/// ```
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}
