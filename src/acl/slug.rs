/// Lowercases, turns every run of non-alphanumeric characters into one hyphen and trims hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// `base`, `base-1`, `base-2`, ...
pub fn candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string()).chain((1u32..).map(move |n| format!("{base}-{n}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Admin Team"), "admin-team");
        assert_eq!(slugify("  Admin -- Team!! "), "admin-team");
        assert_eq!(slugify("Super_Admin"), "super-admin");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn candidates_pad_with_counter() {
        let first: Vec<String> = candidates("admin-team").take(3).collect();
        assert_eq!(first, vec!["admin-team", "admin-team-1", "admin-team-2"]);
    }
}
