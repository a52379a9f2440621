use heck::ToSnakeCase;

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

pub(crate) fn default_alias(type_name: &str) -> String {
    short_type_name(type_name).to_snake_case()
}

pub(crate) fn default_table(type_name: &str) -> String {
    pluralize(&default_alias(type_name))
}

/// Plural of the last `_`-separated word, so `blog_person` becomes `blog_people`.
pub(crate) fn pluralize(word: &str) -> String {
    match word.rsplit_once('_') {
        Some((head, last)) => format!("{head}_{}", pluralizer::pluralize(last, 2, false)),
        None => pluralizer::pluralize(word, 2, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_names_from_type_paths() {
        assert_eq!(short_type_name("app::models::BlogPost"), "BlogPost");
        assert_eq!(short_type_name("app::Wrapper<app::Inner>"), "Wrapper");
        assert_eq!(default_table("app::models::BlogPost"), "blog_posts");
        assert_eq!(default_alias("app::models::BlogPost"), "blog_post");
    }

    #[test]
    fn pluralizes_irregular_nouns() {
        assert_eq!(pluralize("person"), "people");
        assert_eq!(pluralize("child"), "children");
        assert_eq!(pluralize("blog_person"), "blog_people");
        assert_eq!(default_table("app::Person"), "people");
        assert_eq!(default_alias("app::Person"), "person");
    }

    #[test]
    fn pluralizes_common_endings() {
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("key"), "keys");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("status"), "statuses");
        assert_eq!(pluralize("branch"), "branches");
        assert_eq!(pluralize("user"), "users");
    }
}
