// parity-core/src/domain/compiler/quoter.rs

/// Builds SQL fragments from rule parameters. Identifiers are always
/// double-quoted and literals single-quoted, so configured names can never
/// change the shape of a generated query.
pub struct SqlQuoter;

impl SqlQuoter {
    /// `schema.table` -> `"schema"."table"`. Embedded quotes are doubled.
    pub fn ident(name: &str) -> String {
        name.split('.')
            .map(|part| format!("\"{}\"", part.trim().replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn idents(names: &[String]) -> String {
        names
            .iter()
            .map(|n| Self::ident(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_qualified() {
        assert_eq!(SqlQuoter::ident("main.orders"), "\"main\".\"orders\"");
        assert_eq!(SqlQuoter::ident("amount"), "\"amount\"");
    }

    #[test]
    fn test_ident_escapes_quotes() {
        assert_eq!(SqlQuoter::ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_idents_list() {
        let cols = vec!["a".to_string(), "b".to_string()];
        assert_eq!(SqlQuoter::idents(&cols), "\"a\", \"b\"");
    }

    #[test]
    fn test_literal_escapes_single_quotes() {
        assert_eq!(SqlQuoter::literal("O'Brien"), "'O''Brien'");
    }
}
