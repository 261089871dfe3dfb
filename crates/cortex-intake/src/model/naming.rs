//! Naming helpers for agent identifiers.

/// Convert a display name into a filesystem-safe identifier.
pub fn safe_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Fully qualified `<database>.<schema>.<name>` agent identifier.
pub fn qualified_name(database: &str, schema: &str, name: &str) -> String {
    format!("{database}.{schema}.{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_name_lowercases_and_replaces_separators() {
        assert_eq!(safe_name("INS_CO.Loss Claims.agent-1"), "ins_co_loss_claims_agent_1");
        assert_eq!(safe_name("--x--"), "x");
    }

    #[test]
    fn qualified_name_joins_with_dots() {
        assert_eq!(qualified_name("db", "sc", "a"), "db.sc.a");
    }
}
