//! SQL Validator (C2) — a pure, stateless defense-in-depth check over
//! generated SQL before it ever reaches the warehouse connection.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::rag::ValidationResult;

const FORBIDDEN_WORD_TOKENS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "REPLACE", "CREATE", "ALTER", "DROP", "TRUNCATE",
    "RENAME", "EXEC", "EXECUTE", "CALL", "UNION", "INTO", "OUTFILE", "DUMPFILE", "IF", "CASE",
    "WHILE", "LOOP", "LOAD_FILE", "PG_READ_FILE", "PG_LS_DIR",
];

const FORBIDDEN_PUNCT_TOKENS: &[&str] = &["--", "/*", "*/", "#"];

const TABLE_WHITELIST: &[&str] =
    &["monthly_kpis", "metricas_cartera_segmentada", "metricas_financieras_ext"];

const MAX_LIMIT: u32 = 1000;

static WORD_BOUNDARY_CACHE: Lazy<Vec<(String, Regex)>> = Lazy::new(|| {
    FORBIDDEN_WORD_TOKENS
        .iter()
        .map(|t| {
            let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(t))).expect("valid regex");
            (t.to_string(), re)
        })
        .collect()
});

static FROM_JOIN_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([a-zA-Z_][a-zA-Z0-9_]*)").unwrap());

static SUSPICIOUS_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("stacked statement", Regex::new(r";\s*\S").unwrap()),
        ("boolean tautology injection", Regex::new(r"(?i)\bOR\s+1\s*=\s*1\b").unwrap()),
        ("string-or injection", Regex::new(r"(?i)'\s*OR\s*'").unwrap()),
        ("UNION SELECT", Regex::new(r"(?i)\bUNION\s+SELECT\b").unwrap()),
        ("EXEC call", Regex::new(r"(?i)\bEXEC\s*\(").unwrap()),
        ("escaped-quote injection", Regex::new(r#"\\['\"]"#).unwrap()),
    ]
});

static AGGREGATION_SCAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bGROUP\s+BY\b|\b(?:COUNT|SUM|AVG|MAX|MIN)\s*\(").unwrap());

static LIMIT_SCAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bLIMIT\s+\d+").unwrap());

/// Runs every layer in order; the first failing layer determines the
/// rejection reason. Never emits partial SQL on failure.
pub fn validate(sql: &str) -> ValidationResult {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return reject("SQL statement is empty");
    }

    if let Some(token) = forbidden_token_hit(trimmed) {
        return reject(&format!("forbidden token detected: {}", token));
    }

    if !trimmed.to_uppercase().starts_with("SELECT") {
        return reject("statement must start with SELECT");
    }

    if let Some(bad_table) = unwhitelisted_table(trimmed) {
        return reject(&format!("table not in whitelist: {}", bad_table));
    }

    if let Some((name, _)) = SUSPICIOUS_PATTERNS.iter().find(|(_, re)| re.is_match(trimmed)) {
        return reject(&format!("suspicious pattern detected: {}", name));
    }

    let mut warnings = Vec::new();
    let mut sanitized = trimmed.to_string();
    if !LIMIT_SCAN.is_match(trimmed) && !AGGREGATION_SCAN.is_match(trimmed) {
        sanitized = format!("{} LIMIT {}", sanitized.trim_end_matches(';'), MAX_LIMIT);
        warnings.push(format!("no LIMIT or aggregation present; appended LIMIT {}", MAX_LIMIT));
    }

    ValidationResult { valid: true, error_message: None, sanitized_sql: Some(sanitized), warnings }
}

fn forbidden_token_hit(sql: &str) -> Option<String> {
    for (token, re) in WORD_BOUNDARY_CACHE.iter() {
        if re.is_match(sql) {
            return Some(token.clone());
        }
    }
    for token in FORBIDDEN_PUNCT_TOKENS {
        if sql.contains(token) {
            return Some(token.to_string());
        }
    }
    None
}

fn unwhitelisted_table(sql: &str) -> Option<String> {
    FROM_JOIN_IDENTIFIER.captures_iter(sql).find_map(|cap| {
        let ident = cap.get(1)?.as_str();
        if TABLE_WHITELIST.iter().any(|t| t.eq_ignore_ascii_case(ident)) {
            None
        } else {
            Some(ident.to_string())
        }
    })
}

fn reject(reason: &str) -> ValidationResult {
    ValidationResult {
        valid: false,
        error_message: Some(reason.to_string()),
        sanitized_sql: None,
        warnings: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_clean_select_and_appends_limit() {
        let result = validate("SELECT banco, fecha, imor FROM monthly_kpis WHERE banco = 'INVEX'");
        assert!(result.valid);
        assert!(result.sanitized_sql.unwrap().contains("LIMIT 1000"));
    }

    #[test]
    fn rejects_drop_table_injection() {
        let result = validate("SELECT * FROM monthly_kpis; DROP TABLE monthly_kpis");
        assert!(!result.valid);
        assert!(result.error_message.unwrap().to_uppercase().contains("DROP"));
    }

    #[test]
    fn rejects_non_select_statement() {
        let result = validate("UPDATE monthly_kpis SET imor = 0");
        assert!(!result.valid);
    }

    #[test]
    fn rejects_table_outside_whitelist() {
        let result = validate("SELECT * FROM users");
        assert!(!result.valid);
    }

    #[test]
    fn does_not_append_limit_when_aggregation_present() {
        let result = validate("SELECT banco, AVG(imor) FROM monthly_kpis GROUP BY banco");
        assert!(result.valid);
        assert!(!result.sanitized_sql.unwrap().contains("LIMIT"));
    }

    #[test]
    fn rejects_union_select() {
        let result =
            validate("SELECT banco FROM monthly_kpis UNION SELECT password FROM monthly_kpis");
        assert!(!result.valid);
    }
}
