//! 通用工具函数

use chrono::Utc;
use uuid::Uuid;

/// 生成唯一的标本登记号
///
/// 格式: LAB + 日期(yyyymmdd) + 10位随机段。
pub fn generate_accession_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("LAB{}{}", date, &suffix[..10].to_uppercase())
}

/// 验证标本登记号格式
pub fn is_valid_accession_number(accession: &str) -> bool {
    accession.len() == 21
        && accession.starts_with("LAB")
        && accession[3..].chars().all(|c| c.is_ascii_alphanumeric())
}

/// 验证检验项目代码格式
///
/// 项目代码为大写字母、数字、连字符组成的非空短串。
pub fn is_valid_test_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 32
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
}

/// 去重检验项目代码列表，保留首次出现的顺序
pub fn dedup_test_codes(codes: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    codes
        .iter()
        .filter(|c| seen.insert(c.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_accession_number() {
        let accession = generate_accession_number();
        assert!(is_valid_accession_number(&accession), "{}", accession);
    }

    #[test]
    fn test_accession_numbers_are_unique() {
        let a = generate_accession_number();
        let b = generate_accession_number();
        assert_ne!(a, b);
    }

    #[test]
    fn test_is_valid_accession_number() {
        assert!(is_valid_accession_number("LAB20260801ABCDEF0123"));
        assert!(!is_valid_accession_number(""));
        assert!(!is_valid_accession_number("ORD20260801ABCDEF0123"));
        assert!(!is_valid_accession_number("LAB2026"));
    }

    #[test]
    fn test_is_valid_test_code() {
        assert!(is_valid_test_code("CBC-WBC"));
        assert!(is_valid_test_code("GLU"));
        assert!(!is_valid_test_code(""));
        assert!(!is_valid_test_code("glu"));
        assert!(!is_valid_test_code("GLU 01"));
    }

    #[test]
    fn test_dedup_test_codes_preserves_first_occurrence() {
        let codes = vec![
            "GLU".to_string(),
            "CBC-WBC".to_string(),
            "GLU".to_string(),
            "K".to_string(),
        ];
        assert_eq!(dedup_test_codes(&codes), vec!["GLU", "CBC-WBC", "K"]);
    }
}
