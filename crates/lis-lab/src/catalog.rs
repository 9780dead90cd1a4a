//! 检验项目目录
//!
//! 维护检验项目定义与参考范围，并提供危急值判定。
//! 目录条目只追加版本，旧版本归档后仍可按版本号查询，
//! 保证历史结果的判读依据不被覆盖。

use lis_core::{CatalogEntry, LisError, ReferenceRange, Result, ResultValue};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Default)]
struct CatalogInner {
    entries: HashMap<String, CatalogEntry>,
    // (code, version) -> 归档条目
    archive: HashMap<(String, u32), CatalogEntry>,
}

/// 检验项目目录
#[derive(Debug, Default)]
pub struct TestCatalog {
    inner: RwLock<CatalogInner>,
}

impl TestCatalog {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或更新项目条目
    ///
    /// 已存在的代码: 旧条目归档，新条目版本号在旧版本上递增；
    /// 新代码: 版本号从 1 开始。返回实际存储的条目。
    pub async fn upsert(&self, entry: CatalogEntry) -> Result<CatalogEntry> {
        if entry.code.is_empty() {
            return Err(LisError::Validation("项目代码不能为空".to_string()));
        }

        let mut inner = self.inner.write().await;
        let version = match inner.entries.get(&entry.code).cloned() {
            Some(old) => {
                let next = old.version + 1;
                inner.archive.insert((old.code.clone(), old.version), old);
                next
            }
            None => 1,
        };

        let stored = CatalogEntry { version, ..entry };
        inner.entries.insert(stored.code.clone(), stored.clone());

        info!(code = %stored.code, version = stored.version, "目录条目已更新");
        Ok(stored)
    }

    /// 获取项目的当前版本条目
    pub async fn get(&self, code: &str) -> Option<CatalogEntry> {
        self.inner.read().await.entries.get(code).cloned()
    }

    /// 按版本号获取条目，含归档版本
    pub async fn get_version(&self, code: &str, version: u32) -> Option<CatalogEntry> {
        let inner = self.inner.read().await;
        match inner.entries.get(code) {
            Some(entry) if entry.version == version => Some(entry.clone()),
            _ => inner.archive.get(&(code.to_string(), version)).cloned(),
        }
    }

    /// 列出全部当前条目，按代码排序
    pub async fn list(&self) -> Vec<CatalogEntry> {
        let inner = self.inner.read().await;
        let mut entries: Vec<CatalogEntry> = inner.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.code.cmp(&b.code));
        entries
    }

    /// 检查项目代码是否存在
    pub async fn contains(&self, code: &str) -> bool {
        self.inner.read().await.entries.contains_key(code)
    }

    /// 批量载入种子条目
    pub async fn seed(&self, entries: Vec<CatalogEntry>) -> Result<usize> {
        let count = entries.len();
        for entry in entries {
            self.upsert(entry).await?;
        }
        Ok(count)
    }
}

/// 危急值判定
///
/// 数值型: 值落在 [low, high] 之外即为危急；
/// 定性型: 值不在枚举集合内即为危急。
/// 值类型与参考范围类型不匹配是验证错误。
pub fn evaluate(entry: &CatalogEntry, value: &ResultValue) -> Result<bool> {
    match (&entry.reference_range, value) {
        (ReferenceRange::Numeric { low, high }, ResultValue::Numeric(v)) => {
            Ok(*v < *low || *v > *high)
        }
        (ReferenceRange::Qualitative { allowed }, ResultValue::Qualitative(s)) => {
            Ok(!allowed.iter().any(|a| a == s))
        }
        (ReferenceRange::Numeric { .. }, ResultValue::Qualitative(s)) => {
            Err(LisError::Validation(format!(
                "项目 {} 为数值型，不接受定性结果 '{}'",
                entry.code, s
            )))
        }
        (ReferenceRange::Qualitative { .. }, ResultValue::Numeric(v)) => {
            Err(LisError::Validation(format!(
                "项目 {} 为定性型，不接受数值结果 {}",
                entry.code, v
            )))
        }
    }
}

/// 从 JSON 文本解析目录条目列表
pub fn entries_from_json(json: &str) -> Result<Vec<CatalogEntry>> {
    Ok(serde_json::from_str(json)?)
}

/// 内置种子条目，覆盖常见血液学与生化项目
pub fn default_entries() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry {
            code: "CBC-WBC".to_string(),
            name: "白细胞计数".to_string(),
            category: "hematology".to_string(),
            unit: "10^9/L".to_string(),
            reference_range: ReferenceRange::Numeric { low: 3.5, high: 9.5 },
            version: 1,
        },
        CatalogEntry {
            code: "CBC-HGB".to_string(),
            name: "血红蛋白".to_string(),
            category: "hematology".to_string(),
            unit: "g/L".to_string(),
            reference_range: ReferenceRange::Numeric { low: 115.0, high: 175.0 },
            version: 1,
        },
        CatalogEntry {
            code: "CBC-PLT".to_string(),
            name: "血小板计数".to_string(),
            category: "hematology".to_string(),
            unit: "10^9/L".to_string(),
            reference_range: ReferenceRange::Numeric { low: 125.0, high: 350.0 },
            version: 1,
        },
        CatalogEntry {
            code: "BMP-GLU".to_string(),
            name: "血糖".to_string(),
            category: "chemistry".to_string(),
            unit: "mmol/L".to_string(),
            reference_range: ReferenceRange::Numeric { low: 3.9, high: 6.1 },
            version: 1,
        },
        CatalogEntry {
            code: "BMP-K".to_string(),
            name: "血钾".to_string(),
            category: "chemistry".to_string(),
            unit: "mmol/L".to_string(),
            reference_range: ReferenceRange::Numeric { low: 3.5, high: 5.3 },
            version: 1,
        },
        CatalogEntry {
            code: "BMP-NA".to_string(),
            name: "血钠".to_string(),
            category: "chemistry".to_string(),
            unit: "mmol/L".to_string(),
            reference_range: ReferenceRange::Numeric { low: 137.0, high: 147.0 },
            version: 1,
        },
        CatalogEntry {
            code: "BMP-CRE".to_string(),
            name: "肌酐".to_string(),
            category: "chemistry".to_string(),
            unit: "umol/L".to_string(),
            reference_range: ReferenceRange::Numeric { low: 41.0, high: 111.0 },
            version: 1,
        },
        CatalogEntry {
            code: "UA-NIT".to_string(),
            name: "尿亚硝酸盐".to_string(),
            category: "urinalysis".to_string(),
            unit: "".to_string(),
            reference_range: ReferenceRange::Qualitative {
                allowed: vec!["negative".to_string()],
            },
            version: 1,
        },
        CatalogEntry {
            code: "MICRO-BC".to_string(),
            name: "血培养".to_string(),
            category: "microbiology".to_string(),
            unit: "".to_string(),
            reference_range: ReferenceRange::Qualitative {
                allowed: vec!["no growth".to_string(), "contaminant".to_string()],
            },
            version: 1,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glucose() -> CatalogEntry {
        CatalogEntry {
            code: "BMP-GLU".to_string(),
            name: "血糖".to_string(),
            category: "chemistry".to_string(),
            unit: "mmol/L".to_string(),
            reference_range: ReferenceRange::Numeric { low: 3.9, high: 6.1 },
            version: 1,
        }
    }

    #[test]
    fn test_numeric_evaluation() {
        let entry = glucose();

        assert!(!evaluate(&entry, &ResultValue::Numeric(5.0)).unwrap());
        // 边界值属于正常区间
        assert!(!evaluate(&entry, &ResultValue::Numeric(3.9)).unwrap());
        assert!(!evaluate(&entry, &ResultValue::Numeric(6.1)).unwrap());
        assert!(evaluate(&entry, &ResultValue::Numeric(2.1)).unwrap());
        assert!(evaluate(&entry, &ResultValue::Numeric(22.0)).unwrap());
    }

    #[test]
    fn test_qualitative_evaluation() {
        let entry = CatalogEntry {
            code: "UA-NIT".to_string(),
            name: "尿亚硝酸盐".to_string(),
            category: "urinalysis".to_string(),
            unit: "".to_string(),
            reference_range: ReferenceRange::Qualitative {
                allowed: vec!["negative".to_string()],
            },
            version: 1,
        };

        assert!(!evaluate(&entry, &ResultValue::Qualitative("negative".to_string())).unwrap());
        assert!(evaluate(&entry, &ResultValue::Qualitative("positive".to_string())).unwrap());
    }

    #[test]
    fn test_type_mismatch_is_validation_error() {
        let entry = glucose();

        let result = evaluate(&entry, &ResultValue::Qualitative("high".to_string()));
        assert!(matches!(result, Err(LisError::Validation(_))));
    }

    #[tokio::test]
    async fn test_upsert_archives_previous_version() {
        let catalog = TestCatalog::new();

        let v1 = catalog.upsert(glucose()).await.unwrap();
        assert_eq!(v1.version, 1);

        let mut updated = glucose();
        updated.reference_range = ReferenceRange::Numeric { low: 4.0, high: 7.8 };
        let v2 = catalog.upsert(updated).await.unwrap();
        assert_eq!(v2.version, 2);

        // 旧版本仍可按版本号取回
        let archived = catalog.get_version("BMP-GLU", 1).await.unwrap();
        assert_eq!(
            archived.reference_range,
            ReferenceRange::Numeric { low: 3.9, high: 6.1 }
        );
        assert_eq!(catalog.get("BMP-GLU").await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_seed_default_entries() {
        let catalog = TestCatalog::new();
        let count = catalog.seed(default_entries()).await.unwrap();
        assert_eq!(count, catalog.list().await.len());
        assert!(catalog.contains("CBC-WBC").await);
        assert!(catalog.contains("MICRO-BC").await);
    }

    #[test]
    fn test_entries_from_json() {
        let json = r#"[
            {
                "code": "TSH",
                "name": "促甲状腺激素",
                "category": "endocrinology",
                "unit": "mIU/L",
                "reference_range": {"type": "numeric", "low": 0.27, "high": 4.2},
                "version": 1
            }
        ]"#;
        let entries = entries_from_json(json).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].code, "TSH");
    }
}
