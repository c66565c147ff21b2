//! File-backed finding store.
//!
//! `JsonFindingStore` serves a findings document loaded from disk (or built
//! in memory). It backs the CLI entry points and the integration tests; a
//! production deployment would put the graph-backed store behind the same
//! trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

use crate::collab::{FindingFilter, FindingStore};
use crate::core::finding::{Asset, Finding};
use crate::error::Result;

/// On-disk findings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingsDocument {
    pub findings: Vec<Finding>,
    pub assets: Vec<Asset>,
    /// Directed dependency pairs: (dependent arn, dependency arn).
    #[serde(default)]
    pub dependencies: Vec<(String, String)>,
}

/// In-memory [`FindingStore`] over a [`FindingsDocument`].
pub struct JsonFindingStore {
    findings: RwLock<Vec<Finding>>,
    assets: HashMap<String, Asset>,
    /// dependent arn -> dependency arns
    dependencies: HashMap<String, Vec<String>>,
    /// dependency arn -> dependent arns
    dependents: HashMap<String, Vec<String>>,
}

impl JsonFindingStore {
    pub fn from_document(doc: FindingsDocument) -> Self {
        let assets = doc
            .assets
            .into_iter()
            .map(|a| (a.arn.clone(), a))
            .collect();

        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in doc.dependencies {
            dependencies.entry(from.clone()).or_default().push(to.clone());
            dependents.entry(to).or_default().push(from);
        }

        Self {
            findings: RwLock::new(doc.findings),
            assets,
            dependencies,
            dependents,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let doc: FindingsDocument = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        Ok(Self::from_document(doc))
    }

    fn resolve(&self, arns: Option<&Vec<String>>) -> Vec<Asset> {
        arns.map(|list| {
            list.iter()
                .filter_map(|arn| self.assets.get(arn).cloned())
                .collect()
        })
        .unwrap_or_default()
    }
}

#[async_trait]
impl FindingStore for JsonFindingStore {
    async fn query_findings(&self, filter: &FindingFilter) -> Result<Vec<Finding>> {
        let now = chrono::Utc::now();
        let findings = self.findings.read().await;
        Ok(findings
            .iter()
            .filter(|f| {
                if let Some(min) = filter.min_severity {
                    if f.severity.score() < min.score() {
                        return false;
                    }
                }
                if let Some(max_age) = filter.max_age_days {
                    if f.age_days(now) > max_age {
                        return false;
                    }
                }
                if let Some(categories) = &filter.categories {
                    if !categories.contains(&f.category) {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect())
    }

    async fn get_asset(&self, arn: &str) -> Result<Option<Asset>> {
        Ok(self.assets.get(arn).cloned())
    }

    async fn get_asset_dependencies(&self, arn: &str) -> Result<Vec<Asset>> {
        Ok(self.resolve(self.dependencies.get(arn)))
    }

    async fn get_asset_dependents(&self, arn: &str) -> Result<Vec<Asset>> {
        Ok(self.resolve(self.dependents.get(arn)))
    }

    async fn update_finding(&self, finding: &Finding) -> Result<()> {
        let mut findings = self.findings.write().await;
        if let Some(existing) = findings.iter_mut().find(|f| f.id == finding.id) {
            *existing = finding.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::finding::{Environment, FindingCategory, Severity};
    use chrono::{Duration, Utc};

    fn asset(arn: &str, service: &str) -> Asset {
        Asset {
            arn: arn.to_string(),
            service: service.to_string(),
            region: "us-east-1".to_string(),
            environment: Environment::Production,
            criticality: 5.0,
            public_exposure: false,
            sensitive_data: false,
        }
    }

    fn finding(id: &str, severity: Severity, age_days: i64, arn: &str) -> Finding {
        Finding {
            id: id.to_string(),
            title: format!("finding {}", id),
            severity,
            category: FindingCategory::Configuration,
            resource_type: "s3-bucket".to_string(),
            risk_score: 5.0,
            asset_arn: arn.to_string(),
            first_seen: Utc::now() - Duration::days(age_days),
        }
    }

    fn store() -> JsonFindingStore {
        JsonFindingStore::from_document(FindingsDocument {
            findings: vec![
                finding("f-1", Severity::Critical, 5, "arn:a"),
                finding("f-2", Severity::Low, 45, "arn:b"),
            ],
            assets: vec![asset("arn:a", "s3"), asset("arn:b", "ec2")],
            dependencies: vec![("arn:a".to_string(), "arn:b".to_string())],
        })
    }

    #[tokio::test]
    async fn test_query_filters_by_severity() {
        let store = store();
        let filter = FindingFilter {
            min_severity: Some(Severity::High),
            ..Default::default()
        };
        let results = store.query_findings(&filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "f-1");
    }

    #[tokio::test]
    async fn test_query_filters_by_age() {
        let store = store();
        let filter = FindingFilter {
            max_age_days: Some(30),
            ..Default::default()
        };
        let results = store.query_findings(&filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "f-1");
    }

    #[tokio::test]
    async fn test_asset_lookup() {
        let store = store();
        assert!(store.get_asset("arn:a").await.unwrap().is_some());
        assert!(store.get_asset("arn:missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dependency_graph_both_directions() {
        let store = store();
        let deps = store.get_asset_dependencies("arn:a").await.unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].arn, "arn:b");

        let dependents = store.get_asset_dependents("arn:b").await.unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].arn, "arn:a");

        assert!(store.get_asset_dependencies("arn:b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("findings.json");
        let doc = FindingsDocument {
            findings: vec![finding("f-1", Severity::High, 3, "arn:a")],
            assets: vec![asset("arn:a", "s3")],
            dependencies: vec![],
        };
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let store = JsonFindingStore::load(&path).unwrap();
        let all = store.query_findings(&FindingFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(store.get_asset("arn:a").await.unwrap().is_some());
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        assert!(JsonFindingStore::load(std::path::Path::new("/nonexistent/findings.json")).is_err());
    }

    #[tokio::test]
    async fn test_update_finding_replaces_in_place() {
        let store = store();
        let mut updated = finding("f-1", Severity::Medium, 5, "arn:a");
        updated.title = "resolved".to_string();
        store.update_finding(&updated).await.unwrap();

        let all = store.query_findings(&FindingFilter::default()).await.unwrap();
        let f1 = all.iter().find(|f| f.id == "f-1").unwrap();
        assert_eq!(f1.title, "resolved");
    }
}
