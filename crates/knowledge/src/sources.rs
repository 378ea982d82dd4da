//! Source records and the catalog that supplies them for bulk ingestion.
//!
//! Each record type knows its chunk type, its stable source ID and how to
//! render itself as canonical chunk text.

use async_trait::async_trait;
use ragline_core::chunk::{ChunkType, TenantId};
use ragline_core::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A record that can be turned into knowledge chunks.
pub trait SourceRecord: Send + Sync {
    const CHUNK_TYPE: ChunkType;

    fn source_id(&self) -> &str;

    fn title(&self) -> String;

    /// Text to chunk, rendered from the per-type template.
    fn canonical_text(&self) -> String;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqRecord {
    pub id: String,
    pub question: String,
    pub answer: String,
}

impl SourceRecord for FaqRecord {
    const CHUNK_TYPE: ChunkType = ChunkType::Faq;

    fn source_id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        self.question.trim().to_string()
    }

    fn canonical_text(&self) -> String {
        format!("Q: {}\n\nA: {}", self.question.trim(), self.answer.trim())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub product_type: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SourceRecord for ProductRecord {
    const CHUNK_TYPE: ChunkType = ChunkType::Product;

    fn source_id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        self.name.trim().to_string()
    }

    fn canonical_text(&self) -> String {
        let mut lines = vec![format!("Product: {}", self.name.trim())];
        let optional = [
            ("Type", self.product_type.as_deref()),
            ("Description", Some(self.description.as_str())),
            ("Price", self.price.as_deref()),
            ("Link", self.link.as_deref()),
        ];
        for (label, value) in optional {
            if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                lines.push(format!("{label}: {value}"));
            }
        }
        if !self.tags.is_empty() {
            lines.push(format!("Tags: {}", self.tags.join(", ")));
        }
        lines.join("\n")
    }
}

/// A crawled or hand-written website page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    pub content: String,
}

impl SourceRecord for PageRecord {
    const CHUNK_TYPE: ChunkType = ChunkType::Website;

    fn source_id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        self.title.trim().to_string()
    }

    fn canonical_text(&self) -> String {
        match self.url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => format!("{}\n{}\n\n{}", self.title.trim(), url, self.content.trim()),
            None => format!("{}\n\n{}", self.title.trim(), self.content.trim()),
        }
    }
}

/// A manual prompt the business owner wrote for the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualRecord {
    pub id: String,
    pub title: String,
    pub content: String,
}

impl SourceRecord for ManualRecord {
    const CHUNK_TYPE: ChunkType = ChunkType::Manual;

    fn source_id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        self.title.trim().to_string()
    }

    fn canonical_text(&self) -> String {
        self.content.trim().to_string()
    }
}

/// Every record of one tenant, grouped by source type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBundle {
    #[serde(default)]
    pub faqs: Vec<FaqRecord>,
    #[serde(default)]
    pub products: Vec<ProductRecord>,
    #[serde(default)]
    pub pages: Vec<PageRecord>,
    #[serde(default)]
    pub manuals: Vec<ManualRecord>,
}

impl KnowledgeBundle {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Supplies source records for bulk ingestion. Implemented by the host
/// application's persistence layer.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    async fn faqs(&self, tenant: &TenantId) -> Result<Vec<FaqRecord>, StoreError>;

    async fn products(&self, tenant: &TenantId) -> Result<Vec<ProductRecord>, StoreError>;

    async fn pages(&self, tenant: &TenantId) -> Result<Vec<PageRecord>, StoreError>;

    async fn manuals(&self, tenant: &TenantId) -> Result<Vec<ManualRecord>, StoreError>;
}

/// A catalog over in-memory bundles, keyed by tenant.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    bundles: HashMap<TenantId, KnowledgeBundle>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(mut self, tenant: TenantId, bundle: KnowledgeBundle) -> Self {
        self.bundles.insert(tenant, bundle);
        self
    }

    fn bundle(&self, tenant: &TenantId) -> Option<&KnowledgeBundle> {
        self.bundles.get(tenant)
    }
}

#[async_trait]
impl SourceCatalog for InMemoryCatalog {
    async fn faqs(&self, tenant: &TenantId) -> Result<Vec<FaqRecord>, StoreError> {
        Ok(self.bundle(tenant).map(|b| b.faqs.clone()).unwrap_or_default())
    }

    async fn products(&self, tenant: &TenantId) -> Result<Vec<ProductRecord>, StoreError> {
        Ok(self.bundle(tenant).map(|b| b.products.clone()).unwrap_or_default())
    }

    async fn pages(&self, tenant: &TenantId) -> Result<Vec<PageRecord>, StoreError> {
        Ok(self.bundle(tenant).map(|b| b.pages.clone()).unwrap_or_default())
    }

    async fn manuals(&self, tenant: &TenantId) -> Result<Vec<ManualRecord>, StoreError> {
        Ok(self.bundle(tenant).map(|b| b.manuals.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faq_template() {
        let faq = FaqRecord {
            id: "f1".into(),
            question: " Do you ship abroad? ".into(),
            answer: "Only within the country.".into(),
        };
        assert_eq!(faq.canonical_text(), "Q: Do you ship abroad?\n\nA: Only within the country.");
        assert_eq!(faq.title(), "Do you ship abroad?");
    }

    #[test]
    fn product_template_skips_missing_fields() {
        let product = ProductRecord {
            id: "p1".into(),
            name: "Trail Runner".into(),
            product_type: Some("Shoes".into()),
            price: Some("40 USD".into()),
            tags: vec!["running".into(), "outdoor".into()],
            ..Default::default()
        };
        assert_eq!(
            product.canonical_text(),
            "Product: Trail Runner\nType: Shoes\nPrice: 40 USD\nTags: running, outdoor"
        );
    }

    #[test]
    fn bundle_parses_partial_json() {
        let bundle = KnowledgeBundle::from_json(
            r#"{"products": [{"id": "p1", "name": "Hat", "type": "Accessory"}]}"#,
        )
        .unwrap();
        assert_eq!(bundle.products[0].product_type.as_deref(), Some("Accessory"));
        assert!(bundle.faqs.is_empty());
    }

    #[tokio::test]
    async fn catalog_is_tenant_scoped() {
        let bundle = KnowledgeBundle {
            faqs: vec![FaqRecord {
                id: "f1".into(),
                question: "q".into(),
                answer: "a".into(),
            }],
            ..Default::default()
        };
        let catalog = InMemoryCatalog::new().with_bundle(TenantId::from("t1"), bundle);
        assert_eq!(catalog.faqs(&TenantId::from("t1")).await.unwrap().len(), 1);
        assert!(catalog.faqs(&TenantId::from("t2")).await.unwrap().is_empty());
    }
}
