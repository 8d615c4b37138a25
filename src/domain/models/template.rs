//! Stack templates for nearest-neighbor technology inference.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Embedding dimension expected from the LLM gateway.
pub const EMBEDDING_DIM: usize = 1536;

/// A seeded technology-stack row used only for nearest-neighbor lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackTemplate {
    pub id: Uuid,
    pub title: String,
    pub backend: String,
    pub frontend: String,
    pub database: String,
    pub description: String,
    /// Absent until the first embedding pass over the seed corpus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl StackTemplate {
    pub fn new(
        title: impl Into<String>,
        backend: impl Into<String>,
        frontend: impl Into<String>,
        database: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            backend: backend.into(),
            frontend: frontend.into(),
            database: database.into(),
            description: description.into(),
            embedding: None,
        }
    }
}

/// Cosine similarity between two vectors. Mismatched lengths or zero
/// magnitudes yield 0.0 so callers can treat the result as "no match".
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    f64::from(dot / (mag_a * mag_b))
}

/// The canonical seed corpus. Descriptions are the texts that get embedded;
/// integration tests use them as similarity-path sanity anchors.
pub fn seed_templates() -> Vec<StackTemplate> {
    vec![
        StackTemplate::new(
            "Next.js SaaS",
            "Next.js API routes",
            "Next.js",
            "PostgreSQL",
            "A subscription SaaS web application with marketing pages, \
             authenticated dashboard, and billing",
        ),
        StackTemplate::new(
            "FastAPI CRUD",
            "FastAPI",
            "React",
            "PostgreSQL",
            "A straightforward CRUD application: forms, lists, and records \
             over a relational schema",
        ),
        StackTemplate::new(
            "E-commerce storefront",
            "Node.js Express",
            "Next.js",
            "PostgreSQL",
            "An online store with product catalog, cart, checkout, and order \
             management",
        ),
        StackTemplate::new(
            "Analytics dashboard",
            "FastAPI",
            "React",
            "ClickHouse",
            "A data dashboard with charts, filters, and aggregate queries \
             over large event volumes",
        ),
        StackTemplate::new(
            "Mobile-first PWA",
            "FastAPI",
            "React",
            "SQLite",
            "A lightweight progressive web app optimized for phones with \
             offline support",
        ),
        StackTemplate::new(
            "Realtime chat",
            "Node.js Express",
            "React",
            "Redis",
            "A realtime messaging application with channels, presence, and \
             websockets",
        ),
        StackTemplate::new(
            "CMS blog",
            "Django",
            "Next.js",
            "PostgreSQL",
            "A content site with authoring, publishing workflow, and static \
             page rendering",
        ),
        StackTemplate::new(
            "Internal admin tool",
            "FastAPI",
            "React",
            "PostgreSQL",
            "An internal back-office tool with tables, detail views, and \
             role-based access",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identity() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_seed_titles_unique() {
        let templates = seed_templates();
        let mut titles: Vec<_> = templates.iter().map(|t| t.title.as_str()).collect();
        titles.sort_unstable();
        titles.dedup();
        assert_eq!(titles.len(), templates.len());
    }
}
