//! Mapping freshly extracted variants onto stored variant identities.
//!
//! Stores rename and reshuffle option labels, so a candidate is matched
//! against the product's stored variants by attribute set first, then by
//! SKU. A stored variant is claimed by at most one candidate per check.

use std::collections::HashSet;

use crate::models::{normalize_attributes, Attributes, Variant};
use crate::repository::{DbError, SqliteConn, VariantRepository};

/// How a candidate found its stored variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    /// The stored attributes are a subset of the candidate's.
    Subset,
    Sku,
}

/// A resolved stored variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantMatch {
    pub variant_id: String,
    pub kind: MatchKind,
    /// The candidate carries a SKU the stored variant lacks.
    pub learned_sku: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredVariant {
    id: String,
    attributes: Attributes,
    sku: Option<String>,
}

/// Resolves candidates against one product's stored variants.
#[derive(Debug, Clone)]
pub struct VariantReconciler {
    product_id: String,
    /// Creation order.
    stored: Vec<StoredVariant>,
    claimed: HashSet<String>,
}

fn clean_sku(sku: Option<&str>) -> Option<&str> {
    sku.map(str::trim).filter(|s| !s.is_empty())
}

impl VariantReconciler {
    /// Build from stored variants, which must be in creation order.
    pub fn new(product_id: &str, variants: &[Variant]) -> Self {
        Self {
            product_id: product_id.to_string(),
            stored: variants
                .iter()
                .map(|v| StoredVariant {
                    id: v.id.clone(),
                    attributes: normalize_attributes(&v.attributes),
                    sku: v.sku.clone(),
                })
                .collect(),
            claimed: HashSet::new(),
        }
    }

    /// Load a product's stored variants on an open connection.
    pub(crate) async fn load(conn: &mut SqliteConn, product_id: &str) -> Result<Self, DbError> {
        let variants = VariantRepository::list_for_product_on(conn, product_id).await?;
        Ok(Self::new(product_id, &variants))
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Find the stored variant for a candidate and claim it.
    pub fn resolve(&mut self, attributes: &Attributes, sku: Option<&str>) -> Option<VariantMatch> {
        let candidate = normalize_attributes(attributes);
        self.resolve_exact(&candidate, sku)
            .or_else(|| self.resolve_fallback(&candidate, sku))
    }

    /// Resolve a whole batch. Exact matches are claimed before any subset or
    /// SKU match so a looser match cannot steal an exact one's variant.
    pub fn resolve_all(&mut self, candidates: &[(&Attributes, Option<&str>)]) -> Vec<Option<VariantMatch>> {
        let normalized: Vec<Attributes> = candidates
            .iter()
            .map(|(attributes, _)| normalize_attributes(attributes))
            .collect();

        let mut matches: Vec<Option<VariantMatch>> = candidates
            .iter()
            .zip(&normalized)
            .map(|((_, sku), attrs)| self.resolve_exact(attrs, *sku))
            .collect();

        for (idx, ((_, sku), attrs)) in candidates.iter().zip(&normalized).enumerate() {
            if matches[idx].is_none() {
                matches[idx] = self.resolve_fallback(attrs, *sku);
            }
        }
        matches
    }

    /// Record a newly created variant so later candidates cannot match it.
    pub fn register(&mut self, variant: &Variant) {
        self.claimed.insert(variant.id.clone());
        self.stored.push(StoredVariant {
            id: variant.id.clone(),
            attributes: normalize_attributes(&variant.attributes),
            sku: variant.sku.clone(),
        });
    }

    fn resolve_exact(&mut self, candidate: &Attributes, sku: Option<&str>) -> Option<VariantMatch> {
        let idx = self
            .stored
            .iter()
            .position(|s| !self.claimed.contains(&s.id) && s.attributes == *candidate)?;
        Some(self.claim(idx, MatchKind::Exact, sku))
    }

    fn resolve_fallback(&mut self, candidate: &Attributes, sku: Option<&str>) -> Option<VariantMatch> {
        // Largest subset wins; `max_by_key` keeps the last maximum, so scan
        // in reverse creation order to prefer the oldest on ties.
        let subset = self
            .stored
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, s)| {
                !self.claimed.contains(&s.id)
                    && s.attributes.len() < candidate.len()
                    && s.attributes.iter().all(|(k, v)| candidate.get(k) == Some(v))
            })
            .max_by_key(|(_, s)| s.attributes.len())
            .map(|(idx, _)| idx);
        if let Some(idx) = subset {
            return Some(self.claim(idx, MatchKind::Subset, sku));
        }

        let sku = clean_sku(sku)?;
        let idx = self.stored.iter().position(|s| {
            !self.claimed.contains(&s.id) && clean_sku(s.sku.as_deref()) == Some(sku)
        })?;
        Some(self.claim(idx, MatchKind::Sku, Some(sku)))
    }

    fn claim(&mut self, idx: usize, kind: MatchKind, sku: Option<&str>) -> VariantMatch {
        let stored = &mut self.stored[idx];
        self.claimed.insert(stored.id.clone());
        let learned_sku = match (clean_sku(stored.sku.as_deref()), clean_sku(sku)) {
            (None, Some(new)) => {
                stored.sku = Some(new.to_string());
                Some(new.to_string())
            }
            _ => None,
        };
        VariantMatch {
            variant_id: stored.id.clone(),
            kind,
            learned_sku,
        }
    }
}
