// =============================================================================
// SKU ALLOCATOR
// =============================================================================
// SKU = BASE-FRAG1-FRAG2-..., each part uppercased with non-alphanumerics
// stripped, fragments in canonical dimension order.
//
// COLLISIONS:
// A candidate already used in the current batch or in storage gets a
// 4-character hex suffix derived from SHA-256(candidate, attempt) and is
// retried. The suffix is deterministic, so a given catalog state always
// produces the same SKUs.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::generator::CandidateCombination;
use crate::metrics;
use crate::models::AttributeValue;
use crate::persistence::VariantStore;

/// Uppercase `raw` and drop everything that is not ASCII alphanumeric.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// SKU fragment for one value: its `sku_fragment`, or the first three
/// alphanumerics of its name when the fragment is blank.
pub fn fragment(value: &AttributeValue) -> String {
    let explicit = normalize(&value.sku_fragment);
    if !explicit.is_empty() {
        return explicit;
    }
    normalize(&value.value).chars().take(3).collect()
}

/// The undisambiguated SKU for a combination.
pub fn base_candidate(base_sku: &str, combination: &CandidateCombination) -> String {
    std::iter::once(normalize(base_sku))
        .chain(combination.values.iter().map(fragment))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn disambiguate(candidate: &str, attempt: u32) -> String {
    let digest = Sha256::digest(format!("{candidate}#{attempt}").as_bytes());
    let suffix = hex::encode_upper(&digest[..2]);
    format!("{candidate}-{suffix}")
}

#[derive(Clone)]
pub struct SkuAllocator {
    store: Arc<dyn VariantStore>,
    max_attempts: u32,
}

impl SkuAllocator {
    pub fn new(store: Arc<dyn VariantStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Assign a SKU not used in `batch` nor in storage, and record it in
    /// `batch`.
    ///
    /// # Errors
    /// - `BadRequest` when the base SKU normalizes to nothing
    /// - `SkuAllocationExhausted` after `max_attempts` collisions
    pub async fn allocate(
        &self,
        base_sku: &str,
        combination: &CandidateCombination,
        batch: &mut HashSet<String>,
    ) -> AppResult<String> {
        if normalize(base_sku).is_empty() {
            return Err(AppError::BadRequest(
                "base_sku must contain at least one alphanumeric character".to_string(),
            ));
        }

        let candidate = base_candidate(base_sku, combination);

        for attempt in 0..self.max_attempts {
            let sku = if attempt == 0 {
                candidate.clone()
            } else {
                disambiguate(&candidate, attempt)
            };

            if batch.contains(&sku) || self.store.sku_exists(&sku).await? {
                metrics::record_sku_collision();
                debug!(sku = %sku, attempt = attempt, "SKU collision, retrying");
                continue;
            }

            batch.insert(sku.clone());
            return Ok(sku);
        }

        Err(AppError::SkuAllocationExhausted {
            sku: candidate,
            attempts: self.max_attempts,
        })
    }
}
