use crate::cluster::cluster_hashes;
use crate::hashing::HashIndex;
use crate::models::{ImageRecord, ItemFailure};
use crate::store::ConceptStore;
use crate::Result;
use serde::Serialize;
use storage::normalize_rel;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimilarReport {
    pub clusters: Vec<Vec<ImageRecord>>,
    /// Images that could not be resolved or hashed; they take no part in
    /// clustering.
    pub failures: Vec<ItemFailure>,
}

impl ConceptStore {
    /// Near-duplicate groups among `paths`. Quadratic in the number of
    /// paths; meant for a concept-sized selection.
    pub fn find_similar(
        &self,
        index: &HashIndex,
        paths: &[String],
        threshold: f64,
    ) -> Result<SimilarReport> {
        let mut failures = Vec::new();
        let mut inputs = Vec::with_capacity(paths.len());
        for path in paths {
            match normalize_rel(path)
                .map_err(crate::Error::from)
                .and_then(|rel| Ok((self.existing_image(&rel)?, rel)))
            {
                Ok((abs, rel)) => inputs.push((rel, abs)),
                Err(err) => failures.push(ItemFailure {
                    item: path.clone(),
                    reason: err.to_string(),
                }),
            }
        }

        let hashed = index.compute_many(inputs);
        failures.extend(hashed.failures);
        let groups = cluster_hashes(&hashed.processed, threshold);

        let mut clusters = Vec::with_capacity(groups.len());
        for group in groups {
            let mut records = Vec::with_capacity(group.len());
            for rel in group {
                match self.image_record(&rel) {
                    Ok(record) => records.push(record),
                    Err(err) => failures.push(ItemFailure {
                        item: rel,
                        reason: err.to_string(),
                    }),
                }
            }
            if records.len() >= 2 {
                clusters.push(records);
            }
        }
        info!(
            images = paths.len(),
            clusters = clusters.len(),
            failed = failures.len(),
            threshold,
            "similarity scan finished"
        );
        Ok(SimilarReport { clusters, failures })
    }
}
