//! Concurrent builds of independent documents.

use super::{BuildOutcome, BuildRequest, Docmaker};
use crate::errors::DocflowError;
use futures::future::join_all;
use std::sync::Arc;
use tracing::info;

impl Docmaker {
    /// Runs each request as its own build on tokio's blocking pool.
    ///
    /// Every build owns its context and temporary area; results come back
    /// in request order.
    pub async fn build_all(
        self: &Arc<Self>,
        requests: Vec<BuildRequest>,
    ) -> Vec<Result<BuildOutcome, DocflowError>> {
        let count = requests.len();
        let tasks = requests.into_iter().map(|request| {
            let docmaker = Arc::clone(self);
            tokio::task::spawn_blocking(move || docmaker.build(request))
        });

        let results: Vec<_> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|err| {
                    Err(DocflowError::Internal(format!("Build task failed: {err}")))
                })
            })
            .collect();

        info!(
            builds = count,
            failed = results.iter().filter(|r| r.is_err()).count(),
            "Batch finished"
        );
        results
    }
}
