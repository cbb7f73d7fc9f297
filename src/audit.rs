use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::analysis::{CheckContext, CheckRegistry, Scanner};
use crate::catalog::RuleCatalog;
use crate::config::ScanConfig;
use crate::fs::FileSystem;
use crate::types::{AuditSession, Dimension};

/// Runs one audit over every dimension, in `Dimension::ALL` order.
pub struct Auditor {
    root: PathBuf,
    scan: ScanConfig,
    catalog: Arc<RuleCatalog>,
    fs: Arc<dyn FileSystem>,
    registry: CheckRegistry,
}

impl Auditor {
    pub fn new(
        root: impl Into<PathBuf>,
        scan: ScanConfig,
        catalog: Arc<RuleCatalog>,
        fs: Arc<dyn FileSystem>,
        registry: CheckRegistry,
    ) -> Self {
        Self {
            root: root.into(),
            scan,
            catalog,
            fs,
            registry,
        }
    }

    /// Scan every dimension and return the sealed session.
    ///
    /// Cancellation is coarse: it is checked before each dimension, and a
    /// dimension already scanning runs to completion. A cancelled session is
    /// still sealed, scored over the dimensions that finished.
    pub async fn run(&self, cancel: &CancellationToken) -> AuditSession {
        let mut session = AuditSession::start();
        let ctx = Arc::new(CheckContext::new(
            self.root.clone(),
            Arc::clone(&self.fs),
            self.scan.clone(),
        ));
        let scanner = Scanner::new(Arc::clone(&self.catalog));

        for dimension in Dimension::ALL {
            if cancel.is_cancelled() {
                warn!(next = %dimension, "audit cancelled");
                session.cancelled = true;
                break;
            }
            let checks = self.registry.for_dimension(dimension);
            let span = info_span!("dimension", dimension = %dimension);
            let result = scanner
                .run_dimension(dimension, &checks, checks.len(), Arc::clone(&ctx))
                .instrument(span)
                .await;
            info!(
                dimension = %dimension,
                score = result.score,
                issues = result.issues.len(),
                "dimension scanned"
            );
            session.record(result);
        }

        session.seal(&self.catalog);
        info!(
            score = session.overall_score,
            status = %session.overall_status,
            issues = session.summary.total_issues,
            "audit complete"
        );
        session
    }
}
