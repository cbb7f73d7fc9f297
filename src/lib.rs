//! Static analysis and auto-remediation for TypeScript/React (Next.js) projects.
//!
//! A run scans five dimensions with independent checks, scores each one, and
//! aggregates the results into an [`types::AuditSession`]. Issues whose rule
//! has a registered strategy can then be fixed in place by the
//! [`fix::AutoFixEngine`].

pub mod analysis;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod fix;
pub mod fs;
pub mod report;
pub mod scoring;
pub mod types;
