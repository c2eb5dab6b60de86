//! Final report of one check run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use super::{EntityId, EntityType, FileHash, Pointer};

/// Failures detected by a run, grouped by category. Each phase accumulates
/// into its own collection; the orchestrator merges them here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Entities whose bodies differ between the reference and some replica.
    pub failed_entities: BTreeMap<EntityId, EntityType>,
    /// Entities whose audit metadata disagrees beyond the overwrite race rule.
    pub failed_audit: BTreeMap<EntityId, EntityType>,
    /// Active pointers that resolve to an unexpected entity.
    pub failed_pointers: BTreeMap<Pointer, EntityType>,
    /// Referenced content hashes reported unavailable somewhere.
    pub failed_content: BTreeSet<FileHash>,
    /// Content hashes whose bytes differ between replicas.
    pub failed_content_files: BTreeSet<FileHash>,
}

impl CheckReport {
    /// Total number of recorded failures across all categories.
    pub fn total_failures(&self) -> usize {
        self.failed_entities.len()
            + self.failed_audit.len()
            + self.failed_pointers.len()
            + self.failed_content.len()
            + self.failed_content_files.len()
    }

    /// Render the grouped results artifact, one section per category.
    pub fn render_results(&self) -> String {
        let mut out = String::new();
        out.push_str("Failed Entities\n");
        for (id, entity_type) in &self.failed_entities {
            let _ = writeln!(out, "({entity_type}, {id})");
        }
        out.push_str("\nFailed Audit\n");
        for (id, entity_type) in &self.failed_audit {
            let _ = writeln!(out, "({entity_type}, {id})");
        }
        out.push_str("\nFailed Pointers\n");
        for (pointer, entity_type) in &self.failed_pointers {
            let _ = writeln!(out, "({entity_type}, {pointer})");
        }
        out.push_str("\nFailed Available Content\n");
        for hash in &self.failed_content {
            let _ = writeln!(out, "{hash}");
        }
        out.push_str("\nFailed Content Files\n");
        for hash in &self.failed_content_files {
            let _ = writeln!(out, "{hash}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_counts_every_category() {
        let mut report = CheckReport::default();
        assert_eq!(report.total_failures(), 0);

        report.failed_entities.insert("Qm1".into(), "scene".into());
        report.failed_pointers.insert("10,20".into(), "scene".into());
        report.failed_content.insert("QmH".into());
        assert_eq!(report.total_failures(), 3);
    }

    #[test]
    fn rendered_results_group_by_category() {
        let mut report = CheckReport::default();
        report.failed_audit.insert("Qm2".into(), "profile".into());
        report.failed_content_files.insert("QmF".into());

        let rendered = report.render_results();
        let audit_at = rendered.find("Failed Audit").unwrap();
        let files_at = rendered.find("Failed Content Files").unwrap();
        assert!(audit_at < files_at);
        assert!(rendered.contains("(profile, Qm2)"));
        assert!(rendered.contains("QmF"));
    }
}
