//! Revisioned task definition storage for backends without a native registry.

use std::collections::BTreeMap;

use super::backend::{BackendError, BackendResult};
use super::types::{RawTaskDefinition, STATUS_ACTIVE, STATUS_INACTIVE};
use crate::tasks::TaskSpec;

#[derive(Debug, Clone)]
struct Revision {
    arn: String,
    spec: TaskSpec,
    active: bool,
}

#[derive(Debug, Clone)]
pub struct TaskDefinitionTable {
    arn_prefix: String,
    families: BTreeMap<String, Vec<Revision>>,
}

impl TaskDefinitionTable {
    pub fn new(arn_prefix: impl Into<String>) -> Self {
        Self {
            arn_prefix: arn_prefix.into(),
            families: BTreeMap::new(),
        }
    }

    /// Every call allocates the next revision of the family.
    pub fn register(&mut self, spec: &TaskSpec) -> RawTaskDefinition {
        let revisions = self.families.entry(spec.family.clone()).or_default();
        let revision = revisions.len() as u32 + 1;
        let arn = format!(
            "{}:task-definition/{}:{}",
            self.arn_prefix, spec.family, revision
        );
        revisions.push(Revision {
            arn,
            spec: spec.clone(),
            active: true,
        });
        to_raw(&spec.family, revision, &revisions[revisions.len() - 1])
    }

    pub fn describe(
        &self,
        operation: &'static str,
        reference: &str,
    ) -> BackendResult<RawTaskDefinition> {
        let (family, revision) = self.resolve(operation, reference)?;
        let rev = &self.families[&family][revision as usize - 1];
        Ok(to_raw(&family, revision, rev))
    }

    pub fn deregister(
        &mut self,
        operation: &'static str,
        reference: &str,
    ) -> BackendResult<RawTaskDefinition> {
        let (family, revision) = self.resolve(operation, reference)?;
        let rev = self
            .families
            .get_mut(&family)
            .and_then(|revs| revs.get_mut(revision as usize - 1))
            .ok_or_else(|| not_found(operation, reference))?;
        rev.active = false;
        let rev = rev.clone();
        Ok(to_raw(&family, revision, &rev))
    }

    /// Container spec of the revision `reference` points at.
    pub fn spec(&self, operation: &'static str, reference: &str) -> BackendResult<TaskSpec> {
        let (family, revision) = self.resolve(operation, reference)?;
        Ok(self.families[&family][revision as usize - 1].spec.clone())
    }

    pub fn active_arns(&self) -> Vec<String> {
        self.families
            .values()
            .flatten()
            .filter(|rev| rev.active)
            .map(|rev| rev.arn.clone())
            .collect()
    }

    pub fn active_families(&self) -> Vec<String> {
        self.families
            .iter()
            .filter(|(_, revs)| revs.iter().any(|rev| rev.active))
            .map(|(family, _)| family.clone())
            .collect()
    }

    /// Resolves an ARN, `family:revision` or bare family (latest active revision).
    fn resolve(&self, operation: &'static str, reference: &str) -> BackendResult<(String, u32)> {
        let tail = reference
            .rsplit_once("task-definition/")
            .map(|(_, tail)| tail)
            .unwrap_or(reference);

        let (family, revision) = match tail.rsplit_once(':') {
            Some((family, rev)) => match rev.parse::<u32>() {
                Ok(rev) => (family, Some(rev)),
                Err(_) => return Err(not_found(operation, reference)),
            },
            None => (tail, None),
        };

        let revisions = self
            .families
            .get(family)
            .ok_or_else(|| not_found(operation, reference))?;

        let revision = match revision {
            Some(rev) if rev >= 1 && (rev as usize) <= revisions.len() => rev,
            Some(_) => return Err(not_found(operation, reference)),
            None => revisions
                .iter()
                .rposition(|rev| rev.active)
                .map(|idx| idx as u32 + 1)
                .ok_or_else(|| not_found(operation, reference))?,
        };

        Ok((family.to_string(), revision))
    }
}

fn to_raw(family: &str, revision: u32, rev: &Revision) -> RawTaskDefinition {
    RawTaskDefinition {
        task_definition_arn: Some(rev.arn.clone()),
        family: Some(family.to_string()),
        revision: Some(revision),
        status: Some(if rev.active { STATUS_ACTIVE } else { STATUS_INACTIVE }.to_string()),
        container_definitions: rev.spec.containers.clone(),
        extra: Default::default(),
    }
}

fn not_found(operation: &'static str, reference: &str) -> BackendError {
    BackendError::NotFound {
        operation,
        resource: format!("task definition {reference}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::SpecBuilder;

    fn table_with(families: &[&str]) -> TaskDefinitionTable {
        let mut table = TaskDefinitionTable::new("arn:test");
        let builder = SpecBuilder::default();
        for family in families {
            table.register(&builder.build_task(*family).unwrap());
        }
        table
    }

    #[test]
    fn revisions_increase_per_family() {
        let table = table_with(&["web", "web", "api"]);
        let web = table.describe("describe", "web").unwrap();
        assert_eq!(web.revision, Some(2));
        assert_eq!(
            web.task_definition_arn.as_deref(),
            Some("arn:test:task-definition/web:2")
        );
        assert_eq!(table.describe("describe", "api:1").unwrap().revision, Some(1));
    }

    #[test]
    fn resolves_arn_references() {
        let table = table_with(&["web"]);
        let raw = table
            .describe("describe", "arn:test:task-definition/web:1")
            .unwrap();
        assert_eq!(raw.family.as_deref(), Some("web"));
    }

    #[test]
    fn deregister_marks_inactive() {
        let mut table = table_with(&["web"]);
        let raw = table.deregister("deregister", "web:1").unwrap();
        assert_eq!(raw.status.as_deref(), Some(STATUS_INACTIVE));
        assert!(table.active_arns().is_empty());
        assert!(table.active_families().is_empty());
        // the revision itself stays describable
        assert!(!table.describe("describe", "web:1").unwrap().is_active());
        assert!(table.describe("describe", "web").is_err());
    }

    #[test]
    fn unknown_references_are_not_found() {
        let table = table_with(&["web"]);
        for reference in ["db", "web:9", "web:0", "web:x"] {
            assert!(matches!(
                table.describe("describe", reference),
                Err(BackendError::NotFound { .. })
            ));
        }
    }
}
