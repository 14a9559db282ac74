use std::collections::HashSet;

use serde_json::Value;

use super::types::{ContainerInput, ContainerSpec, PartialContainer, TaskInput, TaskSpec};
use crate::error::{ReconcileError, Result};

/// Default and floor applied to container memory, in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPolicy {
    pub default_mib: u32,
    pub min_mib: u32,
}

impl MemoryPolicy {
    pub fn new(default_mib: u32, min_mib: u32) -> Self {
        Self {
            default_mib,
            min_mib,
        }
    }

    /// Coerces a raw memory value; never returns less than `min_mib`.
    pub fn coerce(&self, value: Option<&Value>) -> u32 {
        let parsed = value.and_then(parse_memory).filter(|mib| *mib > 0);
        let mib = match parsed {
            Some(mib) => u32::try_from(mib).unwrap_or(u32::MAX),
            None => self.default_mib,
        };
        mib.max(self.min_mib)
    }
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self::new(512, 128)
    }
}

fn parse_memory(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

/// Normalizes loosely typed task input into a [`TaskSpec`]. Pure, no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecBuilder {
    memory: MemoryPolicy,
}

impl SpecBuilder {
    pub fn new(memory: MemoryPolicy) -> Self {
        Self { memory }
    }

    pub fn build_container(&self, input: impl Into<ContainerInput>) -> Result<ContainerSpec> {
        let partial = match input.into() {
            ContainerInput::Name(name) => PartialContainer {
                name: Some(name),
                ..Default::default()
            },
            ContainerInput::Partial(partial) => partial,
        };

        let name = non_empty(partial.name)
            .ok_or_else(|| ReconcileError::InvalidSpec("container requires a name".into()))?;
        let image = non_empty(partial.image).unwrap_or_else(|| name.clone());
        let memory = self.memory.coerce(partial.memory.as_ref());

        Ok(ContainerSpec {
            name,
            image,
            memory,
        })
    }

    pub fn build_task(&self, input: impl Into<TaskInput>) -> Result<TaskSpec> {
        let (family, containers) = match input.into() {
            TaskInput::Family(family) => (Some(family), Vec::new()),
            TaskInput::Partial(partial) => (partial.family, partial.containers),
        };

        let family = non_empty(family)
            .ok_or_else(|| ReconcileError::InvalidSpec("task requires a family".into()))?;

        let mut containers = containers
            .into_iter()
            .map(|c| self.build_container(c))
            .collect::<Result<Vec<_>>>()?;

        if containers.is_empty() {
            containers.push(self.build_container(family.as_str())?);
        }

        if let Some(repeated) = first_repeated_name(&containers) {
            return Err(ReconcileError::InvalidSpec(format!(
                "task {family} defines container {repeated} more than once"
            )));
        }

        Ok(TaskSpec { family, containers })
    }
}

fn first_repeated_name(containers: &[ContainerSpec]) -> Option<&str> {
    let mut seen = HashSet::new();
    containers
        .iter()
        .map(|c| c.name.as_str())
        .find(|name| !seen.insert(*name))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::PartialTask;
    use serde_json::json;

    fn builder() -> SpecBuilder {
        SpecBuilder::new(MemoryPolicy::new(512, 128))
    }

    #[test]
    fn container_from_bare_name() {
        let spec = builder().build_container("nginx").unwrap();
        assert_eq!(spec.name, "nginx");
        assert_eq!(spec.image, "nginx");
        assert_eq!(spec.memory, 512);
    }

    #[test]
    fn container_without_name_is_invalid() {
        let err = builder()
            .build_container(ContainerInput::Partial(PartialContainer::default()))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidSpec(_)));

        let err = builder().build_container("").unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidSpec(_)));
    }

    #[test]
    fn container_keeps_explicit_image() {
        let input: ContainerInput =
            serde_json::from_value(json!({"name": "web", "image": "nginx:1.27"})).unwrap();
        let spec = builder().build_container(input).unwrap();
        assert_eq!(spec.image, "nginx:1.27");
    }

    #[test]
    fn memory_never_below_floor() {
        let policy = MemoryPolicy::new(512, 128);
        let inputs = [
            json!(-5),
            json!(0),
            json!(1),
            json!(127),
            json!(128),
            json!(4096),
            json!("64"),
            json!("256"),
            json!("lots"),
            json!(12.9),
            json!(null),
            json!([1, 2]),
        ];
        for input in inputs {
            assert!(policy.coerce(Some(&input)) >= 128, "input {input}");
        }
        assert!(policy.coerce(None) >= 128);
    }

    #[test]
    fn memory_defaults_and_clamps() {
        let policy = MemoryPolicy::new(512, 128);
        assert_eq!(policy.coerce(Some(&json!(0))), 512);
        assert_eq!(policy.coerce(Some(&json!("nope"))), 512);
        assert_eq!(policy.coerce(Some(&json!(64))), 128);
        assert_eq!(policy.coerce(Some(&json!("300"))), 300);
        assert_eq!(policy.coerce(Some(&json!(1024))), 1024);

        let tiny_default = MemoryPolicy::new(16, 128);
        assert_eq!(tiny_default.coerce(None), 128);
    }

    #[test]
    fn task_from_family_seeds_one_container() {
        let spec = builder().build_task("web").unwrap();
        assert_eq!(spec.family, "web");
        assert_eq!(spec.containers.len(), 1);
        assert_eq!(spec.containers[0].name, "web");
        assert_eq!(spec.containers[0].image, "web");
    }

    #[test]
    fn task_without_family_is_invalid() {
        let err = builder()
            .build_task(PartialTask {
                family: None,
                containers: vec!["api".into()],
            })
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidSpec(_)));
    }

    #[test]
    fn task_maps_every_container() {
        let input: TaskInput = serde_json::from_value(json!({
            "family": "shop",
            "containerDefinitions": ["api", {"name": "worker", "memory": "64"}]
        }))
        .unwrap();
        let spec = builder().build_task(input).unwrap();
        assert_eq!(spec.containers.len(), 2);
        assert_eq!(spec.containers[0].name, "api");
        assert_eq!(spec.containers[1].memory, 128);
    }

    #[test]
    fn task_rejects_invalid_container() {
        let input = PartialTask {
            family: Some("shop".into()),
            containers: vec![ContainerInput::Partial(PartialContainer::default())],
        };
        assert!(builder().build_task(input).is_err());
    }

    #[test]
    fn task_rejects_repeated_container_names() {
        let input = PartialTask {
            family: Some("web".into()),
            containers: vec!["api".into(), "api".into()],
        };
        let err = builder().build_task(input).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidSpec(msg) if msg.contains("api")));

        let input: TaskInput = serde_json::from_value(json!({
            "family": "web",
            "containers": ["api", {"name": " api ", "image": "other"}]
        }))
        .unwrap();
        assert!(builder().build_task(input).is_err());
    }

    #[test]
    fn build_task_is_idempotent() {
        let b = builder();
        let inputs: Vec<TaskInput> = vec![
            "web".into(),
            serde_json::from_value(json!({
                "family": "a",
                "containers": ["x", {"name": "y", "image": "redis", "memory": 7}]
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "family": "b",
                "containers": [{"name": "z", "memory": "garbage"}]
            }))
            .unwrap(),
        ];
        for input in inputs {
            let once = b.build_task(input).unwrap();
            let twice = b.build_task(once.clone()).unwrap();
            assert_eq!(once, twice);
        }
    }
}
