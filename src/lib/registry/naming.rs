//! Family naming for resources the engine owns.
//!
//! A managed family reads `<prefix>pid-<cluster>[--pr-<request>][--deployment-<id>]`,
//! for example `fleet-pid-shop--pr-12--deployment-master`.

const CLUSTER_TAG: &str = "pid-";
const REQUEST_TAG: &str = "pr-";
const DEPLOYMENT_TAG: &str = "deployment-";
const SEPARATOR: &str = "--";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNaming {
    prefix: String,
}

impl ResourceNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn family(
        &self,
        cluster: &str,
        request: Option<&str>,
        deployment: Option<&str>,
    ) -> String {
        let mut family = format!("{}{CLUSTER_TAG}{cluster}", self.prefix);
        if let Some(request) = request {
            family.push_str(&format!("{SEPARATOR}{REQUEST_TAG}{request}"));
        }
        if let Some(deployment) = deployment {
            family.push_str(&format!("{SEPARATOR}{DEPLOYMENT_TAG}{deployment}"));
        }
        family
    }

    /// Whether the ARN carries this deployment's prefix at all.
    pub fn is_managed(&self, arn: &str) -> bool {
        arn.contains(&self.prefix)
    }

    pub fn belongs_to_cluster(&self, arn: &str, cluster: &str) -> bool {
        self.parse(arn).is_some_and(|parts| parts.cluster == cluster)
    }

    pub fn belongs_to_request(&self, arn: &str, cluster: &str, request: &str) -> bool {
        self.parse(arn)
            .is_some_and(|parts| parts.cluster == cluster && parts.request == Some(request))
    }

    pub fn belongs_to_deployment(&self, arn: &str, cluster: &str, deployment: &str) -> bool {
        self.parse(arn).is_some_and(|parts| {
            parts.cluster == cluster && parts.deployment == Some(deployment)
        })
    }

    fn parse<'a>(&self, arn: &'a str) -> Option<FamilyParts<'a>> {
        let family = family_of(arn);
        let mut tokens = family.split(SEPARATOR);
        let cluster = tokens
            .next()?
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix(CLUSTER_TAG)?;

        let mut parts = FamilyParts {
            cluster,
            request: None,
            deployment: None,
        };
        for token in tokens {
            if let Some(request) = token.strip_prefix(REQUEST_TAG) {
                parts.request = Some(request);
            } else if let Some(deployment) = token.strip_prefix(DEPLOYMENT_TAG) {
                parts.deployment = Some(deployment);
            }
        }
        Some(parts)
    }
}

impl Default for ResourceNaming {
    fn default() -> Self {
        Self::new("fleet-")
    }
}

struct FamilyParts<'a> {
    cluster: &'a str,
    request: Option<&'a str>,
    deployment: Option<&'a str>,
}

/// `arn:...:task-definition/web:3` -> `web`
fn family_of(arn: &str) -> &str {
    let tail = arn.rsplit('/').next().unwrap_or(arn);
    match tail.rsplit_once(':') {
        Some((family, revision)) if revision.chars().all(|c| c.is_ascii_digit()) => family,
        _ => tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARNS: [&str; 4] = [
        "arn:fleet:local:task-definition/fleet-resource:1",
        "arn:fleet:local:task-definition/fleet-pid-my-project--pr-5--deployment-master:2",
        "arn:fleet:local:task-definition/fleet-pid-my-project-2--pr-5:1",
        "arn:fleet:local:task-definition/other-pid-my-project:1",
    ];

    #[test]
    fn builds_family_names() {
        let naming = ResourceNaming::default();
        assert_eq!(naming.family("shop", None, None), "fleet-pid-shop");
        assert_eq!(
            naming.family("shop", Some("12"), Some("master")),
            "fleet-pid-shop--pr-12--deployment-master"
        );
    }

    #[test]
    fn managed_means_prefixed() {
        let naming = ResourceNaming::default();
        let managed: Vec<_> = ARNS.iter().filter(|a| naming.is_managed(a)).collect();
        assert_eq!(managed.len(), 3);
    }

    #[test]
    fn cluster_match_is_exact() {
        let naming = ResourceNaming::default();
        let matching: Vec<_> = ARNS
            .iter()
            .filter(|a| naming.belongs_to_cluster(a, "my-project"))
            .collect();
        assert_eq!(matching, vec![&ARNS[1]]);
    }

    #[test]
    fn request_and_deployment_filters() {
        let naming = ResourceNaming::default();
        assert!(naming.belongs_to_request(ARNS[1], "my-project", "5"));
        assert!(!naming.belongs_to_request(ARNS[1], "my-project", "6"));
        assert!(naming.belongs_to_deployment(ARNS[1], "my-project", "master"));
        assert!(!naming.belongs_to_deployment(ARNS[2], "my-project-2", "master"));
    }

    #[test]
    fn family_is_extracted_from_arn() {
        assert_eq!(family_of("arn:x:task-definition/web:3"), "web");
        assert_eq!(family_of("/fleet-pid-a"), "fleet-pid-a");
        assert_eq!(family_of("web"), "web");
    }
}
