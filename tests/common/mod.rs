use std::sync::Arc;
use std::time::Duration;

use r_fleet::backend::InMemoryBackend;
use r_fleet::poller::{PollPolicy, Poller};
use r_fleet::registry::{ResourceNaming, TaskDefinitionRegistry};
use r_fleet::services::ServiceManager;
use r_fleet::tasks::SpecBuilder;

pub struct Harness {
    pub backend: Arc<InMemoryBackend>,
    pub services: Arc<ServiceManager>,
}

pub fn harness(backend: InMemoryBackend) -> Harness {
    let backend = Arc::new(backend);
    let registry = Arc::new(TaskDefinitionRegistry::new(
        backend.clone(),
        SpecBuilder::default(),
        ResourceNaming::default(),
    ));
    let poller = Poller::new(PollPolicy {
        delay: Duration::from_secs(15),
        max_attempts: Some(40),
    });
    let services = Arc::new(ServiceManager::new(backend.clone(), registry, poller));
    Harness { backend, services }
}
