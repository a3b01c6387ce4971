//! In-memory Harbor for tests

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::{
    NewProject, NewRegistry, RegistryApi, RegistryConnector, RegistryEndpoint, RegistryError,
};

#[derive(Default)]
struct State {
    registries: Vec<RegistryEndpoint>,
    projects: BTreeMap<String, Option<i64>>,
    calls: Vec<String>,
}

/// A [`RegistryApi`] backed by in-memory state, recording every call.
#[derive(Default)]
pub struct FakeRegistry {
    state: Mutex<State>,
    unreachable_pings: AtomicU32,
    fail_creates: bool,
}

impl FakeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` pings with a transport error.
    #[must_use]
    pub fn unreachable_for(self, n: u32) -> Self {
        self.unreachable_pings.store(n, Ordering::SeqCst);
        self
    }

    /// Reject every create with 500.
    #[must_use]
    pub fn failing_creates(mut self) -> Self {
        self.fail_creates = true;
        self
    }

    #[must_use]
    pub fn with_registry(self, name: &str, id: i64) -> Self {
        self.lock().registries.push(RegistryEndpoint {
            id,
            name: name.to_string(),
            kind: "docker-hub".to_string(),
            url: "https://hub.docker.com".to_string(),
        });
        self
    }

    /// `Some(registry_id)` of an existing project.
    #[must_use]
    pub fn project_registry(&self, name: &str) -> Option<Option<i64>> {
        self.lock().projects.get(name).copied()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake registry lock poisoned")
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }

    fn rejected(&self, path: &str) -> RegistryError {
        RegistryError::Status {
            method: "POST".to_string(),
            path: path.to_string(),
            status: 500,
            body: "internal error".to_string(),
        }
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn ping(&self) -> Result<(), RegistryError> {
        self.record("ping".to_string());
        let remaining = self.unreachable_pings.load(Ordering::SeqCst);
        if remaining > 0 {
            self.unreachable_pings.store(remaining - 1, Ordering::SeqCst);
            return Err(RegistryError::Http {
                url: "http://127.0.0.1/api/v2.0/ping".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn find_registry(&self, name: &str) -> Result<Option<RegistryEndpoint>, RegistryError> {
        self.record(format!("find_registry {name}"));
        Ok(self.lock().registries.iter().find(|r| r.name == name).cloned())
    }

    async fn create_registry(&self, registry: &NewRegistry) -> Result<(), RegistryError> {
        self.record(format!("create_registry {}", registry.name));
        if self.fail_creates {
            return Err(self.rejected("/api/v2.0/registries"));
        }
        let mut state = self.lock();
        let id = state.registries.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        state.registries.push(RegistryEndpoint {
            id,
            name: registry.name.clone(),
            kind: registry.kind.clone(),
            url: registry.url.clone(),
        });
        Ok(())
    }

    async fn project_exists(&self, name: &str) -> Result<bool, RegistryError> {
        self.record(format!("project_exists {name}"));
        Ok(self.lock().projects.contains_key(name))
    }

    async fn create_project(&self, project: &NewProject) -> Result<(), RegistryError> {
        self.record(format!("create_project {}", project.project_name));
        if self.fail_creates {
            return Err(self.rejected("/api/v2.0/projects"));
        }
        self.lock()
            .projects
            .insert(project.project_name.clone(), project.registry_id);
        Ok(())
    }
}

/// Hands out one shared [`FakeRegistry`] and records the URLs connected to.
pub struct FakeConnector {
    registry: Arc<FakeRegistry>,
    urls: Mutex<Vec<String>>,
}

impl FakeConnector {
    #[must_use]
    pub fn new(registry: Arc<FakeRegistry>) -> Self {
        Self {
            registry,
            urls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().expect("urls lock poisoned").clone()
    }
}

impl RegistryConnector for FakeConnector {
    fn connect(
        &self,
        base_url: &str,
        _username: &str,
        _password: &str,
    ) -> Result<Arc<dyn RegistryApi>, RegistryError> {
        self.urls
            .lock()
            .expect("urls lock poisoned")
            .push(base_url.to_string());
        Ok(self.registry.clone())
    }
}
