//! Network-endpoint announcer
//!
//! Turns the ingress load-balancer address into `<service>.<ip>.nip.io` hostnames,
//! writes them into the `hosts` mapping of a tracked values file and hands the
//! change to GitOps: commit, optional push, then a hard refresh of the root
//! Application. Nothing is committed when the file already holds the hostnames.

use camino::{Utf8Path, Utf8PathBuf};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::io::Write;
use tracing::{debug, info};

use aksboot_cloud::Cloud;
use aksboot_config::RunConfig;
use aksboot_utils::BootstrapError;

use crate::gitops::ARGOCD_NAMESPACE;
use crate::manifests::read_metadata;

/// Wildcard DNS zone resolving `<name>.<ip>.nip.io` to `<ip>`.
pub const NIP_IO: &str = "nip.io";

/// Annotation asking Argo CD to re-read the source immediately.
pub const REFRESH_ANNOTATION: &str = "argocd.argoproj.io/refresh";

const HOSTS_KEY: &str = "hosts";

#[must_use]
pub fn hostname(service: &str, address: &str) -> String {
    format!("{service}.{address}.{NIP_IO}")
}

/// Hostname per declared service.
#[must_use]
pub fn hostnames(services: &[String], address: &str) -> BTreeMap<String, String> {
    services
        .iter()
        .map(|s| (s.clone(), hostname(s, address)))
        .collect()
}

/// Rewrite the `hosts` mapping of a YAML document.
///
/// Other top-level keys and unrelated entries under `hosts` are kept. Returns
/// `None` when the document already holds every hostname.
pub fn render_hosts(
    current: &str,
    hosts: &BTreeMap<String, String>,
    path: &Utf8Path,
) -> Result<Option<String>, BootstrapError> {
    let mut document = if current.trim().is_empty() {
        Mapping::new()
    } else {
        match serde_yaml::from_str::<Value>(current) {
            Ok(Value::Mapping(map)) => map,
            Ok(Value::Null) => Mapping::new(),
            Ok(_) => {
                return Err(BootstrapError::Manifest {
                    path: path.to_string(),
                    reason: "top level is not a mapping".to_string(),
                });
            }
            Err(e) => {
                return Err(BootstrapError::Manifest {
                    path: path.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    };

    let key = Value::String(HOSTS_KEY.to_string());
    let mut section = match document.get(&key) {
        Some(Value::Mapping(existing)) => existing.clone(),
        Some(Value::Null) | None => Mapping::new(),
        Some(_) => {
            return Err(BootstrapError::Manifest {
                path: path.to_string(),
                reason: format!("`{HOSTS_KEY}` is not a mapping"),
            });
        }
    };

    let mut changed = false;
    for (service, host) in hosts {
        let k = Value::String(service.clone());
        let v = Value::String(host.clone());
        if section.get(&k) != Some(&v) {
            section.insert(k, v);
            changed = true;
        }
    }
    if !changed && document.contains_key(&key) {
        return Ok(None);
    }

    document.insert(key, Value::Mapping(section));
    serde_yaml::to_string(&Value::Mapping(document))
        .map(Some)
        .map_err(|e| BootstrapError::Manifest {
            path: path.to_string(),
            reason: e.to_string(),
        })
}

/// Write via a temporary file in the same directory, then rename.
fn write_atomic(path: &Utf8Path, content: &str) -> Result<(), BootstrapError> {
    let dir = path.parent().filter(|p| !p.as_str().is_empty()).unwrap_or_else(|| Utf8Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path.as_std_path()).map_err(|e| e.error)?;
    Ok(())
}

/// What an announcement did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Announcement {
    pub hosts: BTreeMap<String, String>,
    pub file_changed: bool,
    pub committed: bool,
    pub pushed: bool,
    pub refreshed: bool,
}

/// Publishes hostnames for the ingress address through the GitOps repository.
pub struct EndpointAnnouncer<'a> {
    cloud: &'a Cloud,
    config: &'a RunConfig,
}

impl<'a> EndpointAnnouncer<'a> {
    #[must_use]
    pub fn new(cloud: &'a Cloud, config: &'a RunConfig) -> Self {
        Self { cloud, config }
    }

    fn values_path(&self) -> Utf8PathBuf {
        self.config.payload(&self.config.paths.hosts_values)
    }

    fn read_values(&self, path: &Utf8Path) -> Result<String, BootstrapError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// True when the file holds the hostnames and has nothing left to commit or push.
    pub async fn is_announced(&self, address: &str) -> Result<bool, BootstrapError> {
        let path = self.values_path();
        let hosts = hostnames(&self.config.announce_services, address);
        if render_hosts(&self.read_values(&path)?, &hosts, &path)?.is_some() {
            return Ok(false);
        }
        let repo = &self.config.repo_root;
        if self.cloud.git.is_dirty(repo, &path).await? {
            return Ok(false);
        }
        Ok(!self.config.git_push || self.cloud.git.unpushed_commits(repo).await? == 0)
    }

    pub async fn announce(&self, address: &str) -> Result<Announcement, BootstrapError> {
        let path = self.values_path();
        let hosts = hostnames(&self.config.announce_services, address);
        let mut outcome = Announcement {
            hosts: hosts.clone(),
            ..Announcement::default()
        };

        if let Some(updated) = render_hosts(&self.read_values(&path)?, &hosts, &path)? {
            write_atomic(&path, &updated)?;
            outcome.file_changed = true;
            info!(path = %path, address = %address, "hosts values updated");
        } else {
            debug!(path = %path, "hosts values already current");
        }

        // a commit that failed on a previous run leaves the file dirty
        let repo = &self.config.repo_root;
        if self.cloud.git.is_dirty(repo, &path).await? {
            let message = format!("Announce endpoints at {address}");
            self.cloud.git.commit_file(repo, &path, &message).await?;
            outcome.committed = true;
        }

        // and a push that failed leaves the branch ahead of its upstream
        if self.config.git_push
            && (outcome.committed || self.cloud.git.unpushed_commits(repo).await? > 0)
        {
            self.cloud.git.push(repo).await?;
            outcome.pushed = true;
        }

        if !outcome.committed && !outcome.pushed {
            return Ok(outcome);
        }

        let root_app = self.config.payload(&self.config.paths.root_application);
        let meta = read_metadata(&root_app)?;
        let name = meta.name;
        let namespace = meta.namespace.unwrap_or_else(|| ARGOCD_NAMESPACE.to_string());
        self.cloud
            .kubectl
            .annotate("application", &name, Some(&namespace), REFRESH_ANNOTATION, "hard")
            .await?;
        outcome.refreshed = true;

        info!(
            address = %address,
            pushed = outcome.pushed,
            application = %name,
            "endpoints announced"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aksboot_runner::ProcessOutput;
    use aksboot_runner::test_support::ScriptedRunner;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    const ROOT_APP: &str = "apiVersion: argoproj.io/v1alpha1\nkind: Application\nmetadata:\n  name: gws-root\n  namespace: argocd\n";

    fn services() -> Vec<String> {
        ["argocd", "dashboard", "harbor"].iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_hostnames_for_documentation_address() {
        let hosts = hostnames(&services(), "203.0.113.5");
        assert_eq!(hosts["argocd"], "argocd.203.0.113.5.nip.io");
        assert_eq!(hosts["dashboard"], "dashboard.203.0.113.5.nip.io");
        assert_eq!(hosts["harbor"], "harbor.203.0.113.5.nip.io");
    }

    #[test]
    fn test_render_keeps_other_keys() {
        let current = "replicas: 2\nhosts:\n  grafana: grafana.example.com\n";
        let rendered = render_hosts(current, &hostnames(&services(), "203.0.113.5"), Utf8Path::new("v.yaml"))
            .unwrap()
            .unwrap();
        let doc: Value = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(doc["replicas"].as_u64(), Some(2));
        assert_eq!(doc["hosts"]["grafana"].as_str(), Some("grafana.example.com"));
        assert_eq!(doc["hosts"]["harbor"].as_str(), Some("harbor.203.0.113.5.nip.io"));
    }

    #[test]
    fn test_render_rejects_non_mapping() {
        let err = render_hosts("- a\n- b\n", &BTreeMap::new(), Utf8Path::new("v.yaml")).unwrap_err();
        assert!(matches!(err, BootstrapError::Manifest { .. }));
        let err = render_hosts("hosts: [a]\n", &BTreeMap::new(), Utf8Path::new("v.yaml")).unwrap_err();
        assert!(matches!(err, BootstrapError::Manifest { .. }));
    }

    /// A repository whose `git status` reports the values file dirty until committed,
    /// and whose branch stays ahead of its upstream until a push succeeds.
    fn fake_git(runner: &ScriptedRunner, values: Utf8PathBuf) -> Arc<Mutex<u32>> {
        let committed = Arc::new(Mutex::new(String::new()));
        let ahead = Arc::new(Mutex::new(0u32));
        let status_view = committed.clone();
        let status_path = values.clone();
        runner.on(&["git", "status"], move |_| {
            let on_disk = std::fs::read_to_string(&status_path).unwrap_or_default();
            if on_disk == *status_view.lock().unwrap() {
                ProcessOutput::ok("")
            } else {
                ProcessOutput::ok(" M gitops/values/hosts.yaml\n")
            }
        });
        runner.respond(&["git", "add"], ProcessOutput::ok(""));
        let commit_view = committed.clone();
        let commit_ahead = ahead.clone();
        runner.on(&["git", "commit"], move |_| {
            *commit_view.lock().unwrap() = std::fs::read_to_string(&values).unwrap();
            *commit_ahead.lock().unwrap() += 1;
            ProcessOutput::ok("")
        });
        let count_view = ahead.clone();
        runner.on(&["git", "rev-list"], move |_| {
            ProcessOutput::ok(format!("{}\n", count_view.lock().unwrap()))
        });
        let push_ahead = ahead.clone();
        runner.on(&["git", "push"], move |_| {
            *push_ahead.lock().unwrap() = 0;
            ProcessOutput::ok("")
        });
        runner.respond(&["kubectl", "annotate"], ProcessOutput::ok(""));
        ahead
    }

    fn repo() -> (TempDir, RunConfig) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("gitops/values")).unwrap();
        std::fs::write(root.join("gitops/values/hosts.yaml"), "ingress:\n  className: nginx\n").unwrap();
        std::fs::write(root.join("gitops/root-app.yaml"), ROOT_APP).unwrap();
        let config = RunConfig {
            repo_root: root,
            ..RunConfig::default()
        };
        (dir, config)
    }

    #[tokio::test]
    async fn test_second_announcement_is_a_no_op() {
        let (_dir, config) = repo();
        let runner = Arc::new(ScriptedRunner::new());
        fake_git(&runner, config.payload(&config.paths.hosts_values));
        let cloud = Cloud::new(runner.clone(), Duration::from_secs(5));
        let announcer = EndpointAnnouncer::new(&cloud, &config);

        let first = announcer.announce("203.0.113.5").await.unwrap();
        assert!(first.file_changed && first.committed && first.pushed && first.refreshed);
        let annotate = &runner.calls_matching(&["kubectl", "annotate"])[0];
        assert!(annotate.contains(&"gws-root".to_string()));
        assert!(annotate.contains(&"argocd.argoproj.io/refresh=hard".to_string()));

        runner.clear_calls();
        assert!(announcer.is_announced("203.0.113.5").await.unwrap());
        let second = announcer.announce("203.0.113.5").await.unwrap();
        assert_eq!(
            second,
            Announcement {
                hosts: first.hosts.clone(),
                ..Announcement::default()
            }
        );
        assert!(runner.calls_matching(&["git", "commit"]).is_empty());
        assert!(runner.calls_matching(&["kubectl", "annotate"]).is_empty());

        let text = std::fs::read_to_string(config.payload(&config.paths.hosts_values)).unwrap();
        assert!(text.contains("className: nginx"));
        assert!(text.contains("argocd.203.0.113.5.nip.io"));
    }

    #[tokio::test]
    async fn test_failed_commit_is_retried_next_run() {
        let (_dir, config) = repo();
        let runner = Arc::new(ScriptedRunner::new());
        fake_git(&runner, config.payload(&config.paths.hosts_values));
        runner.respond(&["git", "commit"], ProcessOutput::failed(1, "fatal: unable to auto-detect email address"));
        let cloud = Cloud::new(runner.clone(), Duration::from_secs(5));
        let announcer = EndpointAnnouncer::new(&cloud, &config);

        assert!(announcer.announce("203.0.113.5").await.is_err());
        assert!(!announcer.is_announced("203.0.113.5").await.unwrap());

        let retry = announcer.announce("203.0.113.5").await;
        assert!(retry.is_err());
        // the file is already current, only the commit is attempted again
        assert_eq!(runner.calls_matching(&["git", "commit"]).len(), 2);
    }

    #[tokio::test]
    async fn test_failed_push_is_retried_next_run() {
        let (_dir, config) = repo();
        let runner = Arc::new(ScriptedRunner::new());
        let ahead = fake_git(&runner, config.payload(&config.paths.hosts_values));
        runner.respond(&["git", "push"], ProcessOutput::failed(1, "fatal: unable to access remote"));
        let cloud = Cloud::new(runner.clone(), Duration::from_secs(5));
        let announcer = EndpointAnnouncer::new(&cloud, &config);

        assert!(announcer.announce("203.0.113.5").await.is_err());
        assert_eq!(*ahead.lock().unwrap(), 1);
        assert!(runner.calls_matching(&["kubectl", "annotate"]).is_empty());
        assert!(!announcer.is_announced("203.0.113.5").await.unwrap());

        // remote reachable again
        let push_ahead = ahead.clone();
        runner.on(&["git", "push"], move |_| {
            *push_ahead.lock().unwrap() = 0;
            ProcessOutput::ok("")
        });
        let rerun = announcer.announce("203.0.113.5").await.unwrap();
        assert!(!rerun.committed && rerun.pushed && rerun.refreshed);
        assert_eq!(runner.calls_matching(&["git", "commit"]).len(), 1);
        assert_eq!(runner.calls_matching(&["git", "push"]).len(), 2);
        assert_eq!(runner.calls_matching(&["kubectl", "annotate"]).len(), 1);
        assert!(announcer.is_announced("203.0.113.5").await.unwrap());
    }

    #[tokio::test]
    async fn test_push_disabled() {
        let (_dir, mut config) = repo();
        config.git_push = false;
        let runner = Arc::new(ScriptedRunner::new());
        fake_git(&runner, config.payload(&config.paths.hosts_values));
        let cloud = Cloud::new(runner.clone(), Duration::from_secs(5));

        let outcome = EndpointAnnouncer::new(&cloud, &config)
            .announce("203.0.113.5")
            .await
            .unwrap();
        assert!(outcome.committed && !outcome.pushed && outcome.refreshed);
        assert!(runner.calls_matching(&["git", "push"]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_hostname_embeds_service_and_address(
            service in "[a-z][a-z0-9-]{0,20}",
            octets in proptest::array::uniform4(0u8..=255),
        ) {
            let address = format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]);
            let host = hostname(&service, &address);
            let expected_prefix = format!("{service}.");
            prop_assert!(host.starts_with(&expected_prefix));
            prop_assert!(host.ends_with(".nip.io"));
            let middle = &host[service.len() + 1..host.len() - ".nip.io".len()];
            prop_assert_eq!(middle, address.as_str());
        }

        #[test]
        fn prop_render_is_idempotent(
            services in proptest::collection::btree_set("[a-z]{1,10}", 1..5),
            last_octet in 1u8..=254,
        ) {
            let services: Vec<String> = services.into_iter().collect();
            let hosts = hostnames(&services, &format!("198.51.100.{last_octet}"));
            let path = Utf8Path::new("hosts.yaml");
            let once = render_hosts("hosts: {}\n", &hosts, path).unwrap().unwrap();
            prop_assert_eq!(render_hosts(&once, &hosts, path).unwrap(), None);
        }
    }
}
