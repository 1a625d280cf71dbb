//! Test fixtures and fake implementations for integration testing
#![allow(dead_code)]

use arena_broker::matchmaker::{AdmissionPolicy, Matchmaker};
use arena_broker::metrics::MetricsCollector;
use arena_broker::provision::{
    ClusterApi, ClusterError, Provisioner, ProvisionerConfig, ReadinessProbe, RetryPolicy,
    UnitInstance, UnitSpec,
};
use arena_broker::queue::LocalQueueStore;
use arena_broker::store::{ActiveSessionIndex, InMemorySessionStore};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-process cluster API with injectable failures.
#[derive(Default)]
pub struct FakeClusterApi {
    units: Mutex<HashSet<String>>,
    endpoints: Mutex<HashSet<String>>,
    /// Port the fake reports for any existing endpoint
    assigned_port: Mutex<u16>,
    node_addr: Mutex<Option<String>>,
    /// When set, every unit instance reports running + ready
    all_ready: AtomicBool,
    /// Forced failures remaining per unit name for delete_unit
    delete_failures: Mutex<HashMap<String, u32>>,
    fail_port_reads: AtomicBool,
    pub unit_creates: AtomicUsize,
    pub unit_delete_attempts: AtomicUsize,
}

impl FakeClusterApi {
    pub fn new() -> Self {
        let fake = Self::default();
        *fake.assigned_port.lock().unwrap() = 30777;
        *fake.node_addr.lock().unwrap() = Some("10.0.0.5".to_string());
        fake.all_ready.store(true, Ordering::SeqCst);
        fake
    }

    pub fn set_assigned_port(&self, port: u16) {
        *self.assigned_port.lock().unwrap() = port;
    }

    pub fn set_node_addr(&self, addr: Option<&str>) {
        *self.node_addr.lock().unwrap() = addr.map(str::to_string);
    }

    pub fn set_all_ready(&self, ready: bool) {
        self.all_ready.store(ready, Ordering::SeqCst);
    }

    pub fn fail_port_reads(&self) {
        self.fail_port_reads.store(true, Ordering::SeqCst);
    }

    /// Make the next `count` delete_unit calls for `name` fail.
    pub fn fail_unit_deletes(&self, name: &str, count: u32) {
        self.delete_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), count);
    }

    pub fn insert_unit(&self, name: &str) {
        self.units.lock().unwrap().insert(name.to_string());
        self.endpoints.lock().unwrap().insert(name.to_string());
    }

    pub fn has_unit(&self, name: &str) -> bool {
        self.units.lock().unwrap().contains(name)
    }

    pub fn unit_count(&self) -> usize {
        self.units.lock().unwrap().len()
    }
}

#[async_trait]
impl ClusterApi for FakeClusterApi {
    async fn create_unit(&self, spec: &UnitSpec) -> Result<(), ClusterError> {
        self.unit_creates.fetch_add(1, Ordering::SeqCst);
        let mut units = self.units.lock().unwrap();
        if !units.insert(spec.name.clone()) {
            return Err(ClusterError::AlreadyExists {
                name: spec.name.clone(),
            });
        }
        Ok(())
    }

    async fn delete_unit(&self, name: &str) -> Result<(), ClusterError> {
        self.unit_delete_attempts.fetch_add(1, Ordering::SeqCst);

        let mut failures = self.delete_failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClusterError::Api {
                    message: "injected delete failure".to_string(),
                });
            }
        }
        drop(failures);

        if self.units.lock().unwrap().remove(name) {
            Ok(())
        } else {
            Err(ClusterError::NotFound {
                name: name.to_string(),
            })
        }
    }

    async fn create_endpoint(&self, spec: &UnitSpec) -> Result<(), ClusterError> {
        let mut endpoints = self.endpoints.lock().unwrap();
        if !endpoints.insert(spec.name.clone()) {
            return Err(ClusterError::AlreadyExists {
                name: spec.name.clone(),
            });
        }
        Ok(())
    }

    async fn delete_endpoint(&self, name: &str) -> Result<(), ClusterError> {
        if self.endpoints.lock().unwrap().remove(name) {
            Ok(())
        } else {
            Err(ClusterError::NotFound {
                name: name.to_string(),
            })
        }
    }

    async fn endpoint_port(&self, name: &str) -> Result<u16, ClusterError> {
        if self.fail_port_reads.load(Ordering::SeqCst) {
            return Err(ClusterError::Api {
                message: "port not assigned yet".to_string(),
            });
        }
        if !self.endpoints.lock().unwrap().contains(name) {
            return Err(ClusterError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(*self.assigned_port.lock().unwrap())
    }

    async fn unit_instances(&self, _session_id: &str) -> Result<Vec<UnitInstance>, ClusterError> {
        let ready = self.all_ready.load(Ordering::SeqCst);
        Ok(vec![UnitInstance {
            running: true,
            ready,
        }])
    }

    async fn list_unit_names(&self) -> Result<Vec<String>, ClusterError> {
        let mut names: Vec<String> = self.units.lock().unwrap().iter().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn node_address(&self) -> Result<Option<String>, ClusterError> {
        Ok(self.node_addr.lock().unwrap().clone())
    }
}

/// Provisioner configuration with no real-time pauses, for tests that do not
/// run under a paused clock.
pub fn fast_provisioner_config() -> ProvisionerConfig {
    ProvisionerConfig {
        unit_port: 8080,
        connect_host_override: None,
        endpoint_read_delay: Duration::ZERO,
        destroy_retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        },
        readiness: ReadinessProbe {
            interval: Duration::from_millis(10),
            deadline: Duration::from_millis(200),
        },
    }
}

/// Fully wired matchmaker over in-process fakes.
pub struct TestHarness {
    pub matchmaker: Matchmaker,
    pub store: Arc<InMemorySessionStore>,
    pub cluster: Arc<FakeClusterApi>,
    pub metrics: Arc<MetricsCollector>,
}

pub fn harness() -> TestHarness {
    harness_with_policy(AdmissionPolicy::default())
}

pub fn harness_with_policy(policy: AdmissionPolicy) -> TestHarness {
    let queue = Arc::new(LocalQueueStore::new());
    let store = Arc::new(InMemorySessionStore::new());
    let cluster = Arc::new(FakeClusterApi::new());
    let provisioner = Arc::new(Provisioner::new(cluster.clone(), fast_provisioner_config()));
    let metrics = Arc::new(MetricsCollector::new().expect("metrics"));

    let matchmaker = Matchmaker::new(
        queue,
        store.clone(),
        ActiveSessionIndex::disabled(),
        provisioner,
        policy,
        "test-backend".to_string(),
        metrics.clone(),
    );

    TestHarness {
        matchmaker,
        store,
        cluster,
        metrics,
    }
}

/// Distinct player ids in enqueue order.
pub fn player_ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("player-{i:02}")).collect()
}
