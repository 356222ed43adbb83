// ── Sensor dispatch ──
//
// Turns entities into registration or update requests, sends them through
// an `ApiClient`, and reconciles the response with local state. A
// `disabled` flag in an update response is the only place a remote answer
// changes local control state. First contact for a sensor ID goes through a
// per-ID gate so concurrent dispatches register it once.

use std::sync::Arc;

use dashmap::DashMap;
use sensorlink_api::{ApiClient, Request, SensorRegistration, SensorState};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CoreError, HandleSensorError};
use crate::model::Entity;
use crate::store::{Registry, Tracker};

/// What [`Dispatcher::dispatch`] did with an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Registered with the remote for the first time.
    Registered,
    /// Sent as a state update.
    Updated,
    /// Not sent: the sensor is disabled locally.
    Skipped,
}

pub struct Dispatcher {
    api: Arc<dyn ApiClient>,
    registry: Arc<dyn Registry>,
    tracker: Arc<Tracker>,
    url: Url,
    registering: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl Dispatcher {
    pub fn new(
        api: Arc<dyn ApiClient>,
        registry: Arc<dyn Registry>,
        tracker: Arc<Tracker>,
        url: Url,
    ) -> Self {
        Self {
            api,
            registry,
            tracker,
            url,
            registering: DashMap::new(),
        }
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Route one entity: skip if disabled, register if new, otherwise
    /// update. Successfully handled entities are recorded in the tracker.
    pub async fn dispatch(&self, entity: Entity) -> Result<Outcome, CoreError> {
        let id = entity.id().to_owned();

        if self.registry.is_disabled(&id) {
            debug!(sensor = %id, "sensor disabled, not sending");
            return Ok(Outcome::Skipped);
        }

        let outcome = if self.registry.is_registered(&id) {
            self.update(&entity).await?;
            Outcome::Updated
        } else {
            self.first_contact(&entity).await?
        };

        self.tracker.add(entity)?;
        Ok(outcome)
    }

    /// Register an unknown sensor, or update it if a concurrent dispatch
    /// registered it while this one waited at the gate.
    async fn first_contact(&self, entity: &Entity) -> Result<Outcome, HandleSensorError> {
        let id = entity.id();
        let gate = Arc::clone(self.registering.entry(id.to_owned()).or_default().value());

        let result = {
            let _held = gate.lock().await;
            if self.registry.is_registered(id) {
                self.update(entity).await.map(|()| Outcome::Updated)
            } else {
                self.register(entity).await.map(|()| Outcome::Registered)
            }
        };

        drop(gate);
        self.registering
            .remove_if(id, |_, gate| Arc::strong_count(gate) == 1);
        result
    }

    /// Send a registration carrying the entity's full metadata.
    pub async fn register(&self, entity: &Entity) -> Result<(), HandleSensorError> {
        let id = entity.id();
        let registration = SensorRegistration::try_from(entity)?;
        let request = Request::registration(registration).with_retryable(entity.is_retryable());

        let response = self.api.send_request(&self.url, &request).await?;
        let status = response.registration().map_err(HandleSensorError::Decode)?;

        match status.has_success() {
            Ok(true) => {}
            Ok(false) => {
                return Err(HandleSensorError::RegistrationFailed { id: id.to_owned() });
            }
            Err(e) => {
                return Err(HandleSensorError::Indeterminate {
                    id: id.to_owned(),
                    reason: e.to_string(),
                });
            }
        }

        if let Err(e) = self.registry.set_registered(id) {
            // The remote knows the sensor; at worst it is registered again.
            warn!(sensor = %id, error = %e, "could not record registration");
        }
        info!(sensor = %id, "sensor registered");
        Ok(())
    }

    /// Send a state update for one entity.
    pub async fn update(&self, entity: &Entity) -> Result<(), HandleSensorError> {
        self.update_batch(std::slice::from_ref(entity)).await
    }

    /// Send one update request for many entities and reconcile every
    /// per-sensor status. A failure for one sensor never stops the others
    /// from being reconciled; all failures are returned together.
    pub async fn update_batch(&self, entities: &[Entity]) -> Result<(), HandleSensorError> {
        if entities.is_empty() {
            return Ok(());
        }

        let states = entities
            .iter()
            .map(SensorState::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let retryable = entities.iter().all(Entity::is_retryable);
        let request = Request::update(states).with_retryable(retryable);

        let response = self.api.send_request(&self.url, &request).await?;
        let statuses = response.sensor_states().map_err(HandleSensorError::Decode)?;

        let mut errors = Vec::new();
        for (id, status) in &statuses {
            if let Some(error) = status.has_error() {
                errors.push(HandleSensorError::Remote {
                    id: id.clone(),
                    error,
                });
                continue;
            }

            match status.has_success() {
                Err(e) => errors.push(HandleSensorError::Indeterminate {
                    id: id.clone(),
                    reason: e.to_string(),
                }),
                Ok(false) => errors.push(HandleSensorError::Unsuccessful { id: id.clone() }),
                Ok(true) if status.sensor_disabled() => {
                    if let Err(e) = self.disable(id) {
                        errors.push(e);
                    }
                }
                Ok(true) => debug!(sensor = %id, "sensor updated"),
            }
        }

        for e in &errors {
            warn!(error = %e, "sensor update failed");
        }
        HandleSensorError::join(errors)
    }

    fn disable(&self, id: &str) -> Result<(), HandleSensorError> {
        if self.registry.is_disabled(id) {
            return Ok(());
        }
        info!(sensor = %id, "sensor disabled by remote");
        self.registry
            .disable_sensor(id)
            .map_err(|e| HandleSensorError::Disable {
                id: id.to_owned(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sensorlink_api::{RequestType, Response};
    use serde_json::{Value, json};

    use super::*;
    use crate::store::MemoryRegistry;

    /// Replies with a canned body per request type and records requests.
    struct MockApi {
        register: Value,
        update: Value,
        sent: Mutex<Vec<Value>>,
    }

    impl MockApi {
        fn new(register: Value, update: Value) -> Arc<Self> {
            Arc::new(Self {
                register,
                update,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ApiClient for MockApi {
        async fn send_request(
            &self,
            _url: &Url,
            request: &Request,
        ) -> Result<Response, sensorlink_api::Error> {
            self.sent.lock().push(serde_json::to_value(request).unwrap());
            let body = match request.kind() {
                RequestType::RegisterSensor => self.register.clone(),
                _ => self.update.clone(),
            };
            Ok(Response::from_value(body))
        }
    }

    /// Registry that counts disable calls.
    #[derive(Default)]
    struct CountingRegistry {
        inner: MemoryRegistry,
        disables: AtomicUsize,
    }

    impl Registry for CountingRegistry {
        fn is_disabled(&self, id: &str) -> bool {
            self.inner.is_disabled(id)
        }

        fn disable_sensor(&self, id: &str) -> Result<(), CoreError> {
            self.disables.fetch_add(1, Ordering::SeqCst);
            self.inner.disable_sensor(id)
        }

        fn is_registered(&self, id: &str) -> bool {
            self.inner.is_registered(id)
        }

        fn set_registered(&self, id: &str) -> Result<(), CoreError> {
            self.inner.set_registered(id)
        }
    }

    fn url() -> Url {
        Url::parse("http://sink.local/api/webhook/abc").unwrap()
    }

    fn entity(id: &str, value: i64) -> Entity {
        Entity::builder(id, id).value(value).build().unwrap()
    }

    fn dispatcher(api: Arc<MockApi>, registry: Arc<dyn Registry>) -> Dispatcher {
        Dispatcher::new(api, registry, Arc::new(Tracker::new()), url())
    }

    #[tokio::test]
    async fn remote_disable_calls_registry_once_and_is_not_an_error() {
        let api = MockApi::new(
            json!({"success": true}),
            json!({"fan": {"success": true, "is_disabled": true}}),
        );
        let registry = Arc::new(CountingRegistry::default());
        let d = dispatcher(api, registry.clone());

        d.update(&entity("fan", 1)).await.unwrap();
        assert_eq!(registry.disables.load(Ordering::SeqCst), 1);
        assert!(registry.is_disabled("fan"));

        // Already disabled locally: not disabled again.
        d.update(&entity("fan", 2)).await.unwrap();
        assert_eq!(registry.disables.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_error_names_sensor_and_spares_the_rest() {
        let api = MockApi::new(
            json!({"success": true}),
            json!({
                "a": {"success": false, "error": {"code": "invalid_format", "message": "bad state"}},
                "b": {"success": true},
                "c": {"success": true, "is_disabled": true}
            }),
        );
        let registry = Arc::new(CountingRegistry::default());
        let d = dispatcher(api, registry.clone());

        let err = d
            .update_batch(&[entity("a", 1), entity("b", 2), entity("c", 3)])
            .await
            .unwrap_err();

        assert_eq!(err.sensor_ids(), vec!["a"]);
        assert!(err.to_string().contains("sensor update failed for a"));
        assert!(err.to_string().contains("invalid_format"));
        assert_eq!(registry.disables.load(Ordering::SeqCst), 1);
        assert!(registry.is_disabled("c"));
        assert!(!registry.is_disabled("b"));
    }

    #[tokio::test]
    async fn indeterminate_and_unsuccessful_are_distinct() {
        let api = MockApi::new(
            json!({"success": true}),
            json!({"x": {"success": "maybe"}, "y": {"success": false}}),
        );
        let d = dispatcher(api, Arc::new(MemoryRegistry::new()));

        let err = d
            .update_batch(&[entity("x", 1), entity("y", 2)])
            .await
            .unwrap_err();
        let HandleSensorError::Multiple(errors) = err else {
            panic!("expected aggregated errors");
        };
        assert!(matches!(&errors[0], HandleSensorError::Indeterminate { id, .. } if id == "x"));
        assert!(matches!(&errors[1], HandleSensorError::Unsuccessful { id } if id == "y"));
    }

    #[tokio::test]
    async fn absent_success_counts_as_success() {
        let api = MockApi::new(json!({"success": true}), json!({"x": {}}));
        let d = dispatcher(api, Arc::new(MemoryRegistry::new()));
        d.update(&entity("x", 1)).await.unwrap();
    }

    #[tokio::test]
    async fn failed_registration_is_a_hard_failure() {
        let api = MockApi::new(json!({"success": false}), json!({}));
        let registry = Arc::new(MemoryRegistry::new());
        let d = dispatcher(api, registry.clone());

        let err = d.dispatch(entity("new", 1)).await.unwrap_err();
        assert!(err.is_handle_sensor());
        assert!(!registry.is_registered("new"));
        assert!(d.tracker().get("new").is_err());
    }

    #[tokio::test]
    async fn dispatch_registers_then_updates_and_tracks() {
        let api = MockApi::new(json!({"success": true}), json!({"temp": {"success": true}}));
        let registry = Arc::new(MemoryRegistry::new());
        let d = dispatcher(api.clone(), registry.clone());

        assert_eq!(d.dispatch(entity("temp", 20)).await.unwrap(), Outcome::Registered);
        assert!(registry.is_registered("temp"));
        assert_eq!(d.dispatch(entity("temp", 21)).await.unwrap(), Outcome::Updated);

        let kinds: Vec<Value> = api.sent.lock().iter().map(|r| r["type"].clone()).collect();
        assert_eq!(kinds, vec![json!("register_sensor"), json!("update_sensor_states")]);

        let tracked = d.tracker().get("temp").unwrap();
        assert_eq!(tracked.value(), entity("temp", 21).value());
    }

    /// Delays registration replies so concurrent dispatches overlap.
    struct SlowRegister(Arc<MockApi>);

    #[async_trait]
    impl ApiClient for SlowRegister {
        async fn send_request(
            &self,
            url: &Url,
            request: &Request,
        ) -> Result<Response, sensorlink_api::Error> {
            if request.kind() == RequestType::RegisterSensor {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            self.0.send_request(url, request).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_first_dispatches_register_once() {
        let api = MockApi::new(json!({"success": true}), json!({"temp": {"success": true}}));
        let registry = Arc::new(MemoryRegistry::new());
        let d = Dispatcher::new(
            Arc::new(SlowRegister(api.clone())),
            registry.clone(),
            Arc::new(Tracker::new()),
            url(),
        );

        let (first, second) = tokio::join!(d.dispatch(entity("temp", 1)), d.dispatch(entity("temp", 2)));
        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.sort_by_key(|o| *o == Outcome::Updated);
        assert_eq!(outcomes, vec![Outcome::Registered, Outcome::Updated]);

        let registrations = api
            .sent
            .lock()
            .iter()
            .filter(|r| r["type"] == json!("register_sensor"))
            .count();
        assert_eq!(registrations, 1);
        assert!(registry.is_registered("temp"));
        assert!(d.registering.is_empty());
    }

    #[tokio::test]
    async fn disabled_sensors_are_skipped() {
        let api = MockApi::new(json!({"success": true}), json!({}));
        let registry = Arc::new(MemoryRegistry::new());
        registry.disable_sensor("quiet").unwrap();
        let d = dispatcher(api.clone(), registry);

        assert_eq!(d.dispatch(entity("quiet", 1)).await.unwrap(), Outcome::Skipped);
        assert!(api.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn entity_without_state_fails_request_construction() {
        let api = MockApi::new(json!({"success": true}), json!({}));
        let d = dispatcher(api.clone(), Arc::new(MemoryRegistry::new()));
        let bare = Entity::builder("bare", "Bare").build().unwrap();

        assert!(matches!(
            d.update(&bare).await,
            Err(HandleSensorError::InvalidRequest { .. })
        ));
        assert!(api.sent.lock().is_empty());
    }
}
