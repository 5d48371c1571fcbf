use std::collections::BTreeMap;
use std::collections::BTreeSet;

use motion_dimmer::MotionDimmer;

use super::message::ServiceTarget;
use super::port::HostPort;
use super::services::ServiceError;

/// Every running dimmer, keyed by device id.
#[derive(Default)]
pub struct Registry {
    dimmers: BTreeMap<String, MotionDimmer<HostPort>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dimmer: MotionDimmer<HostPort>) {
        let device_id = dimmer.port().device_id().to_string();
        self.dimmers.insert(device_id, dimmer);
    }

    pub fn len(&self) -> usize {
        self.dimmers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimmers.is_empty()
    }

    pub fn get_mut(&mut self, device_id: &str) -> Option<&mut MotionDimmer<HostPort>> {
        self.dimmers.get_mut(device_id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut MotionDimmer<HostPort>)> {
        self.dimmers.iter_mut()
    }

    /// Devices with `entity_id` among their triggers.
    pub fn triggered_by(&self, entity_id: &str) -> Vec<String> {
        self.matching(|dimmer| dimmer.port().config().triggers.iter().any(|t| t == entity_id))
    }

    /// Devices with `entity_id` among their predictors.
    pub fn predicted_by(&self, entity_id: &str) -> Vec<String> {
        self.matching(|dimmer| {
            dimmer
                .port()
                .config()
                .predictors
                .iter()
                .any(|p| p == entity_id)
        })
    }

    /// The device managing light `entity_id`.
    pub fn managing(&self, entity_id: &str) -> Option<String> {
        self.matching(|dimmer| dimmer.port().config().dimmer == entity_id)
            .into_iter()
            .next()
    }

    /// The device owning control entity `entity_id`.
    pub fn owner_of(&self, entity_id: &str) -> Option<&str> {
        self.dimmers.iter().find_map(|(device_id, dimmer)| {
            let port = dimmer.port();
            let segments = port.config().segments.iter().map(|s| s.slug.as_str());
            port.ids()
                .all(segments)
                .iter()
                .any(|id| id == entity_id)
                .then_some(device_id.as_str())
        })
    }

    /// Resolve a service target to sorted, deduplicated device ids.
    pub fn resolve(&self, target: &ServiceTarget) -> Result<Vec<String>, ServiceError> {
        if target.device_id.is_empty() && target.entity_id.is_empty() {
            return Err(ServiceError::NoTarget);
        }

        let mut devices = BTreeSet::new();
        for device_id in &target.device_id {
            let (key, _) = self
                .dimmers
                .get_key_value(device_id)
                .ok_or_else(|| ServiceError::UnknownDevice(device_id.clone()))?;
            devices.insert(key.clone());
        }
        for entity_id in &target.entity_id {
            let owner = self
                .owner_of(entity_id)
                .ok_or_else(|| ServiceError::UnknownEntity(entity_id.clone()))?;
            devices.insert(owner.to_string());
        }

        Ok(devices.into_iter().collect())
    }

    fn matching(&self, pred: impl Fn(&MotionDimmer<HostPort>) -> bool) -> Vec<String> {
        self.dimmers
            .iter()
            .filter(|(_, dimmer)| pred(dimmer))
            .map(|(device_id, _)| device_id.clone())
            .collect()
    }
}
