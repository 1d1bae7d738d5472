use std::sync::RwLock;

use portbill_catalog::{RedevanceRate, ServiceDefinition};

use super::r#trait::{PersistenceError, ServiceCatalog};

/// In-memory service catalog.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryServiceCatalog {
    services: RwLock<Vec<ServiceDefinition>>,
    rate: RwLock<RedevanceRate>,
}

impl InMemoryServiceCatalog {
    pub fn new(services: Vec<ServiceDefinition>, rate: RedevanceRate) -> Self {
        Self {
            services: RwLock::new(services),
            rate: RwLock::new(rate),
        }
    }

    /// Insert a service, or replace the entry with the same id in place.
    pub fn upsert(&self, service: ServiceDefinition) -> Result<(), PersistenceError> {
        let mut services = self.services.write().map_err(|_| PersistenceError::Poisoned)?;
        match services.iter_mut().find(|s| s.id == service.id) {
            Some(existing) => *existing = service,
            None => services.push(service),
        }
        Ok(())
    }

    pub fn set_rate(&self, rate: RedevanceRate) -> Result<(), PersistenceError> {
        *self.rate.write().map_err(|_| PersistenceError::Poisoned)? = rate;
        Ok(())
    }
}

impl ServiceCatalog for InMemoryServiceCatalog {
    fn list_active_services(&self) -> Result<Vec<ServiceDefinition>, PersistenceError> {
        let services = self.services.read().map_err(|_| PersistenceError::Poisoned)?;
        Ok(services.iter().filter(|s| s.active).cloned().collect())
    }

    fn current_redevance_rate(&self) -> Result<RedevanceRate, PersistenceError> {
        Ok(*self.rate.read().map_err(|_| PersistenceError::Poisoned)?)
    }
}
