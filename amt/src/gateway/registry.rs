//! Reference-counted sharing of pseudo-interfaces.
//!
//! All callers tunnelling through the same relay discovery address share
//! one pseudo-interface.  The registry counts acquisitions per address
//! and tears the interface down when the last holder releases it.  Both
//! paths run under a single registry lock, so concurrent acquire and
//! release calls can never construct two interfaces for one address or
//! close one that still has holders.

use log::{debug, info};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::gateway::errors::GatewayError;
use crate::gateway::pseudo_interface::PseudoInterface;
use crate::gateway::transport::TransportFactory;
use crate::gateway::GatewayConfig;
use crate::nonce::NonceGenerator;
use crate::timer::TaskTimer;

struct RegistryEntry {
    interface: Arc<PseudoInterface>,
    reference_count: usize,
}

pub struct InterfaceRegistry {
    factory: Arc<dyn TransportFactory>,
    timer: Arc<TaskTimer>,
    nonces: Arc<NonceGenerator>,
    config: GatewayConfig,
    entries: Mutex<HashMap<IpAddr, RegistryEntry>>,
}

impl InterfaceRegistry {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        timer: Arc<TaskTimer>,
        nonces: Arc<NonceGenerator>,
        config: GatewayConfig,
    ) -> InterfaceRegistry {
        InterfaceRegistry {
            factory,
            timer,
            nonces,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the shared pseudo-interface for `relay_discovery_address`,
    /// constructing and starting it on the first acquisition.
    pub fn acquire(
        &self,
        relay_discovery_address: IpAddr,
    ) -> Result<Arc<PseudoInterface>, GatewayError> {
        let mut entries = self.lock();

        if let Some(entry) = entries.get_mut(&relay_discovery_address) {
            entry.reference_count += 1;
            debug!(
                "pseudo-interface for {} now held {} time(s)",
                relay_discovery_address, entry.reference_count
            );
            return Ok(entry.interface.clone());
        }

        let transport = self.factory.open(relay_discovery_address)?;
        let interface = Arc::new(PseudoInterface::new(
            transport,
            relay_discovery_address,
            &self.config,
            self.timer.clone(),
            self.nonces.clone(),
        ));
        interface.start()?;

        info!("opened pseudo-interface for {}", relay_discovery_address);
        entries.insert(
            relay_discovery_address,
            RegistryEntry {
                interface: interface.clone(),
                reference_count: 1,
            },
        );
        Ok(interface)
    }

    /// Drops one holder of the interface for `relay_discovery_address`,
    /// closing it when the count reaches zero.
    pub fn release(&self, relay_discovery_address: IpAddr) -> Result<(), GatewayError> {
        let mut entries = self.lock();

        let entry = entries
            .get_mut(&relay_discovery_address)
            .ok_or(GatewayError::InterfaceNotAcquired {
                address: relay_discovery_address,
            })?;

        entry.reference_count -= 1;
        if entry.reference_count > 0 {
            debug!(
                "pseudo-interface for {} still held {} time(s)",
                relay_discovery_address, entry.reference_count
            );
            return Ok(());
        }

        let entry = match entries.remove(&relay_discovery_address) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        info!("closing pseudo-interface for {}", relay_discovery_address);
        entry.interface.close()?;
        Ok(())
    }

    /// How many holders the interface for `relay_discovery_address`
    /// currently has.
    pub fn reference_count(&self, relay_discovery_address: IpAddr) -> usize {
        self.lock()
            .get(&relay_discovery_address)
            .map(|entry| entry.reference_count)
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, RegistryEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|error| error.into_inner())
    }
}
