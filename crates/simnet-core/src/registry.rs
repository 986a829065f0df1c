//! Bring-up and teardown of the device pair

use crate::config::{DEVICE_COUNT, DriverConfig, Wiring};
use crate::device::{Device, NetDevice};
use crate::error::{DriverError, Result};
use crate::stack::HostStack;
use std::sync::Arc;

/// The registered device pair
///
/// Dropping the registry unregisters both devices and frees their pools.
pub struct DeviceRegistry {
    devices: Vec<Arc<Device>>,
    stack: Arc<dyn HostStack>,
    config: Arc<DriverConfig>,
    registered: bool,
}

impl DeviceRegistry {
    /// Create, wire and register both devices.
    ///
    /// Registration is all-or-nothing: if the stack refuses either device,
    /// every device registered so far is unregistered again and all pools are
    /// torn down before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidConfig`] for an unusable configuration
    /// and [`DriverError::Registration`] if the stack refuses a device.
    pub fn bring_up(config: DriverConfig, stack: Arc<dyn HostStack>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let devices: Vec<Arc<Device>> = (0..DEVICE_COUNT)
            .map(|i| Device::new(i, Arc::clone(&config), Arc::clone(&stack)))
            .collect();
        wire(&devices, config.wiring);

        let mut registered: Vec<&str> = Vec::with_capacity(devices.len());
        for dev in &devices {
            if let Err(source) = stack.register(Arc::clone(dev) as Arc<dyn NetDevice>) {
                tracing::error!(device = dev.name(), error = %source, "registration failed");
                for name in registered.iter().rev() {
                    stack.unregister(name);
                }
                for dev in &devices {
                    dev.teardown_pool();
                }
                return Err(DriverError::Registration {
                    device: dev.name().to_string(),
                    source,
                });
            }
            registered.push(dev.name());
        }

        tracing::info!(
            devices = ?registered,
            wiring = ?config.wiring,
            rx_mode = ?config.rx_mode,
            lockup = config.lockup_simulated,
            "device pair registered"
        );

        Ok(Self {
            devices,
            stack,
            config,
            registered: true,
        })
    }

    /// Both devices, in index order
    #[must_use]
    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    /// Device at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<Device>> {
        self.devices.get(index)
    }

    /// Device called `name`
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Arc<Device>> {
        self.devices.iter().find(|d| d.name() == name)
    }

    /// Configuration the pair was brought up with
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Stop and unregister both devices and free their pools. Later calls
    /// do nothing.
    pub fn shutdown(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;

        for dev in &self.devices {
            if dev.is_running() {
                dev.stop();
            }
            self.stack.unregister(dev.name());
            let discarded = dev.teardown_pool();
            if discarded > 0 {
                tracing::debug!(device = dev.name(), discarded, "queued frames freed at shutdown");
            }
        }
        tracing::info!("device pair unregistered");
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.devices)
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}

fn wire(devices: &[Arc<Device>], wiring: Wiring) {
    match wiring {
        Wiring::Crossed => {
            for (i, dev) in devices.iter().enumerate() {
                dev.set_peer(&devices[(i + 1) % devices.len()]);
            }
        }
        Wiring::Reflect => {
            for dev in devices {
                dev.set_peer(dev);
            }
        }
    }
}
