use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControlConfig {
    pub simulation_interval_ms: u64,
    pub notification_interval_ms: u64,
    pub notification_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            simulation_interval_ms: 20_000,
            notification_interval_ms: 5_000,
            notification_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub http_port: u16,
    pub mqtt_host: Option<String>,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub client_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            mqtt_host: None,
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            client_id: "thermostat-node-rust".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub control: ControlConfig,
    pub network: NetworkConfig,
    /// Fixed seed for the initial temperature; entropy when unset.
    pub seed: Option<u64>,
}

impl ControlConfig {
    pub fn sanitize(&mut self) {
        self.simulation_interval_ms = self.simulation_interval_ms.max(1);
        self.notification_interval_ms = self.notification_interval_ms.max(1);
        self.notification_capacity = self.notification_capacity.max(1);
    }
}

impl NetworkConfig {
    pub fn sanitize(&mut self) {
        if self
            .mqtt_host
            .as_deref()
            .is_some_and(|host| host.trim().is_empty())
        {
            self.mqtt_host = None;
        }
        if self.mqtt_port == 0 {
            self.mqtt_port = 1883;
        }
        if self.client_id.trim().is_empty() {
            self.client_id = NetworkConfig::default().client_id;
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.control.sanitize();
        self.network.sanitize();
    }
}
