use crate::types::Device;

pub const RESOURCE_DISCOVERY: &str = "/.well-known/core";
pub const RESOURCE_STATUS: &str = "/status";
pub const RESOURCE_TEMPERATURE: &str = "/temperature";
pub const RESOURCE_TEMPERATURE_OBSERVE: &str = "/temperature/observe";
pub const RESOURCE_SET: &str = "/set";

pub const LINK_FORMAT_CONTENT_TYPE: &str = "application/link-format";

pub const TOPIC_NODE_TEMPERATURE: &str = "thermostat/node/temperature";
pub const TOPIC_NODE_STATUS: &str = "thermostat/node/status";
pub const TOPIC_CMD_PREFIX: &str = "thermostat/cmnd/";

/// CoRE link-format listing of the node's resources.
pub fn link_format() -> String {
    [
        format!("<{RESOURCE_STATUS}>;n=\"Status\""),
        format!("<{RESOURCE_TEMPERATURE}>;n=\"Temperature\";obs"),
        format!("<{RESOURCE_SET}>;n=\"Set Device Mode\""),
    ]
    .join(",")
}

pub fn command_topic(device: Device) -> String {
    format!("{TOPIC_CMD_PREFIX}{}", device.as_str())
}

pub fn command_topics() -> Vec<String> {
    Device::ALL.into_iter().map(command_topic).collect()
}

/// Device token of an inbound command topic, if it is one.
pub fn device_token(topic: &str) -> Option<&str> {
    topic.strip_prefix(TOPIC_CMD_PREFIX)
}
