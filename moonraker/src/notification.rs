use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{ACTIVE_STATE_INACTIVE, MoonrakerError};

pub const SUBSCRIBE_METHOD: &str = "printer.objects.subscribe";

/// One inbound websocket message. Only the `params` array matters here; responses
/// to our own requests carry no params and decode to an empty frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub params: Vec<Value>,
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self, MoonrakerError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut message) = value else {
            return Err(MoonrakerError::decode("frame is not a JSON object"));
        };

        let params = match message.remove("params") {
            Some(Value::Array(params)) => params,
            Some(_) => return Err(MoonrakerError::decode("frame params is not an array")),
            None => Vec::new(),
        };

        Ok(Self { params })
    }

    pub fn sections(&self) -> impl Iterator<Item = Section<'_>> {
        self.params.iter().filter_map(|param| match param {
            Value::Object(fields) => Some(Section { fields }),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Section<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> Section<'a> {
    pub fn new(fields: &'a Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn motion_report(&self) -> Option<Result<MotionReport, MoonrakerError>> {
        self.decode("motion_report")
    }

    pub fn toolhead(&self) -> Option<Result<Toolhead, MoonrakerError>> {
        self.decode("toolhead")
    }

    pub fn klipper(&self) -> Option<Result<KlipperState, MoonrakerError>> {
        self.decode("klipper")
    }

    fn decode<T: DeserializeOwned>(&self, key: &str) -> Option<Result<T, MoonrakerError>> {
        self.fields.get(key).map(|value| {
            T::deserialize(value).map_err(|e| MoonrakerError::decode(format!("{}: {}", key, e)))
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MotionReport {
    #[serde(default)]
    pub live_position: Option<LivePosition>,
}

/// Either `{"x": .., "y": .., "z": ..}` or the positional `[x, y, z, e]` form.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LivePosition {
    Vector(Vec<Option<f64>>),
    Named {
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        #[serde(default)]
        z: Option<f64>,
    },
}

impl LivePosition {
    pub fn component(&self, index: usize) -> Option<f64> {
        match self {
            LivePosition::Vector(values) => values.get(index).copied().flatten(),
            LivePosition::Named { x, y, z } => match index {
                0 => *x,
                1 => *y,
                2 => *z,
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Toolhead {
    #[serde(default)]
    pub homed_axes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct KlipperState {
    #[serde(default)]
    pub active_state: Option<String>,
}

impl KlipperState {
    pub fn is_inactive(&self) -> bool {
        self.active_state.as_deref() == Some(ACTIVE_STATE_INACTIVE)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscribeRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: SubscribeParams,
    id: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct SubscribeParams {
    objects: SubscribeObjects,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct SubscribeObjects {
    // `null` subscribes to every field of the object.
    motion_report: Option<Vec<&'static str>>,
    toolhead: Vec<&'static str>,
}

impl SubscribeRequest {
    pub fn odometer(id: u32) -> Self {
        Self {
            jsonrpc: "2.0",
            method: SUBSCRIBE_METHOD,
            params: SubscribeParams {
                objects: SubscribeObjects {
                    motion_report: None,
                    toolhead: vec!["homed_axes"],
                },
            },
            id,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn to_json(&self) -> Result<String, MoonrakerError> {
        Ok(serde_json::to_string(self)?)
    }
}
