use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;


/// Field names older servers (and the legacy client) wrap the raw array in.
const WRAPPER_FIELDS: [&str; 2] = ["positions", "trafficLights"];

/// World-space coordinate applied to a handle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinates {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Lift a planar simulation position onto the ground plane.
    ///
    /// The simulation's second axis is depth, so `(x, y)` becomes `(x, 0, y)`.
    pub fn from_planar(x: f64, depth: f64) -> Self {
        Self::new(x, 0.0, depth)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Visual state of a traffic light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightColor {
    Red,
    Green,
}

impl LightColor {
    /// Map a wire token to a color.
    ///
    /// Only the exact token `"red"` is RED; everything else (including
    /// `"Red"`, `"yellow"` and the empty string) is GREEN.
    pub fn from_wire(token: &str) -> Self {
        if token == "red" {
            LightColor::Red
        } else {
            LightColor::Green
        }
    }

    /// True if `token` is one of the two tokens the server is expected to send.
    pub fn is_known_token(token: &str) -> bool {
        matches!(token, "red" | "green")
    }
}

impl fmt::Display for LightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightColor::Red => f.write_str("red"),
            LightColor::Green => f.write_str("green"),
        }
    }
}

/// One `{id, position: [x, y]}` record.
///
/// `position` is kept as a raw JSON value so that a single bad record
/// (wrong arity, wrong type, non-numeric element, null) is skipped on its
/// own instead of failing the whole batch.
#[derive(Clone, Debug, Deserialize)]
pub struct EntityPosition {
    pub id: String,
    #[serde(default)]
    pub position: Option<Value>,
}

impl EntityPosition {
    /// Coordinates for this record, or `None` if the position is malformed.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self.position.as_ref()?.as_array()?.as_slice() {
            [x, depth] => Some(Coordinates::from_planar(x.as_f64()?, depth.as_f64()?)),
            _ => None,
        }
    }
}

/// One `{id, state}` record. `state` is raw for the same reason as
/// [`EntityPosition::position`].
#[derive(Clone, Debug, Deserialize)]
pub struct LightState {
    pub id: String,
    #[serde(default)]
    pub state: Option<Value>,
}

impl LightState {
    /// The state token, if the server sent a string.
    pub fn token(&self) -> Option<&str> {
        self.state.as_ref()?.as_str()
    }

    /// Anything other than the string `"red"` is GREEN.
    pub fn color(&self) -> LightColor {
        LightColor::from_wire(self.token().unwrap_or_default())
    }

    pub fn is_known_token(&self) -> bool {
        self.token().is_some_and(LightColor::is_known_token)
    }
}

pub type PositionBatch = Vec<EntityPosition>;
pub type StateBatch = Vec<LightState>;

/// Decode a position batch from a response body.
pub fn decode_positions(body: &str) -> Result<PositionBatch, serde_json::Error> {
    decode_batch(body)
}

/// Decode a light-state batch from a response body.
pub fn decode_light_states(body: &str) -> Result<StateBatch, serde_json::Error> {
    decode_batch(body)
}

/// Accepts the bare array as well as `{"positions": [...]}` / `{"trafficLights": [...]}`.
fn decode_batch<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, serde_json::Error> {
    let value: Value = serde_json::from_str(body)?;
    serde_json::from_value(unwrap_array(value))
}

fn unwrap_array(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 => {
            for field in WRAPPER_FIELDS {
                if let Some(inner) = map.remove(field) {
                    return inner;
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}
