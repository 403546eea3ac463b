use indexmap::IndexMap;
use serde::Serialize;

use crate::models::Reading;

/// Record type nodejs-poolController expects for a remote chemistry controller.
pub const RECORD_TYPE: &str = "REM";
/// Id of the chem controller the readings are attached to.
pub const CHEM_CONTROLLER_ID: u32 = 1;

/// Body of a `PUT /config/chemController` request.
///
/// Serializes as `{"type":"REM","id":1,"<sensor>":<value>}` with the fields in
/// that order.
#[derive(Debug, Serialize)]
pub struct ForwardPayload<'a> {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub id: u32,
    #[serde(flatten)]
    pub readings: IndexMap<String, &'a Reading>,
}

impl<'a> ForwardPayload<'a> {
    pub fn new(sensor_key: &str, value: &'a Reading) -> Self {
        let mut readings = IndexMap::new();
        readings.insert(sensor_key.to_lowercase(), value);

        Self {
            record_type: RECORD_TYPE,
            id: CHEM_CONTROLLER_ID,
            readings,
        }
    }
}
