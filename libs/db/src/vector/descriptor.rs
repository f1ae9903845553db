//! Index parameter descriptor.
//!
//! The descriptor is the only part of the index serialized outside the
//! graph: a flat JSON object holding the construction parameters, the
//! storage naming convention, and the current entry point. Edges live in
//! the storage engine and are never part of the descriptor.
//!
//! Distance functions and comparators are resolved through their string
//! registries on load; an unknown name is a configuration error and the
//! index does not open.

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};

use crate::graph::VertexId;

use super::distance::Distance;
use super::error;

/// Current descriptor format version.
pub const DESCRIPTOR_VERSION: u64 = 0;

/// Comparator over distance values.
///
/// Only the natural ascending order is registered; the variant exists so
/// the persisted comparator name round-trips through the same registry
/// mechanism as the distance function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    NaturalOrder,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::NaturalOrder => "NaturalOrder",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "NaturalOrder" => Some(Comparator::NaturalOrder),
            _ => None,
        }
    }
}

/// The persisted parameters of one index.
#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    pub dimensions: u32,
    pub max_item_count: usize,
    pub m: usize,
    pub max_m: usize,
    pub max_m0: usize,
    pub level_lambda: f64,
    pub ef: usize,
    pub ef_construction: usize,
    pub distance: Distance,
    pub comparator: Comparator,
    pub entry_point: Option<VertexId>,
    pub vertex_type: String,
    pub edge_type: String,
    pub id_property_name: String,
    pub vector_property_name: String,
}

impl IndexDescriptor {
    /// Serialize to the flat JSON wire format.
    pub fn to_json(&self) -> Value {
        json!({
            "version": DESCRIPTOR_VERSION,
            "dimensions": self.dimensions,
            "distanceFunction": self.distance.as_str(),
            "distanceComparator": self.comparator.as_str(),
            "maxItemCount": self.max_item_count,
            "m": self.m,
            "maxM": self.max_m,
            "maxM0": self.max_m0,
            "levelLambda": self.level_lambda,
            "ef": self.ef,
            "efConstruction": self.ef_construction,
            "entryPoint": self.entry_point.map_or(String::new(), |v| v.to_string()),
            "vertexType": self.vertex_type,
            "edgeType": self.edge_type,
            "idPropertyName": self.id_property_name,
            "vectorPropertyName": self.vector_property_name,
        })
    }

    /// Serialize to a JSON byte blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_json())?)
    }

    /// Rehydrate from the JSON wire format.
    pub fn from_json(value: &Value) -> Result<Self> {
        let version = get_u64(value, "version")?;
        if version > DESCRIPTOR_VERSION {
            return Err(anyhow!("Unsupported descriptor version {}", version));
        }

        let distance_name = get_str(value, "distanceFunction")?;
        let distance: Distance = distance_name
            .parse()
            .map_err(|_| error::unknown_distance_function(distance_name))?;

        let comparator_name = get_str(value, "distanceComparator")?;
        let comparator = Comparator::from_name(comparator_name)
            .ok_or_else(|| error::unknown_comparator(comparator_name))?;

        let entry_point = match get_str(value, "entryPoint")? {
            "" => None,
            raw => Some(
                raw.parse::<VertexId>()
                    .with_context(|| format!("Invalid entryPoint '{}'", raw))?,
            ),
        };

        Ok(Self {
            dimensions: get_u64(value, "dimensions")? as u32,
            max_item_count: get_u64(value, "maxItemCount")? as usize,
            m: get_u64(value, "m")? as usize,
            max_m: get_u64(value, "maxM")? as usize,
            max_m0: get_u64(value, "maxM0")? as usize,
            level_lambda: value
                .get("levelLambda")
                .and_then(Value::as_f64)
                .ok_or_else(|| anyhow!("Descriptor missing field levelLambda"))?,
            ef: get_u64(value, "ef")? as usize,
            ef_construction: get_u64(value, "efConstruction")? as usize,
            distance,
            comparator,
            entry_point,
            vertex_type: get_str(value, "vertexType")?.to_string(),
            edge_type: get_str(value, "edgeType")?.to_string(),
            id_property_name: get_str(value, "idPropertyName")?.to_string(),
            vector_property_name: get_str(value, "vectorPropertyName")?.to_string(),
        })
    }

    /// Rehydrate from a JSON byte blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_json(&value)
    }
}

fn get_u64(value: &Value, key: &str) -> Result<u64> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("Descriptor missing field {}", key))
}

fn get_str<'a>(value: &'a Value, key: &str) -> Result<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Descriptor missing field {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexDescriptor {
        IndexDescriptor {
            dimensions: 128,
            max_item_count: 10_000,
            m: 10,
            max_m: 10,
            max_m0: 20,
            level_lambda: 1.0 / 10f64.ln(),
            ef: 10,
            ef_construction: 200,
            distance: Distance::Cosine,
            comparator: Comparator::NaturalOrder,
            entry_point: Some(42),
            vertex_type: "Document".to_string(),
            edge_type: "Proximity".to_string(),
            id_property_name: "id".to_string(),
            vector_property_name: "vector".to_string(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let descriptor = sample();
        let back = IndexDescriptor::from_bytes(&descriptor.to_bytes().unwrap()).unwrap();
        assert_eq!(back.dimensions, 128);
        assert_eq!(back.m, 10);
        assert_eq!(back.max_m0, 20);
        assert_eq!(back.distance, Distance::Cosine);
        assert_eq!(back.comparator, Comparator::NaturalOrder);
        assert_eq!(back.entry_point, Some(42));
        assert_eq!(back.vertex_type, "Document");
    }

    #[test]
    fn test_wire_keys_exact() {
        let value = sample().to_json();
        for key in [
            "version",
            "dimensions",
            "distanceFunction",
            "distanceComparator",
            "maxItemCount",
            "m",
            "maxM",
            "maxM0",
            "levelLambda",
            "ef",
            "efConstruction",
            "entryPoint",
            "vertexType",
            "edgeType",
            "idPropertyName",
            "vectorPropertyName",
        ] {
            assert!(value.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(value["version"], 0);
        assert_eq!(value["distanceFunction"], "cosine");
        assert_eq!(value["entryPoint"], "42");
    }

    #[test]
    fn test_absent_entry_point_is_empty_string() {
        let mut descriptor = sample();
        descriptor.entry_point = None;
        let value = descriptor.to_json();
        assert_eq!(value["entryPoint"], "");
        let back = IndexDescriptor::from_json(&value).unwrap();
        assert_eq!(back.entry_point, None);
    }

    #[test]
    fn test_unknown_distance_function_rejected() {
        let mut value = sample().to_json();
        value["distanceFunction"] = serde_json::json!("frobnitz");
        let err = IndexDescriptor::from_json(&value).unwrap_err();
        assert!(err.to_string().contains("Unknown distance function"));
    }

    #[test]
    fn test_unknown_comparator_rejected() {
        let mut value = sample().to_json();
        value["distanceComparator"] = serde_json::json!("ReverseOrder");
        let err = IndexDescriptor::from_json(&value).unwrap_err();
        assert!(err.to_string().contains("Unknown distance comparator"));
    }
}
