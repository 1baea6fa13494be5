//! Serde helpers for glam types (glam is built without its serde feature).

use glam::Vec3;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serde proxy for Vec3
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3Def {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for Vec3Def {
    fn from(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Vec3Def> for Vec3 {
    fn from(def: Vec3Def) -> Self {
        Vec3::new(def.x, def.y, def.z)
    }
}

pub fn serialize_vec3<S>(v: &Vec3, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    Vec3Def::from(*v).serialize(s)
}

pub fn deserialize_vec3<'de, D>(d: D) -> Result<Vec3, D::Error>
where
    D: Deserializer<'de>,
{
    Vec3Def::deserialize(d).map(Vec3::from)
}

/// Serialize a slice of vectors as `[[x, y, z], ...]` (compact form for particle dumps).
pub fn serialize_vec3_slice<S>(values: &[Vec3], s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut seq = s.serialize_seq(Some(values.len()))?;
    for v in values {
        seq.serialize_element(&v.to_array())?;
    }
    seq.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
        v: Vec3,
    }

    #[test]
    fn test_vec3_field_json_shape() {
        let json = serde_json::to_string(&Holder { v: Vec3::new(1.0, -2.0, 0.5) }).unwrap();
        assert_eq!(json, r#"{"v":{"x":1.0,"y":-2.0,"z":0.5}}"#);
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back.v, Vec3::new(1.0, -2.0, 0.5));
    }

    #[test]
    fn test_vec3_slice_is_nested_arrays() {
        #[derive(Serialize)]
        struct Dump<'a> {
            #[serde(serialize_with = "serialize_vec3_slice")]
            p: &'a [Vec3],
        }
        let pts = [Vec3::ZERO, Vec3::X];
        let json = serde_json::to_string(&Dump { p: &pts }).unwrap();
        assert_eq!(json, r#"{"p":[[0.0,0.0,0.0],[1.0,0.0,0.0]]}"#);
    }
}
