//! Serde helpers for glam types.
//!
//! Use with `#[serde(with = "crate::serde_utils::vec3")]`.

/// `Vec3` as a `[x, y, z]` array.
pub mod vec3 {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(v: &Vec3, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        v.to_array().serialize(s)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Vec3, D::Error>
    where
        D: Deserializer<'de>,
    {
        <[f32; 3]>::deserialize(d).map(Vec3::from_array)
    }
}
