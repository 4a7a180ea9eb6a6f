// fusion_core/src/serde_helpers.rs

pub mod vec3_from_array {
    use nalgebra::Vector3;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(vec: &Vector3<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq([vec.x, vec.y, vec.z].iter())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vector3<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let arr: [f64; 3] = Deserialize::deserialize(deserializer)?;
        Ok(Vector3::from(arr))
    }
}

/// Unit quaternions as `[x, y, z, w]`, the same ordering as the full state.
/// Deserialized values are normalized; zero or non-finite quaternions are rejected.
pub mod unit_quat_from_xyzw {
    use nalgebra::{Quaternion, UnitQuaternion};
    use serde::{self, de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(quat: &UnitQuaternion<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let c = quat.coords;
        serializer.collect_seq([c.x, c.y, c.z, c.w].iter())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<UnitQuaternion<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let [x, y, z, w]: [f64; 4] = Deserialize::deserialize(deserializer)?;
        if ![x, y, z, w].iter().all(|c| c.is_finite()) {
            return Err(D::Error::custom("quaternion components must be finite"));
        }
        let raw = Quaternion::new(w, x, y, z);
        UnitQuaternion::try_new(raw, f64::EPSILON)
            .ok_or_else(|| D::Error::custom("quaternion must have a non-zero norm"))
    }
}

/// A 6x6 matrix as a flat, row-major sequence of 36 numbers.
pub mod row_major_6x6 {
    use serde::{self, de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(cov: &[f64; 36], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(cov.iter())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[f64; 36], D::Error>
    where
        D: Deserializer<'de>,
    {
        let values: Vec<f64> = Deserialize::deserialize(deserializer)?;
        let len = values.len();
        values
            .try_into()
            .map_err(|_| D::Error::invalid_length(len, &"36 row-major covariance entries"))
    }
}
