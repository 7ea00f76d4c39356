use crate::SpirvTargetEnv;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

impl Serialize for SpirvTargetEnv {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SpirvTargetEnv {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let env = String::deserialize(deserializer)?;
        Self::parse_env(&env).map_err(|_e| serde::de::Error::unknown_variant(&env, &[]))
    }
}
