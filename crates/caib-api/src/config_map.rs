//! ConfigMap resource holding the build manifest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_kind() -> String {
    "ConfigMap".to_string()
}

impl ConfigMap {
    /// ConfigMap with a single document stored under `key`.
    pub fn with_document(metadata: ObjectMeta, key: impl Into<String>, document: impl Into<String>) -> Self {
        let mut data = BTreeMap::new();
        data.insert(key.into(), document.into());
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_keyed_by_file_name() {
        let cm = ConfigMap::with_document(
            ObjectMeta::named("demo-manifest-config", "default"),
            "simple.aib.yml",
            "name: simple\n",
        );
        let json = serde_json::to_value(&cm).unwrap();

        assert_eq!(json["apiVersion"], "v1");
        assert_eq!(json["kind"], "ConfigMap");
        assert_eq!(json["data"]["simple.aib.yml"], "name: simple\n");
    }
}
