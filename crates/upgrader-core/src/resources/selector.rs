use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Render equality labels as a `labelSelector` query value (`k1=v1,k2=v2`)
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether every selector pair is present on `labels` with the same value
pub fn labels_match(
    selector: &BTreeMap<String, String>,
    labels: Option<&BTreeMap<String, String>>,
) -> bool {
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
}

/// UID of the object's owner, if it has exactly one owner reference
pub fn single_owner_uid(metadata: &ObjectMeta) -> Option<&str> {
    match metadata.owner_references.as_deref() {
        Some([owner]) => Some(owner.uid.as_str()),
        _ => None,
    }
}
