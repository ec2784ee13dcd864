//! Pairs desired (`StateResource`) and actual (`PlatformResource`) by
//! identity.
//!
//! Two keys are tried in order: the declared `KeyID` attribute against
//! the platform resource's `provider_assigned_id`, then a `Name` tag
//! equality fallback that requires hydrating the actual side. More than
//! one candidate match on either key is an ambiguity, reported as
//! `MatchingError` rather than guessed at.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{DriftError, ErrorCode};
use crate::model::{MatchingResult, PlatformResource, StateResource};

/// The attribute name holding the provider-assigned identifier on the
/// desired side.
const KEY_ID_ATTRIBUTE: &str = "id";

pub async fn match_resources(
    desired: Vec<StateResource>,
    actual: Vec<Arc<PlatformResource>>,
    cancel: &CancellationToken,
) -> Result<MatchingResult, DriftError> {
    let mut remaining_actual: Vec<Arc<PlatformResource>> = actual;
    let mut matched = Vec::new();
    let mut unmatched_desired = Vec::new();

    for resource in desired {
        let candidates = find_candidates(&resource, &remaining_actual, cancel).await?;
        match candidates.len() {
            0 => unmatched_desired.push(resource),
            1 => {
                let index = candidates[0];
                let actual = remaining_actual.remove(index);
                matched.push((resource, actual));
            }
            _ => {
                return Err(DriftError::new(
                    ErrorCode::MatchingError,
                    format!(
                        "ambiguous match for {:?}: {} candidates share the same key",
                        resource.metadata.source_identifier,
                        candidates.len()
                    ),
                ));
            }
        }
    }

    Ok(MatchingResult { matched, unmatched_desired, unmatched_actual: remaining_actual })
}

/// Indices into `pool` that match `resource` by KeyID, or (if that
/// finds nothing and both sides carry a `Name` tag) by name equality.
async fn find_candidates(
    resource: &StateResource,
    pool: &[Arc<PlatformResource>],
    cancel: &CancellationToken,
) -> Result<Vec<usize>, DriftError> {
    if let Some(key_id) = resource.attribute(KEY_ID_ATTRIBUTE).and_then(|v| v.as_str()) {
        let by_id: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, p)| p.metadata.provider_assigned_id.as_deref() == Some(key_id))
            .map(|(i, _)| i)
            .collect();
        if !by_id.is_empty() {
            return Ok(by_id);
        }
    }

    let Some(name) = resource
        .attributes
        .get("tags")
        .and_then(|v| v.as_map())
        .and_then(|m| m.get("Name"))
        .and_then(|v| v.as_str())
    else {
        return Ok(Vec::new());
    };

    let mut by_name = Vec::new();
    for (i, p) in pool.iter().enumerate() {
        let (attrs, _) = p.attributes(cancel).await;
        let matches = attrs
            .get("tags")
            .and_then(|v| v.as_map())
            .and_then(|m| m.get("Name"))
            .and_then(|v| v.as_str())
            == Some(name);
        if matches {
            by_name.push(i);
        }
    }
    Ok(by_name)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use super::*;
    use crate::model::{Hydrator, ResourceKind, ResourceMetadata};
    use crate::value::Value;

    struct StaticHydrator(BTreeMap<String, Value>);

    #[async_trait]
    impl Hydrator for StaticHydrator {
        async fn hydrate(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<BTreeMap<String, Value>, (BTreeMap<String, Value>, DriftError)> {
            Ok(self.0.clone())
        }
    }

    fn platform_resource(id: &str, name: Option<&str>) -> Arc<PlatformResource> {
        let mut metadata = ResourceMetadata::new(ResourceKind::ComputeInstance, "aws_instance");
        metadata.provider_assigned_id = Some(id.to_string());
        let mut attrs = BTreeMap::new();
        if let Some(name) = name {
            let mut tags = BTreeMap::new();
            tags.insert("Name".to_string(), Value::string(name));
            attrs.insert("tags".to_string(), Value::Map(tags));
        }
        Arc::new(PlatformResource::new(metadata, Box::new(StaticHydrator(attrs))))
    }

    fn desired_resource(id: Option<&str>, name: Option<&str>) -> StateResource {
        let mut metadata = ResourceMetadata::new(ResourceKind::ComputeInstance, "aws_instance");
        metadata.source_identifier = Some("aws_instance.web".to_string());
        let mut attrs = BTreeMap::new();
        if let Some(id) = id {
            attrs.insert("id".to_string(), Value::string(id));
        }
        if let Some(name) = name {
            let mut tags = BTreeMap::new();
            tags.insert("Name".to_string(), Value::string(name));
            attrs.insert("tags".to_string(), Value::Map(tags));
        }
        StateResource::new(metadata, attrs)
    }

    #[tokio::test]
    async fn matches_by_key_id() {
        let desired = vec![desired_resource(Some("i-1"), None)];
        let actual = vec![platform_resource("i-1", None)];
        let cancel = CancellationToken::new();
        let result = match_resources(desired, actual, &cancel).await.unwrap();
        assert_eq!(result.matched.len(), 1);
        assert!(result.unmatched_desired.is_empty());
        assert!(result.unmatched_actual.is_empty());
    }

    #[tokio::test]
    async fn unmatched_desired_and_actual_classified() {
        let desired = vec![desired_resource(Some("i-missing"), None)];
        let actual = vec![platform_resource("i-unmanaged", None)];
        let cancel = CancellationToken::new();
        let result = match_resources(desired, actual, &cancel).await.unwrap();
        assert_eq!(result.matched.len(), 0);
        assert_eq!(result.unmatched_desired.len(), 1);
        assert_eq!(result.unmatched_actual.len(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_name_tag_when_no_id() {
        let desired = vec![desired_resource(None, Some("web-1"))];
        let actual = vec![platform_resource("i-9", Some("web-1"))];
        let cancel = CancellationToken::new();
        let result = match_resources(desired, actual, &cancel).await.unwrap();
        assert_eq!(result.matched.len(), 1);
    }

    #[tokio::test]
    async fn ambiguous_name_match_is_fatal() {
        let desired = vec![desired_resource(None, Some("web-1"))];
        let actual = vec![platform_resource("i-9", Some("web-1")), platform_resource("i-10", Some("web-1"))];
        let cancel = CancellationToken::new();
        let err = match_resources(desired, actual, &cancel).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MatchingError);
    }
}
