use kube::{Resource, ResourceExt};

use crate::{Error, Result};

pub(crate) fn namespace_of<K: Resource<DynamicType = ()>>(resource: &K) -> Result<String> {
    resource.namespace().ok_or_else(|| {
        Error::InvalidResource(format!(
            "{} {} has no namespace",
            K::kind(&()),
            resource.name_any()
        ))
    })
}
