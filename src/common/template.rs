use serde_json::{Map, Value};

const TEMPLATE_ROOT: &str = "template";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("component template has no {0}")]
    MissingField(&'static str),
    #[error("pod set path {0} does not lead to an object in the component template")]
    InvalidPath(String),
}

/// Identity of the object a component template creates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentIdentity {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

pub fn component_identity(template: &Value) -> Result<ComponentIdentity, TemplateError> {
    let field = |pointer: &str, name: &'static str| {
        template.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_owned).ok_or(TemplateError::MissingField(name))
    };
    Ok(ComponentIdentity { api_version: field("/apiVersion", "apiVersion")?, kind: field("/kind", "kind")?, name: field("/metadata/name", "metadata.name")? })
}

/// Adds a label to the pod template found at `path`, e.g. `template.spec.replicatedJobs[1].template.spec.template`.
pub fn inject_label(template: &mut Value, path: &str, key: &str, value: &str) -> Result<(), TemplateError> {
    let invalid = || TemplateError::InvalidPath(path.to_owned());
    let mut segments = path.split('.');
    if segments.next() != Some(TEMPLATE_ROOT) {
        return Err(invalid());
    }

    let mut current = template;
    for segment in segments {
        let (field, indices) = split_indices(segment).ok_or_else(invalid)?;
        current = current.as_object_mut().and_then(|object| object.get_mut(field)).ok_or_else(invalid)?;
        for index in indices {
            current = current.as_array_mut().and_then(|array| array.get_mut(index)).ok_or_else(invalid)?;
        }
    }

    let object = current.as_object_mut().ok_or_else(invalid)?;
    let labels = object
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(invalid)?
        .entry("labels")
        .or_insert_with(|| Value::Object(Map::new()));
    if labels.is_null() {
        *labels = Value::Object(Map::new());
    }
    labels.as_object_mut().ok_or_else(invalid)?.insert(key.to_owned(), Value::String(value.to_owned()));
    Ok(())
}

fn split_indices(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(open) = segment.find('[') else {
        return Some((segment, vec![]));
    };
    let (field, mut rest) = segment.split_at(open);
    let mut indices = vec![];
    while !rest.is_empty() {
        let close = rest.find(']')?;
        indices.push(rest.get(1..close)?.parse().ok()?);
        rest = &rest[close + 1..];
        if !rest.is_empty() && !rest.starts_with('[') {
            return None;
        }
    }
    Some((field, indices))
}
