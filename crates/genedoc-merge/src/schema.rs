use genedoc_types::{Fields, SourceDescriptor};
use serde_json::Value;
use tracing::{debug, warn};

/// Schema of a merged collection: the union of every source's field mapping
/// under `properties`, with dynamic fields disabled.
///
/// Sources without a mapping contribute nothing and are reported.
pub fn merged_schema<'a>(sources: impl IntoIterator<Item = &'a SourceDescriptor>) -> Fields {
    let mut properties = Fields::new();
    for source in sources {
        if source.field_mapping.is_empty() {
            warn!(source = %source.name, "source has no field mapping");
            continue;
        }
        for (field, mapping) in &source.field_mapping {
            if let Some(previous) = properties.insert(field.clone(), mapping.clone()) {
                if &previous != mapping {
                    debug!(source = %source.name, field = %field, "field mapping overridden");
                }
            }
        }
    }
    let mut schema = Fields::new();
    schema.insert("properties".into(), Value::Object(properties));
    schema.insert("dynamic".into(), Value::Bool(false));
    schema
}
