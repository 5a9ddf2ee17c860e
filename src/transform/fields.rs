//! Derived field declarations and the compiled field set

use serde::{Deserialize, Serialize};

use crate::formula::{Formula, MAX_ROUND_DP};
use crate::template::Template;

use super::errors::{EvaluationError, TransformError, TransformResult};

/// A derived field as written in configuration.
///
/// Exactly one of `formula` and `template` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    pub fn formula(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            formula: Some(text.to_string()),
            template: None,
            required: true,
            scale: None,
        }
    }

    pub fn template(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            formula: None,
            template: Some(text.to_string()),
            required: true,
            scale: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Formula(Formula),
    Template(Template),
}

/// A compiled derived field
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub scale: Option<u32>,
}

impl DerivedField {
    /// Every name the field reads
    pub fn references(&self) -> Vec<String> {
        match &self.kind {
            FieldKind::Formula(f) => f.fields().to_vec(),
            FieldKind::Template(t) => t.fields(),
        }
    }

    /// Names that must resolve for the field to succeed
    pub fn required_references(&self) -> Vec<String> {
        match &self.kind {
            FieldKind::Formula(f) => f.fields().to_vec(),
            FieldKind::Template(t) => t.required_fields(),
        }
    }
}

/// Ordered derived fields, compiled once at startup
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldSet {
    fields: Vec<DerivedField>,
}

impl FieldSet {
    /// Compile declarations in order.
    ///
    /// Every formula and template is parsed here so that syntax errors
    /// surface before the first cycle.
    pub fn compile(specs: &[FieldSpec]) -> TransformResult<Self> {
        let mut fields: Vec<DerivedField> = Vec::with_capacity(specs.len());

        for spec in specs {
            let name = spec.name.trim();
            if name.is_empty() {
                return Err(TransformError::InvalidField {
                    field: spec.name.clone(),
                    message: "name is empty".to_string(),
                });
            }
            if fields.iter().any(|f| f.name == name) {
                return Err(TransformError::DuplicateField(name.to_string()));
            }
            if let Some(scale) = spec.scale {
                if scale > MAX_ROUND_DP {
                    return Err(TransformError::InvalidField {
                        field: name.to_string(),
                        message: format!("scale {} exceeds {}", scale, MAX_ROUND_DP),
                    });
                }
            }

            let kind = match (&spec.formula, &spec.template) {
                (Some(text), None) => Formula::parse(text)
                    .map(FieldKind::Formula)
                    .map_err(|e| compile_error(name, e.into()))?,
                (None, Some(text)) => Template::parse(text)
                    .map(FieldKind::Template)
                    .map_err(|e| compile_error(name, e.into()))?,
                _ => {
                    return Err(TransformError::InvalidField {
                        field: name.to_string(),
                        message: "exactly one of formula or template must be set".to_string(),
                    })
                }
            };

            fields.push(DerivedField {
                name: name.to_string(),
                kind,
                required: spec.required,
                scale: spec.scale,
            });
        }

        for (index, field) in fields.iter().enumerate() {
            for reference in field.references() {
                if fields[index..].iter().any(|later| later.name == reference) {
                    return Err(TransformError::ForwardReference {
                        field: field.name.clone(),
                        reference,
                    });
                }
            }
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[DerivedField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Derived field names in declaration order
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Source fields the set reads, in first-seen order
    pub fn referenced_inputs(&self) -> Vec<String> {
        self.collect_inputs(|f| f.references())
    }

    /// Source fields that required fields cannot do without
    pub fn required_inputs(&self) -> Vec<String> {
        self.collect_inputs(|f| {
            if f.required {
                f.required_references()
            } else {
                Vec::new()
            }
        })
    }

    fn collect_inputs<F>(&self, refs: F) -> Vec<String>
    where
        F: Fn(&DerivedField) -> Vec<String>,
    {
        let derived = self.names();
        let mut inputs: Vec<String> = Vec::new();
        for field in &self.fields {
            for name in refs(field) {
                if !derived.contains(&name) && !inputs.contains(&name) {
                    inputs.push(name);
                }
            }
        }
        inputs
    }

    /// Compare the set's needs with the fields a source declares
    pub fn check_schema(&self, available: &[String]) -> TransformResult<()> {
        let missing: Vec<String> = self
            .required_inputs()
            .into_iter()
            .filter(|name| !available.contains(name))
            .collect();
        let shadowed: Vec<String> = self
            .names()
            .into_iter()
            .filter(|name| available.contains(name))
            .collect();

        if missing.is_empty() && shadowed.is_empty() {
            Ok(())
        } else {
            Err(TransformError::Schema { missing, shadowed })
        }
    }
}

fn compile_error(field: &str, source: EvaluationError) -> TransformError {
    TransformError::Compile {
        field: field.to_string(),
        source,
    }
}
