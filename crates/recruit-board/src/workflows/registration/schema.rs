use serde::Serialize;

use super::domain::{Field, FieldKind};

/// One screen of the wizard and the fields it validates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDefinition {
    pub title: String,
    pub fields: Vec<Field>,
}

impl StepDefinition {
    pub fn new(title: impl Into<String>, fields: impl Into<Vec<Field>>) -> Self {
        Self {
            title: title.into(),
            fields: fields.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("a registration form needs at least one step before the review step")]
    NoSteps,
    #[error("field `{0}` appears in more than one step")]
    DuplicateField(Field),
}

/// Ordered step layout. The last step is always a review screen that
/// re-checks every field collected before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WizardSchema {
    steps: Vec<StepDefinition>,
}

impl WizardSchema {
    /// Build a schema from the editable steps; a review step is appended.
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self, SchemaError> {
        if steps.is_empty() {
            return Err(SchemaError::NoSteps);
        }

        let mut collected: Vec<Field> = Vec::new();
        for step in &steps {
            for field in &step.fields {
                if collected.contains(field) {
                    return Err(SchemaError::DuplicateField(*field));
                }
                collected.push(*field);
            }
        }

        let mut steps = steps;
        steps.push(StepDefinition::new("Review & Submit", collected));
        Ok(Self { steps })
    }

    /// Identity, department and intent, documents, review.
    pub fn with_documents() -> Self {
        Self::from_preset_steps(vec![
            StepDefinition::new("Identity", [Field::FullName, Field::Email, Field::Mobile]),
            StepDefinition::new(
                "Department & Intent",
                [Field::Branch, Field::Year, Field::Mission],
            ),
            StepDefinition::new("Documents", [Field::ProfilePhoto, Field::Resume]),
        ])
    }

    /// Identity, department, mission, review. No attachments.
    pub fn classic() -> Self {
        Self::from_preset_steps(vec![
            StepDefinition::new("Identity", [Field::FullName, Field::Email, Field::Mobile]),
            StepDefinition::new("Department", [Field::Branch, Field::Prn]),
            StepDefinition::new("Mission", [Field::Mission]),
        ])
    }

    fn from_preset_steps(steps: Vec<StepDefinition>) -> Self {
        match Self::new(steps) {
            Ok(schema) => schema,
            Err(err) => unreachable!("preset schema is malformed: {err}"),
        }
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// One-based lookup.
    pub fn step(&self, number: usize) -> Option<&StepDefinition> {
        number.checked_sub(1).and_then(|index| self.steps.get(index))
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn contains(&self, field: Field) -> bool {
        self.steps.iter().any(|step| step.fields.contains(&field))
    }

    pub fn fields(&self) -> &[Field] {
        self.steps
            .last()
            .map(|review| review.fields.as_slice())
            .unwrap_or_default()
    }

    pub fn has_attachments(&self) -> bool {
        self.fields()
            .iter()
            .any(|field| field.kind() == FieldKind::Attachment)
    }
}

/// Named layouts selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPreset {
    Documents,
    Classic,
}

impl SchemaPreset {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "documents" | "attachments" => Some(Self::Documents),
            "classic" => Some(Self::Classic),
            _ => None,
        }
    }

    pub fn schema(self) -> WizardSchema {
        match self {
            SchemaPreset::Documents => WizardSchema::with_documents(),
            SchemaPreset::Classic => WizardSchema::classic(),
        }
    }
}
