use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

use crate::models::{GenerationError, GenerationRequest, Style, MAX_PROMPT_CHARS};

pub const IMAGE_DATA_PREFIX: &str = "data:image/";

// Form fields, declared in the order their errors are reported.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Image,
    Prompt,
    Style,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub field_errors: BTreeMap<Field, String>,
}

impl ValidationResult {
    pub fn first_error(&self) -> Option<(Field, &str)> {
        self.field_errors.iter().next().map(|(field, msg)| (*field, msg.as_str()))
    }

    pub fn to_error(&self) -> GenerationError {
        let message = self.first_error().map(|(_, msg)| msg).unwrap_or("Invalid request");
        GenerationError::validation(message)
    }
}

pub fn validate(request: &GenerationRequest) -> ValidationResult {
    validate_fields(&request.image_data, &request.prompt, request.style.as_str())
}

pub fn validate_fields(image_data: &str, prompt: &str, style: &str) -> ValidationResult {
    let mut field_errors = BTreeMap::new();

    if image_data.trim().is_empty() {
        field_errors.insert(Field::Image, "Please upload an image".to_string());
    } else if !image_data.starts_with(IMAGE_DATA_PREFIX) {
        field_errors.insert(Field::Image, "Uploaded file must be an image".to_string());
    }

    let prompt_len = prompt.trim().chars().count();
    if prompt_len == 0 {
        field_errors.insert(Field::Prompt, "Prompt is required".to_string());
    } else if prompt_len > MAX_PROMPT_CHARS {
        field_errors.insert(Field::Prompt, format!("Prompt must be {MAX_PROMPT_CHARS} characters or less"));
    }

    if style.parse::<Style>().is_err() {
        field_errors.insert(Field::Style, "Please select a valid style".to_string());
    }

    ValidationResult { is_valid: field_errors.is_empty(), field_errors }
}
