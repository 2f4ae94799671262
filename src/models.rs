use serde::{Serialize, Deserialize};
use serde_with::{serde_as, DurationMilliSeconds};
use chrono::{DateTime, Utc};
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;
use uuid::Uuid;

pub const MAX_PROMPT_CHARS: usize = 500;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Editorial,
    Streetwear,
    Vintage,
    Luxury,
    Casual,
}

impl Style {
    pub const ALL: [Style; 5] = [Style::Editorial, Style::Streetwear, Style::Vintage, Style::Luxury, Style::Casual];

    pub fn as_str(self) -> &'static str {
        match self {
            Style::Editorial => "editorial",
            Style::Streetwear => "streetwear",
            Style::Vintage => "vintage",
            Style::Luxury => "luxury",
            Style::Casual => "casual",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown style: {0}")]
pub struct UnknownStyle(pub String);

impl FromStr for Style {
    type Err = UnknownStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Style::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| UnknownStyle(s.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub image_data: String,
    pub prompt: String,
    pub style: Style,
    /// Cancellation key; a new submission under the same id replaces the old one.
    pub request_id: String,
}

impl GenerationRequest {
    pub fn new(image_data: impl Into<String>, prompt: impl Into<String>, style: Style) -> Self {
        Self {
            image_data: image_data.into(),
            prompt: prompt.into(),
            style,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub id: String,
    pub image_url: String,
    pub prompt: String,
    pub style: Style,
    pub created_at: DateTime<Utc>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "processingTimeMs")]
    pub processing_time: Duration,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ModelOverloaded,
    ValidationError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorCode::ModelOverloaded => "MODEL_OVERLOADED",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
        })
    }
}

#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct GenerationError {
    pub message: String,
    pub code: ErrorCode,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl GenerationError {
    pub fn overloaded(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: ErrorCode::ModelOverloaded, retryable: true, timestamp: Utc::now() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: ErrorCode::ValidationError, retryable: false, timestamp: Utc::now() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(flatten)]
    pub result: GenerationResult,
    pub thumbnail: String,
    #[serde(default)]
    pub is_favorite: bool,
}

impl HistoryItem {
    pub fn id(&self) -> &str { &self.result.id }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Generating,
    Success,
    Error,
    Aborted,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GenerationStatus::Success | GenerationStatus::Error | GenerationStatus::Aborted)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationState {
    pub status: GenerationStatus,
    pub progress: u8,
    pub retry_count: u32,
    /// Endpoint calls made so far for this request.
    pub attempts: u32,
    pub error: Option<GenerationError>,
    pub can_retry: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn style_parses_lowercase_names() {
        for style in Style::ALL {
            assert_eq!(style.as_str().parse::<Style>(), Ok(style));
        }
        assert_eq!("Editorial".parse::<Style>(), Err(UnknownStyle("Editorial".into())));
        assert!("gothic".parse::<Style>().is_err());
    }

    #[test]
    fn history_item_serializes_flat_camel_case() {
        let item = HistoryItem {
            result: GenerationResult {
                id: "gen-1".into(),
                image_url: "https://example.test/a.jpg".into(),
                prompt: "red dress".into(),
                style: Style::Vintage,
                created_at: Utc::now(),
                processing_time: Duration::from_millis(1500),
            },
            thumbnail: "thumb".into(),
            is_favorite: true,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["id"], "gen-1");
        assert_eq!(json["imageUrl"], "https://example.test/a.jpg");
        assert_eq!(json["style"], "vintage");
        assert_eq!(json["processingTimeMs"], 1500);
        assert_eq!(json["isFavorite"], true);

        let back: HistoryItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn error_codes_use_wire_names() {
        let err = GenerationError::overloaded("busy");
        assert!(err.retryable);
        assert_eq!(serde_json::to_value(err.code).unwrap(), "MODEL_OVERLOADED");
        assert_eq!(err.to_string(), "MODEL_OVERLOADED: busy");
        assert!(!GenerationError::validation("bad").retryable);
    }
}
