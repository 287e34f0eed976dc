use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::Presentation;

/// Request payload for registering a presentation
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreatePresentationRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Title must be between 1 and 255 characters"
    ))]
    #[validate(custom(function = "validate_title"))]
    pub title: String,

    #[validate(length(max = 255))]
    pub speaker: Option<String>,

    #[validate(length(max = 100))]
    pub room: Option<String>,
}

fn validate_title(title: &str) -> Result<(), validator::ValidationError> {
    if title.trim().is_empty() {
        Err(validator::ValidationError::new("blank_title"))
    } else {
        Ok(())
    }
}

impl CreatePresentationRequest {
    /// New presentation with an empty rollup
    pub fn into_presentation(self) -> Presentation {
        let mut presentation = Presentation::new(self.title.trim());
        presentation.speaker = self.speaker;
        presentation.room = self.room;
        presentation
    }
}
