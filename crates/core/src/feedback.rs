use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    #[default]
    PositiveOnly,
    Symmetric,
}

impl FeedbackMode {
    #[must_use]
    pub fn sends(self, positive: bool) -> bool {
        match self {
            Self::PositiveOnly => positive,
            Self::Symmetric => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEvent {
    pub positive: bool,
    pub input_context: String,
    pub output_query: String,
}

impl FeedbackEvent {
    #[must_use]
    pub fn new(
        positive: bool,
        input_context: impl Into<String>,
        output_query: impl Into<String>,
    ) -> Self {
        Self {
            positive,
            input_context: input_context.into(),
            output_query: output_query.into(),
        }
    }

    #[must_use]
    pub fn for_result(
        positive: bool,
        schema: &str,
        question: &str,
        generated_query: &str,
    ) -> Self {
        Self::new(
            positive,
            format!("Schema:{schema}\n\nQuestion: {question}"),
            generated_query,
        )
    }
}
