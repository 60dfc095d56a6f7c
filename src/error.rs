use thiserror::Error;

#[derive(Debug, Error)]
pub enum TutorError {
    #[error("no usable text extracted from {path}: {pages} content page(s), need at least {required}")]
    Processing {
        path: String,
        pages: usize,
        required: usize,
    },

    #[error("no context retrieved for query: {query}")]
    InsufficientContext { query: String },

    #[error("language model call failed: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("model response parsed with placeholders for: {}", .missing.join(", "))]
    ParseDegraded { missing: Vec<&'static str> },

    #[error("invalid keyword catalog: {0}")]
    Catalog(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TutorError {
    pub fn user_message(&self) -> &'static str {
        match self {
            TutorError::InsufficientContext { .. } | TutorError::Llm(_) => {
                "문제를 생성하지 못했습니다. 잠시 후 다시 시도해주세요."
            }
            TutorError::Processing { .. } => "교재에서 텍스트를 추출하지 못했습니다.",
            _ => "요청을 처리하는 중 오류가 발생했습니다.",
        }
    }
}

pub type TutorResult<T> = std::result::Result<T, TutorError>;
