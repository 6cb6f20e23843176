use thiserror::Error;

#[derive(Error, Debug)]
pub enum DistillError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("prompt template at {path} is empty")]
    EmptyPrompt { path: String },
}
