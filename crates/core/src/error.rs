#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] chart_types::TextError),
    #[error("cannot {action} a form that is {from}")]
    InvalidTransition { from: String, action: &'static str },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),

    #[error("FHIR error: {0}")]
    Fhir(#[from] fhir::FhirError),
}

pub type ChartResult<T> = std::result::Result<T, ChartError>;
