use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] kube::error::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Registry transport error: {0}")]
    TransportError(#[from] reqwest::Error),

    #[error("Registry returned status {0}")]
    RegistryStatus(reqwest::StatusCode),

    #[error("Pod {0} is missing {1}")]
    MissingPodField(String, &'static str),

    #[error("Pod {0} has a malformed routing-names annotation: {1}")]
    InvalidRoutingNames(String, serde_json::Error),

    #[error("Malformed backend file {0}: {1}")]
    MalformedBackendFile(String, serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
