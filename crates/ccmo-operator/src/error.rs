use ccmo_common::error::CcmoError;

pub type OperatorResult<T = (), E = OperatorError> = Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error("{0}")]
    InvalidInfrastructure(String),

    #[error("unable to read images file {path}: {reason}")]
    ImagesFile { path: String, reason: String },

    #[error("{provider}: missed images in config: {fields}")]
    MissingImages { provider: String, fields: String },

    #[error("can not construct template values for {provider} assets: {reason}")]
    TemplateValue { provider: String, reason: String },

    #[error("can not render template {path}: {reason}")]
    Render { path: String, reason: String },

    #[error("invalid platform, expected {0}")]
    WrongPlatform(String),

    #[error("{0}")]
    Transform(String),

    #[error("unable to resolve group kind: {0}")]
    SchemeResolution(String),

    #[error("failed to apply resources because {condition} condition is set to True: {message}")]
    ControllerDegraded { condition: String, message: String },

    #[error("{0}")]
    TrustBundle(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] anyhow::Error),

    #[error(transparent)]
    Common(#[from] CcmoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any error originating from the `kube-rs` crate
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("Invalid Json: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Invalid Kubernetes Yaml: {source}")]
    Yaml {
        #[from]
        source: serde_yaml::Error,
    },
}

impl OperatorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OperatorError::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, OperatorError::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }

    /// Builds the API error shape the client returns, used by in-memory clusters in tests.
    pub fn api(code: u16, reason: &str, message: impl Into<String>) -> Self {
        OperatorError::Kube {
            source: kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: message.into(),
                reason: reason.to_string(),
                code,
            }),
        }
    }
}
