use rspirv::spirv::Word;
use thiserror::Error;

/// Coarse classification of a validation failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Structural malformation, e.g. a decoration targeting an id that is never defined.
    InvalidBinary,
    /// A decoration, layout or interface rule is violated by specific ids.
    InvalidId,
    /// A numeric or content level violation, e.g. an out of range `Component`.
    InvalidData,
    /// A decoration needs a SPIR-V version or extension the module doesn't have.
    WrongVersion,
}

/// The first rule violation found in a module.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{}{message}", vuid_prefix(.vuid))]
pub struct ValidationError {
    pub kind: ErrorKind,
    pub message: String,
    /// The id of the instruction the error is reported against, if any.
    pub id: Option<Word>,
    /// Vulkan valid usage id, only attached when validating for Vulkan.
    pub vuid: Option<&'static str>,
}

fn vuid_prefix(vuid: &Option<&'static str>) -> String {
    vuid.map(|vuid| format!("[{vuid}] ")).unwrap_or_default()
}

impl ValidationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            id: None,
            vuid: None,
        }
    }

    pub fn invalid_binary(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidBinary, message)
    }

    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidId, message)
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidData, message)
    }

    pub fn wrong_version(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WrongVersion, message)
    }

    #[must_use]
    pub fn at(mut self, id: Word) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_vuid(mut self, vuid: Option<&'static str>) -> Self {
        self.vuid = vuid;
        self
    }
}

pub type Result<T, E = ValidationError> = std::result::Result<T, E>;
