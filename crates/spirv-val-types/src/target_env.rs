use core::str::FromStr;
use std::fmt::{Debug, Display, Formatter};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

pub const SPIRV_TARGET_PREFIX: &str = "spirv-unknown-";

/// All environments a module can be validated against. Each one bounds the
/// SPIR-V version a module may declare and decides which client API rules
/// (Vulkan, OpenGL, or none for the universal envs) apply on top of the core
/// SPIR-V rules.
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Hash, EnumString, IntoStaticStr, EnumIter, Display,
)]
pub enum SpirvTargetEnv {
    #[strum(to_string = "opengl4.0")]
    OpenGL_4_0,
    #[strum(to_string = "opengl4.1")]
    OpenGL_4_1,
    #[strum(to_string = "opengl4.2")]
    OpenGL_4_2,
    #[strum(to_string = "opengl4.3")]
    OpenGL_4_3,
    #[strum(to_string = "opengl4.5")]
    OpenGL_4_5,
    #[strum(to_string = "spv1.0")]
    Spv_1_0,
    #[strum(to_string = "spv1.1")]
    Spv_1_1,
    #[strum(to_string = "spv1.2")]
    Spv_1_2,
    #[strum(to_string = "spv1.3")]
    Spv_1_3,
    #[strum(to_string = "spv1.4")]
    Spv_1_4,
    #[strum(to_string = "spv1.5")]
    Spv_1_5,
    #[default]
    #[strum(to_string = "spv1.6")]
    Spv_1_6,
    #[strum(to_string = "vulkan1.0")]
    Vulkan_1_0,
    #[strum(to_string = "vulkan1.1")]
    Vulkan_1_1,
    #[strum(to_string = "vulkan1.1spv1.4")]
    Vulkan_1_1_Spv_1_4,
    #[strum(to_string = "vulkan1.2")]
    Vulkan_1_2,
    #[strum(to_string = "vulkan1.3")]
    Vulkan_1_3,
    #[strum(to_string = "vulkan1.4")]
    Vulkan_1_4,
}

#[derive(Clone, Error, Eq, PartialEq)]
pub enum SpirvTargetParseError {
    #[error("Expected SPIR-V target with prefix `{SPIRV_TARGET_PREFIX}`, got `{0}`")]
    WrongPrefix(String),
    #[error(
        "Unknown SPIR-V target environment `{0}`, see `enum SpirvTargetEnv` for possible values"
    )]
    UnknownEnv(String),
}

impl Debug for SpirvTargetParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl SpirvTargetEnv {
    /// Parses a bare env name such as `vulkan1.2`.
    pub fn parse_env(env: &str) -> Result<Self, SpirvTargetParseError> {
        FromStr::from_str(env).map_err(|_e| SpirvTargetParseError::UnknownEnv(env.to_string()))
    }

    /// Parses a full triple such as `spirv-unknown-vulkan1.2`.
    pub fn parse_triple(target: &str) -> Result<Self, SpirvTargetParseError> {
        let env = target
            .strip_prefix(SPIRV_TARGET_PREFIX)
            .ok_or_else(|| SpirvTargetParseError::WrongPrefix(target.to_string()))?;
        Self::parse_env(env)
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn target_triple(&self) -> String {
        format!("{SPIRV_TARGET_PREFIX}{}", self.as_str())
    }

    pub fn iter() -> impl DoubleEndedIterator<Item = Self> {
        <Self as strum::IntoEnumIterator>::iter()
    }

    /// Highest SPIR-V version a module may declare in this environment.
    #[allow(clippy::match_same_arms)]
    pub fn spirv_version(&self) -> (u8, u8) {
        match self {
            Self::Spv_1_0 => (1, 0),
            Self::Spv_1_1 => (1, 1),
            Self::Spv_1_2 => (1, 2),
            Self::Spv_1_3 => (1, 3),
            Self::Spv_1_4 => (1, 4),
            Self::Spv_1_5 => (1, 5),
            Self::Spv_1_6 => (1, 6),

            Self::OpenGL_4_0
            | Self::OpenGL_4_1
            | Self::OpenGL_4_2
            | Self::OpenGL_4_3
            | Self::OpenGL_4_5 => (1, 0),

            Self::Vulkan_1_0 => (1, 0),
            Self::Vulkan_1_1 => (1, 3),
            Self::Vulkan_1_1_Spv_1_4 => (1, 4),
            Self::Vulkan_1_2 => (1, 5),
            Self::Vulkan_1_3 | Self::Vulkan_1_4 => (1, 6),
        }
    }

    pub fn is_vulkan(&self) -> bool {
        matches!(
            self,
            Self::Vulkan_1_0
                | Self::Vulkan_1_1
                | Self::Vulkan_1_1_Spv_1_4
                | Self::Vulkan_1_2
                | Self::Vulkan_1_3
                | Self::Vulkan_1_4
        )
    }

    pub fn is_opengl(&self) -> bool {
        matches!(
            self,
            Self::OpenGL_4_0
                | Self::OpenGL_4_1
                | Self::OpenGL_4_2
                | Self::OpenGL_4_3
                | Self::OpenGL_4_5
        )
    }

    pub fn is_universal(&self) -> bool {
        !self.is_vulkan() && !self.is_opengl()
    }

    /// Vulkan 1.1 made `VK_KHR_relaxed_block_layout` core, so every later
    /// Vulkan environment validates buffer blocks with relaxed rules.
    pub fn relaxes_block_layout(&self) -> bool {
        self.is_vulkan() && *self != Self::Vulkan_1_0
    }
}

pub trait IntoSpirvTargetEnv: Sized {
    fn to_spirv_target_env(&self) -> Result<SpirvTargetEnv, SpirvTargetParseError>;
}

impl IntoSpirvTargetEnv for SpirvTargetEnv {
    fn to_spirv_target_env(&self) -> Result<SpirvTargetEnv, SpirvTargetParseError> {
        Ok(*self)
    }
}

/// Accepts either a full triple or a bare env name.
impl IntoSpirvTargetEnv for &str {
    fn to_spirv_target_env(&self) -> Result<SpirvTargetEnv, SpirvTargetParseError> {
        if self.starts_with(SPIRV_TARGET_PREFIX) {
            SpirvTargetEnv::parse_triple(self)
        } else {
            SpirvTargetEnv::parse_env(self)
        }
    }
}

impl IntoSpirvTargetEnv for String {
    fn to_spirv_target_env(&self) -> Result<SpirvTargetEnv, SpirvTargetParseError> {
        self.as_str().to_spirv_target_env()
    }
}
