use crate::SpirvTargetEnv;

/// Options for specifying the behavior of the decoration validator.
///
/// The layout flags follow `spirv-val`'s command line: when more than one of
/// them is set, scalar layout takes priority over relaxed layout, which takes
/// priority over the standard rules.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[cfg_attr(feature = "clap", derive(clap::Parser))]
#[non_exhaustive]
pub struct ValidatorOptions {
    /// The environment the module is validated against. Decides the highest
    /// accepted SPIR-V version and whether Vulkan or OpenGL specific rules
    /// apply.
    #[cfg_attr(feature = "clap", arg(long, default_value = "spv1.6"))]
    pub target_env: SpirvTargetEnv,
    /// Records whether the validator should use "relaxed" block layout rules.
    /// Relaxed layout rules are described by Vulkan extension
    /// `VK_KHR_relaxed_block_layout`, and they affect uniform blocks, storage blocks,
    /// and push constants.
    ///
    /// Vulkan 1.1 and later always use relaxed layout, whatever this is set
    /// to. Relaxed layout is more permissive than the default rules in
    /// Vulkan 1.0.
    #[cfg_attr(feature = "clap", arg(long, default_value = "false"))]
    pub relax_block_layout: bool,
    /// Records whether the validator should use standard block layout rules for
    /// uniform blocks, i.e. the rules otherwise used for storage buffers.
    ///
    /// See Vulkan extension `VK_KHR_uniform_buffer_standard_layout`.
    #[cfg_attr(feature = "clap", arg(long, default_value = "false"))]
    pub uniform_buffer_standard_layout: bool,
    /// Records whether the validator should use "scalar" block layout rules.
    /// Scalar layout rules are more permissive than relaxed block layout.
    ///
    /// See Vulkan extension `VK_EXT_scalar_block_layout`.  The scalar alignment is
    /// defined as follows:
    /// - scalar alignment of a scalar is the scalar size
    /// - scalar alignment of a vector is the scalar alignment of its component
    /// - scalar alignment of a matrix is the scalar alignment of its component
    /// - scalar alignment of an array is the scalar alignment of its element
    /// - scalar alignment of a struct is the max scalar alignment among its
    ///   members
    ///
    /// For a struct in Uniform, `StorageClass`, or `PushConstant`:
    /// - a member Offset must be a multiple of the member's scalar alignment
    /// - `ArrayStride` or `MatrixStride` must be a multiple of the array or
    ///   matrix scalar alignment
    #[cfg_attr(feature = "clap", arg(long, default_value = "false"))]
    pub scalar_block_layout: bool,
    /// Records whether the validator should use "scalar" block layout rules
    /// for blocks in the Workgroup storage class.
    ///
    /// See Vulkan extension `VK_KHR_workgroup_memory_explicit_layout`.
    #[cfg_attr(feature = "clap", arg(long, default_value = "false"))]
    pub workgroup_scalar_block_layout: bool,
    /// Records whether or not the validator should skip validating standard
    /// uniform/storage block layout.
    #[cfg_attr(feature = "clap", arg(long, default_value = "false"))]
    pub skip_block_layout: bool,
}

impl ValidatorOptions {
    pub fn new(target_env: SpirvTargetEnv) -> Self {
        Self {
            target_env,
            ..Self::default()
        }
    }

    /// Whether relaxed block layout is in effect, either explicitly or because
    /// the target environment implies it.
    pub fn is_relaxed_block_layout(&self) -> bool {
        self.relax_block_layout || self.target_env.relaxes_block_layout()
    }

    #[must_use]
    pub fn with_relax_block_layout(mut self, relax: bool) -> Self {
        self.relax_block_layout = relax;
        self
    }

    #[must_use]
    pub fn with_uniform_buffer_standard_layout(mut self, enable: bool) -> Self {
        self.uniform_buffer_standard_layout = enable;
        self
    }

    #[must_use]
    pub fn with_scalar_block_layout(mut self, enable: bool) -> Self {
        self.scalar_block_layout = enable;
        self
    }

    #[must_use]
    pub fn with_workgroup_scalar_block_layout(mut self, enable: bool) -> Self {
        self.workgroup_scalar_block_layout = enable;
        self
    }

    #[must_use]
    pub fn with_skip_block_layout(mut self, skip: bool) -> Self {
        self.skip_block_layout = skip;
        self
    }
}
