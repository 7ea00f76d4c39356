use rspirv::spirv::StorageClass;
use spirv_val_types::ValidatorOptions;
use std::fmt;

/// Whether a block follows uniform buffer (std140-like) or storage buffer
/// (std430-like) rounding.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlockRules {
    Uniform,
    Storage,
}

/// How tightly members may be packed, from strictest to loosest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Packing {
    Standard,
    Relaxed,
    Scalar,
}

/// The layout rule set one block is checked against.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayoutPolicy {
    pub rules: BlockRules,
    pub packing: Packing,
}

impl LayoutPolicy {
    pub const fn new(rules: BlockRules, packing: Packing) -> Self {
        Self { rules, packing }
    }

    /// The policy for a block in `storage_class`, given whether its struct is
    /// decorated `BufferBlock` rather than `Block`. `None` when layout checking
    /// is switched off.
    pub fn select(
        storage_class: StorageClass,
        buffer_block: bool,
        options: &ValidatorOptions,
    ) -> Option<Self> {
        if options.skip_block_layout {
            return None;
        }
        let rules = if storage_class == StorageClass::Uniform
            && !buffer_block
            && !options.uniform_buffer_standard_layout
        {
            BlockRules::Uniform
        } else {
            BlockRules::Storage
        };
        let scalar = if storage_class == StorageClass::Workgroup {
            options.workgroup_scalar_block_layout
        } else {
            options.scalar_block_layout
        };
        let packing = if scalar {
            Packing::Scalar
        } else if options.is_relaxed_block_layout() {
            Packing::Relaxed
        } else {
            Packing::Standard
        };
        Some(Self { rules, packing })
    }

    pub fn is_uniform(&self) -> bool {
        self.rules == BlockRules::Uniform
    }

    pub fn is_relaxed(&self) -> bool {
        self.packing == Packing::Relaxed
    }

    pub fn is_scalar(&self) -> bool {
        self.packing == Packing::Scalar
    }
}

/// Renders as used in diagnostics, e.g. `standard uniform buffer`.
impl fmt::Display for LayoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let packing = match self.packing {
            Packing::Standard => "standard",
            Packing::Relaxed => "relaxed",
            Packing::Scalar => "scalar",
        };
        let rules = match self.rules {
            BlockRules::Uniform => "uniform buffer",
            BlockRules::Storage => "storage buffer",
        };
        write!(f, "{packing} {rules}")
    }
}

/// Whether objects in `storage_class` may carry explicit layout decorations
/// (`Offset`, `ArrayStride`, `MatrixStride`).
pub fn allows_layout(
    storage_class: StorageClass,
    spirv_version: (u8, u8),
    has_workgroup_layout_capability: bool,
) -> bool {
    match storage_class {
        StorageClass::UniformConstant => false,

        StorageClass::Workgroup => has_workgroup_layout_capability,

        // Forbidden from SPIR-V 1.4 on.
        StorageClass::Function | StorageClass::Private => spirv_version < (1, 4),

        _ => true,
    }
}
