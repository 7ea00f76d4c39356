//! Per-id decoration rules, run over a finished decoration table.
//!
//! Every check returns the first violation it finds; the stages run in a
//! fixed order so the reported error is deterministic for a given module.

mod buffers;
mod builtins;
mod multiplicity;
mod targets;

pub use buffers::check_buffers;
pub use builtins::check_builtin_structs;
pub use multiplicity::check_multiplicity;
pub use targets::check_targets;

use crate::decoration::DecorationTable;
use crate::error::ValidationError;
use crate::module_index::ModuleIndex;
use crate::spirv_type::SpirvType;
use crate::vuid::vuid_tag;
use rspirv::spirv::{Decoration, Op, StorageClass, Word};
use spirv_val_types::ValidatorOptions;

/// Everything a check may consult, all read-only.
#[derive(Copy, Clone)]
pub struct CheckContext<'a, 'm> {
    pub index: &'a ModuleIndex<'m>,
    pub table: &'a DecorationTable,
    pub options: &'a ValidatorOptions,
}

impl<'a, 'm> CheckContext<'a, 'm> {
    pub fn new(
        index: &'a ModuleIndex<'m>,
        table: &'a DecorationTable,
        options: &'a ValidatorOptions,
    ) -> Self {
        Self { index, table, options }
    }

    pub fn is_vulkan(&self) -> bool {
        self.options.target_env.is_vulkan()
    }

    /// The VUID tag for `number`, present only when validating for Vulkan.
    pub fn vuid(&self, number: u32) -> Option<&'static str> {
        if self.is_vulkan() { vuid_tag(number) } else { None }
    }

    /// Attaches the Vulkan VUID `number` to `error`.
    pub fn vk(&self, error: ValidationError, number: u32) -> ValidationError {
        error.with_vuid(self.vuid(number))
    }

    pub fn is_variable(&self, id: Word) -> bool {
        self.index.opcode(id) == Some(Op::Variable)
    }

    /// Variables and function parameters.
    pub fn is_memory_object_declaration(&self, id: Word) -> bool {
        matches!(self.index.opcode(id), Some(Op::Variable | Op::FunctionParameter))
    }

    /// The struct a buffer variable's pointee resolves to once one level of
    /// arraying is stripped, if any.
    pub fn block_struct_of(&self, pointee: Word, strip_array: bool) -> Option<Word> {
        let mut id = pointee;
        if strip_array {
            if let Some(element) = self.index.ty(id).and_then(|ty| ty.array_element()) {
                id = element;
            }
        }
        self.index.ty(id).filter(|ty| ty.is_struct()).map(|_| id)
    }

    /// Whether a pointer of `storage_class` to `pointee` points into a uniform block.
    pub fn is_pointer_to_uniform_block(&self, storage_class: StorageClass, pointee: Word) -> bool {
        let element = self.index.strip_arrays(pointee);
        storage_class == StorageClass::Uniform
            && self.table.has_decoration(element, Decoration::Block)
    }

    pub fn is_pointer_to_storage_buffer(&self, storage_class: StorageClass, pointee: Word) -> bool {
        let element = self.index.strip_arrays(pointee);
        match storage_class {
            StorageClass::StorageBuffer | StorageClass::PhysicalStorageBuffer => true,
            StorageClass::Uniform => self.table.has_decoration(element, Decoration::BufferBlock),
            _ => false,
        }
    }

    pub fn is_pointer_to_storage_image(&self, storage_class: StorageClass, pointee: Word) -> bool {
        let element = self.index.strip_arrays(pointee);
        storage_class == StorageClass::UniformConstant
            && matches!(
                self.index.ty(element),
                Some(SpirvType::Image { sampled: 2, .. })
            )
    }
}
