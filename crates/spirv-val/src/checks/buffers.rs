//! Storage-class requirements on buffer variables, and the explicit layout
//! of the blocks they hold.

use super::CheckContext;
use crate::error::{Result, ValidationError};
use crate::layout::{LayoutPolicy, LayoutWalker, allows_layout, block_decoration};
use crate::spirv_type::SpirvType;
use rspirv::spirv::{Capability, Decoration, Op, StorageClass, Word};
use tracing::trace;

/// Checks every global variable in module order, then every block reachable
/// through a `PhysicalStorageBuffer` pointer type.
pub fn check_buffers(cx: CheckContext<'_, '_>) -> Result<()> {
    let mut walker = LayoutWalker::new(cx.index, cx.table);
    if !cx.options.skip_block_layout {
        for (id, _) in cx.table.all_targets() {
            if block_decoration(cx.table, id).is_some() {
                walker.check_nesting(id)?;
            }
        }
    }

    let globals = &cx.index.module().types_global_values;
    for inst in globals.iter().filter(|inst| inst.class.opcode == Op::Variable) {
        let Some(id) = inst.result_id else {
            continue;
        };
        let (Some(storage_class), Some((_, pointee))) =
            (cx.index.variable_storage_class(id), cx.index.pointer_info(id))
        else {
            continue;
        };
        check_storage_requirements(cx, id, storage_class, pointee)?;
        check_variable_layout(cx, &mut walker, storage_class, pointee)?;
    }

    for inst in globals.iter().filter(|inst| inst.class.opcode == Op::TypePointer) {
        let Some(SpirvType::Pointer {
            storage_class: StorageClass::PhysicalStorageBuffer,
            pointee,
        }) = inst.result_id.and_then(|id| cx.index.ty(id))
        else {
            continue;
        };
        if let Some(block) = cx.block_struct_of(pointee, false) {
            let buffer_block = cx.table.has_decoration(block, Decoration::BufferBlock);
            let storage_class = StorageClass::PhysicalStorageBuffer;
            let policy = LayoutPolicy::select(storage_class, buffer_block, cx.options);
            walker.check_block(block, storage_class, policy)?;
        }
    }
    Ok(())
}

fn check_variable_layout(
    cx: CheckContext<'_, '_>,
    walker: &mut LayoutWalker<'_, '_>,
    storage_class: StorageClass,
    pointee: Word,
) -> Result<()> {
    match storage_class {
        StorageClass::Uniform | StorageClass::StorageBuffer | StorageClass::PushConstant => {}
        StorageClass::Workgroup => {
            let explicit = cx.index.has_capability(Capability::WorkgroupMemoryExplicitLayoutKHR);
            if !allows_layout(storage_class, cx.index.version(), explicit) {
                return Ok(());
            }
        }
        _ => return Ok(()),
    }
    let strip_array = storage_class != StorageClass::Workgroup;
    let Some(block) = cx.block_struct_of(pointee, strip_array) else {
        return Ok(());
    };
    let buffer_block = cx.table.has_decoration(block, Decoration::BufferBlock);
    let policy = LayoutPolicy::select(storage_class, buffer_block, cx.options);
    walker.check_block(block, storage_class, policy)
}

fn check_storage_requirements(
    cx: CheckContext<'_, '_>,
    id: Word,
    storage_class: StorageClass,
    pointee: Word,
) -> Result<()> {
    let block = cx.block_struct_of(pointee, true);
    let has_block = block.is_some_and(|st| cx.table.has_decoration(st, Decoration::Block));
    let has_buffer_block =
        block.is_some_and(|st| cx.table.has_decoration(st, Decoration::BufferBlock));
    let statically_used = !cx.index.entry_point_references(id).is_empty();
    trace!(
        "{} in {:?}: block {has_block}, buffer block {has_buffer_block}, used {statically_used}",
        cx.index.display_id(id),
        storage_class
    );

    if cx.is_vulkan() {
        let descriptor = matches!(
            storage_class,
            StorageClass::Uniform | StorageClass::StorageBuffer | StorageClass::UniformConstant
        );
        if descriptor && statically_used {
            for required in [Decoration::DescriptorSet, Decoration::Binding] {
                if !cx.table.has_decoration(id, required) {
                    return Err(cx.vk(
                        ValidationError::invalid_id(format!(
                            "{storage_class:?} id '{id}' is missing {required:?} decoration.\n\
                             From Vulkan spec:\n\
                             These variables must have DescriptorSet and Binding decorations \
                             specified"
                        ))
                        .at(id),
                        6677,
                    ));
                }
            }
        }
        // Block requirements only concern struct pointees.
        if block.is_none() {
            return Ok(());
        }
        if storage_class == StorageClass::PushConstant && !has_block {
            return Err(cx.vk(
                ValidationError::invalid_id(format!(
                    "PushConstant id '{id}' is missing Block decoration.\nFrom Vulkan spec:\n\
                     Such variables must be identified with a Block decoration"
                ))
                .at(id),
                6675,
            ));
        }
        if storage_class == StorageClass::StorageBuffer {
            if has_buffer_block {
                return Err(cx.vk(
                    ValidationError::invalid_id(format!(
                        "StorageBuffer id '{id}' is decorated with BufferBlock.\n\
                         From Vulkan spec:\n\
                         In Vulkan, BufferBlock is disallowed on variables in the StorageBuffer \
                         storage class"
                    ))
                    .at(id),
                    6675,
                ));
            }
            if !has_block {
                return Err(cx.vk(
                    ValidationError::invalid_id(format!(
                        "StorageBuffer id '{id}' is missing Block decoration.\nFrom Vulkan spec:\n\
                         Such variables must be identified with a Block decoration"
                    ))
                    .at(id),
                    6675,
                ));
            }
        }
        if storage_class == StorageClass::Uniform && !has_block && !has_buffer_block {
            return Err(cx.vk(
                ValidationError::invalid_id(format!(
                    "Uniform id '{id}' is missing Block or BufferBlock decoration.\n\
                     From Vulkan spec:\n\
                     Such variables must be identified with a Block or BufferBlock decoration"
                ))
                .at(id),
                6676,
            ));
        }
    } else if cx.options.target_env.is_opengl()
        && statically_used
        && matches!(storage_class, StorageClass::Uniform | StorageClass::StorageBuffer)
        && (has_block || has_buffer_block)
        && !cx.table.has_decoration(id, Decoration::Binding)
    {
        return Err(ValidationError::invalid_id(format!(
            "{storage_class:?} id '{id}' is missing Binding decoration.\n\
             From ARB_gl_spirv extension:\n\
             Uniform and shader storage block variables must also be decorated with a Binding."
        ))
        .at(id));
    }
    Ok(())
}
