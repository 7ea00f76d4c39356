//! Rules on the interface list of each `OpEntryPoint`: what may be listed,
//! and what the listed variables may share between them.

use crate::checks::CheckContext;
use crate::decoration::kind_name;
use crate::error::{Result, ValidationError};
use crate::module_index::EntryPoint;
use crate::spirv_type::SpirvType;
use indexmap::IndexSet;
use itertools::Itertools;
use rspirv::spirv::{BuiltIn, Capability, Decoration, ExecutionModel, Op, StorageClass, Word};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::debug;

const INTERPOLATION: &[Decoration] = &[
    Decoration::Flat,
    Decoration::NoPerspective,
    Decoration::Sample,
    Decoration::Centroid,
];

/// An interface variable, decoded once per entry point.
#[derive(Copy, Clone, Debug)]
struct InterfaceVar {
    id: Word,
    storage_class: StorageClass,
    pointee: Word,
}

pub fn check_entry_points(cx: CheckContext<'_, '_>) -> Result<()> {
    for entry in cx.index.entry_points() {
        debug!(
            "checking interface of {:?} entry point {}",
            entry.model,
            cx.index.display_id(entry.function)
        );
        let vars = interface_vars(cx, entry)?;
        check_builtin_blocks(cx, entry, &vars)?;
        check_duplicate_builtins(cx, &vars)?;
        if cx.is_vulkan() {
            check_push_constants(cx, entry)?;
        }
        check_workgroup(cx, entry, &vars)?;
        if cx.is_vulkan() {
            check_interpolation(cx, entry, &vars)?;
        }
        check_per_vertex(cx, entry, &vars)?;
    }
    Ok(())
}

/// Decodes the interface list, checking what may appear in it.
fn interface_vars(
    cx: CheckContext<'_, '_>,
    entry: &EntryPoint<'_>,
) -> Result<SmallVec<[InterfaceVar; 8]>> {
    let function = entry.function;
    let lists_globals = cx.index.version() >= (1, 4);
    if lists_globals {
        if let Some(&duplicate) = entry.interface.iter().duplicates().next() {
            return Err(ValidationError::invalid_id(format!(
                "Non-unique OpEntryPoint interface {} is disallowed",
                cx.index.display_id(duplicate)
            ))
            .at(duplicate));
        }
    }

    let mut vars = SmallVec::new();
    for &id in &entry.interface {
        let Some(def) = cx.index.def(id) else {
            return Err(ValidationError::invalid_binary(format!(
                "OpEntryPoint interface id {id} is not defined"
            ))
            .at(function));
        };
        let opcode = def.inst.class.opcode;
        if opcode != Op::Variable {
            return Err(ValidationError::invalid_id(format!(
                "Interfaces passed to OpEntryPoint must be variables. Found Op{opcode:?}."
            ))
            .at(id));
        }
        let (Some(storage_class), Some((_, pointee))) =
            (cx.index.variable_storage_class(id), cx.index.pointer_info(id))
        else {
            return Err(ValidationError::invalid_binary(format!(
                "OpVariable {id} is missing its storage class or pointer type"
            ))
            .at(id));
        };

        if !lists_globals {
            if !matches!(storage_class, StorageClass::Input | StorageClass::Output) {
                return Err(ValidationError::invalid_id(format!(
                    "OpEntryPoint interfaces must be OpVariables with Storage Class of Input(1) or \
                     Output(3). Found Storage Class {} for Entry Point id {function}.",
                    storage_class as u32
                ))
                .at(id));
            }
        } else {
            if def.function.is_some() || storage_class == StorageClass::Function {
                return Err(ValidationError::invalid_id(
                    "OpEntryPoint interfaces should only list global variables",
                )
                .at(id));
            }
            if !storage_class_allowed(storage_class, entry.model) {
                return Err(ValidationError::invalid_id(format!(
                    "{storage_class:?} storage class is not allowed in the interface of a {:?} \
                     entry point. Entry Point id {function} lists variable id {id}.",
                    entry.model
                ))
                .at(id));
            }
        }
        vars.push(InterfaceVar {
            id,
            storage_class,
            pointee,
        });
    }
    Ok(vars)
}

fn is_ray_tracing(model: ExecutionModel) -> bool {
    matches!(
        model,
        ExecutionModel::RayGenerationKHR
            | ExecutionModel::IntersectionKHR
            | ExecutionModel::AnyHitKHR
            | ExecutionModel::ClosestHitKHR
            | ExecutionModel::MissKHR
            | ExecutionModel::CallableKHR
    )
}

/// Storage classes only some execution models may list.
fn storage_class_allowed(storage_class: StorageClass, model: ExecutionModel) -> bool {
    use ExecutionModel as M;
    match storage_class {
        StorageClass::RayPayloadKHR
        | StorageClass::IncomingRayPayloadKHR
        | StorageClass::HitAttributeKHR
        | StorageClass::CallableDataKHR
        | StorageClass::IncomingCallableDataKHR
        | StorageClass::ShaderRecordBufferKHR => is_ray_tracing(model),
        StorageClass::HitObjectAttributeNV => {
            matches!(model, M::RayGenerationKHR | M::ClosestHitKHR | M::MissKHR)
        }
        StorageClass::TaskPayloadWorkgroupEXT => matches!(model, M::TaskEXT | M::MeshEXT),
        StorageClass::Workgroup => matches!(
            model,
            M::GLCompute | M::Kernel | M::TaskNV | M::MeshNV | M::TaskEXT | M::MeshEXT
        ),
        _ => true,
    }
}

/// The struct behind an interface variable's pointee, arrays stripped.
fn interface_struct(cx: CheckContext<'_, '_>, var: &InterfaceVar) -> Option<Word> {
    let id = cx.index.strip_arrays(var.pointee);
    cx.index.ty(id).filter(SpirvType::is_struct).map(|_| id)
}

fn is_builtin_block(cx: CheckContext<'_, '_>, var: &InterfaceVar) -> bool {
    interface_struct(cx, var).is_some_and(|st| cx.table.any_member_has(st, Decoration::BuiltIn))
}

fn check_builtin_blocks(
    cx: CheckContext<'_, '_>,
    entry: &EntryPoint<'_>,
    vars: &[InterfaceVar],
) -> Result<()> {
    let mut seen = FxHashSet::default();
    for var in vars {
        if !matches!(var.storage_class, StorageClass::Input | StorageClass::Output)
            || !is_builtin_block(cx, var)
        {
            continue;
        }
        if let Some(st) = interface_struct(cx, var) {
            if !cx.table.has_decoration(st, Decoration::Block) {
                return Err(cx.vk(
                    ValidationError::invalid_id(
                        "Interface struct has no Block decoration but has BuiltIn members. \
                         Location decorations must be used on each member of OpVariable with a \
                         structure type that is a block not decorated with Location.",
                    )
                    .at(st),
                    4919,
                ));
            }
        }
        if !seen.insert(var.storage_class) {
            return Err(ValidationError::invalid_binary(format!(
                "There must be at most one object per Storage Class that can contain a structure \
                 type containing members decorated with BuiltIn, consumed per entry-point. Entry \
                 Point id {} does not meet this requirement.",
                entry.function
            ))
            .at(var.id));
        }
    }
    Ok(())
}

/// Built-ins a variable provides: its own, or those of its block's members.
fn builtins_of(cx: CheckContext<'_, '_>, var: &InterfaceVar) -> SmallVec<[BuiltIn; 4]> {
    let own = cx.table.id_decorations(var.id).iter().filter(|d| d.member().is_none());
    let members = interface_struct(cx, var)
        .into_iter()
        .flat_map(|st| cx.table.id_decorations(st).iter().filter(|d| d.member().is_some()));
    own.chain(members)
        .filter(|d| d.kind() == Decoration::BuiltIn)
        .filter_map(|d| d.builtin())
        .collect()
}

fn check_duplicate_builtins(cx: CheckContext<'_, '_>, vars: &[InterfaceVar]) -> Result<()> {
    for (storage_class, direction, vuid) in [
        (StorageClass::Input, "input", 9658),
        (StorageClass::Output, "output", 9659),
    ] {
        let mut seen = FxHashSet::default();
        for var in vars.iter().filter(|var| var.storage_class == storage_class) {
            for builtin in builtins_of(cx, var) {
                if !seen.insert(builtin) {
                    return Err(cx.vk(
                        ValidationError::invalid_id(format!(
                            "OpEntryPoint contains duplicate {direction} variables with \
                             {builtin:?} builtin"
                        ))
                        .at(var.id),
                        vuid,
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Push constant variables statically used by the entry point, whether
/// listed in its interface or not.
fn check_push_constants(cx: CheckContext<'_, '_>, entry: &EntryPoint<'_>) -> Result<()> {
    let used = cx
        .index
        .module()
        .types_global_values
        .iter()
        .filter_map(|inst| inst.result_id)
        .filter(|&id| cx.index.variable_storage_class(id) == Some(StorageClass::PushConstant))
        .filter(|&id| cx.index.entry_point_references(id).contains(&entry.function))
        .count();
    if used > 1 {
        return Err(cx.vk(
            ValidationError::invalid_id(format!(
                "Entry point id '{}' uses more than one PushConstant interface.\n\
                 From Vulkan spec:\n\
                 There must be no more than one push constant block statically used per shader \
                 entry point.",
                entry.function
            ))
            .at(entry.function),
            6674,
        ));
    }
    Ok(())
}

fn check_workgroup(
    cx: CheckContext<'_, '_>,
    entry: &EntryPoint<'_>,
    vars: &[InterfaceVar],
) -> Result<()> {
    let workgroup: SmallVec<[&InterfaceVar; 4]> =
        vars.iter().filter(|var| var.storage_class == StorageClass::Workgroup).collect();
    let blocks: IndexSet<Word> = workgroup
        .iter()
        .filter(|var| {
            interface_struct(cx, var)
                .is_some_and(|st| cx.table.has_decoration(st, Decoration::Block))
        })
        .map(|var| var.id)
        .collect();
    if blocks.is_empty() {
        return Ok(());
    }
    let function = entry.function;
    if !cx.index.has_capability(Capability::WorkgroupMemoryExplicitLayoutKHR) {
        return Err(ValidationError::invalid_binary(
            "Workgroup Storage Class variables can't be decorated with Block unless declaring the \
             WorkgroupMemoryExplicitLayoutKHR capability.",
        )
        .at(blocks[0]));
    }
    if blocks.len() != workgroup.len() {
        return Err(ValidationError::invalid_binary(format!(
            "When declaring WorkgroupMemoryExplicitLayoutKHR, either all or none of the Workgroup \
             Storage Class variables in the entry point interface must point to struct types \
             decorated with Block (or an array of them). Entry point id {function} does not meet \
             this requirement."
        ))
        .at(function));
    }
    if blocks.len() > 1
        && !blocks.iter().all(|&var| cx.table.has_decoration(var, Decoration::Aliased))
    {
        return Err(ValidationError::invalid_binary(format!(
            "When declaring WorkgroupMemoryExplicitLayoutKHR, if more than one Workgroup Storage \
             Class variable in the entry point interface point to a type decorated with Block, all \
             of them must be decorated with Aliased (or an array of them). Entry point id \
             {function} does not meet this requirement."
        ))
        .at(function));
    }
    Ok(())
}

fn check_interpolation(
    cx: CheckContext<'_, '_>,
    entry: &EntryPoint<'_>,
    vars: &[InterfaceVar],
) -> Result<()> {
    let function = entry.function;
    for var in vars {
        let forbidden = match (entry.model, var.storage_class) {
            (ExecutionModel::Fragment, StorageClass::Output) => Some(("Output", "Fragment", 6201)),
            (ExecutionModel::Vertex, StorageClass::Input) => Some(("Input", "Vertex", 6202)),
            _ => None,
        };
        if let Some((storage, stage, vuid)) = forbidden {
            let decorated = cx
                .table
                .id_decorations(var.id)
                .iter()
                .find(|d| INTERPOLATION.contains(&d.kind()));
            if let Some(decoration) = decorated {
                return Err(cx.vk(
                    ValidationError::invalid_id(format!(
                        "{} decoration is not allowed on {storage} variables of a {stage} entry \
                         point. Entry Point id {function}, variable id {}.",
                        kind_name(decoration.kind()),
                        var.id
                    ))
                    .at(var.id),
                    vuid,
                ));
            }
        }

        if entry.model == ExecutionModel::Fragment
            && var.storage_class == StorageClass::Input
            && cx.index.entry_point_references(var.id).contains(&function)
            && needs_flat(cx, var)
        {
            return Err(cx.vk(
                ValidationError::invalid_id(format!(
                    "Fragment OpEntryPoint operand {} with Input interfaces with integer or float \
                     type must have a Flat decoration for Entry Point id {function}.",
                    var.id
                ))
                .at(var.id),
                4744,
            ));
        }
    }
    Ok(())
}

/// Integer and 64-bit float fragment inputs can't be interpolated.
fn needs_flat(cx: CheckContext<'_, '_>, var: &InterfaceVar) -> bool {
    if cx.table.has_decoration(var.id, Decoration::Flat)
        || cx.table.has_decoration(var.id, Decoration::BuiltIn)
    {
        return false;
    }
    let not_interpolable = |ty: Word| {
        matches!(
            cx.index.numeric_shape(cx.index.strip_arrays(ty)),
            Some((SpirvType::Integer(..), ..) | (SpirvType::Float(64), ..))
        )
    };
    match interface_struct(cx, var).and_then(|st| Some((st, cx.index.ty(st)?))) {
        Some((st, ty)) => {
            if cx.table.any_member_has(st, Decoration::BuiltIn) {
                return false;
            }
            (0..ty.member_count()).any(|member| {
                ty.member(member).is_some_and(not_interpolable)
                    && !cx.table.has_member_decoration(st, member, Decoration::Flat)
            })
        }
        None => not_interpolable(var.pointee),
    }
}

fn check_per_vertex(
    cx: CheckContext<'_, '_>,
    entry: &EntryPoint<'_>,
    vars: &[InterfaceVar],
) -> Result<()> {
    for var in vars {
        if !cx.table.has_decoration(var.id, Decoration::PerVertexKHR) {
            continue;
        }
        if entry.model != ExecutionModel::Fragment {
            return Err(cx.vk(
                ValidationError::invalid_id(
                    "PerVertexKHR can only be applied to Fragment Execution Models",
                )
                .at(var.id),
                6777,
            ));
        }
        if !cx.index.ty(var.pointee).is_some_and(|ty| ty.is_array()) {
            return Err(cx.vk(
                ValidationError::invalid_id("PerVertexKHR must be declared as arrays").at(var.id),
                6778,
            ));
        }
    }
    Ok(())
}
