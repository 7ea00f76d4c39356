//! What each decoration may be applied to, and environment-specific limits
//! on where it may appear.

use super::CheckContext;
use crate::decoration::{Decoration, kind_name};
use crate::error::{Result, ValidationError};
use crate::spirv_type::SpirvType;
use rspirv::dr::Operand;
use rspirv::spirv::{BuiltIn, Capability, Decoration as D, FPRoundingMode, Op, StorageClass, Word};
use std::fmt;

/// Storage classes `Location` and `Component` may be used with under Vulkan.
const LOCATION_STORAGE: &[StorageClass] = &[
    StorageClass::Input,
    StorageClass::Output,
    StorageClass::RayPayloadKHR,
    StorageClass::IncomingRayPayloadKHR,
    StorageClass::HitAttributeKHR,
    StorageClass::CallableDataKHR,
    StorageClass::IncomingCallableDataKHR,
    StorageClass::ShaderRecordBufferKHR,
    StorageClass::HitObjectAttributeNV,
];

const INTERFACE_STORAGE: &[StorageClass] = &[StorageClass::Input, StorageClass::Output];

const ROUNDED_STORE_STORAGE: &[StorageClass] = &[
    StorageClass::StorageBuffer,
    StorageClass::PhysicalStorageBuffer,
    StorageClass::Uniform,
    StorageClass::PushConstant,
    StorageClass::Input,
    StorageClass::Output,
];

const VALID_SCOPES: std::ops::RangeInclusive<u32> = 0..=6;
const SCOPE_WORKGROUP: u32 = 2;
const SCOPE_SUBGROUP: u32 = 3;

fn on_target(kind: D, id: Word, detail: impl fmt::Display) -> ValidationError {
    let kind = kind_name(kind);
    ValidationError::invalid_id(format!("{kind} decoration on target <id> {id} {detail}")).at(id)
}

/// Checks every decoration against the instruction it targets.
pub fn check_targets(cx: CheckContext<'_, '_>) -> Result<()> {
    for (id, decorations) in cx.table.all_targets() {
        // Groups only carry decorations on behalf of their targets.
        if cx.index.opcode(id) == Some(Op::DecorationGroup) {
            continue;
        }
        for decoration in decorations {
            match decoration.member() {
                None => check_object_decoration(cx, id, decoration)?,
                Some(member) => check_member_decoration(cx, id, member, decoration)?,
            }
        }
    }
    Ok(())
}

fn check_member_decoration(
    cx: CheckContext<'_, '_>,
    struct_id: Word,
    member: u32,
    decoration: &Decoration,
) -> Result<()> {
    if decoration.kind() == D::Component {
        if let Some(member_ty) = cx.index.ty(struct_id).and_then(|ty| ty.member(member)) {
            check_component(cx, struct_id, member_ty, decoration)?;
        }
    }
    Ok(())
}

fn check_object_decoration(
    cx: CheckContext<'_, '_>,
    id: Word,
    decoration: &Decoration,
) -> Result<()> {
    let kind = decoration.kind();
    if cx.is_vulkan() && matches!(kind, D::GLSLShared | D::GLSLPacked) {
        return Err(cx.vk(
            ValidationError::invalid_id(format!(
                "OpDecorate decoration '{}' is not valid for the Vulkan execution environment.",
                kind_name(kind)
            ))
            .at(id),
            4669,
        ));
    }
    check_target_kind(cx, id, decoration)?;

    match kind {
        D::Block | D::BufferBlock => check_block(cx, id, kind),
        D::Location | D::Component => {
            storage_gate(cx, id, kind, LOCATION_STORAGE, 6672)?;
            if kind == D::Component {
                if let Some((_, pointee)) = cx.index.pointer_info(id) {
                    check_component(cx, id, pointee, decoration)?;
                }
            }
            Ok(())
        }
        D::Index => storage_gate(cx, id, kind, INTERFACE_STORAGE, 6672),
        D::Flat | D::NoPerspective | D::Centroid | D::Sample => {
            storage_gate(cx, id, kind, INTERFACE_STORAGE, 4670)
        }
        D::InputAttachmentIndex => {
            storage_gate(cx, id, kind, &[StorageClass::UniformConstant], 6678)
        }
        D::PerVertexKHR => storage_gate(cx, id, kind, &[StorageClass::Input], 6777),
        D::NonWritable | D::NonReadable => check_non_writable(cx, id, kind),
        D::FPRoundingMode => check_rounding_mode(cx, id, decoration),
        D::NoSignedWrap | D::NoUnsignedWrap => check_integer_wrap(cx, id, kind),
        D::Uniform | D::UniformId => check_uniform(cx, id, decoration),
        D::LinkageAttributes => check_linkage(cx, id, decoration),
        _ => Ok(()),
    }
}

/// The kind of instruction each decoration may target.
fn check_target_kind(cx: CheckContext<'_, '_>, id: Word, decoration: &Decoration) -> Result<()> {
    let kind = decoration.kind();
    let Some(opcode) = cx.index.opcode(id) else {
        return Ok(());
    };
    match kind {
        D::SpecId => {
            if !matches!(
                opcode,
                Op::SpecConstant | Op::SpecConstantTrue | Op::SpecConstantFalse
            ) {
                return Err(on_target(kind, id, "must be a scalar specialization constant"));
            }
        }
        D::GLSLShared | D::GLSLPacked | D::CPacked => {
            if opcode != Op::TypeStruct {
                return Err(on_target(kind, id, "must be a structure type"));
            }
        }
        D::ArrayStride => {
            if !matches!(opcode, Op::TypeArray | Op::TypeRuntimeArray | Op::TypePointer) {
                return Err(on_target(kind, id, "must be an array or pointer type"));
            }
        }
        D::BuiltIn => {
            let is_constant = is_constant_op(opcode);
            if opcode != Op::Variable && !is_constant {
                return Err(ValidationError::invalid_id(
                    "BuiltIns can only target variables, structure members or constants",
                )
                .at(id));
            }
            if cx.index.has_capability(Capability::Shader)
                && decoration.builtin() == Some(BuiltIn::WorkgroupSize)
            {
                if !is_constant {
                    return Err(on_target(kind, id, "must be a constant for WorkgroupSize"));
                }
            } else if opcode != Op::Variable {
                return Err(on_target(kind, id, "must be a variable"));
            }
        }
        D::NoPerspective
        | D::Flat
        | D::Patch
        | D::Centroid
        | D::Sample
        | D::Restrict
        | D::Aliased
        | D::Volatile
        | D::Coherent
        | D::NonWritable
        | D::NonReadable
        | D::XfbBuffer
        | D::XfbStride
        | D::Component
        | D::Stream
        | D::RestrictPointer
        | D::AliasedPointer => {
            if !cx.is_memory_object_declaration(id) {
                return Err(on_target(kind, id, "must be a memory object declaration"));
            }
            if cx.index.pointer_info(id).is_none() {
                return Err(on_target(kind, id, "must be a pointer type"));
            }
        }
        D::Location => {
            if !cx.is_variable(id) {
                return Err(ValidationError::invalid_id(
                    "Location decoration can only be applied to a variable or member of a \
                     structure type",
                )
                .at(id));
            }
        }
        D::Invariant | D::Index | D::Binding | D::DescriptorSet | D::InputAttachmentIndex => {
            if !cx.is_variable(id) {
                return Err(on_target(kind, id, "must be a variable"));
            }
        }
        _ => {}
    }
    Ok(())
}

fn is_constant_op(opcode: Op) -> bool {
    matches!(
        opcode,
        Op::Constant
            | Op::ConstantTrue
            | Op::ConstantFalse
            | Op::ConstantComposite
            | Op::ConstantNull
            | Op::SpecConstant
            | Op::SpecConstantTrue
            | Op::SpecConstantFalse
            | Op::SpecConstantComposite
            | Op::SpecConstantOp
    )
}

/// Under Vulkan, `kind` may only decorate variables in `allowed` storage.
fn storage_gate(
    cx: CheckContext<'_, '_>,
    id: Word,
    kind: D,
    allowed: &[StorageClass],
    vuid: u32,
) -> Result<()> {
    if !cx.is_vulkan() {
        return Ok(());
    }
    match cx.index.variable_storage_class(id) {
        Some(storage_class) if !allowed.contains(&storage_class) => Err(cx.vk(
            ValidationError::invalid_id(format!(
                "{} decoration must not be applied to this storage class",
                kind_name(kind)
            ))
            .at(id),
            vuid,
        )),
        _ => Ok(()),
    }
}

fn check_block(cx: CheckContext<'_, '_>, id: Word, kind: D) -> Result<()> {
    if !matches!(cx.index.ty(id), Some(SpirvType::Struct { .. })) {
        let kind = kind_name(kind);
        return Err(
            ValidationError::invalid_id(format!("{kind} decoration on a non-struct type.")).at(id),
        );
    }
    if kind == D::BufferBlock && cx.index.version() >= (1, 4) {
        return Err(ValidationError::wrong_version(
            "BufferBlock decoration requires SPIR-V version 1.3 or earlier",
        )
        .at(id));
    }
    Ok(())
}

/// `Component` on a variable (`ty` is its pointee) or on a struct member.
fn check_component(
    cx: CheckContext<'_, '_>,
    id: Word,
    ty: Word,
    decoration: &Decoration,
) -> Result<()> {
    if !cx.is_vulkan() {
        return Ok(());
    }
    let component = decoration.literal().unwrap_or(0);
    let Some((_, width, count)) = cx.index.numeric_shape(cx.index.strip_arrays(ty)) else {
        return Err(cx.vk(
            ValidationError::invalid_id("Component decoration specified for invalid type").at(id),
            4924,
        ));
    };
    if component > 3 {
        return Err(cx.vk(
            ValidationError::invalid_data("Component decoration value must not be greater than 3")
                .at(id),
            4920,
        ));
    }
    let (consumed, vuid) = if width == 64 {
        if count > 2 {
            return Err(cx.vk(
                ValidationError::invalid_data(
                    "Component decoration only allowed on 64-bit scalar and 2-component vector",
                )
                .at(id),
                7703,
            ));
        }
        if component == 1 || component == 3 {
            return Err(cx.vk(
                ValidationError::invalid_data(
                    "Component decoration value must not be 1 or 3 for 64-bit data types",
                )
                .at(id),
                4923,
            ));
        }
        (2 * count, 4922)
    } else {
        (count, 4921)
    };
    let end = component + consumed;
    if end > 4 {
        return Err(cx.vk(
            ValidationError::invalid_data(format!(
                "Sequence of components starting with {component} and ending with {} gets \
                 larger than 3",
                end - 1
            ))
            .at(id),
            vuid,
        ));
    }
    Ok(())
}

fn check_non_writable(cx: CheckContext<'_, '_>, id: Word, kind: D) -> Result<()> {
    let Some((storage_class, pointee)) = cx.index.pointer_info(id) else {
        return Ok(());
    };
    let private_allowed = cx.index.version() >= (1, 4);
    if private_allowed && matches!(storage_class, StorageClass::Function | StorageClass::Private) {
        return Ok(());
    }
    if cx.is_pointer_to_uniform_block(storage_class, pointee)
        || cx.is_pointer_to_storage_buffer(storage_class, pointee)
        || cx.is_pointer_to_storage_image(storage_class, pointee)
    {
        return Ok(());
    }
    let allowed = if private_allowed {
        "storage buffer, or variable in Private or Function storage class"
    } else {
        "or storage buffer"
    };
    Err(ValidationError::invalid_id(format!(
        "Target of {} decoration is invalid: must point to a storage image, uniform block, \
         {allowed}. Found a pointer in the {storage_class:?} storage class.",
        kind_name(kind)
    ))
    .at(id))
}

fn check_rounding_mode(
    cx: CheckContext<'_, '_>,
    id: Word,
    decoration: &Decoration,
) -> Result<()> {
    // Kernels may round any conversion.
    if cx.index.has_capability(Capability::Kernel) {
        return Ok(());
    }
    if cx.index.opcode(id) != Some(Op::FConvert) {
        return Err(ValidationError::invalid_id(
            "FPRoundingMode decoration can be applied only to a width-only conversion \
             instruction for floating-point object.",
        )
        .at(id));
    }
    if cx.is_vulkan()
        && !matches!(
            decoration.rounding_mode(),
            Some(FPRoundingMode::RTE | FPRoundingMode::RTZ)
        )
    {
        return Err(cx.vk(
            ValidationError::invalid_id(
                "In Vulkan, the FPRoundingMode mode must only by RTE or RTZ.",
            )
            .at(id),
            4675,
        ));
    }

    let store_error = |detail: &str| {
        ValidationError::invalid_id(format!(
            "FPRoundingMode decoration can be applied only to the Object operand of an \
             OpStore{detail}."
        ))
        .at(id)
    };
    for use_ in cx.index.uses(id) {
        let opcode = use_.inst.class.opcode;
        if opcode == Op::FConvert || is_debug_use(cx, use_.inst) {
            continue;
        }
        if opcode != Op::Store || use_.operand != 1 {
            return Err(store_error(""));
        }
        let Some((storage_class, pointee)) = use_
            .inst
            .operands
            .first()
            .and_then(Operand::id_ref_any)
            .and_then(|pointer| cx.index.pointer_info(pointer))
        else {
            return Err(store_error(""));
        };
        if !matches!(cx.index.numeric_shape(pointee), Some((SpirvType::Float(_), 16, _))) {
            return Err(store_error(
                " storing through a pointer to a 16-bit floating-point scalar or vector object",
            ));
        }
        if !ROUNDED_STORE_STORAGE.contains(&storage_class) {
            return Err(store_error(
                " in the StorageBuffer, PhysicalStorageBuffer, Uniform, PushConstant, Input, or \
                 Output Storage Classes",
            ));
        }
    }
    Ok(())
}

/// Line info and non-semantic extended instructions don't count as uses.
fn is_debug_use(cx: CheckContext<'_, '_>, inst: &rspirv::dr::Instruction) -> bool {
    match inst.class.opcode {
        Op::Line | Op::NoLine => true,
        Op::ExtInst => inst
            .operands
            .first()
            .and_then(Operand::id_ref_any)
            .and_then(|set| cx.index.inst(set))
            .is_some_and(|import| {
                matches!(
                    import.operands.first(),
                    Some(Operand::LiteralString(name)) if name.starts_with("NonSemantic.")
                )
            }),
        _ => false,
    }
}

fn check_integer_wrap(cx: CheckContext<'_, '_>, id: Word, kind: D) -> Result<()> {
    if cx.index.version() < (1, 4)
        && !cx.index.has_extension("SPV_KHR_no_integer_wrap_decoration")
    {
        return Err(ValidationError::wrong_version(format!(
            "{} decoration requires SPIR-V version 1.4 or later, or the \
             SPV_KHR_no_integer_wrap_decoration extension",
            kind_name(kind)
        ))
        .at(id));
    }
    let Some(opcode) = cx.index.opcode(id) else {
        return Ok(());
    };
    let allowed = match kind {
        D::NoSignedWrap => matches!(
            opcode,
            Op::IAdd | Op::ISub | Op::IMul | Op::ShiftLeftLogical | Op::SNegate | Op::ExtInst
        ),
        _ => matches!(
            opcode,
            Op::IAdd | Op::ISub | Op::IMul | Op::ShiftLeftLogical | Op::ExtInst
        ),
    };
    if !allowed {
        return Err(ValidationError::invalid_id(format!(
            "{} decoration may not be applied to Op{opcode:?}",
            kind_name(kind)
        ))
        .at(id));
    }
    Ok(())
}

fn check_uniform(cx: CheckContext<'_, '_>, id: Word, decoration: &Decoration) -> Result<()> {
    let kind = decoration.kind();
    if kind == D::UniformId && cx.index.version() < (1, 4) {
        return Err(ValidationError::wrong_version(
            "UniformId decoration requires SPIR-V version 1.4 or later",
        )
        .at(id));
    }
    let name = kind_name(kind);
    let result_type = cx.index.inst(id).and_then(|inst| inst.result_type);
    let Some(result_type) = result_type else {
        return Err(
            ValidationError::invalid_id(format!("{name} decoration applied to a non-object"))
                .at(id),
        );
    };
    if matches!(cx.index.ty(result_type), Some(SpirvType::Void)) {
        return Err(ValidationError::invalid_id(format!(
            "{name} decoration applied to a value with void type"
        ))
        .at(id));
    }
    if kind != D::UniformId {
        return Ok(());
    }

    let Some(scope) = decoration.id_param() else {
        return Err(
            ValidationError::invalid_binary("UniformId decoration is missing its scope operand")
                .at(id),
        );
    };
    let scope_is_int32 = cx
        .index
        .type_of(scope)
        .and_then(|ty| cx.index.ty(ty))
        .is_some_and(|ty| matches!(ty, SpirvType::Integer(32, _)));
    if !scope_is_int32 {
        return Err(ValidationError::invalid_data(format!(
            "UniformId scope <id> {scope} must be a 32-bit integer scalar"
        ))
        .at(id));
    }
    // Specialization constants and computed scopes can't be checked, so they
    // are rejected outright.
    let Some(value) = cx.index.eval_u32_constant(scope) else {
        return Err(ValidationError::invalid_data(format!(
            "UniformId scope <id> {scope} must be an OpConstant"
        ))
        .at(id));
    };
    if !VALID_SCOPES.contains(&value) {
        return Err(ValidationError::invalid_data(format!("Invalid scope value: {value}")).at(id));
    }
    if cx.is_vulkan() && value != SCOPE_WORKGROUP && value != SCOPE_SUBGROUP {
        return Err(cx.vk(
            ValidationError::invalid_data(
                "UniformId: in Vulkan environment, Execution Scope is limited to Workgroup and \
                 Subgroup",
            )
            .at(id),
            4636,
        ));
    }
    Ok(())
}

fn check_linkage(cx: CheckContext<'_, '_>, id: Word, decoration: &Decoration) -> Result<()> {
    if cx.index.opcode(id) != Some(Op::Function) {
        return Ok(());
    }
    if cx.index.entry_points().iter().any(|entry| entry.function == id) {
        return Err(ValidationError::invalid_binary(format!(
            "The LinkageAttributes Decoration (Linkage name: {}) cannot be applied to function \
             id {id} because it is targeted by an OpEntryPoint instruction.",
            decoration.string().unwrap_or_default()
        ))
        .at(id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::test::{TestModule, validate_in};
    use crate::{DecorationTable, Result};
    use pretty_assertions::assert_eq;
    use rspirv::dr::Operand;
    use rspirv::spirv::{
        BuiltIn, Decoration as D, Dim, ExecutionModel, FPRoundingMode, Op, StorageClass,
    };
    use spirv_val_types::SpirvTargetEnv;

    #[test]
    fn location_targets() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let st = m.type_struct(&[float]);
        m.decorate(st, D::Location, [Operand::LiteralBit32(0)]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            "Location decoration can only be applied to a variable or member of a structure type"
        );

        let mut m = TestModule::new();
        let float = m.type_float(32);
        let st = m.type_struct(&[float]);
        m.member_decorate(st, 0, D::Location, [Operand::LiteralBit32(0)]);
        let var = m.variable(StorageClass::Input, st);
        m.entry_point(ExecutionModel::Vertex, "main", &[var], &[var], &[]);
        assert!(validate_in(m, SpirvTargetEnv::Spv_1_6).is_ok());
    }

    #[test]
    fn location_storage_under_vulkan() {
        let mut m = TestModule::for_env(SpirvTargetEnv::Vulkan_1_0);
        let float = m.type_float(32);
        let var = m.variable(StorageClass::Private, float);
        m.decorate(var, D::Location, [Operand::LiteralBit32(0)]);
        let err = validate_in(m, SpirvTargetEnv::Vulkan_1_0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[VUID-StandaloneSpirv-Location-06672] Location decoration must not be applied to \
             this storage class"
        );
    }

    #[test]
    fn memory_object_decorations() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        m.decorate(float, D::Restrict, []);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            format!(
                "Restrict decoration on target <id> {float} must be a memory object declaration"
            )
        );
    }

    #[test]
    fn memory_objects_include_parameters() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let pointer = m.type_pointer(StorageClass::StorageBuffer, float);
        let param = m.function_param(pointer);
        m.decorate(param, D::Restrict, []);
        m.function(&[], &[]);
        assert!(validate_in(m, SpirvTargetEnv::Spv_1_6).is_ok());

        let mut m = TestModule::new();
        let float = m.type_float(32);
        let param = m.function_param(float);
        m.decorate(param, D::Volatile, []);
        m.function(&[], &[]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            format!("Volatile decoration on target <id> {param} must be a pointer type")
        );
    }

    #[test]
    fn binding_needs_a_variable() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        m.decorate(float, D::Binding, [Operand::LiteralBit32(0)]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            format!("Binding decoration on target <id> {float} must be a variable")
        );
    }

    #[test]
    fn spec_id_and_array_stride_targets() {
        let mut m = TestModule::new();
        let c = m.constant_u32(1);
        m.decorate(c, D::SpecId, [Operand::LiteralBit32(0)]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            format!("SpecId decoration on target <id> {c} must be a scalar specialization constant")
        );

        let mut m = TestModule::new();
        let float = m.type_float(32);
        m.array_stride(float, 4);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            format!(
                "ArrayStride decoration on target <id> {float} must be an array or pointer type"
            )
        );
    }

    #[test]
    fn block_on_non_struct() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        m.decorate(float, D::Block, []);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(err.message, "Block decoration on a non-struct type.");
    }

    #[test]
    fn buffer_block_is_pre_1_4() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let st = m.type_struct(&[float]);
        m.decorate(st, D::BufferBlock, []);
        m.offsets(st, &[0]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(err.kind, ErrorKind::WrongVersion);

        let mut m = TestModule::for_env(SpirvTargetEnv::Spv_1_3);
        let float = m.type_float(32);
        let st = m.type_struct(&[float]);
        m.decorate(st, D::BufferBlock, []);
        m.offsets(st, &[0]);
        assert!(validate_in(m, SpirvTargetEnv::Spv_1_3).is_ok());
    }

    #[test]
    fn glsl_shared_is_not_vulkan() {
        let mut m = TestModule::for_env(SpirvTargetEnv::Vulkan_1_0);
        let float = m.type_float(32);
        let st = m.type_struct(&[float]);
        m.decorate(st, D::GLSLShared, []);
        let err = validate_in(m, SpirvTargetEnv::Vulkan_1_0).unwrap_err();
        assert_eq!(err.vuid, Some("VUID-StandaloneSpirv-GLSLShared-04669"));
        assert_eq!(
            err.message,
            "OpDecorate decoration 'GLSLShared' is not valid for the Vulkan execution environment."
        );

        let mut m = TestModule::for_env(SpirvTargetEnv::OpenGL_4_5);
        let float = m.type_float(32);
        let st = m.type_struct(&[float]);
        m.decorate(st, D::GLSLShared, []);
        assert!(validate_in(m, SpirvTargetEnv::OpenGL_4_5).is_ok());
    }

    #[test]
    fn builtin_targets() {
        let mut m = TestModule::new();
        m.capability(rspirv::spirv::Capability::Shader);
        let uint = m.type_int(32, false);
        let var = m.variable(StorageClass::Input, uint);
        m.decorate(var, D::BuiltIn, [Operand::BuiltIn(BuiltIn::WorkgroupSize)]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            format!("BuiltIn decoration on target <id> {var} must be a constant for WorkgroupSize")
        );

        let mut m = TestModule::new();
        let uint = m.type_int(32, false);
        m.decorate(uint, D::BuiltIn, [Operand::BuiltIn(BuiltIn::Position)]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            "BuiltIns can only target variables, structure members or constants"
        );
    }

    /// A Vulkan 1.0 module with a `vecN` Input variable decorated `Component`.
    fn component(width: u32, count: u32, component: u32) -> Result<DecorationTable> {
        let mut m = TestModule::for_env(SpirvTargetEnv::Vulkan_1_0);
        let float = m.type_float(width);
        let ty = if count == 1 { float } else { m.type_vector(float, count) };
        let var = m.variable(StorageClass::Input, ty);
        m.decorate(var, D::Location, [Operand::LiteralBit32(0)]);
        m.decorate(var, D::Component, [Operand::LiteralBit32(component)]);
        m.entry_point(ExecutionModel::Vertex, "main", &[var], &[], &[]);
        validate_in(m, SpirvTargetEnv::Vulkan_1_0)
    }

    #[test]
    fn component_ranges() {
        assert!(component(32, 2, 2).is_ok());
        assert!(component(32, 1, 3).is_ok());
        assert!(component(64, 1, 2).is_ok());
        assert!(component(64, 2, 0).is_ok());

        let err = component(32, 1, 4).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidData);
        assert_eq!(err.vuid, Some("VUID-StandaloneSpirv-Component-04920"));

        let err = component(32, 3, 2).unwrap_err();
        assert_eq!(
            err.message,
            "Sequence of components starting with 2 and ending with 4 gets larger than 3"
        );
        assert_eq!(err.vuid, Some("VUID-StandaloneSpirv-Component-04921"));

        let err = component(64, 3, 0).unwrap_err();
        assert_eq!(err.vuid, Some("VUID-StandaloneSpirv-Component-07703"));

        let err = component(64, 1, 1).unwrap_err();
        assert_eq!(err.vuid, Some("VUID-StandaloneSpirv-Component-04923"));

        let err = component(64, 2, 2).unwrap_err();
        assert_eq!(
            err.message,
            "Sequence of components starting with 2 and ending with 5 gets larger than 3"
        );
        assert_eq!(err.vuid, Some("VUID-StandaloneSpirv-Component-04922"));
    }

    #[test]
    fn component_needs_numeric_type() {
        let mut m = TestModule::for_env(SpirvTargetEnv::Vulkan_1_0);
        let float = m.type_float(32);
        let st = m.type_struct(&[float]);
        let var = m.variable(StorageClass::Input, st);
        m.decorate(var, D::Component, [Operand::LiteralBit32(0)]);
        let err = validate_in(m, SpirvTargetEnv::Vulkan_1_0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[VUID-StandaloneSpirv-Component-04924] Component decoration specified for invalid type"
        );
    }

    #[test]
    fn non_writable_targets() {
        let make = |env: SpirvTargetEnv, storage_class: StorageClass| {
            let mut m = TestModule::for_env(env);
            let float = m.type_float(32);
            let var = m.variable(storage_class, float);
            m.decorate(var, D::NonWritable, []);
            validate_in(m, env)
        };
        assert!(make(SpirvTargetEnv::Spv_1_4, StorageClass::Private).is_ok());
        assert!(make(SpirvTargetEnv::Spv_1_4, StorageClass::StorageBuffer).is_ok());
        let err = make(SpirvTargetEnv::Spv_1_3, StorageClass::Private).unwrap_err();
        assert_eq!(
            err.message,
            "Target of NonWritable decoration is invalid: must point to a storage image, uniform \
             block, or storage buffer. Found a pointer in the Private storage class."
        );
        let err = make(SpirvTargetEnv::Spv_1_4, StorageClass::Workgroup).unwrap_err();
        assert!(err.message.contains(
            "storage buffer, or variable in Private or Function storage class"
        ));

        let mut m = TestModule::new();
        let float = m.type_float(32);
        let image = m.type_storage_image(float, Dim::Dim2D);
        let var = m.variable(StorageClass::UniformConstant, image);
        m.decorate(var, D::NonReadable, []);
        assert!(validate_in(m, SpirvTargetEnv::Spv_1_6).is_ok());
    }

    /// An `OpFConvert` to f16 decorated with `mode`, stored to `storage_class`.
    fn rounded_store(
        env: SpirvTargetEnv,
        mode: FPRoundingMode,
        storage_class: StorageClass,
        width: u32,
    ) -> Result<DecorationTable> {
        let mut m = TestModule::for_env(env);
        let half = m.type_float(width);
        let value = m.constant_u32(0);
        let out = m.variable(storage_class, half);
        let converted = m.body_inst(Op::FConvert, Some(half), vec![Operand::IdRef(value)]);
        m.decorate(converted, D::FPRoundingMode, [Operand::FPRoundingMode(mode)]);
        m.body_inst(
            Op::Store,
            None,
            vec![Operand::IdRef(out), Operand::IdRef(converted)],
        );
        m.entry_point(ExecutionModel::GLCompute, "main", &[], &[], &[]);
        validate_in(m, env)
    }

    #[test]
    fn rounding_mode_stores() {
        use FPRoundingMode::{RTE, RTP};
        use SpirvTargetEnv::{Spv_1_6, Vulkan_1_0};

        assert!(rounded_store(Spv_1_6, RTP, StorageClass::StorageBuffer, 16).is_ok());
        let err = rounded_store(Vulkan_1_0, RTP, StorageClass::StorageBuffer, 16).unwrap_err();
        assert_eq!(err.vuid, Some("VUID-StandaloneSpirv-FPRoundingMode-04675"));
        let err = rounded_store(Spv_1_6, RTE, StorageClass::Private, 16).unwrap_err();
        assert!(err.message.ends_with("Input, or Output Storage Classes."));
        let err = rounded_store(Spv_1_6, RTE, StorageClass::StorageBuffer, 32).unwrap_err();
        assert!(err.message.ends_with("16-bit floating-point scalar or vector object."));
    }

    #[test]
    fn rounding_mode_needs_fconvert() {
        let mut m = TestModule::new();
        let uint = m.type_int(32, false);
        let a = m.constant_u32(1);
        let sum = m.body_inst(Op::IAdd, Some(uint), vec![Operand::IdRef(a), Operand::IdRef(a)]);
        m.decorate(sum, D::FPRoundingMode, [Operand::FPRoundingMode(FPRoundingMode::RTE)]);
        m.function(&[], &[]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            "FPRoundingMode decoration can be applied only to a width-only conversion instruction \
             for floating-point object."
        );
    }

    #[test]
    fn integer_wrap_targets() {
        let make = |op: Op, kind: D, version: SpirvTargetEnv| {
            let mut m = TestModule::for_env(version);
            let uint = m.type_int(32, false);
            let a = m.constant_u32(1);
            let result = m.body_inst(op, Some(uint), vec![Operand::IdRef(a), Operand::IdRef(a)]);
            m.decorate(result, kind, []);
            m.function(&[], &[]);
            validate_in(m, version)
        };
        assert!(make(Op::IAdd, D::NoSignedWrap, SpirvTargetEnv::Spv_1_4).is_ok());
        assert!(make(Op::SNegate, D::NoSignedWrap, SpirvTargetEnv::Spv_1_4).is_ok());
        let err = make(Op::SNegate, D::NoUnsignedWrap, SpirvTargetEnv::Spv_1_4).unwrap_err();
        assert_eq!(err.message, "NoUnsignedWrap decoration may not be applied to OpSNegate");
        let err = make(Op::SRem, D::NoSignedWrap, SpirvTargetEnv::Spv_1_4).unwrap_err();
        assert_eq!(err.message, "NoSignedWrap decoration may not be applied to OpSRem");
        let err = make(Op::IAdd, D::NoSignedWrap, SpirvTargetEnv::Spv_1_3).unwrap_err();
        assert_eq!(err.kind, ErrorKind::WrongVersion);
    }

    #[test]
    fn integer_wrap_extension_pre_1_4() {
        let mut m = TestModule::for_env(SpirvTargetEnv::Spv_1_3);
        m.extension("SPV_KHR_no_integer_wrap_decoration");
        let uint = m.type_int(32, false);
        let a = m.constant_u32(1);
        let result = m.body_inst(Op::IMul, Some(uint), vec![Operand::IdRef(a), Operand::IdRef(a)]);
        m.decorate(result, D::NoUnsignedWrap, []);
        m.function(&[], &[]);
        assert!(validate_in(m, SpirvTargetEnv::Spv_1_3).is_ok());
    }

    #[test]
    fn uniform_targets() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        m.decorate(float, D::Uniform, []);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(err.message, "Uniform decoration applied to a non-object");

        let mut m = TestModule::new();
        let void = m.type_void();
        let call = m.body_inst(Op::FunctionCall, Some(void), vec![]);
        m.decorate(call, D::Uniform, []);
        m.function(&[], &[]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(err.message, "Uniform decoration applied to a value with void type");
    }

    /// A value decorated `UniformId`, with its scope made by `scope`.
    fn uniform_id(
        env: SpirvTargetEnv,
        scope: impl FnOnce(&mut TestModule) -> rspirv::spirv::Word,
    ) -> Result<DecorationTable> {
        let mut m = TestModule::for_env(env);
        let uint = m.type_int(32, false);
        let scope = scope(&mut m);
        let a = m.constant_u32(1);
        let sum = m.body_inst(Op::IAdd, Some(uint), vec![Operand::IdRef(a), Operand::IdRef(a)]);
        m.decorate_id(sum, D::UniformId, [Operand::IdScope(scope)]);
        m.function(&[], &[]);
        validate_in(m, env)
    }

    fn constant_scope(value: u32) -> impl FnOnce(&mut TestModule) -> rspirv::spirv::Word {
        move |m| m.constant_u32(value)
    }

    #[test]
    fn uniform_id_scopes() {
        use SpirvTargetEnv::{Spv_1_3, Spv_1_4, Vulkan_1_2};

        assert!(uniform_id(Spv_1_4, constant_scope(1)).is_ok());
        let err = uniform_id(Spv_1_3, constant_scope(2)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::WrongVersion);
        let err = uniform_id(Spv_1_4, constant_scope(9)).unwrap_err();
        assert_eq!(err.message, "Invalid scope value: 9");
        assert!(uniform_id(Vulkan_1_2, constant_scope(3)).is_ok());
        let err = uniform_id(Vulkan_1_2, constant_scope(1)).unwrap_err();
        assert_eq!(err.vuid, Some("VUID-StandaloneSpirv-None-04636"));
    }

    #[test]
    fn uniform_id_scope_must_be_a_constant() {
        let mut scope = 0;
        let err = uniform_id(SpirvTargetEnv::Vulkan_1_2, |m| {
            scope = m.spec_constant_u32(1);
            scope
        })
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidData);
        assert_eq!(err.message, format!("UniformId scope <id> {scope} must be an OpConstant"));

        // Even a spec constant defaulting to a valid scope is rejected.
        let err = uniform_id(SpirvTargetEnv::Spv_1_4, |m| m.spec_constant_u32(2)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidData);
    }

    #[test]
    fn linkage_on_entry_point() {
        let mut m = TestModule::new();
        m.capability(rspirv::spirv::Capability::Linkage);
        let main = m.entry_point(ExecutionModel::GLCompute, "main", &[], &[], &[]);
        m.decorate(
            main,
            D::LinkageAttributes,
            [
                Operand::LiteralString("main".to_string()),
                Operand::LinkageType(rspirv::spirv::LinkageType::Export),
            ],
        );
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidBinary);
        assert_eq!(
            err.message,
            format!(
                "The LinkageAttributes Decoration (Linkage name: main) cannot be applied to \
                 function id {main} because it is targeted by an OpEntryPoint instruction."
            )
        );
    }
}
