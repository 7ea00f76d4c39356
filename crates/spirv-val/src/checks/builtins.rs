use super::CheckContext;
use crate::error::{Result, ValidationError};
use crate::spirv_type::SpirvType;
use rspirv::spirv::{Decoration, Op, Word};
use rustc_hash::FxHashSet;

/// A struct with built-in members must be built-in throughout, and may not be
/// nested inside another struct.
pub fn check_builtin_structs(cx: CheckContext<'_, '_>) -> Result<()> {
    let mut builtin_structs = FxHashSet::default();
    for (id, _) in cx.table.all_targets() {
        let Some(ty @ SpirvType::Struct { .. }) = cx.index.ty(id) else {
            continue;
        };
        let builtin_members = (0..ty.member_count())
            .filter(|&member| cx.table.has_member_decoration(id, member, Decoration::BuiltIn))
            .count();
        if builtin_members == 0 {
            continue;
        }
        if builtin_members != ty.member_count() as usize {
            return Err(ValidationError::invalid_id(format!(
                "When BuiltIn decoration is applied to a structure-type member, all members of \
                 that structure type must also be decorated with BuiltIn (No allowed mixing of \
                 built-in variables and non-built-in variables within a single structure). \
                 Structure id {id} does not meet this requirement."
            ))
            .at(id));
        }
        builtin_structs.insert(id);
    }
    if builtin_structs.is_empty() {
        return Ok(());
    }

    let structs = cx
        .index
        .module()
        .types_global_values
        .iter()
        .filter(|inst| inst.class.opcode == Op::TypeStruct)
        .filter_map(|inst| inst.result_id);
    for outer in structs {
        let Some(ty) = cx.index.ty(outer) else {
            continue;
        };
        for member_ty in ty.struct_members() {
            let inner = cx.index.strip_arrays(member_ty);
            if builtin_structs.contains(&inner) {
                return Err(ValidationError::invalid_id(format!(
                    "Structure <id> {inner} contains members with BuiltIn decoration. Therefore \
                     this structure may not be contained as a member of another structure type. \
                     Structure <id> {outer} contains structure <id> {inner}."
                ))
                .at(outer));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::test::{TestModule, validate_in};
    use pretty_assertions::assert_eq;
    use rspirv::dr::Operand;
    use rspirv::spirv::{BuiltIn, Decoration as D, Word};
    use spirv_val_types::SpirvTargetEnv;

    fn builtin_members(m: &mut TestModule, st: Word, members: u32) {
        for member in 0..members {
            m.member_decorate(st, member, D::BuiltIn, [Operand::BuiltIn(BuiltIn::Position)]);
        }
    }

    #[test]
    fn all_or_nothing() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let vec4 = m.type_vector(float, 4);
        let st = m.type_struct(&[vec4, vec4, vec4, vec4]);
        builtin_members(&mut m, st, 4);
        assert!(validate_in(m, SpirvTargetEnv::Spv_1_6).is_ok());

        let mut m = TestModule::new();
        let float = m.type_float(32);
        let vec4 = m.type_vector(float, 4);
        let st = m.type_struct(&[vec4, vec4, vec4, vec4]);
        builtin_members(&mut m, st, 2);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidId);
        assert!(err.message.contains(
            "all members of that structure type must also be decorated with BuiltIn"
        ));
        let expected = format!("Structure id {st} does not meet this requirement.");
        assert!(err.message.ends_with(&expected));
    }

    #[test]
    fn no_nesting() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let inner = m.type_struct(&[float]);
        builtin_members(&mut m, inner, 1);
        let array = m.type_array(inner, 2);
        let outer = m.type_struct(&[float, array]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            format!(
                "Structure <id> {inner} contains members with BuiltIn decoration. Therefore this \
                 structure may not be contained as a member of another structure type. Structure \
                 <id> {outer} contains structure <id> {inner}."
            )
        );
    }
}
