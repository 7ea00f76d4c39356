use super::CheckContext;
use crate::decoration::kind_name;
use crate::error::{Result, ValidationError};
use rspirv::spirv::{Decoration as D, Word};
use rustc_hash::FxHashMap;

/// Layout decorations that may appear at most once per id or member.
const SINGLE_USE: &[D] = &[D::Offset, D::ArrayStride, D::MatrixStride, D::RowMajor, D::ColMajor];

/// Pairs that may not decorate the same id or member together.
const MUTUALLY_EXCLUSIVE: &[(D, D)] = &[
    (D::RowMajor, D::ColMajor),
    (D::Block, D::BufferBlock),
    (D::Aliased, D::Restrict),
    (D::AliasedPointer, D::RestrictPointer),
];

fn subject(id: Word, member: Option<u32>) -> String {
    match member {
        Some(member) => format!("ID '{id}', member '{member}'"),
        None => format!("ID '{id}'"),
    }
}

/// Rejects repeated layout decorations and contradicting pairs.
pub fn check_multiplicity(cx: CheckContext<'_, '_>) -> Result<()> {
    for (id, decorations) in cx.table.all_targets() {
        // Duplicates collapse in the set, so count the raw applications.
        let mut counts: FxHashMap<(Option<u32>, D), u32> = FxHashMap::default();
        for decoration in cx.table.applied(id) {
            let kind = decoration.kind();
            if !SINGLE_USE.contains(&kind) {
                continue;
            }
            let count = counts.entry((decoration.member(), kind)).or_insert(0);
            *count += 1;
            if *count > 1 {
                return Err(ValidationError::invalid_id(format!(
                    "{} decorated with {} multiple times is not allowed.",
                    subject(id, decoration.member()),
                    kind_name(kind)
                ))
                .at(id));
            }
        }

        for &(first, second) in MUTUALLY_EXCLUSIVE {
            for decoration in decorations.iter().filter(|d| d.kind() == first) {
                let member = decoration.member();
                if decorations.iter().any(|d| d.kind() == second && d.member() == member) {
                    return Err(ValidationError::invalid_id(format!(
                        "{} decorated with both {} and {} not allowed.",
                        subject(id, member),
                        kind_name(first),
                        kind_name(second)
                    ))
                    .at(id));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::test::{TestModule, validate_in};
    use pretty_assertions::assert_eq;
    use rspirv::dr::Operand;
    use rspirv::spirv::{Decoration as D, StorageClass};
    use spirv_val_types::SpirvTargetEnv;

    #[test]
    fn repeated_offset() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let st = m.type_struct(&[float, float]);
        m.offsets(st, &[0, 4]);
        m.member_decorate(st, 1, D::Offset, [Operand::LiteralBit32(4)]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            format!("ID '{st}', member '1' decorated with Offset multiple times is not allowed.")
        );
    }

    #[test]
    fn repeated_stride_through_a_group() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let array = m.type_array(float, 4);
        let group = m.decoration_group();
        m.array_stride(group, 4);
        m.array_stride(array, 4);
        m.group_decorate(group, &[array]);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            format!("ID '{array}' decorated with ArrayStride multiple times is not allowed.")
        );
    }

    #[test]
    fn repeated_flags_are_fine() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let var = m.variable(StorageClass::StorageBuffer, float);
        m.decorate(var, D::Restrict, []);
        m.decorate(var, D::Restrict, []);
        assert!(validate_in(m, SpirvTargetEnv::Spv_1_6).is_ok());
    }

    #[test]
    fn exclusive_pairs() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let column = m.type_vector(float, 4);
        let matrix = m.type_matrix(column, 4);
        let st = m.type_struct(&[matrix]);
        m.member_decorate(st, 0, D::RowMajor, []);
        m.member_decorate(st, 0, D::ColMajor, []);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            format!("ID '{st}', member '0' decorated with both RowMajor and ColMajor not allowed.")
        );

        let mut m = TestModule::new();
        let float = m.type_float(32);
        let var = m.variable(StorageClass::StorageBuffer, float);
        m.decorate(var, D::Aliased, []);
        m.decorate(var, D::Restrict, []);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_6).unwrap_err();
        assert_eq!(
            err.message,
            format!("ID '{var}' decorated with both Aliased and Restrict not allowed.")
        );
    }

    #[test]
    fn majorness_on_different_members() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let column = m.type_vector(float, 4);
        let matrix = m.type_matrix(column, 4);
        let st = m.type_struct(&[matrix, matrix]);
        m.member_decorate(st, 0, D::RowMajor, []);
        m.member_decorate(st, 1, D::ColMajor, []);
        assert!(validate_in(m, SpirvTargetEnv::Spv_1_6).is_ok());
    }

    #[test]
    fn block_and_buffer_block() {
        let mut m = TestModule::for_env(SpirvTargetEnv::Spv_1_3);
        let float = m.type_float(32);
        let st = m.type_struct(&[float]);
        m.offsets(st, &[0]);
        m.decorate(st, D::Block, []);
        m.decorate(st, D::BufferBlock, []);
        let err = validate_in(m, SpirvTargetEnv::Spv_1_3).unwrap_err();
        assert_eq!(
            err.message,
            format!("ID '{st}' decorated with both Block and BufferBlock not allowed.")
        );
    }
}
