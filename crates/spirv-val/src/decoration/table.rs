use super::{
    Decoration, is_member_decoration_only, is_not_member_decoration, kind_name,
    takes_id_parameters, takes_string_parameters,
};
use crate::error::{Result, ValidationError};
use crate::module_index::ModuleIndex;
use crate::spirv_type::SpirvType;
use rspirv::dr::{Instruction, Operand};
use rspirv::spirv::{self, Op, Word};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{instrument, trace};

static NO_DECORATIONS: BTreeSet<Decoration> = BTreeSet::new();

/// Every decoration of a module, keyed by target id.
///
/// Built once from the annotation section, with decoration groups already
/// expanded onto their targets, and read-only afterwards. Member decorations
/// live under their struct's id and carry their member index.
#[derive(Default, Debug)]
pub struct DecorationTable {
    /// Raw applications per id, duplicates included, in module order.
    applied: FxHashMap<Word, Vec<Decoration>>,
    /// Deduplicated view per id, ascending id order.
    sets: BTreeMap<Word, BTreeSet<Decoration>>,
}

impl DecorationTable {
    #[instrument(level = "debug", skip_all)]
    pub fn build(index: &ModuleIndex<'_>) -> Result<Self> {
        let mut table = Self::default();
        let mut group_applications = Vec::new();
        let mut groups = FxHashSet::default();

        for inst in &index.module().annotations {
            match inst.class.opcode {
                Op::DecorationGroup => {
                    groups.extend(inst.result_id);
                }
                Op::Decorate => {
                    let (target, kind, params) = split_decorate(inst, "OpDecorate")?;
                    let target_inst = defined_target(index, target, "OpDecorate")?;
                    if takes_id_parameters(kind) {
                        return Err(ValidationError::invalid_id(
                            "Decorations taking ID parameters may not be used with OpDecorate",
                        )
                        .at(target));
                    }
                    if target_inst.class.opcode != Op::DecorationGroup
                        && is_member_decoration_only(kind)
                    {
                        return Err(ValidationError::invalid_id(format!(
                            "{} can only be applied to structure members",
                            kind_name(kind)
                        ))
                        .at(target));
                    }
                    table.insert(target, Decoration::from_operands(kind, params, None));
                }
                Op::DecorateId => {
                    let (target, kind, params) = split_decorate(inst, "OpDecorateId")?;
                    let target_def = *index
                        .def(target)
                        .ok_or_else(|| undefined_target("OpDecorateId", target))?;
                    reject_group_target(target_def.inst, "OpDecorateId")?;
                    if !takes_id_parameters(kind) {
                        return Err(ValidationError::invalid_id(
                            "Decorations that don't take ID parameters may not be used with \
                             OpDecorateId",
                        )
                        .at(target));
                    }
                    for operand in params.iter().filter_map(Operand::id_ref_any) {
                        let operand_def = index.def(operand).ok_or_else(|| {
                            ValidationError::invalid_binary(format!(
                                "OpDecorateId operand id {operand} is not defined"
                            ))
                            .at(target)
                        })?;
                        if operand_def.position >= target_def.position {
                            return Err(ValidationError::invalid_id(format!(
                                "OpDecorateId operand id {operand} must be defined before its \
                                 target id {target}"
                            ))
                            .at(target));
                        }
                    }
                    table.insert(target, Decoration::from_operands(kind, params, None));
                }
                Op::DecorateString => {
                    let (target, kind, params) = split_decorate(inst, "OpDecorateString")?;
                    let target_inst = defined_target(index, target, "OpDecorateString")?;
                    reject_group_target(target_inst, "OpDecorateString")?;
                    if !takes_string_parameters(kind) {
                        return Err(ValidationError::invalid_id(
                            "Decorations that don't take string parameters may not be used \
                             with OpDecorateString",
                        )
                        .at(target));
                    }
                    table.insert(target, Decoration::from_operands(kind, params, None));
                }
                Op::MemberDecorate | Op::MemberDecorateString => {
                    let opname = if inst.class.opcode == Op::MemberDecorate {
                        "OpMemberDecorate"
                    } else {
                        "OpMemberDecorateString"
                    };
                    let (target, member, kind, params) = match inst.operands.as_slice() {
                        [
                            Operand::IdRef(target),
                            Operand::LiteralBit32(member),
                            Operand::Decoration(kind),
                            params @ ..,
                        ] => (*target, *member, *kind, params),
                        _ => return Err(malformed(opname)),
                    };
                    check_struct_member(index, target, member, opname)?;
                    if is_not_member_decoration(kind) {
                        return Err(ValidationError::invalid_id(format!(
                            "{} cannot be applied to structure members",
                            kind_name(kind)
                        ))
                        .at(target));
                    }
                    if opname == "OpMemberDecorateString" && !takes_string_parameters(kind) {
                        return Err(ValidationError::invalid_id(
                            "Decorations that don't take string parameters may not be used \
                             with OpMemberDecorateString",
                        )
                        .at(target));
                    }
                    table.insert(target, Decoration::from_operands(kind, params, Some(member)));
                }
                Op::GroupDecorate | Op::GroupMemberDecorate => group_applications.push(inst),
                _ => {}
            }
        }

        // Group definitions are complete at this point, so every application
        // sees the group's full decoration set regardless of where it appears.
        let group_sets: FxHashMap<Word, Vec<Decoration>> = groups
            .iter()
            .map(|&group| {
                let decorations = table.id_decorations(group).iter().cloned().collect();
                (group, decorations)
            })
            .collect();
        for inst in group_applications {
            table.apply_group(index, inst, &group_sets)?;
        }

        check_group_uses(index, &groups)?;

        trace!("decoration table: {} decorated ids", table.sets.len());
        Ok(table)
    }

    fn insert(&mut self, target: Word, decoration: Decoration) {
        trace!("%{} <- {}", target, decoration);
        self.applied.entry(target).or_default().push(decoration.clone());
        self.sets.entry(target).or_default().insert(decoration);
    }

    fn apply_group(
        &mut self,
        index: &ModuleIndex<'_>,
        inst: &Instruction,
        group_sets: &FxHashMap<Word, Vec<Decoration>>,
    ) -> Result<()> {
        let is_member = inst.class.opcode == Op::GroupMemberDecorate;
        let opname = if is_member {
            "OpGroupMemberDecorate"
        } else {
            "OpGroupDecorate"
        };
        let (group, rest) = match inst.operands.split_first() {
            Some((Operand::IdRef(group), rest)) => (*group, rest),
            _ => return Err(malformed(opname)),
        };
        let group_decorations = group_sets.get(&group).ok_or_else(|| {
            ValidationError::invalid_id(format!(
                "{opname} Decoration group <id> {group} is not a decoration group."
            ))
            .at(group)
        })?;

        if is_member {
            if rest.len() % 2 != 0 {
                return Err(malformed(opname));
            }
            for pair in rest.chunks_exact(2) {
                let (target, member) = match pair {
                    [Operand::IdRef(target), Operand::LiteralBit32(member)] => (*target, *member),
                    _ => return Err(malformed(opname)),
                };
                let target_inst = defined_target(index, target, opname)?;
                if target_inst.class.opcode == Op::DecorationGroup {
                    return Err(group_target(opname, target));
                }
                check_struct_member(index, target, member, opname)?;
                for decoration in group_decorations.iter().filter(|d| d.member().is_none()) {
                    self.insert(target, decoration.on_member(member));
                }
            }
        } else {
            for operand in rest {
                let target = operand.id_ref_any().ok_or_else(|| malformed(opname))?;
                let target_inst = defined_target(index, target, opname)?;
                if target_inst.class.opcode == Op::DecorationGroup {
                    return Err(group_target(opname, target));
                }
                for decoration in group_decorations {
                    self.insert(target, decoration.clone());
                }
            }
        }
        Ok(())
    }

    /// Every decoration on `id`, member decorations included, deduplicated.
    pub fn id_decorations(&self, id: Word) -> &BTreeSet<Decoration> {
        self.sets.get(&id).unwrap_or(&NO_DECORATIONS)
    }

    /// Decorations of one struct member, deduplicated.
    pub fn member_decorations(
        &self,
        id: Word,
        member: u32,
    ) -> impl Iterator<Item = &Decoration> + '_ {
        self.id_decorations(id)
            .iter()
            .filter(move |decoration| decoration.member() == Some(member))
    }

    /// Whole-object decorations of `id`, deduplicated.
    pub fn object_decorations(&self, id: Word) -> impl Iterator<Item = &Decoration> + '_ {
        self.id_decorations(id)
            .iter()
            .filter(|decoration| decoration.member().is_none())
    }

    /// Every application on `id` in module order, duplicates included.
    pub fn applied(&self, id: Word) -> &[Decoration] {
        self.applied.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Decorated ids in ascending order, with their deduplicated sets.
    pub fn all_targets(&self) -> impl Iterator<Item = (Word, &BTreeSet<Decoration>)> + '_ {
        self.sets.iter().map(|(&id, set)| (id, set))
    }

    pub fn has_decoration(&self, id: Word, kind: spirv::Decoration) -> bool {
        self.object_decorations(id).any(|d| d.kind() == kind)
    }

    pub fn has_member_decoration(&self, id: Word, member: u32, kind: spirv::Decoration) -> bool {
        self.member_decorations(id, member).any(|d| d.kind() == kind)
    }

    /// Whether any member of struct `id` carries `kind`.
    pub fn any_member_has(&self, id: Word, kind: spirv::Decoration) -> bool {
        self.id_decorations(id)
            .iter()
            .any(|d| d.member().is_some() && d.kind() == kind)
    }

    /// The literal operand of a whole-object decoration, e.g. an `ArrayStride`.
    pub fn decoration_literal(&self, id: Word, kind: spirv::Decoration) -> Option<u32> {
        self.object_decorations(id)
            .find(|d| d.kind() == kind)
            .and_then(Decoration::literal)
    }

    pub fn member_literal(&self, id: Word, member: u32, kind: spirv::Decoration) -> Option<u32> {
        self.member_decorations(id, member)
            .find(|d| d.kind() == kind)
            .and_then(Decoration::literal)
    }

    pub fn member_offset(&self, id: Word, member: u32) -> Option<u32> {
        self.member_literal(id, member, spirv::Decoration::Offset)
    }
}

fn malformed(opname: &str) -> ValidationError {
    ValidationError::invalid_binary(format!("{opname} has malformed operands"))
}

fn undefined_target(opname: &str, target: Word) -> ValidationError {
    ValidationError::invalid_binary(format!("{opname} target id {target} is not defined"))
        .at(target)
}

fn group_target(opname: &str, target: Word) -> ValidationError {
    ValidationError::invalid_id(format!(
        "{opname} may not target OpDecorationGroup <id> {target}"
    ))
    .at(target)
}

fn split_decorate<'i>(
    inst: &'i Instruction,
    opname: &str,
) -> Result<(Word, spirv::Decoration, &'i [Operand])> {
    match inst.operands.as_slice() {
        [Operand::IdRef(target), Operand::Decoration(kind), params @ ..] => {
            Ok((*target, *kind, params))
        }
        _ => Err(malformed(opname)),
    }
}

fn defined_target<'m>(
    index: &ModuleIndex<'m>,
    target: Word,
    opname: &str,
) -> Result<&'m Instruction> {
    index.inst(target).ok_or_else(|| undefined_target(opname, target))
}

fn reject_group_target(target: &Instruction, opname: &str) -> Result<()> {
    match target.result_id {
        Some(id) if target.class.opcode == Op::DecorationGroup => Err(group_target(opname, id)),
        _ => Ok(()),
    }
}

fn check_struct_member(
    index: &ModuleIndex<'_>,
    target: Word,
    member: u32,
    opname: &str,
) -> Result<()> {
    let member_count = match index.ty(target) {
        Some(ty @ SpirvType::Struct { .. }) => ty.member_count(),
        _ => {
            return Err(ValidationError::invalid_id(format!(
                "{opname} Structure type <id> {target} is not a struct type."
            ))
            .at(target));
        }
    };
    if member >= member_count {
        return Err(ValidationError::invalid_id(format!(
            "Index {member} provided in {opname} for struct <id> {target} is out of bounds. \
             The structure has {member_count} members. Largest valid index is {}.",
            i64::from(member_count) - 1
        ))
        .at(target));
    }
    Ok(())
}

/// A decoration group's result id may only be consumed by the instructions
/// that apply it, plus `OpName`.
fn check_group_uses(index: &ModuleIndex<'_>, groups: &FxHashSet<Word>) -> Result<()> {
    if groups.is_empty() {
        return Ok(());
    }
    let module = index.module();
    let globals_using_group = module
        .types_global_values
        .iter()
        .chain(&module.entry_points)
        .chain(&module.execution_modes)
        .flat_map(|inst| inst.operands.iter().filter_map(Operand::id_ref_any));
    let function_uses = groups
        .iter()
        .filter(|&&group| !index.uses(group).is_empty())
        .copied();
    if let Some(group) = globals_using_group
        .filter(|id| groups.contains(id))
        .chain(function_uses)
        .next()
    {
        return Err(ValidationError::invalid_id(
            "Result id of OpDecorationGroup can only be targeted by OpName, OpGroupDecorate, \
             OpDecorate, and OpGroupMemberDecorate",
        )
        .at(group));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoration::DecorationParam;
    use crate::error::ErrorKind;
    use crate::test::TestModule;
    use pretty_assertions::assert_eq;
    use rspirv::spirv::{Decoration as D, StorageClass};

    fn build(m: TestModule) -> Result<Vec<(Word, Vec<Decoration>)>> {
        let module = m.finish();
        let index = ModuleIndex::new(&module)?;
        let table = DecorationTable::build(&index)?;
        Ok(table
            .all_targets()
            .map(|(id, set)| (id, set.iter().cloned().collect()))
            .collect())
    }

    fn table_of(m: TestModule, f: impl FnOnce(&DecorationTable)) {
        let module = m.finish();
        let index = ModuleIndex::new(&module).unwrap();
        let table = DecorationTable::build(&index).unwrap();
        f(&table);
    }

    #[test]
    fn group_decorations_reach_every_target() {
        let mut m = TestModule::new();
        let group = m.decoration_group();
        m.decorate(group, D::DescriptorSet, [Operand::LiteralBit32(0)]);
        m.decorate(group, D::RelaxedPrecision, []);
        m.decorate(group, D::Restrict, []);
        let float = m.type_float(32);
        let a = m.variable(StorageClass::Private, float);
        let b = m.variable(StorageClass::Private, float);
        let c = m.variable(StorageClass::Private, float);
        m.group_decorate(group, &[a, b]);
        m.group_decorate(group, &[c]);

        let expected: BTreeSet<Decoration> = [
            Decoration::new(D::DescriptorSet, [DecorationParam::Literal(0)], None),
            Decoration::new(D::RelaxedPrecision, [], None),
            Decoration::new(D::Restrict, [], None),
        ]
        .into_iter()
        .collect();
        table_of(m, |table| {
            for id in [group, a, b, c] {
                assert_eq!(table.id_decorations(id), &expected, "id {id}");
            }
        });
    }

    #[test]
    fn group_application_order_is_irrelevant() {
        let make = |reversed: bool| {
            let mut m = TestModule::new();
            let first = m.decoration_group();
            let second = m.decoration_group();
            m.decorate(first, D::Restrict, []);
            m.decorate(second, D::Binding, [Operand::LiteralBit32(3)]);
            let float = m.type_float(32);
            let a = m.variable(StorageClass::Uniform, float);
            let b = m.variable(StorageClass::Uniform, float);
            if reversed {
                m.group_decorate(second, &[b, a]);
                m.group_decorate(first, &[b, a]);
            } else {
                m.group_decorate(first, &[a, b]);
                m.group_decorate(second, &[a, b]);
            }
            build(m).unwrap()
        };
        assert_eq!(make(false), make(true));
    }

    #[test]
    fn group_decorate_before_group_contents() {
        // OpGroupDecorate may precede some of the OpDecorate instructions
        // filling the group; the target still gets all of them.
        let mut m = TestModule::new();
        let group = m.decoration_group();
        let float = m.type_float(32);
        let a = m.variable(StorageClass::Private, float);
        m.group_decorate(group, &[a]);
        m.decorate(group, D::Volatile, []);
        table_of(m, |table| {
            assert!(table.has_decoration(a, D::Volatile));
        });
    }

    #[test]
    fn group_member_decorate_attaches_member_index() {
        let mut m = TestModule::new();
        let group = m.decoration_group();
        m.decorate(group, D::Offset, [Operand::LiteralBit32(16)]);
        let float = m.type_float(32);
        let st = m.type_struct(&[float, float]);
        m.group_member_decorate(group, &[(st, 1)]);
        table_of(m, |table| {
            assert_eq!(table.member_offset(st, 1), Some(16));
            assert_eq!(table.member_offset(st, 0), None);
            assert!(!table.has_decoration(st, D::Offset));
        });
    }

    #[test]
    fn duplicates_collapse_but_stay_applied() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let st = m.type_struct(&[float]);
        m.member_decorate(st, 0, D::Offset, [Operand::LiteralBit32(0)]);
        m.member_decorate(st, 0, D::Offset, [Operand::LiteralBit32(0)]);
        table_of(m, |table| {
            assert_eq!(table.member_decorations(st, 0).count(), 1);
            assert_eq!(table.applied(st).len(), 2);
        });
    }

    #[test]
    fn group_cannot_target_group() {
        let mut m = TestModule::new();
        let group = m.decoration_group();
        let other = m.decoration_group();
        m.group_decorate(group, &[other]);
        let err = build(m).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidId);
        assert_eq!(
            err.message,
            format!("OpGroupDecorate may not target OpDecorationGroup <id> {other}")
        );
    }

    #[test]
    fn group_member_decorate_needs_struct_in_bounds() {
        let mut m = TestModule::new();
        let group = m.decoration_group();
        let float = m.type_float(32);
        let st = m.type_struct(&[float, float]);
        m.group_member_decorate(group, &[(st, 2)]);
        let err = build(m).unwrap_err();
        assert_eq!(
            err.message,
            format!(
                "Index 2 provided in OpGroupMemberDecorate for struct <id> {st} is out of bounds. \
                 The structure has 2 members. Largest valid index is 1."
            )
        );

        let mut m = TestModule::new();
        let group = m.decoration_group();
        let float = m.type_float(32);
        m.group_member_decorate(group, &[(float, 0)]);
        let err = build(m).unwrap_err();
        assert_eq!(
            err.message,
            format!("OpGroupMemberDecorate Structure type <id> {float} is not a struct type.")
        );
    }

    #[test]
    fn group_decorate_needs_a_group() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let var = m.variable(StorageClass::Private, float);
        m.group_decorate(float, &[var]);
        let err = build(m).unwrap_err();
        assert_eq!(
            err.message,
            format!("OpGroupDecorate Decoration group <id> {float} is not a decoration group.")
        );
    }

    #[test]
    fn decorate_id_rules() {
        // Id-taking decoration through OpDecorate.
        let mut m = TestModule::new();
        let uint = m.type_int(32, false);
        let scope = m.constant_u32(2);
        let var = m.variable(StorageClass::Private, uint);
        m.decorate(var, D::UniformId, [Operand::IdScope(scope)]);
        let err = build(m).unwrap_err();
        assert_eq!(
            err.message,
            "Decorations taking ID parameters may not be used with OpDecorate"
        );

        // Literal decoration through OpDecorateId.
        let mut m = TestModule::new();
        let uint = m.type_int(32, false);
        let var = m.variable(StorageClass::Private, uint);
        m.decorate_id(var, D::Binding, [Operand::LiteralBit32(0)]);
        let err = build(m).unwrap_err();
        assert_eq!(
            err.message,
            "Decorations that don't take ID parameters may not be used with OpDecorateId"
        );

        // OpDecorateId on a group.
        let mut m = TestModule::new();
        let group = m.decoration_group();
        let scope = m.constant_u32(2);
        m.decorate_id(group, D::UniformId, [Operand::IdScope(scope)]);
        let err = build(m).unwrap_err();
        assert_eq!(
            err.message,
            format!("OpDecorateId may not target OpDecorationGroup <id> {group}")
        );
    }

    #[test]
    fn decorate_id_operand_must_precede_target() {
        let mut m = TestModule::new();
        let uint = m.type_int(32, false);
        let early = m.constant_u32(2);
        let var = m.variable(StorageClass::Private, uint);
        m.decorate_id(var, D::AlignmentId, [Operand::IdRef(early)]);
        assert!(build(m).is_ok());

        let mut m = TestModule::new();
        let uint = m.type_int(32, false);
        let var = m.variable(StorageClass::Private, uint);
        let late = m.constant_u32(16);
        m.decorate_id(var, D::AlignmentId, [Operand::IdRef(late)]);
        let err = build(m).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidId);
        assert_eq!(
            err.message,
            format!("OpDecorateId operand id {late} must be defined before its target id {var}")
        );
    }

    #[test]
    fn member_decorate_rules() {
        let mut m = TestModule::new();
        let float = m.type_float(32);
        let st = m.type_struct(&[float]);
        m.member_decorate(st, 0, D::Block, []);
        let err = build(m).unwrap_err();
        assert_eq!(err.message, "Block cannot be applied to structure members");

        let mut m = TestModule::new();
        let float = m.type_float(32);
        let st = m.type_struct(&[float]);
        m.decorate(st, D::RowMajor, []);
        let err = build(m).unwrap_err();
        assert_eq!(err.message, "RowMajor can only be applied to structure members");

        let mut m = TestModule::new();
        let float = m.type_float(32);
        m.member_decorate(float, 0, D::Offset, [Operand::LiteralBit32(0)]);
        let err = build(m).unwrap_err();
        assert_eq!(
            err.message,
            format!("OpMemberDecorate Structure type <id> {float} is not a struct type.")
        );
    }

    #[test]
    fn undefined_target_is_invalid_binary() {
        let mut m = TestModule::new();
        let missing = m.reserve_id();
        m.decorate(missing, D::Restrict, []);
        let err = build(m).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidBinary);
        assert_eq!(err.message, format!("OpDecorate target id {missing} is not defined"));
    }

    #[test]
    fn group_ids_are_not_values() {
        let mut m = TestModule::new();
        let group = m.decoration_group();
        let float = m.type_float(32);
        let var = m.variable(StorageClass::Private, float);
        let model = rspirv::spirv::ExecutionModel::GLCompute;
        m.entry_point(model, "main", &[], &[var, group], &[]);
        let err = build(m).unwrap_err();
        assert_eq!(
            err.message,
            "Result id of OpDecorationGroup can only be targeted by OpName, OpGroupDecorate, \
             OpDecorate, and OpGroupMemberDecorate"
        );
    }
}
