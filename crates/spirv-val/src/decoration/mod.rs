//! Decoration records and the per-module table built from them.

mod table;

pub use table::DecorationTable;

use rspirv::dr::Operand;
use rspirv::spirv::{self, BuiltIn, FPRoundingMode, FunctionParameterAttribute, LinkageType, Word};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// One operand of a decoration, after the decoration kind itself.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DecorationParam {
    Literal(u32),
    Id(Word),
    String(String),
    BuiltIn(BuiltIn),
    FPRoundingMode(FPRoundingMode),
    LinkageType(LinkageType),
    FuncParamAttr(FunctionParameterAttribute),
    /// An enumerant operand with no dedicated variant, kept in its debug form.
    Other(String),
}

impl DecorationParam {
    pub fn from_operand(operand: &Operand) -> Self {
        match operand {
            &Operand::LiteralBit32(value) => Self::Literal(value),
            Operand::LiteralString(value) => Self::String(value.clone()),
            &Operand::BuiltIn(builtin) => Self::BuiltIn(builtin),
            &Operand::FPRoundingMode(mode) => Self::FPRoundingMode(mode),
            &Operand::LinkageType(linkage) => Self::LinkageType(linkage),
            &Operand::FunctionParameterAttribute(attr) => Self::FuncParamAttr(attr),
            other => match other.id_ref_any() {
                Some(id) => Self::Id(id),
                None => Self::Other(format!("{other:?}")),
            },
        }
    }

    /// Ordering key: variant rank first, then the value.
    fn sort_key(&self) -> (u8, u32, &str) {
        match self {
            Self::Literal(value) => (0, *value, ""),
            Self::Id(id) => (1, *id, ""),
            Self::String(value) => (2, 0, value),
            Self::BuiltIn(builtin) => (3, *builtin as u32, ""),
            Self::FPRoundingMode(mode) => (4, *mode as u32, ""),
            Self::LinkageType(linkage) => (5, *linkage as u32, ""),
            Self::FuncParamAttr(attr) => (6, *attr as u32, ""),
            Self::Other(value) => (7, 0, value),
        }
    }
}

impl PartialOrd for DecorationParam {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DecorationParam {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for DecorationParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value}"),
            Self::Id(id) => write!(f, "%{id}"),
            Self::String(value) => write!(f, "{value:?}"),
            Self::BuiltIn(builtin) => write!(f, "{builtin:?}"),
            Self::FPRoundingMode(mode) => write!(f, "{mode:?}"),
            Self::LinkageType(linkage) => write!(f, "{linkage:?}"),
            Self::FuncParamAttr(attr) => write!(f, "{attr:?}"),
            Self::Other(value) => f.write_str(value),
        }
    }
}

/// A single applied decoration: its kind, its operands and, for member
/// decorations, the struct member index. Immutable once built.
///
/// Two decorations are equal iff all three parts are equal; the table keeps
/// duplicates around for multiplicity checks but queries see them collapsed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Decoration {
    kind: spirv::Decoration,
    params: SmallVec<[DecorationParam; 1]>,
    member: Option<u32>,
}

impl Decoration {
    pub fn new(
        kind: spirv::Decoration,
        params: impl IntoIterator<Item = DecorationParam>,
        member: Option<u32>,
    ) -> Self {
        Self {
            kind,
            params: params.into_iter().collect(),
            member,
        }
    }

    pub fn from_operands(
        kind: spirv::Decoration,
        operands: &[Operand],
        member: Option<u32>,
    ) -> Self {
        Self::new(kind, operands.iter().map(DecorationParam::from_operand), member)
    }

    pub fn kind(&self) -> spirv::Decoration {
        self.kind
    }

    pub fn params(&self) -> &[DecorationParam] {
        &self.params
    }

    /// The struct member index, `None` for whole-object decorations.
    pub fn member(&self) -> Option<u32> {
        self.member
    }

    /// The same decoration moved onto a struct member.
    #[must_use]
    pub fn on_member(&self, member: u32) -> Self {
        Self {
            member: Some(member),
            ..self.clone()
        }
    }

    /// The first literal operand, e.g. the byte offset of `Offset`.
    pub fn literal(&self) -> Option<u32> {
        match self.params.first() {
            Some(&DecorationParam::Literal(value)) => Some(value),
            _ => None,
        }
    }

    pub fn id_param(&self) -> Option<Word> {
        match self.params.first() {
            Some(&DecorationParam::Id(id)) => Some(id),
            _ => None,
        }
    }

    pub fn builtin(&self) -> Option<BuiltIn> {
        match self.params.first() {
            Some(&DecorationParam::BuiltIn(builtin)) => Some(builtin),
            _ => None,
        }
    }

    pub fn rounding_mode(&self) -> Option<FPRoundingMode> {
        match self.params.first() {
            Some(&DecorationParam::FPRoundingMode(mode)) => Some(mode),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&str> {
        self.params.iter().find_map(|param| match param {
            DecorationParam::String(value) => Some(value.as_str()),
            _ => None,
        })
    }

    fn sort_key(&self) -> (Option<u32>, u32) {
        (self.member, self.kind as u32)
    }
}

impl PartialOrd for Decoration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Whole-object decorations sort before member decorations; within each, by
/// kind value, then operands.
impl Ord for Decoration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.params.as_slice().cmp(other.params.as_slice()))
    }
}

impl fmt::Display for Decoration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(member) = self.member {
            write!(f, "member {member} ")?;
        }
        write!(f, "{}", kind_name(self.kind))?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        Ok(())
    }
}

/// The decoration's name as spelled in the SPIR-V grammar.
pub fn kind_name(kind: spirv::Decoration) -> String {
    format!("{kind:?}")
}

/// Decorations whose operands are ids, which must be applied with `OpDecorateId`.
pub fn takes_id_parameters(kind: spirv::Decoration) -> bool {
    matches!(
        kind,
        spirv::Decoration::UniformId
            | spirv::Decoration::AlignmentId
            | spirv::Decoration::MaxByteOffsetId
    )
}

/// Decorations whose operands are strings, applied with `OpDecorateString`.
pub fn takes_string_parameters(kind: spirv::Decoration) -> bool {
    matches!(
        kind,
        spirv::Decoration::UserSemantic | spirv::Decoration::UserTypeGOOGLE
    )
}

/// Decorations only meaningful on struct members.
pub fn is_member_decoration_only(kind: spirv::Decoration) -> bool {
    // Offset is left out: transform feedback puts it on variables too.
    matches!(
        kind,
        spirv::Decoration::RowMajor | spirv::Decoration::ColMajor | spirv::Decoration::MatrixStride
    )
}

/// Decorations that may never be applied to struct members.
pub fn is_not_member_decoration(kind: spirv::Decoration) -> bool {
    use spirv::Decoration as D;
    // Restrict is allowed on members, glslang emits it there.
    matches!(
        kind,
        D::SpecId
            | D::Block
            | D::BufferBlock
            | D::ArrayStride
            | D::GLSLShared
            | D::GLSLPacked
            | D::CPacked
            | D::Aliased
            | D::Constant
            | D::Uniform
            | D::UniformId
            | D::SaturatedConversion
            | D::Index
            | D::Binding
            | D::DescriptorSet
            | D::FuncParamAttr
            | D::FPRoundingMode
            | D::FPFastMathMode
            | D::LinkageAttributes
            | D::NoContraction
            | D::InputAttachmentIndex
            | D::Alignment
            | D::MaxByteOffset
            | D::AlignmentId
            | D::MaxByteOffsetId
            | D::NoSignedWrap
            | D::NoUnsignedWrap
            | D::NonUniform
            | D::RestrictPointer
            | D::AliasedPointer
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn offset(value: u32, member: Option<u32>) -> Decoration {
        Decoration::new(spirv::Decoration::Offset, [DecorationParam::Literal(value)], member)
    }

    #[test]
    fn equality_covers_kind_params_and_member() {
        let offset0 = offset(0, Some(0));
        let offset4 = offset(4, Some(0));
        assert_ne!(offset0, offset4);
        assert_ne!(offset0, offset0.on_member(1));
        assert_eq!(offset0, offset(0, None).on_member(0));

        let set: BTreeSet<_> = [offset4.clone(), offset0.clone(), offset0.clone()]
            .into_iter()
            .collect();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![offset0, offset4]);
    }

    #[test]
    fn whole_object_decorations_sort_first() {
        let member = offset(0, Some(0));
        let block = Decoration::new(spirv::Decoration::Block, [], None);
        let binding =
            Decoration::new(spirv::Decoration::Binding, [DecorationParam::Literal(1)], None);
        let mut sorted = vec![member.clone(), binding.clone(), block.clone()];
        sorted.sort();
        assert_eq!(sorted, vec![block, binding, member]);
    }

    #[test]
    fn operand_conversion() {
        let decoration = Decoration::from_operands(
            spirv::Decoration::BuiltIn,
            &[Operand::BuiltIn(BuiltIn::Position)],
            Some(2),
        );
        assert_eq!(decoration.builtin(), Some(BuiltIn::Position));
        assert_eq!(decoration.to_string(), "member 2 BuiltIn Position");

        let linkage = Decoration::from_operands(
            spirv::Decoration::LinkageAttributes,
            &[
                Operand::LiteralString("foo".to_string()),
                Operand::LinkageType(LinkageType::Export),
            ],
            None,
        );
        assert_eq!(linkage.string(), Some("foo"));
        assert_eq!(linkage.to_string(), "LinkageAttributes \"foo\" Export");

        let uniform_id =
            Decoration::from_operands(spirv::Decoration::UniformId, &[Operand::IdScope(7)], None);
        assert_eq!(uniform_id.id_param(), Some(7));
    }

    #[test]
    fn classification() {
        assert!(takes_id_parameters(spirv::Decoration::UniformId));
        assert!(!takes_id_parameters(spirv::Decoration::Uniform));
        assert!(is_member_decoration_only(spirv::Decoration::MatrixStride));
        assert!(!is_member_decoration_only(spirv::Decoration::Offset));
        assert!(is_not_member_decoration(spirv::Decoration::Block));
        assert!(!is_not_member_decoration(spirv::Decoration::Offset));
        assert_eq!(kind_name(spirv::Decoration::ArrayStride), "ArrayStride");
    }
}
