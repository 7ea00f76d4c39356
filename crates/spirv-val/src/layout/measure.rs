//! Alignment and size arithmetic for explicitly laid out types.

use crate::decoration::DecorationTable;
use crate::error::{Result, ValidationError};
use crate::module_index::ModuleIndex;
use crate::spirv_type::SpirvType;
use rspirv::spirv::{Decoration, Word};
use rustc_hash::FxHashMap;

/// Type graphs nested deeper than this are rejected rather than walked.
pub const MAX_TYPE_DEPTH: u32 = 512;

/// Layout decorations a struct member passes down to the matrices in it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MemberConstraints {
    pub row_major: bool,
    pub matrix_stride: u32,
}

/// Steps one level deeper into a type graph, failing once the depth limit is
/// hit. Cyclic graphs always end up here.
pub fn descend(depth: u32, id: Word) -> Result<u32> {
    if depth >= MAX_TYPE_DEPTH {
        return Err(ValidationError::invalid_binary(format!(
            "Type id {id} is nested more than {MAX_TYPE_DEPTH} levels deep"
        ))
        .at(id));
    }
    Ok(depth + 1)
}

pub fn is_aligned_to(offset: u32, alignment: u32) -> bool {
    alignment == 0 || offset % alignment == 0
}

pub fn align_up(offset: u32, alignment: u32) -> u32 {
    if alignment == 0 {
        return offset;
    }
    offset.checked_next_multiple_of(alignment).unwrap_or(u32::MAX)
}

/// Memoising calculator for scalar alignment, base alignment and size.
pub struct Measure<'a, 'm> {
    index: &'a ModuleIndex<'m>,
    table: &'a DecorationTable,
    scalar_alignments: FxHashMap<Word, u32>,
    base_alignments: FxHashMap<(Word, MemberConstraints, bool), u32>,
    sizes: FxHashMap<(Word, MemberConstraints), u32>,
}

impl<'a, 'm> Measure<'a, 'm> {
    pub fn new(index: &'a ModuleIndex<'m>, table: &'a DecorationTable) -> Self {
        Self {
            index,
            table,
            scalar_alignments: FxHashMap::default(),
            base_alignments: FxHashMap::default(),
            sizes: FxHashMap::default(),
        }
    }

    /// Majorness and `MatrixStride` of member `member` of `struct_id`.
    pub fn member_constraints(&self, struct_id: Word, member: u32) -> MemberConstraints {
        let mut constraints = MemberConstraints::default();
        for decoration in self.table.member_decorations(struct_id, member) {
            match decoration.kind() {
                Decoration::RowMajor => constraints.row_major = true,
                Decoration::ColMajor => constraints.row_major = false,
                Decoration::MatrixStride => {
                    constraints.matrix_stride = decoration.literal().unwrap_or(0);
                }
                _ => {}
            }
        }
        constraints
    }

    /// Alignment under scalar block layout: the largest scalar component.
    pub fn scalar_alignment(&mut self, id: Word) -> Result<u32> {
        self.scalar_alignment_at(id, 0)
    }

    fn scalar_alignment_at(&mut self, id: Word, depth: u32) -> Result<u32> {
        if let Some(&alignment) = self.scalar_alignments.get(&id) {
            return Ok(alignment);
        }
        let depth = descend(depth, id)?;
        let alignment = match self.index.ty(id) {
            Some(SpirvType::Integer(width, _) | SpirvType::Float(width)) => width / 8,
            Some(
                SpirvType::Vector { element, .. }
                | SpirvType::Matrix { element, .. }
                | SpirvType::Array { element, .. }
                | SpirvType::RuntimeArray { element },
            ) => self.scalar_alignment_at(element, depth)?,
            Some(ty @ SpirvType::Struct { .. }) => {
                let mut max = 1;
                for member in ty.struct_members() {
                    max = max.max(self.scalar_alignment_at(member, depth)?);
                }
                max
            }
            Some(SpirvType::Pointer { .. }) => 8,
            _ => 1,
        };
        self.scalar_alignments.insert(id, alignment);
        Ok(alignment)
    }

    /// Base alignment of `id` when used with `constraints`. With `round_up`
    /// (uniform buffer rules), matrices, arrays and structs round up to 16.
    pub fn base_alignment(
        &mut self,
        id: Word,
        constraints: MemberConstraints,
        round_up: bool,
    ) -> Result<u32> {
        self.base_alignment_at(id, constraints, round_up, 0)
    }

    fn base_alignment_at(
        &mut self,
        id: Word,
        constraints: MemberConstraints,
        round_up: bool,
        depth: u32,
    ) -> Result<u32> {
        let key = (id, constraints, round_up);
        if let Some(&alignment) = self.base_alignments.get(&key) {
            return Ok(alignment);
        }
        let depth = descend(depth, id)?;
        let round = |alignment: u32| if round_up { align_up(alignment, 16) } else { alignment };
        let alignment = match self.index.ty(id) {
            Some(SpirvType::Integer(width, _) | SpirvType::Float(width)) => width / 8,
            Some(SpirvType::Vector { element, count }) => {
                let component = self.base_alignment_at(element, constraints, round_up, depth)?;
                component.saturating_mul(if count == 3 { 4 } else { count })
            }
            Some(SpirvType::Matrix { element: column, count: columns }) => {
                let alignment = if constraints.row_major {
                    let component = match self.index.ty(column) {
                        Some(SpirvType::Vector { element, .. }) => element,
                        _ => column,
                    };
                    let component =
                        self.base_alignment_at(component, constraints, round_up, depth)?;
                    component.saturating_mul(if columns == 3 { 4 } else { columns })
                } else {
                    self.base_alignment_at(column, constraints, round_up, depth)?
                };
                round(alignment)
            }
            Some(SpirvType::Array { element, .. } | SpirvType::RuntimeArray { element }) => {
                round(self.base_alignment_at(element, constraints, round_up, depth)?)
            }
            Some(ty @ SpirvType::Struct { .. }) => {
                let mut max = 1;
                for (member, member_ty) in (0..).zip(ty.struct_members()) {
                    let member_constraints = self.member_constraints(id, member);
                    let member_alignment =
                        self.base_alignment_at(member_ty, member_constraints, round_up, depth)?;
                    max = max.max(member_alignment);
                }
                round(max)
            }
            Some(SpirvType::Pointer { .. }) => 8,
            _ => 1,
        };
        self.base_alignments.insert(key, alignment);
        Ok(alignment)
    }

    /// Size in bytes of `id` as laid out by its decorations.
    pub fn size(&mut self, id: Word, constraints: MemberConstraints) -> Result<u32> {
        self.size_at(id, constraints, 0)
    }

    fn size_at(&mut self, id: Word, constraints: MemberConstraints, depth: u32) -> Result<u32> {
        let key = (id, constraints);
        if let Some(&size) = self.sizes.get(&key) {
            return Ok(size);
        }
        let depth = descend(depth, id)?;
        let size = match self.index.ty(id) {
            Some(SpirvType::Integer(width, _) | SpirvType::Float(width)) => width / 8,
            Some(SpirvType::Vector { element, count }) => {
                self.size_at(element, constraints, depth)?.saturating_mul(count)
            }
            // Specialization constant lengths aren't known yet.
            Some(SpirvType::Array { element, count }) => match self.index.eval_u32_constant(count) {
                Some(length) => {
                    let stride = self
                        .table
                        .decoration_literal(id, Decoration::ArrayStride)
                        .unwrap_or(0);
                    let element_size = self.size_at(element, constraints, depth)?;
                    length
                        .saturating_sub(1)
                        .saturating_mul(stride)
                        .saturating_add(element_size)
                }
                None => 0,
            },
            Some(SpirvType::RuntimeArray { .. }) => 0,
            Some(SpirvType::Matrix { element: column, count: columns }) => {
                if constraints.row_major {
                    let (component, rows) = match self.index.ty(column) {
                        Some(SpirvType::Vector { element, count }) => (element, count),
                        _ => (column, 1),
                    };
                    let component_size = self.size_at(component, constraints, depth)?;
                    rows.saturating_sub(1)
                        .saturating_mul(constraints.matrix_stride)
                        .saturating_add(columns.saturating_mul(component_size))
                } else {
                    columns.saturating_mul(constraints.matrix_stride)
                }
            }
            Some(ty @ SpirvType::Struct { .. }) => match ty.member_count().checked_sub(1) {
                Some(last) => {
                    let offset = self.table.member_offset(id, last).unwrap_or(0);
                    let last_ty = ty.member(last).unwrap_or(0);
                    let last_constraints = self.member_constraints(id, last);
                    offset.saturating_add(self.size_at(last_ty, last_constraints, depth)?)
                }
                None => 0,
            },
            Some(SpirvType::Pointer { .. }) => 8,
            _ => 0,
        };
        self.sizes.insert(key, size);
        Ok(size)
    }
}
