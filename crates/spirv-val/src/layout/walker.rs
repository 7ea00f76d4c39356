//! Explicit layout checks for Block and BufferBlock structs.

use super::measure::{MemberConstraints, Measure, align_up, descend, is_aligned_to};
use super::policy::LayoutPolicy;
use crate::decoration::DecorationTable;
use crate::error::{Result, ValidationError};
use crate::module_index::ModuleIndex;
use crate::spirv_type::SpirvType;
use rspirv::spirv::{Decoration, StorageClass, Word};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::fmt;
use tracing::{debug, trace};

/// An `Offset` of all ones is never valid and counts as absent.
const INVALID_OFFSET: u32 = u32::MAX;

/// Successful struct walks are keyed by absolute offset modulo this, a
/// multiple of every base alignment SPIR-V types can have.
const OFFSET_CLASSES: u32 = 256;

/// The block a walk started from, for diagnostics.
#[derive(Copy, Clone, Debug)]
struct BlockContext {
    decoration: &'static str,
    storage_class: StorageClass,
    policy: LayoutPolicy,
}

impl BlockContext {
    fn fail(&self, struct_id: Word, member: u32, detail: impl fmt::Display) -> ValidationError {
        ValidationError::invalid_id(format!(
            "Structure id {struct_id} decorated as {} for variable in {:?} storage class \
             must follow {} layout rules: member {member} {detail}",
            self.decoration, self.storage_class, self.policy
        ))
        .at(struct_id)
    }
}

#[derive(Copy, Clone, Debug)]
struct MemberSlot {
    member: u32,
    ty: Word,
    /// Absolute offset, `None` when the member has no usable `Offset`.
    offset: Option<u32>,
}

/// Name of the block decoration on `struct_id`, if it has one.
pub fn block_decoration(table: &DecorationTable, struct_id: Word) -> Option<&'static str> {
    if table.has_decoration(struct_id, Decoration::Block) {
        Some("Block")
    } else if table.has_decoration(struct_id, Decoration::BufferBlock) {
        Some("BufferBlock")
    } else {
        None
    }
}

pub struct LayoutWalker<'a, 'm> {
    index: &'a ModuleIndex<'m>,
    table: &'a DecorationTable,
    measure: Measure<'a, 'm>,
    verified: FxHashSet<(Word, u32, LayoutPolicy)>,
}

impl<'a, 'm> LayoutWalker<'a, 'm> {
    pub fn new(index: &'a ModuleIndex<'m>, table: &'a DecorationTable) -> Self {
        Self {
            index,
            table,
            measure: Measure::new(index, table),
            verified: FxHashSet::default(),
        }
    }

    /// Fails if another Block or BufferBlock struct is reachable from the
    /// members of `root`, through any number of arrays and plain structs.
    pub fn check_nesting(&self, root: Word) -> Result<()> {
        let Some(root_decoration) = block_decoration(self.table, root) else {
            return Ok(());
        };
        let mut visited = FxHashSet::default();
        let mut stack: Vec<(Word, Word)> = self
            .index
            .ty(root)
            .into_iter()
            .flat_map(SpirvType::struct_members)
            .map(|member| (member, root))
            .collect();
        while let Some((id, parent)) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            match self.index.ty(id) {
                Some(ty @ SpirvType::Struct { .. }) => {
                    if let Some(decoration) = block_decoration(self.table, id) {
                        return Err(ValidationError::invalid_id(format!(
                            "Structure id {id} decorated as {decoration} cannot be nested within \
                             another Block or BufferBlock: it is reachable from structure id \
                             {root} decorated as {root_decoration} through structure id {parent}"
                        ))
                        .at(root));
                    }
                    stack.extend(ty.struct_members().map(|member| (member, id)));
                }
                Some(ty) => stack.extend(ty.array_element().map(|element| (element, parent))),
                None => {}
            }
        }
        Ok(())
    }

    /// Checks the layout of the Block or BufferBlock struct `root` used in
    /// `storage_class`. A `None` policy skips every check.
    pub fn check_block(
        &mut self,
        root: Word,
        storage_class: StorageClass,
        policy: Option<LayoutPolicy>,
    ) -> Result<()> {
        let Some(policy) = policy else {
            return Ok(());
        };
        let Some(decoration) = block_decoration(self.table, root) else {
            return Ok(());
        };
        debug!(
            "checking {} as {} layout in {:?} storage",
            self.index.display_id(root),
            policy,
            storage_class
        );

        let missing = |what: &str| {
            ValidationError::invalid_id(format!(
                "Structure id {root} decorated as {decoration} must be explicitly laid out with \
                 {what} decorations."
            ))
            .at(root)
        };
        if self.is_missing_offset(root, &mut FxHashSet::default(), 0)? {
            return Err(missing("Offset"));
        }
        for (required, what) in [
            (RequiredLayout::ArrayStride, "ArrayStride"),
            (RequiredLayout::MatrixStride, "MatrixStride"),
            (RequiredLayout::Majorness, "RowMajor or ColMajor"),
        ] {
            if !self.has_required(root, required, &mut FxHashSet::default(), 0)? {
                return Err(missing(what));
            }
        }

        let context = BlockContext {
            decoration,
            storage_class,
            policy,
        };
        self.check_struct(root, 0, &context, 0)
    }

    /// Whether any member of `id`, or of a struct nested in it, lacks a
    /// usable `Offset`. Ids in `complete` are known to be fine.
    fn is_missing_offset(
        &self,
        id: Word,
        complete: &mut FxHashSet<Word>,
        depth: u32,
    ) -> Result<bool> {
        if complete.contains(&id) {
            return Ok(false);
        }
        let depth = descend(depth, id)?;
        let nested: SmallVec<[Word; 8]> = match self.index.ty(id) {
            Some(ty @ SpirvType::Struct { .. }) => {
                for member in 0..ty.member_count() {
                    match self.table.member_offset(id, member) {
                        Some(INVALID_OFFSET) | None => return Ok(true),
                        Some(_) => {}
                    }
                }
                ty.struct_members().collect()
            }
            Some(ty) => ty.array_element().into_iter().collect(),
            None => SmallVec::new(),
        };
        for member in nested {
            if self.is_missing_offset(member, complete, depth)? {
                return Ok(true);
            }
        }
        complete.insert(id);
        Ok(false)
    }

    /// Whether every array, or every matrix, reachable from the members of
    /// `struct_id` carries the `required` decoration. Matrix decorations
    /// live on the member holding the matrix, even through arrays.
    fn has_required(
        &self,
        struct_id: Word,
        required: RequiredLayout,
        complete: &mut FxHashSet<Word>,
        depth: u32,
    ) -> Result<bool> {
        if complete.contains(&struct_id) {
            return Ok(true);
        }
        let depth = descend(depth, struct_id)?;
        let Some(ty @ SpirvType::Struct { .. }) = self.index.ty(struct_id) else {
            return Ok(true);
        };
        for (member, member_ty) in (0..).zip(ty.struct_members()) {
            let mut id = member_ty;
            let mut level = depth;
            loop {
                level = descend(level, id)?;
                match self.index.ty(id) {
                    Some(
                        SpirvType::Array { element, .. } | SpirvType::RuntimeArray { element },
                    ) => {
                        if required == RequiredLayout::ArrayStride
                            && !self.table.has_decoration(id, Decoration::ArrayStride)
                        {
                            return Ok(false);
                        }
                        id = element;
                    }
                    Some(SpirvType::Matrix { .. }) => {
                        let has = |decoration| {
                            self.table.has_member_decoration(struct_id, member, decoration)
                        };
                        let found = match required {
                            RequiredLayout::ArrayStride => true,
                            RequiredLayout::MatrixStride => has(Decoration::MatrixStride),
                            RequiredLayout::Majorness => {
                                has(Decoration::RowMajor) || has(Decoration::ColMajor)
                            }
                        };
                        if !found {
                            return Ok(false);
                        }
                        break;
                    }
                    Some(SpirvType::Struct { .. }) => {
                        if !self.has_required(id, required, complete, level)? {
                            return Ok(false);
                        }
                        break;
                    }
                    _ => break,
                }
            }
        }
        complete.insert(struct_id);
        Ok(true)
    }

    fn check_struct(
        &mut self,
        struct_id: Word,
        base_offset: u32,
        context: &BlockContext,
        depth: u32,
    ) -> Result<()> {
        let key = (struct_id, base_offset % OFFSET_CLASSES, context.policy);
        if self.verified.contains(&key) {
            return Ok(());
        }
        let depth = descend(depth, struct_id)?;
        let Some(ty @ SpirvType::Struct { .. }) = self.index.ty(struct_id) else {
            return Ok(());
        };
        trace!("walking %{} at offset {}", struct_id, base_offset);

        let policy = context.policy;
        let uniform = policy.is_uniform();
        let scalar = policy.is_scalar();
        let relaxed = policy.is_relaxed();

        let mut slots: SmallVec<[MemberSlot; 8]> = (0..)
            .zip(ty.struct_members())
            .map(|(member, ty)| MemberSlot {
                member,
                ty,
                offset: match self.table.member_offset(struct_id, member) {
                    Some(INVALID_OFFSET) | None => None,
                    Some(offset) => Some(base_offset.saturating_add(offset)),
                },
            })
            .collect();
        // Overlap is judged in offset order, not declaration order.
        slots.sort_by_key(|slot| slot.offset.unwrap_or(u32::MAX));

        let mut next_valid_offset = 0u32;
        for (position, slot) in slots.iter().enumerate() {
            let fail = |detail: fmt::Arguments<'_>| context.fail(struct_id, slot.member, detail);
            let Some(offset) = slot.offset else {
                return Err(fail(format_args!("is missing an Offset decoration")));
            };
            let member_ty = self.index.ty(slot.ty);
            // Empty structs occupy no bytes and may sit anywhere.
            if matches!(member_ty, Some(ty @ SpirvType::Struct { .. }) if ty.member_count() == 0) {
                continue;
            }
            let constraints = self.measure.member_constraints(struct_id, slot.member);
            let alignment = self.alignment(slot.ty, constraints, uniform, scalar)?;
            let size = self.measure.size(slot.ty, constraints)?;

            if matches!(member_ty, Some(SpirvType::RuntimeArray { .. }))
                && slots[position + 1..]
                    .iter()
                    .any(|later| later.offset.is_some_and(|later| later > offset))
            {
                return Err(fail(format_args!(
                    "has a runtime array at offset {offset}, but other members at larger offsets"
                )));
            }

            match member_ty {
                Some(SpirvType::Vector { element, .. }) if relaxed => {
                    let scalar_alignment = self.measure.scalar_alignment(element)?;
                    if !is_aligned_to(offset, scalar_alignment) {
                        return Err(fail(format_args!(
                            "at offset {offset} is not aligned to scalar element size \
                             {scalar_alignment}"
                        )));
                    }
                }
                _ => {
                    if !is_aligned_to(offset, alignment) {
                        return Err(fail(format_args!(
                            "at offset {offset} is not aligned to {alignment}"
                        )));
                    }
                }
            }

            if offset < next_valid_offset {
                return Err(fail(format_args!(
                    "at offset {offset} overlaps previous member ending at offset {}",
                    next_valid_offset - 1
                )));
            }

            if relaxed
                && matches!(member_ty, Some(SpirvType::Vector { .. }))
                && improperly_straddles(offset, size)
            {
                return Err(fail(format_args!(
                    "is an improperly straddling vector at offset {offset}"
                )));
            }

            match member_ty {
                Some(SpirvType::Struct { .. }) => {
                    self.check_struct(slot.ty, offset, context, depth)?;
                }
                Some(SpirvType::Matrix { .. })
                    if !is_aligned_to(constraints.matrix_stride, alignment) =>
                {
                    return Err(fail(format_args!(
                        "is a matrix with stride {} not satisfying alignment to {alignment}",
                        constraints.matrix_stride
                    )));
                }
                _ => {}
            }

            self.check_array_member(
                struct_id,
                slot,
                offset,
                alignment,
                constraints,
                context,
                depth,
            )?;

            next_valid_offset = offset.saturating_add(size);
            if !scalar
                && matches!(member_ty, Some(SpirvType::Array { .. } | SpirvType::Struct { .. }))
            {
                // Nothing may live in the padding of a struct or array.
                next_valid_offset = align_up(next_valid_offset, alignment);
            }
        }

        self.verified.insert(key);
        Ok(())
    }

    /// Strides, element sizes and struct elements of an array member, level
    /// by level for arrays of arrays.
    #[allow(clippy::too_many_arguments)]
    fn check_array_member(
        &mut self,
        struct_id: Word,
        slot: &MemberSlot,
        offset: u32,
        alignment: u32,
        constraints: MemberConstraints,
        context: &BlockContext,
        depth: u32,
    ) -> Result<()> {
        let policy = context.policy;
        let fail = |detail: fmt::Arguments<'_>| context.fail(struct_id, slot.member, detail);

        let mut array_id = slot.ty;
        let mut array_alignment = alignment;
        let mut level = depth;
        while let Some(array_ty @ (SpirvType::Array { .. } | SpirvType::RuntimeArray { .. })) =
            self.index.ty(array_id)
        {
            level = descend(level, array_id)?;
            let Some(element) = array_ty.array_element() else {
                break;
            };
            let stride = self.table.decoration_literal(array_id, Decoration::ArrayStride);
            if let Some(stride) = stride {
                if stride == 0 {
                    return Err(fail(format_args!("contains an array with stride 0")));
                }
                if !is_aligned_to(stride, array_alignment) {
                    return Err(fail(format_args!(
                        "contains an array with stride {stride} not satisfying alignment to \
                         {array_alignment}"
                    )));
                }
            }
            let stride = stride.unwrap_or(0);

            let length = match array_ty {
                SpirvType::Array { count, .. } => self.index.eval_u32_constant(count).unwrap_or(0),
                _ => 0,
            };
            match self.index.ty(element) {
                Some(SpirvType::Struct { .. }) => {
                    // Element offsets repeat modulo 16 after at most 16 steps.
                    let mut seen = [false; 16];
                    for i in 0..length.max(1) {
                        let element_offset = offset.wrapping_add(i.wrapping_mul(stride));
                        let class = (element_offset % 16) as usize;
                        if seen[class] {
                            break;
                        }
                        self.check_struct(element, element_offset, context, level)?;
                        seen[class] = true;
                    }
                }
                Some(SpirvType::Matrix { .. })
                    if !is_aligned_to(constraints.matrix_stride, alignment) =>
                {
                    return Err(fail(format_args!(
                        "is a matrix with stride {} not satisfying alignment to {alignment}",
                        constraints.matrix_stride
                    )));
                }
                _ => {}
            }

            array_alignment =
                self.alignment(element, constraints, policy.is_uniform(), policy.is_scalar())?;
            let element_size = self.measure.size(element, constraints)?;
            if element_size > stride {
                return Err(fail(format_args!(
                    "contains an array with stride {stride}, but with an element size of \
                     {element_size}"
                )));
            }
            array_id = element;
        }
        Ok(())
    }

    fn alignment(
        &mut self,
        id: Word,
        constraints: MemberConstraints,
        uniform: bool,
        scalar: bool,
    ) -> Result<u32> {
        if scalar {
            self.measure.scalar_alignment(id)
        } else {
            self.measure.base_alignment(id, constraints, uniform)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum RequiredLayout {
    ArrayStride,
    MatrixStride,
    Majorness,
}

/// A vector of at most 16 bytes must stay within one 16-byte slot; a larger
/// one must start on a slot boundary.
fn improperly_straddles(offset: u32, size: u32) -> bool {
    if size <= 16 {
        let last = offset.saturating_add(size.saturating_sub(1));
        offset >> 4 != last >> 4
    } else {
        offset % 16 != 0
    }
}
