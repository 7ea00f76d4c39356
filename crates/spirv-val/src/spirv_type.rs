use rspirv::dr::{Instruction, Operand};
use rspirv::spirv::{Dim, Op, StorageClass, Word};

/// SPIR-V types are plain `Word`s: the `result_id` of an `OpType*` instruction.
/// Layout and decoration checks constantly need to ask "is this an array? of
/// what?", so this is a borrowed, decoded view of one type instruction. It is
/// never stored, only rebuilt on demand from the module index, which keeps the
/// type graph a DAG over ids rather than an owned tree.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SpirvType<'m> {
    Void,
    Bool,
    Integer(u32, bool),
    Float(u32),
    Vector {
        element: Word,
        /// Note: vector count is literal.
        count: u32,
    },
    Matrix {
        /// The column type, itself a vector.
        element: Word,
        /// Note: matrix column count is literal.
        count: u32,
    },
    Array {
        element: Word,
        /// Note: array count is ref to constant.
        count: Word,
    },
    RuntimeArray {
        element: Word,
    },
    Struct {
        members: &'m [Operand],
    },
    Pointer {
        storage_class: StorageClass,
        pointee: Word,
    },
    Function,
    Image {
        sampled_type: Word,
        dim: Dim,
        sampled: u32,
    },
    Sampler,
    SampledImage {
        image_type: Word,
    },
    /// Any other type instruction (opaque handles, acceleration structures, ...).
    Other(Op),
}

fn id_at(inst: &Instruction, index: usize) -> Option<Word> {
    inst.operands.get(index).and_then(Operand::id_ref_any)
}

fn literal_at(inst: &Instruction, index: usize) -> Option<u32> {
    match inst.operands.get(index) {
        Some(&Operand::LiteralBit32(value)) => Some(value),
        _ => None,
    }
}

impl<'m> SpirvType<'m> {
    /// Decodes a type declaration, `None` if `inst` doesn't declare a type.
    /// Malformed operand lists decode as `Other`, so callers treat them like
    /// any type they have no rule for.
    pub fn from_inst(inst: &'m Instruction) -> Option<Self> {
        let op = inst.class.opcode;
        let decoded = match op {
            Op::TypeVoid => Some(Self::Void),
            Op::TypeBool => Some(Self::Bool),
            Op::TypeInt => literal_at(inst, 0)
                .zip(literal_at(inst, 1))
                .map(|(width, signedness)| Self::Integer(width, signedness != 0)),
            Op::TypeFloat => literal_at(inst, 0).map(Self::Float),
            Op::TypeVector => id_at(inst, 0)
                .zip(literal_at(inst, 1))
                .map(|(element, count)| Self::Vector { element, count }),
            Op::TypeMatrix => id_at(inst, 0)
                .zip(literal_at(inst, 1))
                .map(|(element, count)| Self::Matrix { element, count }),
            Op::TypeArray => id_at(inst, 0)
                .zip(id_at(inst, 1))
                .map(|(element, count)| Self::Array { element, count }),
            Op::TypeRuntimeArray => id_at(inst, 0).map(|element| Self::RuntimeArray { element }),
            Op::TypeStruct => Some(Self::Struct {
                members: &inst.operands,
            }),
            Op::TypePointer => match (inst.operands.first(), id_at(inst, 1)) {
                (Some(&Operand::StorageClass(storage_class)), Some(pointee)) => Some(Self::Pointer {
                    storage_class,
                    pointee,
                }),
                _ => None,
            },
            Op::TypeFunction => Some(Self::Function),
            Op::TypeImage => match (id_at(inst, 0), inst.operands.get(1), literal_at(inst, 5)) {
                (Some(sampled_type), Some(&Operand::Dim(dim)), Some(sampled)) => Some(Self::Image {
                    sampled_type,
                    dim,
                    sampled,
                }),
                _ => None,
            },
            Op::TypeSampler => Some(Self::Sampler),
            Op::TypeSampledImage => {
                id_at(inst, 0).map(|image_type| Self::SampledImage { image_type })
            }
            Op::TypeOpaque
            | Op::TypeEvent
            | Op::TypeDeviceEvent
            | Op::TypeReserveId
            | Op::TypeQueue
            | Op::TypePipe
            | Op::TypeForwardPointer
            | Op::TypePipeStorage
            | Op::TypeNamedBarrier
            | Op::TypeAccelerationStructureKHR
            | Op::TypeRayQueryKHR => Some(Self::Other(op)),
            _ => return None,
        };
        Some(decoded.unwrap_or(Self::Other(op)))
    }

    /// Member type ids of a struct, empty for every other type.
    pub fn struct_members(self) -> impl Iterator<Item = Word> + 'm {
        let members: &'m [Operand] = match self {
            Self::Struct { members } => members,
            _ => &[],
        };
        members.iter().filter_map(Operand::id_ref_any)
    }

    pub fn member_count(&self) -> u32 {
        match *self {
            Self::Struct { members } => members.len() as u32,
            _ => 0,
        }
    }

    pub fn member(&self, index: u32) -> Option<Word> {
        match *self {
            Self::Struct { members } => members.get(index as usize).and_then(Operand::id_ref_any),
            _ => None,
        }
    }

    /// Element type of an array or runtime array.
    pub fn array_element(&self) -> Option<Word> {
        match *self {
            Self::Array { element, .. } | Self::RuntimeArray { element } => Some(element),
            _ => None,
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. } | Self::RuntimeArray { .. })
    }

    /// Width in bits of an int/float scalar.
    pub fn scalar_width(&self) -> Option<u32> {
        match *self {
            Self::Integer(width, _) | Self::Float(width) => Some(width),
            _ => None,
        }
    }
}
